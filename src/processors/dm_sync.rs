//! Direct-message state sync.
//!
//! Mirrors the network's conversations into the `conversations` table and
//! works out which incoming messages still need an answer.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::db::{self, ConversationUpsert, Database};
use crate::twitter::{
    compare_message_ids, DirectMessageInbox, SocialClient, UnreadMessage,
};

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub inbox: DirectMessageInbox,
    /// Conversations whose stored state changed.
    pub updated: usize,
    /// Conversations whose latest message is newer than the bot's last reply.
    pub awaiting_reply: usize,
}

/// Fetch every conversation and persist the ones that changed.
///
/// A row is only written when the latest message id or the bot's own latest
/// message id differs from what is stored.
///
/// # Errors
///
/// Returns an error if the inbox cannot be fetched or the store cannot be
/// read or written.
pub async fn sync_direct_messages(
    db: &Database,
    client: &dyn SocialClient,
    user_id: &str,
) -> Result<SyncOutcome> {
    debug!("Syncing direct messages");
    let inbox = client
        .sync_direct_messages(user_id)
        .await
        .context("Failed to fetch direct messages")?;

    let mut updated = 0;
    let mut awaiting_reply = 0;

    for conversation in &inbox.conversations {
        let Some(latest) = conversation
            .messages
            .iter()
            .max_by(|a, b| compare_message_ids(&a.id, &b.id))
        else {
            continue;
        };

        let existing = db::get_conversation(db.pool(), &conversation.conversation_id).await?;

        let fetched_our_last = conversation
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id)
            .max_by(|a, b| compare_message_ids(&a.id, &b.id))
            .map_or("0", |m| m.id.as_str());

        // The inbox can lag behind a reply we already recorded; the pointer
        // only moves forward.
        let our_last_id = match &existing {
            Some(stored)
                if compare_message_ids(&stored.our_last_message_id, fetched_our_last).is_gt() =>
            {
                stored.our_last_message_id.as_str()
            }
            _ => fetched_our_last,
        };

        let has_unread =
            latest.sender_id != user_id && compare_message_ids(&latest.id, our_last_id).is_gt();
        if has_unread {
            awaiting_reply += 1;
        }

        let changed = existing.as_ref().map_or(true, |stored| {
            stored.last_message_id != latest.id || stored.our_last_message_id != our_last_id
        });
        if !changed {
            continue;
        }

        db::upsert_conversation(
            db.pool(),
            &ConversationUpsert {
                conversation_id: conversation.conversation_id.clone(),
                last_message_id: latest.id.clone(),
                last_message_timestamp: latest.created_at.clone(),
                our_last_message_id: our_last_id.to_string(),
                sender_id: latest.sender_id.clone(),
                sender_screen_name: inbox
                    .screen_name(&latest.sender_id)
                    .unwrap_or_default()
                    .to_string(),
                recipient_id: latest.recipient_id.clone(),
                recipient_screen_name: inbox
                    .screen_name(&latest.recipient_id)
                    .unwrap_or_default()
                    .to_string(),
                has_unread_messages: has_unread,
            },
        )
        .await?;
        updated += 1;
    }

    info!(
        conversations = inbox.conversations.len(),
        updated, awaiting_reply, "Direct message sync complete"
    );

    Ok(SyncOutcome {
        inbox,
        updated,
        awaiting_reply,
    })
}

/// Messages in unread conversations that the bot has not answered.
///
/// For each unread conversation: messages from someone other than the bot
/// with an id greater than the bot's last message id, oldest first.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn get_all_unread_messages(
    db: &Database,
    inbox: &DirectMessageInbox,
    user_id: &str,
) -> Result<Vec<UnreadMessage>> {
    let conversations = db::get_unread_conversations(db.pool()).await?;
    let mut unread = Vec::new();

    for stored in conversations {
        let Some(live) = inbox
            .conversation(&stored.conversation_id)
            .filter(|c| !c.messages.is_empty())
        else {
            warn!(conversation_id = %stored.conversation_id, "No messages found for unread conversation");
            continue;
        };

        let mut pending: Vec<_> = live
            .messages
            .iter()
            .filter(|m| m.sender_id != user_id)
            .filter(|m| compare_message_ids(&m.id, &stored.our_last_message_id).is_gt())
            .collect();
        pending.sort_by(|a, b| compare_message_ids(&a.id, &b.id));

        for message in pending {
            let sender_screen_name = inbox
                .screen_name(&message.sender_id)
                .map(ToString::to_string)
                .or_else(|| stored.sender_screen_name.clone())
                .unwrap_or_default();
            let recipient_screen_name = inbox
                .screen_name(&message.recipient_id)
                .map(ToString::to_string)
                .or_else(|| stored.recipient_screen_name.clone())
                .unwrap_or_default();

            unread.push(UnreadMessage {
                conversation_id: live.conversation_id.clone(),
                message: message.clone(),
                sender_screen_name,
                recipient_screen_name,
            });
        }
    }

    debug!(count = unread.len(), "Collected unread messages");
    Ok(unread)
}
