//! Direct-message pipeline: archive posts people send the bot and answer
//! every other message with a short acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::dm_sync::{get_all_unread_messages, sync_direct_messages};
use super::interpret::interpret_dm;
use super::CycleReport;
use crate::archiver::Archiver;
use crate::constants::{DM_ACKNOWLEDGEMENT, DM_POST_NOT_FOUND};
use crate::db::{self, Database};
use crate::reply::ReplyComposer;
use crate::scheduler::run_periodic;
use crate::twitter::{SocialClient, UnreadMessage};

/// Polls direct messages and answers each unread one.
pub struct DmProcessor {
    db: Database,
    client: Arc<dyn SocialClient>,
    archiver: Archiver,
    composer: ReplyComposer,
}

impl DmProcessor {
    #[must_use]
    pub fn new(
        db: Database,
        client: Arc<dyn SocialClient>,
        archiver: Archiver,
        composer: ReplyComposer,
    ) -> Self {
        Self {
            db,
            client,
            archiver,
            composer,
        }
    }

    /// Poll every `interval` until `shutdown` is cancelled.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        run_periodic("dms", interval, shutdown, move || async move {
            match self.run_cycle().await {
                Ok(report) => info!(
                    seen = report.seen,
                    replied = report.replied,
                    failed = report.failed,
                    "DM cycle complete"
                ),
                Err(e) => error!("DM cycle failed: {e:#}"),
            }
        })
        .await;
    }

    /// Sync conversations, then answer every unread message oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the bot profile, the inbox or the conversation
    /// state cannot be loaded. Failures of individual messages are counted.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let profile = self
            .client
            .bot_profile()
            .await
            .context("Failed to load bot profile")?;

        let sync = sync_direct_messages(&self.db, self.client.as_ref(), &profile.user_id).await?;
        let unread = get_all_unread_messages(&self.db, &sync.inbox, &profile.user_id).await?;

        let mut report = CycleReport {
            seen: unread.len(),
            ..CycleReport::default()
        };

        if unread.is_empty() {
            debug!("No unread direct messages");
            return Ok(report);
        }

        info!(count = unread.len(), "Processing unread direct messages");
        for message in &unread {
            match self.handle_message(message, &profile.user_id).await {
                Ok(()) => report.replied += 1,
                Err(e) => {
                    error!(
                        conversation_id = %message.conversation_id,
                        message_id = %message.message.id,
                        "Failed to handle direct message: {e:#}"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Answer one unread message.
    ///
    /// # Errors
    ///
    /// Returns an error if the target post cannot be archived or the reply
    /// cannot be sent.
    #[instrument(
        skip(self, message, user_id),
        fields(conversation_id = %message.conversation_id, message_id = %message.message.id)
    )]
    pub async fn handle_message(&self, message: &UnreadMessage, user_id: &str) -> Result<()> {
        debug!(sender = %message.sender_screen_name, "Handling direct message");

        let text = match interpret_dm(&message.message) {
            Some(post_id) => self.archive_reply(&post_id).await?,
            None => DM_ACKNOWLEDGEMENT.to_string(),
        };

        self.send_and_confirm(&message.conversation_id, &text, user_id)
            .await
    }

    async fn archive_reply(&self, post_id: &str) -> Result<String> {
        let post = self
            .client
            .fetch_post(post_id)
            .await
            .with_context(|| format!("Failed to fetch post {post_id}"))?;

        let Some(post) = post else {
            info!(post_id, "Requested post not found");
            return Ok(DM_POST_NOT_FOUND.to_string());
        };

        let cid = self.archiver.archive(&post).await?;
        Ok(self.composer.dm_reply(&cid))
    }

    /// Send `text`, then record that the conversation has been answered.
    ///
    /// When the network does not report the new message id, the stored
    /// state is refreshed with a full sync instead.
    async fn send_and_confirm(&self, conversation_id: &str, text: &str, user_id: &str) -> Result<()> {
        let sent = self
            .client
            .send_direct_message(conversation_id, text)
            .await
            .context("Failed to send direct message")?;

        db::mark_conversation_read(self.db.pool(), conversation_id).await?;

        match sent {
            Some(message_id) => {
                db::set_our_last_message_id(self.db.pool(), conversation_id, &message_id).await?;
                info!(conversation_id, message_id = %message_id, "Replied to conversation");
            }
            None => {
                warn!(conversation_id, "Send not confirmed, re-syncing direct messages");
                sync_direct_messages(&self.db, self.client.as_ref(), user_id).await?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for DmProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmProcessor").finish_non_exhaustive()
    }
}
