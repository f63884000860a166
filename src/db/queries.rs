use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{Conversation, ConversationUpsert, MentionLogEntry, ProcessedContent};

// ========== Processed Content ==========

/// Look up the storage CID recorded for an archived root post.
pub async fn get_processed_content(pool: &SqlitePool, content_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT storage_cid FROM processed_content WHERE content_id = ?")
            .bind(content_id)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch processed content")?;

    Ok(row.map(|(cid,)| cid))
}

/// Get the full processed-content record.
///
/// Inspection helper; the pipeline itself only needs the CID.
pub async fn get_processed_content_record(
    pool: &SqlitePool,
    content_id: &str,
) -> Result<Option<ProcessedContent>> {
    sqlx::query_as("SELECT * FROM processed_content WHERE content_id = ?")
        .bind(content_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch processed content record")
}

/// Record the CID for a root post.
///
/// An existing record is never overwritten. Returns `true` if a row was inserted.
pub async fn put_processed_content(pool: &SqlitePool, content_id: &str, cid: &str) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO processed_content (content_id, storage_cid)
        VALUES (?, ?)
        ON CONFLICT(content_id) DO NOTHING
        ",
    )
    .bind(content_id)
    .bind(cid)
    .execute(pool)
    .await
    .context("Failed to insert processed content")?;

    Ok(result.rows_affected() > 0)
}

/// Count archived root posts. Logged at startup.
pub async fn count_processed_content(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_content")
        .fetch_one(pool)
        .await
        .context("Failed to count processed content")?;
    Ok(count)
}

// ========== Mention Log ==========

/// Check whether a mention has already been replied to.
pub async fn has_replied_to_mention(pool: &SqlitePool, mention_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM mention_log WHERE mention_id = ?")
        .bind(mention_id)
        .fetch_optional(pool)
        .await
        .context("Failed to check mention log")?;

    Ok(row.is_some())
}

/// Record that a mention has been replied to. Existing entries are left untouched.
pub async fn log_mention(
    pool: &SqlitePool,
    mention_id: &str,
    author_username: &str,
    mention_timestamp: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO mention_log (mention_id, author_username, mention_timestamp)
        VALUES (?, ?, ?)
        ON CONFLICT(mention_id) DO NOTHING
        ",
    )
    .bind(mention_id)
    .bind(author_username)
    .bind(mention_timestamp)
    .execute(pool)
    .await
    .context("Failed to log mention")?;

    Ok(())
}

/// Get a mention log entry.
///
/// Inspection helper; the mention processor only asks [`has_replied_to_mention`].
pub async fn get_mention_log_entry(
    pool: &SqlitePool,
    mention_id: &str,
) -> Result<Option<MentionLogEntry>> {
    sqlx::query_as("SELECT * FROM mention_log WHERE mention_id = ?")
        .bind(mention_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch mention log entry")
}

// ========== Conversations ==========

/// Insert a conversation, or overwrite every field of the existing row.
///
/// This is last-writer-wins: incoming values replace stored ones wholesale.
pub async fn upsert_conversation(pool: &SqlitePool, conv: &ConversationUpsert) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO conversations
            (conversation_id, last_message_id, last_message_timestamp, our_last_message_id,
             sender_id, sender_screen_name, recipient_id, recipient_screen_name,
             has_unread_messages, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT(conversation_id) DO UPDATE SET
            last_message_id = excluded.last_message_id,
            last_message_timestamp = excluded.last_message_timestamp,
            our_last_message_id = excluded.our_last_message_id,
            sender_id = excluded.sender_id,
            sender_screen_name = excluded.sender_screen_name,
            recipient_id = excluded.recipient_id,
            recipient_screen_name = excluded.recipient_screen_name,
            has_unread_messages = excluded.has_unread_messages,
            updated_at = datetime('now')
        ",
    )
    .bind(&conv.conversation_id)
    .bind(&conv.last_message_id)
    .bind(&conv.last_message_timestamp)
    .bind(&conv.our_last_message_id)
    .bind(&conv.sender_id)
    .bind(&conv.sender_screen_name)
    .bind(&conv.recipient_id)
    .bind(&conv.recipient_screen_name)
    .bind(conv.has_unread_messages)
    .execute(pool)
    .await
    .context("Failed to upsert conversation")?;

    Ok(())
}

/// Get a single conversation by ID.
pub async fn get_conversation(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<Option<Conversation>> {
    sqlx::query_as("SELECT * FROM conversations WHERE conversation_id = ?")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch conversation")
}

/// Get all conversations with unread messages, newest first.
pub async fn get_unread_conversations(pool: &SqlitePool) -> Result<Vec<Conversation>> {
    sqlx::query_as(
        r"
        SELECT * FROM conversations
        WHERE has_unread_messages = 1
        ORDER BY last_message_timestamp DESC
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch unread conversations")
}

/// Get all conversations, newest first.
///
/// Inspection helper for the stored direct-message state.
pub async fn get_all_conversations(pool: &SqlitePool) -> Result<Vec<Conversation>> {
    sqlx::query_as("SELECT * FROM conversations ORDER BY last_message_timestamp DESC")
        .fetch_all(pool)
        .await
        .context("Failed to fetch conversations")
}

/// Mark a conversation as read.
pub async fn mark_conversation_read(pool: &SqlitePool, conversation_id: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE conversations
        SET has_unread_messages = 0,
            updated_at = datetime('now')
        WHERE conversation_id = ?
        ",
    )
    .bind(conversation_id)
    .execute(pool)
    .await
    .context("Failed to mark conversation as read")?;

    Ok(())
}

/// Advance the pointer to the bot's most recent message in a conversation.
pub async fn set_our_last_message_id(
    pool: &SqlitePool,
    conversation_id: &str,
    message_id: &str,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE conversations
        SET our_last_message_id = ?,
            updated_at = datetime('now')
        WHERE conversation_id = ?
        ",
    )
    .bind(message_id)
    .bind(conversation_id)
    .execute(pool)
    .await
    .context("Failed to update our last message id")?;

    Ok(())
}
