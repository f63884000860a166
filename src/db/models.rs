use serde::{Deserialize, Serialize};

/// A root post that has already been uploaded to permanent storage.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedContent {
    pub content_id: String,
    pub storage_cid: String,
    pub processed_at: String,
}

/// A mention the bot has already replied to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MentionLogEntry {
    pub mention_id: String,
    pub author_username: String,
    pub mention_timestamp: Option<String>,
    pub logged_at: String,
}

/// Latest known state of a direct-message conversation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub conversation_id: String,
    pub last_message_id: String,
    pub last_message_timestamp: String,
    pub our_last_message_id: String,
    pub sender_id: Option<String>,
    pub sender_screen_name: Option<String>,
    pub recipient_id: Option<String>,
    pub recipient_screen_name: Option<String>,
    pub has_unread_messages: bool,
    pub updated_at: String,
}

/// Data for inserting or overwriting a conversation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationUpsert {
    pub conversation_id: String,
    pub last_message_id: String,
    pub last_message_timestamp: String,
    pub our_last_message_id: String,
    pub sender_id: String,
    pub sender_screen_name: String,
    pub recipient_id: String,
    pub recipient_screen_name: String,
    pub has_unread_messages: bool,
}
