//! Social-network boundary.
//!
//! The processors only talk to the network through [`SocialClient`]; the
//! production implementation is [`XApiClient`].

mod client;
mod types;

pub use client::{ApiError, XApiClient};
pub use types::{
    compare_message_ids, DirectMessage, DirectMessageConversation, DirectMessageInbox, DmUser,
    MediaAsset, Post, Profile, UnreadMessage,
};

use anyhow::Result;
use async_trait::async_trait;

/// Read/write operations the bot needs from the social network.
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// The account the bot is logged in as.
    async fn bot_profile(&self) -> Result<Profile>;

    /// Recent mentions of the bot, oldest first.
    async fn fetch_unanswered_mentions(&self, max: usize) -> Result<Vec<Post>>;

    /// Fetch a single post. `Ok(None)` means it does not exist or was deleted.
    async fn fetch_post(&self, id: &str) -> Result<Option<Post>>;

    /// Fetch the first post of a conversation.
    async fn fetch_head_of_conversation(&self, conversation_id: &str) -> Result<Option<Post>>;

    async fn like_post(&self, id: &str) -> Result<()>;

    /// Publish a reply and return the new post's id.
    async fn send_reply(&self, text: &str, in_reply_to: &str) -> Result<String>;

    /// Fetch every direct-message conversation visible to `user_id`.
    async fn sync_direct_messages(&self, user_id: &str) -> Result<DirectMessageInbox>;

    /// Send a direct message.
    ///
    /// Returns the new message id, or `None` when the network accepted the
    /// request without confirming what was created.
    async fn send_direct_message(&self, conversation_id: &str, text: &str)
        -> Result<Option<String>>;
}
