use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A photo or video attached to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Alt text for photos, description for videos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A post (tweet) as decoded from the social network.
///
/// `in_reply_to_status` and `quoted_status` are owned copies, so a `Post` is
/// always a finite tree. `thread` may still embed posts whose own parent
/// carries the thread again; [`Post::archival_copy`] prunes that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permanent_url: Option<String>,
    #[serde(default)]
    pub photos: Vec<MediaAsset>,
    #[serde(default)]
    pub videos: Vec<MediaAsset>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status: Option<Box<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_status: Option<Box<Post>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thread: Vec<Post>,
}

impl Post {
    /// Id of the post this one replies to, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.in_reply_to_status
            .as_ref()
            .map(|p| p.id.as_str())
            .or(self.in_reply_to_status_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Whether this post starts its own conversation.
    #[must_use]
    pub fn is_conversation_head(&self) -> bool {
        self.conversation_id.as_deref() == Some(self.id.as_str())
    }

    /// Username for display and filenames, `unknown` when absent.
    #[must_use]
    pub fn username_or_unknown(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or("unknown")
    }

    /// Clone of the post with every nested `in_reply_to_status.thread` removed.
    #[must_use]
    pub fn archival_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.prune_parent_threads();
        copy
    }

    fn prune_parent_threads(&mut self) {
        if let Some(parent) = self.in_reply_to_status.as_mut() {
            parent.thread.clear();
            parent.prune_parent_threads();
        }
        if let Some(quoted) = self.quoted_status.as_mut() {
            quoted.prune_parent_threads();
        }
        for post in &mut self.thread {
            post.prune_parent_threads();
        }
    }
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub username: String,
}

/// A single direct message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub created_at: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// A participant in a direct-message conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmUser {
    pub id: String,
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageConversation {
    pub conversation_id: String,
    pub messages: Vec<DirectMessage>,
}

/// Every conversation visible to the bot plus the users referenced in them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessageInbox {
    pub conversations: Vec<DirectMessageConversation>,
    pub users: Vec<DmUser>,
}

impl DirectMessageInbox {
    #[must_use]
    pub fn screen_name(&self, user_id: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.screen_name.as_str())
    }

    #[must_use]
    pub fn conversation(&self, conversation_id: &str) -> Option<&DirectMessageConversation> {
        self.conversations
            .iter()
            .find(|c| c.conversation_id == conversation_id)
    }
}

/// A message from someone else that the bot has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadMessage {
    pub conversation_id: String,
    pub message: DirectMessage,
    pub sender_screen_name: String,
    pub recipient_screen_name: String,
}

/// Order two message ids.
///
/// Snowflake ids are compared numerically so that ids of different lengths
/// sort correctly; anything else falls back to string order.
#[must_use]
pub fn compare_message_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
