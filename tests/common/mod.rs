//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use tweet_archive_bot::archiver::Archiver;
use tweet_archive_bot::commentary::LanguageModel;
use tweet_archive_bot::db::Database;
use tweet_archive_bot::storage::{StorageBackend, UploadOptions};
use tweet_archive_bot::twitter::{
    DirectMessage, DirectMessageConversation, DirectMessageInbox, DmUser, Post, Profile,
    SocialClient,
};

pub const BOT_ID: &str = "999";
pub const BOT_USERNAME: &str = "archivebot";

pub async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

pub fn post(id: &str, username: &str) -> Post {
    Post {
        id: id.to_string(),
        conversation_id: Some(id.to_string()),
        username: Some(username.to_string()),
        text: Some(format!("post {id}")),
        ..Post::default()
    }
}

/// A post replying to `parent_id` inside conversation `conversation_id`.
pub fn reply(id: &str, username: &str, parent_id: &str, conversation_id: &str) -> Post {
    Post {
        conversation_id: Some(conversation_id.to_string()),
        in_reply_to_status_id: Some(parent_id.to_string()),
        ..post(id, username)
    }
}

pub fn dm(id: &str, sender: &str, recipient: &str, urls: &[&str]) -> DirectMessage {
    DirectMessage {
        id: id.to_string(),
        text: format!("message {id}"),
        sender_id: sender.to_string(),
        recipient_id: recipient.to_string(),
        created_at: format!("2024-01-01T00:00:{:02}Z", id.len()),
        media_urls: urls.iter().map(ToString::to_string).collect(),
    }
}

pub fn inbox(conversations: Vec<(&str, Vec<DirectMessage>)>) -> DirectMessageInbox {
    DirectMessageInbox {
        conversations: conversations
            .into_iter()
            .map(|(id, messages)| DirectMessageConversation {
                conversation_id: id.to_string(),
                messages,
            })
            .collect(),
        users: vec![
            DmUser {
                id: BOT_ID.to_string(),
                screen_name: BOT_USERNAME.to_string(),
            },
            DmUser {
                id: "1".to_string(),
                screen_name: "alice".to_string(),
            },
        ],
    }
}

// ========== Social client ==========

#[derive(Default)]
pub struct FakeSocialClient {
    pub mentions: Mutex<Vec<Post>>,
    pub posts: Mutex<HashMap<String, Post>>,
    pub inbox: Mutex<DirectMessageInbox>,
    pub failing_posts: Mutex<Vec<String>>,
    pub head_lookup_fails: Mutex<bool>,
    /// Whether `send_direct_message` reports the created message id.
    pub confirm_dm_sends: Mutex<bool>,
    pub fail_replies: Mutex<bool>,

    pub likes: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub sent_dms: Mutex<Vec<(String, String)>>,
    pub fetch_post_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeSocialClient {
    pub fn new() -> Self {
        Self {
            confirm_dm_sends: Mutex::new(true),
            next_id: AtomicUsize::new(5000),
            ..Self::default()
        }
    }

    pub fn add_post(&self, post: Post) {
        self.posts.lock().unwrap().insert(post.id.clone(), post);
    }

    pub fn set_mentions(&self, mentions: Vec<Post>) {
        *self.mentions.lock().unwrap() = mentions;
    }

    pub fn set_inbox(&self, inbox: DirectMessageInbox) {
        *self.inbox.lock().unwrap() = inbox;
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn likes(&self) -> Vec<String> {
        self.likes.lock().unwrap().clone()
    }

    pub fn sent_dms(&self) -> Vec<(String, String)> {
        self.sent_dms.lock().unwrap().clone()
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl SocialClient for FakeSocialClient {
    async fn bot_profile(&self) -> Result<Profile> {
        Ok(Profile {
            user_id: BOT_ID.to_string(),
            username: BOT_USERNAME.to_string(),
        })
    }

    async fn fetch_unanswered_mentions(&self, max: usize) -> Result<Vec<Post>> {
        Ok(self.mentions.lock().unwrap().iter().take(max).cloned().collect())
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<Post>> {
        self.fetch_post_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_posts.lock().unwrap().iter().any(|p| p == id) {
            bail!("lookup of {id} failed");
        }
        Ok(self.posts.lock().unwrap().get(id).cloned())
    }

    async fn fetch_head_of_conversation(&self, conversation_id: &str) -> Result<Option<Post>> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if *self.head_lookup_fails.lock().unwrap() {
            bail!("conversation lookup unavailable");
        }
        Ok(self.posts.lock().unwrap().get(conversation_id).cloned())
    }

    async fn like_post(&self, id: &str) -> Result<()> {
        self.likes.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn send_reply(&self, text: &str, in_reply_to: &str) -> Result<String> {
        if *self.fail_replies.lock().unwrap() {
            bail!("reply rejected");
        }
        self.replies
            .lock()
            .unwrap()
            .push((in_reply_to.to_string(), text.to_string()));
        Ok(self.next_id())
    }

    async fn sync_direct_messages(&self, _user_id: &str) -> Result<DirectMessageInbox> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inbox.lock().unwrap().clone())
    }

    async fn send_direct_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Option<String>> {
        self.sent_dms
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));

        // The sent message shows up in the next inbox sync.
        let id = self.next_id();
        let mut sent = dm(&id, BOT_ID, "1", &[]);
        sent.text = text.to_string();
        if let Some(conversation) = self
            .inbox
            .lock()
            .unwrap()
            .conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id)
        {
            conversation.messages.push(sent);
        }

        if *self.confirm_dm_sends.lock().unwrap() {
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }
}

// ========== Storage ==========

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub json: Option<serde_json::Value>,
    pub options: Option<UploadOptions>,
}

#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<Upload>>,
    pub fail_json: Mutex<bool>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn json_uploads(&self) -> Vec<Upload> {
        self.uploads()
            .into_iter()
            .filter(|u| u.json.is_some())
            .collect()
    }

    fn record(&self, upload: Upload) -> String {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(upload);
        format!("bafk{:04}", uploads.len())
    }
}

#[async_trait]
impl StorageBackend for FakeStorage {
    async fn upload_bytes(&self, data: Vec<u8>, filename: &str, mime_type: &str) -> Result<String> {
        Ok(self.record(Upload {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            bytes: data,
            json: None,
            options: None,
        }))
    }

    async fn upload_json(
        &self,
        object: &serde_json::Value,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<String> {
        // Let concurrent archive attempts interleave here if they can.
        tokio::task::yield_now().await;
        if *self.fail_json.lock().unwrap() {
            bail!("storage unavailable");
        }
        Ok(self.record(Upload {
            filename: filename.to_string(),
            mime_type: "application/json".to_string(),
            bytes: Vec::new(),
            json: Some(object.clone()),
            options: Some(options.clone()),
        }))
    }
}

// ========== Language model ==========

pub struct FakeModel {
    answer: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            answer: Err(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone().map_err(|e| anyhow!(e))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn archiver(db: &Database, storage: &Arc<FakeStorage>) -> Archiver {
    let storage: Arc<dyn StorageBackend> = storage.clone();
    Archiver::new(
        db.clone(),
        storage,
        UploadOptions {
            compression: true,
            password: None,
        },
    )
    .expect("Failed to create archiver")
}
