//! X API v2 adapter.
//!
//! Uses a user-context bearer token. Responses are decoded into typed
//! structs here and converted to the crate's [`Post`] / DM types, so nothing
//! untyped leaves this module.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::types::{
    DirectMessage, DirectMessageConversation, DirectMessageInbox, DmUser, MediaAsset, Post,
    Profile,
};
use super::SocialClient;
use crate::constants::BOT_USER_AGENT;

const TWEET_FIELDS: &str =
    "id,text,author_id,conversation_id,created_at,referenced_tweets,attachments,entities";
const TWEET_EXPANSIONS: &str =
    "author_id,attachments.media_keys,referenced_tweets.id,referenced_tweets.id.author_id";
const MEDIA_FIELDS: &str = "media_key,type,url,preview_image_url,alt_text,variants";
const USER_FIELDS: &str = "id,username,name";
const DM_EVENT_FIELDS: &str =
    "id,text,event_type,dm_conversation_id,created_at,sender_id,participant_ids,referenced_tweets";

/// Pages of DM events fetched per sync (100 events each).
const MAX_DM_PAGES: usize = 5;

static URL_IN_TEXT: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Errors reported by the X API itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited by X API (resets at unix time {reset:?})")]
    RateLimited { reset: Option<i64> },
    #[error("X API request failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// X API v2 client.
pub struct XApiClient {
    http: Client,
    base_url: String,
    token: String,
    me: OnceCell<Profile>,
}

impl XApiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(BOT_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            me: OnceCell::new(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    /// Send a request and decode the body. A 404 decodes to `None`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send X API request: {what}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ApiError::RateLimited { reset }.into());
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let decoded = response
            .json()
            .await
            .with_context(|| format!("Failed to decode X API response: {what}"))?;
        Ok(Some(decoded))
    }

    /// Look up one tweet without hydrating its quoted post.
    async fn lookup_tweet(&self, id: &str) -> Result<Option<Post>> {
        let request = self.get(&format!("/2/tweets/{id}")).query(&[
            ("tweet.fields", TWEET_FIELDS),
            ("expansions", TWEET_EXPANSIONS),
            ("media.fields", MEDIA_FIELDS),
            ("user.fields", USER_FIELDS),
        ]);

        let Some(envelope) = self.send::<Envelope<TweetData>>(request, "tweet lookup").await? else {
            return Ok(None);
        };
        if envelope.data.is_none() {
            for problem in &envelope.errors {
                debug!(id, problem = ?problem, "Tweet lookup returned an error object");
            }
        }
        Ok(envelope
            .data
            .map(|tweet| build_post(&tweet, &envelope.includes, true)))
    }

    /// Look up a tweet and replace a shallow quoted post with a full one so
    /// its media is available for archiving.
    async fn lookup_hydrated(&self, id: &str) -> Result<Option<Post>> {
        let Some(mut post) = self.lookup_tweet(id).await? else {
            return Ok(None);
        };
        if let Some(quoted_id) = post.quoted_status_id.clone() {
            match self.lookup_tweet(&quoted_id).await {
                Ok(Some(quoted)) => post.quoted_status = Some(Box::new(quoted)),
                Ok(None) => debug!(id, quoted_id = %quoted_id, "Quoted post not found"),
                Err(e) => warn!(id, quoted_id = %quoted_id, "Failed to hydrate quoted post: {e:#}"),
            }
        }
        Ok(Some(post))
    }
}

#[async_trait]
impl SocialClient for XApiClient {
    async fn bot_profile(&self) -> Result<Profile> {
        let profile = self
            .me
            .get_or_try_init(|| async {
                let request = self.get("/2/users/me").query(&[("user.fields", USER_FIELDS)]);
                let envelope = self
                    .send::<Envelope<UserData>>(request, "users/me")
                    .await?
                    .and_then(|e| e.data)
                    .context("X API returned no profile for the authenticated user")?;
                Ok::<_, anyhow::Error>(Profile {
                    user_id: envelope.id,
                    username: envelope.username,
                })
            })
            .await?;
        Ok(profile.clone())
    }

    async fn fetch_unanswered_mentions(&self, max: usize) -> Result<Vec<Post>> {
        let me = self.bot_profile().await?;
        let max_results = max.clamp(5, 100).to_string();
        let request = self
            .get(&format!("/2/users/{}/mentions", me.user_id))
            .query(&[
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
                ("expansions", TWEET_EXPANSIONS),
                ("media.fields", MEDIA_FIELDS),
                ("user.fields", USER_FIELDS),
            ]);

        let envelope = self
            .send::<Envelope<Vec<TweetData>>>(request, "mentions")
            .await?
            .unwrap_or_default();

        // The API returns newest first; the processor expects oldest first.
        let mut mentions: Vec<Post> = envelope
            .data
            .unwrap_or_default()
            .iter()
            .filter(|t| t.author_id.as_deref() != Some(me.user_id.as_str()))
            .take(max)
            .map(|t| build_post(t, &envelope.includes, true))
            .collect();
        mentions.reverse();

        debug!(count = mentions.len(), "Fetched mentions");
        Ok(mentions)
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<Post>> {
        self.lookup_hydrated(id).await
    }

    async fn fetch_head_of_conversation(&self, conversation_id: &str) -> Result<Option<Post>> {
        // The head of a conversation carries the conversation's id.
        self.lookup_hydrated(conversation_id).await
    }

    async fn like_post(&self, id: &str) -> Result<()> {
        let me = self.bot_profile().await?;
        let request = self
            .post(&format!("/2/users/{}/likes", me.user_id))
            .json(&json!({ "tweet_id": id }));
        self.send::<serde_json::Value>(request, "like")
            .await?
            .with_context(|| format!("Post {id} not found when liking"))?;
        Ok(())
    }

    async fn send_reply(&self, text: &str, in_reply_to: &str) -> Result<String> {
        let request = self.post("/2/tweets").json(&json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": in_reply_to },
        }));
        let created = self
            .send::<Envelope<CreatedTweet>>(request, "create tweet")
            .await?
            .and_then(|e| e.data)
            .context("X API did not return the created reply")?;
        Ok(created.id)
    }

    async fn sync_direct_messages(&self, user_id: &str) -> Result<DirectMessageInbox> {
        let mut events: Vec<DmEvent> = Vec::new();
        let mut users: Vec<UserData> = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_DM_PAGES {
            let mut query = vec![
                ("max_results", "100".to_string()),
                ("event_types", "MessageCreate".to_string()),
                ("dm_event.fields", DM_EVENT_FIELDS.to_string()),
                ("expansions", "sender_id,participant_ids".to_string()),
                ("user.fields", USER_FIELDS.to_string()),
            ];
            if let Some(token) = next_token.take() {
                query.push(("pagination_token", token));
            }

            let request = self.get("/2/dm_events").query(&query);
            let Some(page) = self
                .send::<Envelope<Vec<DmEvent>>>(request, "dm events")
                .await?
            else {
                break;
            };

            events.extend(page.data.unwrap_or_default());
            users.extend(page.includes.users);
            next_token = page.meta.and_then(|m| m.next_token);
            if next_token.is_none() {
                break;
            }
        }

        Ok(build_inbox(events, users, user_id))
    }

    async fn send_direct_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Option<String>> {
        let request = self
            .post(&format!("/2/dm_conversations/{conversation_id}/messages"))
            .json(&json!({ "text": text }));
        let sent = self
            .send::<Envelope<SentDm>>(request, "send dm")
            .await?
            .and_then(|e| e.data)
            .and_then(|d| d.dm_event_id);
        Ok(sent)
    }
}

impl std::fmt::Debug for XApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// ========== Wire types ==========

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    errors: Vec<ApiProblem>,
    #[serde(default)]
    meta: Option<Meta>,
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            data: None,
            includes: Includes::default(),
            errors: Vec::new(),
            meta: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<UserData>,
    #[serde(default)]
    media: Vec<MediaData>,
    #[serde(default)]
    tweets: Vec<TweetData>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ApiProblem {
    title: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TweetData {
    id: String,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
    conversation_id: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
    attachments: Option<Attachments>,
    entities: Option<Entities>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<UrlEntity>,
    #[serde(default)]
    hashtags: Vec<HashtagEntity>,
}

#[derive(Debug, Clone, Deserialize)]
struct UrlEntity {
    expanded_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HashtagEntity {
    tag: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaData {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
    alt_text: Option<String>,
    #[serde(default)]
    variants: Vec<Variant>,
}

#[derive(Debug, Clone, Deserialize)]
struct Variant {
    bit_rate: Option<u64>,
    content_type: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SentDm {
    dm_event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DmEvent {
    id: String,
    #[serde(default)]
    text: String,
    dm_conversation_id: Option<String>,
    created_at: Option<String>,
    sender_id: Option<String>,
    #[serde(default)]
    participant_ids: Vec<String>,
    #[serde(default)]
    referenced_tweets: Vec<DmReferencedTweet>,
}

#[derive(Debug, Clone, Deserialize)]
struct DmReferencedTweet {
    id: String,
}

// ========== Conversion ==========

fn build_post(tweet: &TweetData, includes: &Includes, expand_references: bool) -> Post {
    let author = tweet
        .author_id
        .as_deref()
        .and_then(|id| includes.users.iter().find(|u| u.id == id));
    let username = author.map(|u| u.username.clone());

    let mut photos = Vec::new();
    let mut videos = Vec::new();
    let media_keys = tweet
        .attachments
        .as_ref()
        .map(|a| a.media_keys.as_slice())
        .unwrap_or_default();
    for key in media_keys {
        let Some(media) = includes.media.iter().find(|m| &m.media_key == key) else {
            continue;
        };
        match media.kind.as_str() {
            "photo" => photos.push(MediaAsset {
                id: Some(media.media_key.clone()),
                url: media.url.clone(),
                preview: None,
                description: media.alt_text.clone(),
            }),
            "video" | "animated_gif" => videos.push(MediaAsset {
                id: Some(media.media_key.clone()),
                url: best_mp4_variant(&media.variants),
                preview: media.preview_image_url.clone(),
                description: media.alt_text.clone(),
            }),
            _ => {}
        }
    }

    let reference = |kind: &str| {
        tweet
            .referenced_tweets
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.id.clone())
    };
    let in_reply_to_status_id = reference("replied_to");
    let quoted_status_id = reference("quoted");

    let embedded = |id: &Option<String>| {
        if !expand_references {
            return None;
        }
        id.as_deref()
            .and_then(|id| includes.tweets.iter().find(|t| t.id == id))
            .map(|t| Box::new(build_post(t, includes, false)))
    };

    let (urls, hashtags) = tweet.entities.as_ref().map_or_else(
        || (Vec::new(), Vec::new()),
        |e| {
            (
                e.urls
                    .iter()
                    .filter_map(|u| u.expanded_url.clone().or_else(|| u.url.clone()))
                    .collect(),
                e.hashtags.iter().map(|h| h.tag.clone()).collect(),
            )
        },
    );

    Post {
        id: tweet.id.clone(),
        conversation_id: tweet.conversation_id.clone(),
        user_id: tweet.author_id.clone(),
        permanent_url: username
            .as_deref()
            .map(|u| format!("https://x.com/{u}/status/{}", tweet.id)),
        username,
        name: None,
        text: Some(tweet.text.clone()),
        timestamp: tweet
            .created_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp()),
        photos,
        videos,
        urls,
        hashtags,
        in_reply_to_status: embedded(&in_reply_to_status_id),
        in_reply_to_status_id,
        quoted_status: embedded(&quoted_status_id),
        quoted_status_id,
        thread: Vec::new(),
    }
}

fn best_mp4_variant(variants: &[Variant]) -> Option<String> {
    variants
        .iter()
        .filter(|v| v.content_type == "video/mp4")
        .max_by_key(|v| v.bit_rate.unwrap_or(0))
        .map(|v| v.url.clone())
}

fn build_inbox(events: Vec<DmEvent>, users: Vec<UserData>, user_id: &str) -> DirectMessageInbox {
    let mut conversations: BTreeMap<String, Vec<DirectMessage>> = BTreeMap::new();

    for event in events {
        let (Some(conversation_id), Some(sender_id)) = (event.dm_conversation_id, event.sender_id)
        else {
            continue;
        };

        let recipient_id = event
            .participant_ids
            .iter()
            .find(|id| **id != sender_id)
            .cloned()
            .or_else(|| {
                conversation_id
                    .split('-')
                    .find(|id| *id != sender_id)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| user_id.to_string());

        let mut media_urls: Vec<String> = event
            .referenced_tweets
            .iter()
            .map(|t| format!("https://x.com/i/status/{}", t.id))
            .collect();
        media_urls.extend(URL_IN_TEXT.find_iter(&event.text).map(|m| m.as_str().to_string()));

        conversations
            .entry(conversation_id)
            .or_default()
            .push(DirectMessage {
                id: event.id,
                text: event.text,
                sender_id,
                recipient_id,
                created_at: event.created_at.unwrap_or_default(),
                media_urls,
            });
    }

    let mut dm_users: Vec<DmUser> = Vec::new();
    for user in users {
        if !dm_users.iter().any(|u| u.id == user.id) {
            dm_users.push(DmUser {
                id: user.id,
                screen_name: user.username,
            });
        }
    }

    DirectMessageInbox {
        conversations: conversations
            .into_iter()
            .map(|(conversation_id, messages)| DirectMessageConversation {
                conversation_id,
                messages,
            })
            .collect(),
        users: dm_users,
    }
}
