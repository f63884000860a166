//! Content archiver: uploads a root post, its media and its thread to
//! permanent storage exactly once.

mod key_lock;

pub use key_lock::{KeyGuard, KeyedLock};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::constants::BOT_USER_AGENT;
use crate::db::{self, Database};
use crate::storage::{StorageBackend, UploadOptions};
use crate::twitter::Post;

/// Content identifiers of the media uploaded for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaCids {
    pub photos: Vec<String>,
    pub videos: Vec<String>,
}

/// Uploads posts to the storage backend, deduplicating through the store.
#[derive(Clone)]
pub struct Archiver {
    db: Database,
    storage: Arc<dyn StorageBackend>,
    http: reqwest::Client,
    payload_options: UploadOptions,
    locks: Arc<KeyedLock>,
}

impl Archiver {
    /// Create a new archiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the media HTTP client cannot be built.
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageBackend>,
        payload_options: UploadOptions,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(BOT_USER_AGENT)
            .build()
            .context("Failed to create media HTTP client")?;

        Ok(Self {
            db,
            storage,
            http,
            payload_options,
            locks: Arc::new(KeyedLock::new()),
        })
    }

    /// Archive `root` and return the CID of its archive payload.
    ///
    /// A root that was archived before returns the stored CID without any
    /// network calls. The processed-content record is written only after the
    /// payload upload succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if a media download or any upload fails, or if the
    /// store cannot be read or written.
    #[instrument(skip(self, root), fields(root_id = %root.id))]
    pub async fn archive(&self, root: &Post) -> Result<String> {
        let _guard = self.locks.lock(&root.id).await?;

        if let Some(cid) = db::get_processed_content(self.db.pool(), &root.id).await? {
            debug!(cid = %cid, "Root already archived");
            return Ok(cid);
        }

        let mut media = self.upload_media(root).await?;
        if let Some(quoted) = root.quoted_status.as_deref() {
            let quoted_media = self.upload_media(quoted).await?;
            media.photos.extend(quoted_media.photos);
            media.videos.extend(quoted_media.videos);
        }

        let payload = build_payload(root, &media)?;
        let key = format!("{}-{}.json", root.username_or_unknown(), root.id);
        let cid = self
            .storage
            .upload_json(&payload, &key, &self.payload_options)
            .await
            .with_context(|| format!("Failed to upload archive payload {key}"))?;

        db::put_processed_content(self.db.pool(), &root.id, &cid).await?;

        info!(
            cid = %cid,
            photos = media.photos.len(),
            videos = media.videos.len(),
            "Archived post"
        );
        Ok(cid)
    }

    /// Upload every photo and video attached to `post`, in order.
    async fn upload_media(&self, post: &Post) -> Result<MediaCids> {
        let username = post.username_or_unknown();
        let mut cids = MediaCids::default();

        for (i, photo) in post.photos.iter().enumerate() {
            let Some(url) = photo.url.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };
            let filename = format!("photo-{username}-{}-{i}.jpg", post.id);
            cids.photos
                .push(self.upload_remote(url, &filename, "image/jpeg").await?);
        }

        for (i, video) in post.videos.iter().enumerate() {
            let Some(url) = video.url.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };
            let filename = format!("video-{username}-{}-{i}.mp4", post.id);
            cids.videos
                .push(self.upload_remote(url, &filename, "video/mp4").await?);
        }

        Ok(cids)
    }

    async fn upload_remote(&self, url: &str, filename: &str, mime_type: &str) -> Result<String> {
        debug!(url = %url, filename = %filename, "Downloading media");

        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {url}"))?
            .error_for_status()
            .with_context(|| format!("Media download returned an error status: {url}"))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read media body from {url}"))?;

        self.storage
            .upload_bytes(bytes.to_vec(), filename, mime_type)
            .await
            .with_context(|| format!("Failed to upload {filename}"))
    }
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("compression", &self.payload_options.compression)
            .field(
                "encrypted",
                &self.payload_options.effective_password().is_some(),
            )
            .finish_non_exhaustive()
    }
}

/// Build the JSON object stored for an archived post.
///
/// Nested parents have their `thread` removed so the payload is a finite
/// tree. `serializedThread` is the post's own thread as a JSON string and is
/// omitted when the post carries no thread.
///
/// # Errors
///
/// Returns an error if the post cannot be serialized.
pub fn build_payload(root: &Post, media: &MediaCids) -> Result<Value> {
    let cleaned = root.archival_copy();

    let mut payload = json!({
        "tweet": serde_json::to_value(&cleaned).context("Failed to serialize post")?,
        "photosCids": media.photos,
        "videosCids": media.videos,
    });

    if !cleaned.thread.is_empty() {
        let serialized =
            serde_json::to_string(&cleaned.thread).context("Failed to serialize thread")?;
        payload["serializedThread"] = Value::String(serialized);
    }

    Ok(payload)
}
