//! Permanent-storage backend.
//!
//! The archiver depends only on [`StorageBackend`]. [`PinningStorage`] is the
//! production implementation; [`envelope`] holds the compression and
//! password protection applied before bytes leave the process.

pub mod envelope;
mod pinning;

pub use pinning::PinningStorage;

use anyhow::Result;
use async_trait::async_trait;

/// How an object is packaged before upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub compression: bool,
    /// Empty or absent means the object is stored unencrypted.
    pub password: Option<String>,
}

impl UploadOptions {
    /// The password, if one is set and non-empty.
    #[must_use]
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Uploads content and returns its content identifier (CID).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload a single media asset.
    async fn upload_bytes(&self, data: Vec<u8>, filename: &str, mime_type: &str) -> Result<String>;

    /// Serialize `object` to JSON and upload it as one object.
    async fn upload_json(
        &self,
        object: &serde_json::Value,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<String>;
}
