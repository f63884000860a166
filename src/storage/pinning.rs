//! Client for a Kubo-compatible pinning endpoint.
//!
//! Uploads go to `POST {api_url}/api/v0/add?pin=true&cid-version=1` as a
//! multipart file, authenticated with the storage API key.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{envelope, StorageBackend, UploadOptions};
use crate::config::Config;
use crate::constants::BOT_USER_AGENT;

/// Pinning API response for add operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    size: String,
}

/// Storage backend that pins content through a pinning API.
#[derive(Clone)]
pub struct PinningStorage {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    media_options: UploadOptions,
}

impl PinningStorage {
    /// Create a new client from configuration.
    ///
    /// Media assets are packaged with the same compression and password
    /// settings as archive payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(BOT_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: config.storage_api_url.trim_end_matches('/').to_string(),
            api_key: config.storage_api_key.clone(),
            media_options: UploadOptions {
                compression: config.archive_compression,
                password: config.archive_password.clone(),
            },
        })
    }

    /// Seal `data` off the async runtime; Argon2 and zstd are CPU-bound.
    async fn seal(data: Vec<u8>, options: UploadOptions) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || envelope::seal(&data, &options))
            .await
            .context("Payload sealing task panicked")?
    }

    async fn add(&self, data: Vec<u8>, filename: &str, mime_type: &str) -> Result<String> {
        let size = data.len();
        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .context("Failed to set mime type")?;
        let form = multipart::Form::new().part("file", part);

        let url = format!("{}/api/v0/add?pin=true&cid-version=1", self.api_url);
        debug!(url = %url, filename = %filename, size, "Uploading to pinning service");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send request to pinning service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            anyhow::bail!("Pinning add failed: {} - {}", status, body);
        }

        let add_response: AddResponse = response
            .json()
            .await
            .context("Failed to parse pinning add response")?;

        info!(cid = %add_response.hash, filename = %filename, "Pinned object");

        Ok(add_response.hash)
    }

    /// Check if the pinning service is reachable.
    ///
    /// # Errors
    ///
    /// Never returns an error today; unreachable services report `Ok(false)`.
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/v0/version", self.api_url);

        match self.http.post(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                warn!(error = %e, "Pinning service health check failed");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl StorageBackend for PinningStorage {
    async fn upload_bytes(&self, data: Vec<u8>, filename: &str, mime_type: &str) -> Result<String> {
        let options = self.media_options.clone();
        let packaged = options.compression || options.effective_password().is_some();
        let sealed = Self::seal(data, options).await?;
        let mime = if packaged {
            "application/octet-stream"
        } else {
            mime_type
        };
        self.add(sealed, filename, mime).await
    }

    async fn upload_json(
        &self,
        object: &serde_json::Value,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<String> {
        let json = serde_json::to_vec(object).context("Failed to serialize payload")?;
        let packaged = options.compression || options.effective_password().is_some();
        let sealed = Self::seal(json, options.clone()).await?;
        let mime = if packaged {
            "application/octet-stream"
        } else {
            "application/json"
        };
        self.add(sealed, filename, mime).await
    }
}

impl std::fmt::Debug for PinningStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinningStorage")
            .field("api_url", &self.api_url)
            .field("compression", &self.media_options.compression)
            .field("encrypted", &self.media_options.effective_password().is_some())
            .finish_non_exhaustive()
    }
}
