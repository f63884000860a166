//! Per-key mutual exclusion for archive jobs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

/// Grants at most one holder per key at a time.
///
/// Keys are root post ids; two processors archiving the same root take
/// turns, while different roots proceed in parallel.
#[derive(Debug, Default)]
pub struct KeyedLock {
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl KeyedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying semaphore was closed.
    pub async fn lock(&self, key: &str) -> Result<KeyGuard> {
        let semaphore = self.get_or_create_semaphore(key).await;
        let permit = semaphore
            .acquire_owned()
            .await
            .context("Key lock semaphore closed")?;

        Ok(KeyGuard {
            key: key.to_string(),
            _permit: permit,
        })
    }

    /// Take `key` only if nobody holds it.
    #[cfg(test)]
    pub async fn try_lock(&self, key: &str) -> Option<KeyGuard> {
        let semaphore = self.get_or_create_semaphore(key).await;
        semaphore.try_acquire_owned().ok().map(|permit| KeyGuard {
            key: key.to_string(),
            _permit: permit,
        })
    }

    async fn get_or_create_semaphore(&self, key: &str) -> Arc<Semaphore> {
        {
            let read_guard = self.semaphores.read().await;
            if let Some(sem) = read_guard.get(key) {
                return Arc::clone(sem);
            }
        }

        let mut write_guard = self.semaphores.write().await;
        // Another task may have inserted it between the two guards.
        if let Some(sem) = write_guard.get(key) {
            return Arc::clone(sem);
        }

        // Drop idle entries so the map does not grow with every root ever seen.
        write_guard.retain(|_, sem| Arc::strong_count(sem) > 1);

        let semaphore = Arc::new(Semaphore::new(1));
        write_guard.insert(key.to_string(), Arc::clone(&semaphore));
        semaphore
    }

    /// Number of keys currently tracked.
    #[cfg(test)]
    pub async fn key_count(&self) -> usize {
        self.semaphores.read().await.len()
    }
}

/// Held while a key is locked; released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _permit: OwnedSemaphorePermit,
}

impl KeyGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}
