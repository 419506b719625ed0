//! Per-application advisory lock kept in the blob store.
//!
//! Acquisition reads the lock file and writes a fresh token only when it is
//! empty. The read and the write are separate calls, so two racing requests
//! can both believe they hold the lock. Locks do not expire; a crashed holder
//! leaves the file behind until an operator clears it.

use crate::paths;
use crate::storage::BlobStore;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppLock {
    store: Arc<dyn BlobStore>,
}

impl AppLock {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Current holder's token, if any.
    pub async fn holder(&self, app_slug: &str) -> Result<Option<String>> {
        let current = self.store.get_file(&paths::lock_key(app_slug)).await?;
        let current = String::from_utf8_lossy(&current).trim().to_string();
        Ok((!current.is_empty()).then_some(current))
    }

    /// Returns a new token, or `None` when somebody else holds the lock.
    pub async fn request(&self, app_slug: &str) -> Result<Option<String>> {
        if self.holder(app_slug).await?.is_some() {
            debug!(app = %app_slug, "Lock is busy");
            metrics::increment_counter!("updraft_lock_busy_total");
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        self.store
            .put_file(&paths::lock_key(app_slug), Bytes::from(token.clone()), true)
            .await?;
        debug!(app = %app_slug, "Lock acquired");
        Ok(Some(token))
    }

    /// Releases the lock if `token` is the current holder. Returns whether it
    /// was released.
    pub async fn release(&self, app_slug: &str, token: &str) -> Result<bool> {
        if self.holder(app_slug).await?.as_deref() != Some(token) {
            warn!(app = %app_slug, "Refusing to release a lock held by another token");
            return Ok(false);
        }
        self.store.delete_path(&paths::lock_key(app_slug)).await?;
        debug!(app = %app_slug, "Lock released");
        Ok(true)
    }

    pub async fn verify(&self, app_slug: &str, token: &str) -> Result<()> {
        match self.holder(app_slug).await? {
            Some(current) if current == token => Ok(()),
            _ => Err(Error::LockNotHeld(app_slug.to_string())),
        }
    }

    /// Clears the lock regardless of holder.
    pub async fn force_release(&self, app_slug: &str) -> Result<()> {
        info!(app = %app_slug, "Force releasing lock");
        self.store.delete_path(&paths::lock_key(app_slug)).await
    }
}
