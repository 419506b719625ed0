//! Batched CDN cache invalidation.
//!
//! Overwritten objects are queued per distribution and flushed by one
//! background task per distribution, so that a burst of manifest rewrites
//! becomes a handful of invalidation requests.

mod actor;
pub mod cloudfront;
mod handler;

pub use handler::Invalidator;

use crate::Result;
use crate::shutdown::ShutdownSignals;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[async_trait]
pub trait InvalidationClient: Send + Sync {
    /// Issues one invalidation request covering `paths`.
    async fn create_invalidation(&self, distribution_id: &str, paths: Vec<String>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationSettings {
    pub interval: Duration,
    /// A flush is postponed while keys were added more recently than this.
    pub quiet_period: Duration,
    pub batch_size: usize,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            quiet_period: Duration::from_secs(20),
            batch_size: 500,
        }
    }
}

/// Owns one [`Invalidator`] per distribution and their background tasks.
pub struct InvalidationService {
    client: Arc<dyn InvalidationClient>,
    settings: InvalidationSettings,
    shutdown: ShutdownSignals,
    invalidators: Mutex<HashMap<String, Invalidator>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InvalidationService {
    pub fn new(
        client: Arc<dyn InvalidationClient>,
        settings: InvalidationSettings,
        shutdown: ShutdownSignals,
    ) -> Self {
        Self {
            client,
            settings,
            shutdown,
            invalidators: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Handle for `distribution_id`, starting its flush task on first use.
    pub async fn invalidator(&self, distribution_id: &str) -> Invalidator {
        let mut invalidators = self.invalidators.lock().await;
        if let Some(existing) = invalidators.get(distribution_id) {
            return existing.clone();
        }

        info!(distribution = %distribution_id, "Starting invalidation batcher");
        let (invalidator, task) = Invalidator::spawn(
            distribution_id.to_string(),
            self.client.clone(),
            self.settings,
            self.shutdown.clone(),
        );
        self.tasks.lock().await.push(task);
        invalidators.insert(distribution_id.to_string(), invalidator.clone());
        invalidator
    }

    /// Signals every batcher to make a final flush and waits for them.
    pub async fn shutdown(&self) {
        self.shutdown.shutdown();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Invalidation batcher ended abnormally: {e}");
            }
        }
    }
}

/// Path form submitted to the CDN: the key with a leading slash, percent
/// encoded the way a URL path would be.
pub fn encode_path(key: &str) -> String {
    let path = format!("/{}", key.trim_start_matches('/'));
    match url::Url::parse("https://invalidation.invalid") {
        Ok(mut url) => {
            url.set_path(&path);
            url.path().to_string()
        }
        Err(_) => path,
    }
}
