use super::actor::{Actor, ActorMessage};
use super::{InvalidationClient, InvalidationSettings, encode_path};
use crate::shutdown::ShutdownSignals;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::error;

/// Queue handle for one CDN distribution.
#[derive(Clone, Debug)]
pub struct Invalidator {
    distribution_id: Arc<str>,
    sender: mpsc::Sender<ActorMessage>,
}

impl Invalidator {
    pub(super) fn spawn(
        distribution_id: String,
        client: Arc<dyn InvalidationClient>,
        settings: InvalidationSettings,
        shutdown: ShutdownSignals,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(256);
        let mut actor = Actor::new(distribution_id.clone(), client, settings, shutdown, receiver);
        let task = tokio::spawn(async move { actor.run().await });

        (
            Self {
                distribution_id: distribution_id.into(),
                sender,
            },
            task,
        )
    }

    pub fn distribution_id(&self) -> &str {
        &self.distribution_id
    }

    pub async fn add_to_batch(&self, key: &str) {
        let path = encode_path(key);
        if self.sender.send(ActorMessage::Add(path)).await.is_err() {
            error!(
                distribution = %self.distribution_id,
                key = %key,
                "Invalidation batcher is gone, dropping key"
            );
        }
    }

    /// Number of paths waiting for the next flush.
    pub async fn pending(&self) -> usize {
        let (rpc, receiver) = oneshot::channel();
        if self.sender.send(ActorMessage::Pending { rpc }).await.is_err() {
            return 0;
        }
        receiver.await.unwrap_or(0)
    }
}
