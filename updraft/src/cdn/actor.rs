use super::{InvalidationClient, InvalidationSettings};
use crate::shutdown::ShutdownSignals;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

#[derive(Debug)]
pub enum ActorMessage {
    /// Already encoded path.
    Add(String),
    Pending { rpc: oneshot::Sender<usize> },
}

/// Invalidation batcher for a single distribution.
pub struct Actor {
    distribution_id: String,
    client: Arc<dyn InvalidationClient>,
    settings: InvalidationSettings,
    shutdown: ShutdownSignals,
    receiver: mpsc::Receiver<ActorMessage>,
    queue: Vec<String>,
    last_add: Option<Instant>,
}

impl Actor {
    pub fn new(
        distribution_id: String,
        client: Arc<dyn InvalidationClient>,
        settings: InvalidationSettings,
        shutdown: ShutdownSignals,
        receiver: mpsc::Receiver<ActorMessage>,
    ) -> Self {
        Self {
            distribution_id,
            client,
            settings,
            shutdown,
            receiver,
            queue: Vec::new(),
            last_add: None,
        }
    }

    fn handle_message(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Add(path) => {
                if !self.queue.contains(&path) {
                    self.queue.push(path);
                }
                self.last_add = Some(Instant::now());
            }
            ActorMessage::Pending { rpc } => {
                let _rpc = rpc.send(self.queue.len());
            }
        }
    }

    fn is_quiet(&self) -> bool {
        self.last_add
            .is_none_or(|at| at.elapsed() > self.settings.quiet_period)
    }

    /// Sends up to one batch. Failed batches go back on the queue.
    async fn send_batch(&mut self) -> bool {
        let take = self.queue.len().min(self.settings.batch_size);
        let batch: Vec<String> = self.queue.drain(..take).collect();
        if batch.is_empty() {
            return true;
        }

        match self
            .client
            .create_invalidation(&self.distribution_id, batch.clone())
            .await
        {
            Ok(()) => {
                debug!(
                    distribution = %self.distribution_id,
                    count = batch.len(),
                    "Batch invalidation succeeded"
                );
                metrics::increment_counter!("updraft_invalidation_batches_total", "result" => "ok");
                true
            }
            Err(e) => {
                error!(
                    distribution = %self.distribution_id,
                    keys = ?batch,
                    "Failed to invalidate: {e}"
                );
                metrics::increment_counter!("updraft_invalidation_batches_total", "result" => "failed");
                self.queue.extend(batch);
                false
            }
        }
    }

    #[tracing::instrument(skip(self), fields(distribution = %self.distribution_id))]
    async fn flush_due(&mut self) {
        if self.queue.is_empty() || !self.is_quiet() {
            return;
        }
        info!(pending = self.queue.len(), "Running batch invalidation");
        self.send_batch().await;
    }

    async fn drain(&mut self) {
        while let Ok(msg) = self.receiver.try_recv() {
            self.handle_message(msg);
        }
        while !self.queue.is_empty() {
            if !self.send_batch().await {
                error!(
                    distribution = %self.distribution_id,
                    keys = ?self.queue,
                    "Abandoning invalidations on shutdown"
                );
                self.queue.clear();
            }
        }
    }

    pub async fn run(&mut self) {
        let mut interval = time::interval_at(
            Instant::now() + self.settings.interval,
            self.settings.interval,
        );

        loop {
            tokio::select! {
                Some(msg) = self.receiver.recv() => {
                    self.handle_message(msg);
                }
                _ = interval.tick() => {
                    self.flush_due().await;
                }
                _ = self.shutdown.token.cancelled() => {
                    info!(distribution = %self.distribution_id, "Invalidation batcher flushing before shutdown");
                    break;
                }
            }
        }

        self.drain().await;
        info!(distribution = %self.distribution_id, "Invalidation batcher shutting down");
    }
}
