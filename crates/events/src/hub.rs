//! Per-job broadcast channels.
//!
//! The delegation task publishes every persisted revision of its job; each
//! status subscription holds a receiver for that one job. A terminal
//! publish removes the channel, so receivers see the final snapshot and
//! then `RecvError::Closed`.

use std::collections::HashMap;
use std::sync::Arc;

use omnidocs_core::job::Job;
use omnidocs_core::types::JobId;
use tokio::sync::{broadcast, RwLock};

/// Default buffer capacity per job channel.
const DEFAULT_CAPACITY: usize = 64;

/// Registry of per-job snapshot channels.
///
/// Cloneable; clones share the same registry.
#[derive(Clone)]
pub struct JobEventHub {
    channels: Arc<RwLock<HashMap<JobId, broadcast::Sender<Job>>>>,
    capacity: usize,
}

impl JobEventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// When a channel's buffer is full the oldest snapshots are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to snapshots of `id`. Creates the channel if needed.
    pub async fn subscribe(&self, id: JobId) -> broadcast::Receiver<Job> {
        let mut channels = self.channels.write().await;
        channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a snapshot. No-op if nobody is subscribed to the job.
    ///
    /// A terminal snapshot closes the job's channel after delivery.
    pub async fn publish(&self, job: &Job) {
        if job.is_terminal() {
            let sender = self.channels.write().await.remove(&job.id);
            if let Some(tx) = sender {
                let _ = tx.send(job.clone());
                tracing::debug!(job_id = %job.id, "Closed job channel");
            }
            return;
        }

        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(&job.id) {
            // Only fails when every receiver is gone.
            let _ = tx.send(job.clone());
        }
    }

    /// Remove the channel for `id` once its last receiver is gone.
    pub async fn release(&self, id: JobId) {
        let mut channels = self.channels.write().await;
        if channels.get(&id).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(&id);
        }
    }

    /// Remove channels whose subscribers have all gone away.
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Number of open job channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Live receivers for `id`.
    pub async fn receiver_count(&self, id: JobId) -> usize {
        self.channels
            .read()
            .await
            .get(&id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for JobEventHub {
    fn default() -> Self {
        Self::new()
    }
}
