//! Process-local job store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use omnidocs_core::job::Job;
use omnidocs_core::types::JobId;
use tokio::sync::RwLock;

use crate::store::{check_overwrite, newest_first, JobStore, StoreError};

/// In-memory [`JobStore`].
///
/// Keeps every accepted write in order so tests can inspect a job's
/// persisted history, and can be told to fail upcoming writes.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    history: RwLock<Vec<Job>>,
    failing_writes: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `put` fail with
    /// [`StoreError::Persistence`] without touching the record.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Every accepted write for `id`, oldest first.
    pub async fn history(&self, id: JobId) -> Vec<Job> {
        self.history
            .read()
            .await
            .iter()
            .filter(|job| job.id == id)
            .cloned()
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        if self.take_failure() {
            return Err(StoreError::Persistence {
                id: job.id,
                message: "injected write failure".into(),
            });
        }

        let mut jobs = self.jobs.write().await;
        check_overwrite(jobs.get(&job.id), job)?;
        jobs.insert(job.id, job.clone());
        self.history.write().await.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await.values().cloned().collect();
        Ok(newest_first(jobs))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
