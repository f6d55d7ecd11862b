use async_trait::async_trait;
use omnidocs_core::job::Job;
use omnidocs_core::types::JobId;

/// Errors reported by a [`JobStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on job store: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be (de)serialized.
    #[error("Job store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a job.
    #[error("Invalid job record: {0}")]
    InvalidRecord(String),

    /// The write would move a job backwards or modify a terminal record.
    #[error("Rejected write for job {id}: {reason}")]
    Conflict { id: JobId, reason: String },

    /// The record was accepted in memory but could not be made durable.
    #[error("Failed to persist job {id}: {message}")]
    Persistence { id: JobId, message: String },
}

/// Keyed store of job records.
///
/// Writes for one job arrive sequentially from its owning task; reads may
/// run concurrently with them and always observe a whole record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or fully replace the record for `job.id`; durable on `Ok`.
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Current record for `id`, or `None` if unknown.
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// Verify the backend is usable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Reject writes that would regress `existing`.
///
/// A terminal record accepts no further writes, status may not move
/// backwards, and `updated_at` may not go back in time.
pub fn check_overwrite(existing: Option<&Job>, next: &Job) -> Result<(), StoreError> {
    let Some(existing) = existing else {
        return Ok(());
    };

    if !existing.status.can_transition_to(next.status) {
        return Err(StoreError::Conflict {
            id: next.id,
            reason: format!(
                "status cannot move from {} to {}",
                existing.status, next.status
            ),
        });
    }

    if next.updated_at < existing.updated_at {
        return Err(StoreError::Conflict {
            id: next.id,
            reason: "stale revision".into(),
        });
    }

    Ok(())
}

/// Sort newest first; shared by the backends that hold records in maps.
pub(crate) fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    jobs
}
