//! Status events pushed to job observers.
//!
//! One [`StatusEvent`] is serialized per server-sent-event `data:` frame.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};
use crate::progress::ConversionProgress;
use crate::types::{JobId, Timestamp};

pub const MSG_DEFAULT_PROGRESS: &str = "Processing...";
pub const MSG_JOB_NOT_FOUND: &str = "Job not found";
pub const MSG_JOB_DATA_LOST: &str = "Job data lost";

/// Coarse status exposed to observers. `Pending` is reported as
/// `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoarseStatus {
    Processing,
    Completed,
    Failed,
}

impl From<JobStatus> for CoarseStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending | JobStatus::Processing => CoarseStatus::Processing,
            JobStatus::Completed => CoarseStatus::Completed,
            JobStatus::Failed => CoarseStatus::Failed,
        }
    }
}

/// Snapshot of one job as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub job_id: JobId,
    pub status: CoarseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        rename = "expiresAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ConversionProgress>,
}

/// Error payload for streams that end without a job snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    pub error: String,
}

/// Outbound only: `NotFound` and `DataLost` share a wire shape, so the
/// enum is not deserializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusEvent {
    Snapshot(JobStatusEvent),
    /// The job id is unknown.
    NotFound(StreamError),
    /// The job record could not be read while watching.
    DataLost(StreamError),
}

impl StatusEvent {
    pub fn not_found() -> Self {
        StatusEvent::NotFound(StreamError {
            error: MSG_JOB_NOT_FOUND.to_string(),
        })
    }

    pub fn data_lost() -> Self {
        StatusEvent::DataLost(StreamError {
            error: MSG_JOB_DATA_LOST.to_string(),
        })
    }

    /// Whether no further events follow this one.
    pub fn is_final(&self) -> bool {
        match self {
            StatusEvent::Snapshot(snapshot) => snapshot.status != CoarseStatus::Processing,
            StatusEvent::NotFound(_) | StatusEvent::DataLost(_) => true,
        }
    }
}

impl From<&Job> for JobStatusEvent {
    fn from(job: &Job) -> Self {
        let failed = job.status == JobStatus::Failed;
        let completed = job.status == JobStatus::Completed;
        Self {
            job_id: job.id,
            status: job.status.into(),
            message: job
                .message
                .clone()
                .unwrap_or_else(|| MSG_DEFAULT_PROGRESS.to_string()),
            error: if failed { job.error.clone() } else { None },
            expires_at: if completed { job.expires_at } else { None },
            progress: job.progress.clone(),
        }
    }
}

impl From<&Job> for StatusEvent {
    fn from(job: &Job) -> Self {
        StatusEvent::Snapshot(job.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ArtifactRef;
    use crate::request::CreateJobRequest;

    fn job() -> Job {
        Job::new(CreateJobRequest::new("https://example.com").validate_input().unwrap())
    }

    #[test]
    fn pending_job_reports_processing_with_default_message() {
        let event = StatusEvent::from(&job());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "processing");
        assert_eq!(json["message"], MSG_DEFAULT_PROGRESS);
        assert!(json.get("error").is_none());
        assert!(json.get("expiresAt").is_none());
        assert!(!event.is_final());
    }

    #[test]
    fn completed_job_carries_expiry() {
        let mut job = job();
        let expiry = crate::types::now();
        job.start_processing().unwrap();
        job.complete(ArtifactRef::Converter { task_id: "t".into() }, Some(expiry))
            .unwrap();

        let event = StatusEvent::from(&job);
        assert!(event.is_final());
        let StatusEvent::Snapshot(snapshot) = event else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.status, CoarseStatus::Completed);
        assert_eq!(snapshot.expires_at, Some(expiry));
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn failed_job_carries_error() {
        let mut job = job();
        job.start_processing().unwrap();
        job.fail("Task failed").unwrap();

        let json = serde_json::to_value(StatusEvent::from(&job)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Task failed");
    }

    #[test]
    fn not_found_serializes_as_plain_error() {
        let json = serde_json::to_value(StatusEvent::not_found()).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Job not found" }));
        assert!(StatusEvent::not_found().is_final());
    }

    #[test]
    fn data_lost_serializes_as_plain_error() {
        let event = StatusEvent::data_lost();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({ "error": "Job data lost" })
        );
        assert_ne!(event, StatusEvent::not_found());
        assert!(event.is_final());
    }
}
