//! The conversion job record and its lifecycle state machine.
//!
//! ```text
//! Pending ──> Processing ──> Completed
//!    │             │
//!    └─────────────┴───────> Failed
//! ```
//!
//! Every mutator checks the transition and returns
//! [`CoreError::Conflict`] instead of moving a job backwards or touching
//! a terminal record. `error` is only ever set together with `Failed` and
//! `artifact` only together with `Completed`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::progress::ConversionProgress;
use crate::request::JobInput;
use crate::types::{now, JobId, Timestamp};

pub const MSG_STARTING: &str = "Starting conversion process...";
pub const MSG_SUBMITTED: &str = "Crawling documentation pages...";
pub const MSG_COMPLETED: &str = "Conversion completed";

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only ordering; both terminal states share
    /// the last rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether a record in `self` may be overwritten by one in `next`.
    ///
    /// Active states may stay where they are or move forward; terminal
    /// states accept nothing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::Internal(format!("Invalid job status: {other}"))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a completed job's artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArtifactRef {
    /// Materialized in object storage (S3 / R2).
    #[serde(rename = "object")]
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
        key: String,
    },
    /// Served by the converter's download endpoint.
    #[serde(rename = "converter")]
    Converter {
        #[serde(rename = "taskId")]
        task_id: String,
    },
}

/// A documentation conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(flatten)]
    pub input: JobInput,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ConversionProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Create a new `Pending` job with a fresh id.
    pub fn new(input: JobInput) -> Self {
        let created = now();
        Self {
            id: JobId::new_v4(),
            input,
            status: JobStatus::Pending,
            message: None,
            progress: None,
            error: None,
            converter_task_id: None,
            artifact: None,
            expires_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Pending -> Processing`. Re-entering `Processing` is allowed so an
    /// interrupted job can be restarted after a process restart.
    pub fn start_processing(&mut self) -> Result<(), CoreError> {
        self.ensure_transition(JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.message = Some(MSG_STARTING.to_string());
        self.progress = None;
        self.touch();
        Ok(())
    }

    /// Record the converter's task id after a successful submission.
    pub fn record_submission(&mut self, task_id: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_status(JobStatus::Processing, "record a submission for")?;
        self.converter_task_id = Some(task_id.into());
        self.message = Some(MSG_SUBMITTED.to_string());
        self.touch();
        Ok(())
    }

    /// Fold a progress observation into the job.
    ///
    /// Returns `false` (and leaves the record untouched) when the progress
    /// equals the last recorded value.
    pub fn record_progress(&mut self, progress: ConversionProgress) -> Result<bool, CoreError> {
        self.ensure_status(JobStatus::Processing, "record progress for")?;
        if self.progress.as_ref() == Some(&progress) {
            return Ok(false);
        }
        self.message = Some(progress.display_message());
        self.progress = Some(progress);
        self.touch();
        Ok(true)
    }

    /// `Processing -> Completed`.
    pub fn complete(
        &mut self,
        artifact: ArtifactRef,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CoreError> {
        self.ensure_status(JobStatus::Processing, "complete")?;
        self.status = JobStatus::Completed;
        self.message = Some(MSG_COMPLETED.to_string());
        self.artifact = Some(artifact);
        self.expires_at = expires_at;
        self.error = None;
        self.touch();
        Ok(())
    }

    /// `Pending | Processing -> Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(reason.into());
        self.artifact = None;
        self.touch();
        Ok(())
    }

    /// Whether `self` is a later revision than `other`.
    pub fn is_newer_than(&self, other: &Job) -> bool {
        self.updated_at > other.updated_at
    }

    /// Advance `updated_at`, keeping it strictly increasing even when the
    /// clock has not moved (or moved backwards).
    fn touch(&mut self) {
        let floor = self.updated_at + chrono::Duration::microseconds(1);
        self.updated_at = now().max(floor);
    }

    fn ensure_transition(&self, next: JobStatus) -> Result<(), CoreError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, next
            )))
        }
    }

    fn ensure_status(&self, expected: JobStatus, action: &str) -> Result<(), CoreError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Cannot {action} job {} in status {}",
                self.id, self.status
            )))
        }
    }
}
