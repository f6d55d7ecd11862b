//! Wire types for the converter REST API.
//!
//! The converter is a task queue front end: a submission returns a task
//! id, and the status endpoint reports the task's queue state together
//! with free-form `info` (while running) or `result` (once finished).

use chrono::{DateTime, SubsecRound, Utc};
use omnidocs_core::job::{ArtifactRef, MSG_SUBMITTED};
use omnidocs_core::progress::ConversionProgress;
use omnidocs_core::request::JobInput;
use omnidocs_core::types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::ConverterError;
use crate::ConverterStatus;

const MSG_TASK_FAILED: &str = "Task failed";
const MSG_TASK_REVOKED: &str = "Task was cancelled by the converter";

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Body of `POST /api/convert`.
///
/// `path_prefix`, `use_regex` and `custom_regex` are derived from the path
/// filters for converters that only understand a single prefix and an
/// exclusion pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    pub site_url: String,
    /// `"zip"` or `"single_md"`.
    pub output_format: String,
    pub paths_to_include: Vec<String>,
    pub paths_to_exclude: Vec<String>,
    pub path_prefix: Option<String>,
    pub use_regex: bool,
    pub custom_regex: Option<String>,
}

impl From<&JobInput> for ConversionRequest {
    fn from(input: &JobInput) -> Self {
        let custom_regex =
            (!input.paths_to_exclude.is_empty()).then(|| input.paths_to_exclude.join("|"));
        Self {
            site_url: input.url.clone(),
            output_format: input.output_format.converter_code().to_string(),
            paths_to_include: input.paths_to_include.clone(),
            paths_to_exclude: input.paths_to_exclude.clone(),
            path_prefix: input.paths_to_include.first().cloned(),
            use_regex: custom_regex.is_some(),
            custom_regex,
        }
    }
}

/// Response of `POST /api/convert`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Response of `GET /api/job/{task_id}/status`.
///
/// `info` and `result` are kept as raw JSON: depending on the state the
/// queue puts objects, strings or `null` there.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub state: String,
    #[serde(default)]
    pub info: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Progress details reported while a task runs.
#[derive(Debug, Default, Deserialize)]
pub struct StatusInfo {
    pub status: Option<String>,
    pub current_url: Option<String>,
    pub crawled: Option<u32>,
    pub max_pages: Option<u32>,
    pub pages_saved: Option<u32>,
}

/// Output location reported for a finished task.
#[derive(Debug, Default, Deserialize)]
pub struct StatusResult {
    #[serde(alias = "r2ObjectKey")]
    pub r2_object_key: Option<String>,
    #[serde(alias = "r2Bucket")]
    pub r2_bucket: Option<String>,
    #[serde(alias = "expiresAt")]
    pub expires_at: Option<String>,
}

impl StatusResponse {
    /// Interpret the raw response for task `task_id`.
    ///
    /// Unknown states are reported as [`ConverterError::TransientPoll`] so
    /// the caller simply tries again.
    pub fn into_status(self, task_id: &str) -> Result<ConverterStatus, ConverterError> {
        match self.state.as_str() {
            "PENDING" | "RECEIVED" | "RETRY" => Ok(ConverterStatus::Queued),
            "STARTED" | "PROGRESS" => {
                let info: StatusInfo = object_field(self.info);
                Ok(ConverterStatus::InProgress(info.into_progress()))
            }
            "SUCCESS" => {
                let result: StatusResult = object_field(self.result);
                let expires_at = result.expires_at.as_deref().and_then(parse_expiry);
                let artifact = match result.r2_object_key.filter(|k| !k.is_empty()) {
                    Some(key) => ArtifactRef::Object {
                        bucket: result.r2_bucket,
                        key,
                    },
                    None => ArtifactRef::Converter {
                        task_id: task_id.to_string(),
                    },
                };
                Ok(ConverterStatus::Succeeded {
                    artifact,
                    expires_at,
                })
            }
            "FAILURE" => Ok(ConverterStatus::Failed(
                self.error
                    .or_else(|| string_field(self.info))
                    .unwrap_or_else(|| MSG_TASK_FAILED.to_string()),
            )),
            "REVOKED" => Ok(ConverterStatus::Failed(
                self.error.unwrap_or_else(|| MSG_TASK_REVOKED.to_string()),
            )),
            other => Err(ConverterError::TransientPoll(format!(
                "unrecognized task state '{other}' for task {task_id}"
            ))),
        }
    }
}

impl StatusInfo {
    fn into_progress(self) -> ConversionProgress {
        let phase = self
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| MSG_SUBMITTED.to_string());
        let completed = self.crawled.or(self.pages_saved);
        let mut progress = ConversionProgress::phase(phase).with_counts(completed, self.max_pages);
        if let Some(url) = self.current_url.filter(|u| !u.is_empty()) {
            progress = progress.with_current_item(url);
        }
        progress
    }
}

/// Deserialize an object-valued field, treating anything else as empty.
fn object_field<T: Default + serde::de::DeserializeOwned>(value: Option<serde_json::Value>) -> T {
    match value {
        Some(v @ serde_json::Value::Object(_)) => serde_json::from_value(v).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring malformed converter status details");
            T::default()
        }),
        _ => T::default(),
    }
}

fn string_field(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn parse_expiry(raw: &str) -> Option<Timestamp> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc).trunc_subsecs(6)),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "Ignoring unparseable artifact expiry");
            None
        }
    }
}
