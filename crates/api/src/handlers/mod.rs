pub mod downloads;
pub mod events;
pub mod jobs;

use omnidocs_core::error::CoreError;
use omnidocs_core::types::JobId;

/// Parse a job id path segment. Malformed ids are reported as unknown jobs.
pub(crate) fn parse_job_id(raw: &str) -> Result<JobId, CoreError> {
    raw.parse().map_err(|_| CoreError::NotFound {
        entity: "Job",
        id: raw.to_string(),
    })
}
