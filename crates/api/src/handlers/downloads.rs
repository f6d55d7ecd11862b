//! Artifact download for completed jobs.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::Response;
use omnidocs_core::request::OutputFormat;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_job_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// `zip` / `archive` or `single_md` / `single-document`.
    pub format: Option<String>,
}

/// GET /api/download/{id}?format=
///
/// Relay the artifact of a completed job. 404 for an unknown job, 400 if
/// it has not completed, 502 if the artifact source fails.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let job_id = parse_job_id(&id)?;
    let format = query
        .format
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(str::parse::<OutputFormat>)
        .transpose()?;

    let artifact = state.artifacts.fetch(job_id, format).await?;

    tracing::info!(
        job_id = %job_id,
        filename = %artifact.filename,
        bytes = artifact.bytes.len(),
        "Serving artifact",
    );

    Response::builder()
        .header(CONTENT_TYPE, artifact.content_type)
        .header(
            CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                artifact.filename.replace('"', "")
            ),
        )
        .body(Body::from(artifact.bytes))
        .map_err(|e| AppError::InternalError(format!("Failed to build download response: {e}")))
}
