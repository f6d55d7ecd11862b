//! Handlers for the `/jobs` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use omnidocs_core::error::CoreError;
use omnidocs_core::request::CreateJobRequest;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_job_id;
use crate::response::{CreateJobResponse, DataResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/jobs
///
/// Validate the request and start a conversion. Returns 202 with the new
/// job id before the converter has been contacted. An unreadable body is a
/// 400 `BAD_REQUEST`.
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let job_id = state.orchestrator.create(input).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse { job_id })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/jobs
///
/// List every job, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.orchestrator.list().await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = parse_job_id(&id)?;
    let job = state
        .orchestrator
        .get(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id,
        }))?;
    Ok(Json(DataResponse { data: job }))
}
