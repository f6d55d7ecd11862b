use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use omnidocs_cloud::ObjectStoreError;
use omnidocs_core::error::CoreError;
use omnidocs_db::StoreError;
use omnidocs_pipeline::ArtifactError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain, store and artifact errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent
/// `{ "error", "code" }` JSON bodies; internal details are logged, never
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `omnidocs_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An artifact could not be produced.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        INTERNAL_MESSAGE.to_string(),
                    )
                }
            },

            // --- Store errors ---
            AppError::Store(err) => {
                tracing::error!(error = %err, "Job store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }

            // --- Artifact errors ---
            AppError::Artifact(err) => classify_artifact_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify an artifact failure into an HTTP status, error code, and message.
///
/// - Unknown job, or an object missing from storage, maps to 404.
/// - A job that has not completed maps to 400.
/// - Converter or object storage failures map to 502.
fn classify_artifact_error(err: &ArtifactError) -> (StatusCode, &'static str, String) {
    match err {
        ArtifactError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Job not found".to_string(),
        ),
        ArtifactError::NotReady { .. } => (
            StatusCode::BAD_REQUEST,
            "JOB_NOT_COMPLETED",
            "Job is not completed yet".to_string(),
        ),
        ArtifactError::Unavailable(_) | ArtifactError::ObjectStore(ObjectStoreError::NotFound { .. }) => {
            tracing::warn!(error = %err, "Artifact missing");
            (
                StatusCode::NOT_FOUND,
                "ARTIFACT_NOT_FOUND",
                "Artifact not found".to_string(),
            )
        }
        ArtifactError::Converter(_) | ArtifactError::ObjectStore(_) => {
            tracing::error!(error = %err, "Artifact download failed");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Failed to download file".to_string(),
            )
        }
        ArtifactError::Store(store) => {
            tracing::error!(error = %store, "Job store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            )
        }
    }
}
