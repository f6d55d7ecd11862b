use axum::routing::get;
use axum::Router;

use crate::handlers::downloads;
use crate::state::AppState;

/// Routes mounted at `/download`.
///
/// ```text
/// GET    /{id}            -> download_artifact
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(downloads::download_artifact))
}
