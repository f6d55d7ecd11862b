pub mod downloads;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /jobs                     create (POST), list (GET)
/// /jobs/{id}                get
/// /jobs/{id}/events         status stream (text/event-stream)
///
/// /download/{id}            artifact bytes (?format=zip|single_md)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/download", downloads::router())
}
