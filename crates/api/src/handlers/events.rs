//! Server-sent status stream for one job.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use omnidocs_core::status_event::StatusEvent;

use crate::handlers::parse_job_id;
use crate::state::AppState;

/// GET /api/jobs/{id}/events
///
/// Streams one JSON [`StatusEvent`] per `data:` frame. The stream ends
/// after a terminal snapshot, `Job not found` or `Job data lost`.
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = match parse_job_id(&id) {
        Ok(job_id) => state.notifier.subscribe(job_id),
        Err(_) => stream::once(async { StatusEvent::not_found() }).boxed(),
    };

    Sse::new(events.map(|event| Ok(to_sse_event(&event)))).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &StatusEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize status event");
        Event::default().data(r#"{"error":"Job data lost"}"#)
    })
}
