#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use omnidocs_api::config::ServerConfig;
use omnidocs_api::router::build_app_router;
use omnidocs_api::state::AppState;
use omnidocs_converter::{
    ConversionRequest, Converter, ConverterError, ConverterStatus, DownloadedFile,
};
use omnidocs_core::job::{ArtifactRef, Job};
use omnidocs_core::request::CreateJobRequest;
use omnidocs_core::types::JobId;
use omnidocs_db::{JobStore, MemoryJobStore};
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults and fast timings.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 1,
        converter_api_url: "http://converter.invalid".to_string(),
        converter_timeout_secs: 5,
        poll_interval_ms: 10,
        job_max_duration_secs: 30,
        status_resync_interval_ms: 20,
        job_store_path: "unused.json".to_string(),
        database_url: None,
        object_store: None,
    }
}

// ---------------------------------------------------------------------------
// Converter stand-in
// ---------------------------------------------------------------------------

/// Converter that accepts every submission and answers polls from a
/// script; an exhausted script answers `Queued`.
pub struct StubConverter {
    reject_with: Option<String>,
    polls: Mutex<VecDeque<ConverterStatus>>,
    download: Mutex<Option<DownloadedFile>>,
}

impl StubConverter {
    pub fn new() -> Self {
        Self {
            reject_with: None,
            polls: Mutex::new(VecDeque::new()),
            download: Mutex::new(None),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            reject_with: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn with_polls(self, polls: impl IntoIterator<Item = ConverterStatus>) -> Self {
        self.polls.lock().unwrap().extend(polls);
        self
    }

    pub fn with_download(self, file: DownloadedFile) -> Self {
        *self.download.lock().unwrap() = Some(file);
        self
    }
}

#[async_trait]
impl Converter for StubConverter {
    async fn submit(&self, _request: &ConversionRequest) -> Result<String, ConverterError> {
        match &self.reject_with {
            Some(message) => Err(ConverterError::Delegation {
                status: Some(400),
                message: message.clone(),
            }),
            None => Ok("task-1".to_string()),
        }
    }

    async fn poll(&self, _task_id: &str) -> Result<ConverterStatus, ConverterError> {
        Ok(self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConverterStatus::Queued))
    }

    async fn download(&self, task_id: &str) -> Result<DownloadedFile, ConverterError> {
        self.download
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConverterError::Download {
                status: Some(500),
                message: format!("converter lost {task_id}"),
            })
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryJobStore>,
}

/// Build the full application router with all middleware layers over an
/// in-memory store and the given converter.
pub fn build_test_app(converter: StubConverter) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryJobStore::new());
    let state = AppState::new(config.clone(), store.clone(), Arc::new(converter), None);
    let router = build_app_router(state.clone(), &config);
    TestApp {
        router,
        state,
        store,
    }
}

/// Insert a job that has already completed with a converter-hosted artifact.
pub async fn seed_completed_job(store: &MemoryJobStore, url: &str) -> Job {
    let mut job = Job::new(CreateJobRequest::new(url).validate_input().unwrap());
    job.start_processing().unwrap();
    job.record_submission("task-1").unwrap();
    job.complete(
        ArtifactRef::Converter {
            task_id: "task-1".into(),
        },
        None,
    )
    .unwrap();
    store.put(&job).await.unwrap();
    job
}

/// Insert a job that is still pending.
pub async fn seed_pending_job(store: &MemoryJobStore, url: &str) -> Job {
    let job = Job::new(CreateJobRequest::new(url).validate_input().unwrap());
    store.put(&job).await.unwrap();
    job
}

/// Poll the store until `id` is terminal.
pub async fn wait_for_terminal(store: &MemoryJobStore, id: JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(job) = store.get(id).await.unwrap() {
                if job.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job should reach a terminal state")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(10), response.into_body().collect())
        .await
        .expect("body should finish")
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse every `data:` frame of a server-sent-event body as JSON.
pub async fn sse_frames(response: Response<Body>) -> Vec<serde_json::Value> {
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
