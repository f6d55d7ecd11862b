//! Fakes shared by the pipeline unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use omnidocs_converter::{
    ConversionRequest, Converter, ConverterError, ConverterStatus, DownloadedFile,
};
use omnidocs_core::job::Job;
use omnidocs_core::request::CreateJobRequest;
use omnidocs_core::types::JobId;
use omnidocs_db::{JobStore, MemoryJobStore, StoreError};
use omnidocs_events::JobEventHub;

use crate::{JobOrchestrator, PipelineConfig};

pub enum SubmitBehavior {
    Accept(String),
    Reject(String),
    /// Never answers.
    Hang,
}

/// Scripted converter. Polls pop from the script; an exhausted script
/// answers `Queued`.
pub struct FakeConverter {
    submit: SubmitBehavior,
    polls: Mutex<VecDeque<Result<ConverterStatus, ConverterError>>>,
    download: Mutex<Option<DownloadedFile>>,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new(submit: SubmitBehavior) -> Self {
        Self {
            submit,
            polls: Mutex::new(VecDeque::new()),
            download: Mutex::new(None),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        }
    }

    pub fn accepting(task_id: &str) -> Self {
        Self::new(SubmitBehavior::Accept(task_id.to_string()))
    }

    pub fn with_polls(
        self,
        polls: impl IntoIterator<Item = Result<ConverterStatus, ConverterError>>,
    ) -> Self {
        self.polls.lock().unwrap().extend(polls);
        self
    }

    pub fn with_download(self, file: DownloadedFile) -> Self {
        *self.download.lock().unwrap() = Some(file);
        self
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn submit(&self, _request: &ConversionRequest) -> Result<String, ConverterError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match &self.submit {
            SubmitBehavior::Accept(id) => Ok(id.clone()),
            SubmitBehavior::Reject(message) => Err(ConverterError::Delegation {
                status: Some(500),
                message: message.clone(),
            }),
            SubmitBehavior::Hang => std::future::pending().await,
        }
    }

    async fn poll(&self, _task_id: &str) -> Result<ConverterStatus, ConverterError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ConverterStatus::Queued))
    }

    async fn download(&self, task_id: &str) -> Result<DownloadedFile, ConverterError> {
        self.download
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConverterError::Download {
                status: Some(404),
                message: format!("no artifact for {task_id}"),
            })
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(100),
        max_job_duration: Duration::from_secs(60),
        resync_interval: Duration::from_millis(50),
    }
}

pub fn request(url: &str) -> CreateJobRequest {
    CreateJobRequest::new(url)
}

pub fn new_job(url: &str) -> Job {
    Job::new(request(url).validate_input().unwrap())
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub converter: Arc<FakeConverter>,
    pub hub: JobEventHub,
    pub orchestrator: JobOrchestrator,
}

pub fn harness(converter: FakeConverter) -> Harness {
    harness_with(converter, test_config())
}

pub fn harness_with(converter: FakeConverter, config: PipelineConfig) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let converter = Arc::new(converter);
    let hub = JobEventHub::new();
    let orchestrator =
        JobOrchestrator::new(store.clone(), converter.clone(), hub.clone(), config);
    Harness {
        store,
        converter,
        hub,
        orchestrator,
    }
}

/// Wait (in virtual time) until the stored record for `id` is terminal.
pub async fn wait_for_terminal(store: &MemoryJobStore, id: JobId) -> Job {
    for _ in 0..10_000 {
        if let Some(job) = store.get(id).await.unwrap() {
            if job.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

/// Memory store whose reads, or writes of terminal revisions, can be
/// switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryJobStore,
    failing_reads: std::sync::atomic::AtomicBool,
    failing_terminal_writes: AtomicUsize,
    pub terminal_write_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_reads(&self, fail: bool) {
        self.failing_reads.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `n` writes of a completed or failed job.
    pub fn fail_terminal_writes(&self, n: usize) {
        self.failing_terminal_writes.store(n, Ordering::SeqCst);
    }

    /// Stored record for `id`, bypassing read failures.
    pub async fn stored(&self, id: JobId) -> Option<Job> {
        self.inner.get(id).await.unwrap()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk unplugged")));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        if job.is_terminal() {
            self.terminal_write_attempts.fetch_add(1, Ordering::SeqCst);
            let rejected = self
                .failing_terminal_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(StoreError::Persistence {
                    id: job.id,
                    message: "disk full".into(),
                });
            }
        }
        self.inner.put(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.check()?;
        self.inner.list().await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check()
    }
}
