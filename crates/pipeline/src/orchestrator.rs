//! Job creation and the per-job delegation task.
//!
//! `create` validates and persists a `Pending` job, then spawns one
//! delegation task that drives it through the converter:
//!
//! ```text
//! start_processing ─> submit ─> poll every `poll_interval` ─> complete | fail
//! ```
//!
//! Every mutation is written to the [`JobStore`] and published on the
//! [`JobEventHub`]. Store failures are logged and the job carries on from
//! its in-memory copy; the next successful write makes it durable again.
//! The terminal write has no successor, so it is retried with backoff.
//! Cancellation (shutdown) leaves the record as-is so [`resume_active`]
//! can pick it up on the next start.
//!
//! [`resume_active`]: JobOrchestrator::resume_active

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use omnidocs_converter::{ConversionRequest, Converter, ConverterStatus};
use omnidocs_core::error::CoreError;
use omnidocs_core::job::{Job, JobStatus};
use omnidocs_core::request::CreateJobRequest;
use omnidocs_core::types::JobId;
use omnidocs_db::{JobStore, StoreError};
use omnidocs_events::JobEventHub;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::PipelineConfig;

/// Backoff bounds for re-writing a terminal revision the store rejected.
const TERMINAL_RETRY_INITIAL: Duration = Duration::from_millis(250);
const TERMINAL_RETRY_MAX: Duration = Duration::from_secs(30);

/// Creates jobs and owns their delegation tasks.
///
/// Cheap to clone; clones share the same task set.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    converter: Arc<dyn Converter>,
    hub: JobEventHub,
    config: PipelineConfig,
    tracker: TaskTracker,
    cancel: CancellationToken,
    in_flight: Mutex<HashSet<JobId>>,
}

/// Why a delegation stopped before reaching a terminal state.
enum Interrupt {
    Cancelled,
    TimedOut,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        hub: JobEventHub,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                converter,
                hub,
                config,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Validate `request`, record a `Pending` job and start delegating it.
    ///
    /// Returns as soon as the job is recorded; the converter is contacted
    /// from the background task. Invalid input persists nothing.
    pub async fn create(&self, request: CreateJobRequest) -> Result<JobId, CoreError> {
        let input = request.validate_input()?;
        let job = Job::new(input);
        let id = job.id;

        if let Err(e) = self.inner.store.put(&job).await {
            tracing::error!(job_id = %id, error = %e, "Failed to persist new job");
        }
        tracing::info!(job_id = %id, url = %job.input.url, format = %job.input.output_format, "Job created");

        self.spawn(job);
        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.inner.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.store.list().await
    }

    /// Restart delegation for every job left `Pending` or `Processing` by a
    /// previous process. Returns how many were resumed.
    pub async fn resume_active(&self) -> Result<usize, StoreError> {
        let active: Vec<Job> = self
            .inner
            .store
            .list()
            .await?
            .into_iter()
            .filter(|job| !job.is_terminal())
            .collect();

        let count = active.len();
        for job in active {
            tracing::info!(
                job_id = %job.id,
                status = %job.status,
                task_id = job.converter_task_id.as_deref().unwrap_or("-"),
                "Resuming job",
            );
            self.spawn(job);
        }
        Ok(count)
    }

    /// Whether a delegation task is currently running for `id`.
    pub fn is_running(&self, id: JobId) -> bool {
        self.inner
            .in_flight
            .lock()
            .map(|set| set.contains(&id))
            .unwrap_or(false)
    }

    /// Stop all delegation tasks and wait up to `timeout` for them to exit.
    ///
    /// Jobs keep their current status and are resumed on the next start.
    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        if tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.inner.tracker.len(),
                "Delegation tasks did not stop before the shutdown timeout",
            );
        } else {
            tracing::info!("Job orchestrator stopped");
        }
    }

    /// Spawn the delegation task for `job` unless one is already running.
    fn spawn(&self, job: Job) {
        let Some(guard) = InFlight::acquire(&self.inner, job.id) else {
            tracing::debug!(job_id = %job.id, "Delegation already running");
            return;
        };

        let inner = self.inner.clone();
        self.inner.tracker.spawn(async move {
            let _guard = guard;
            let id = job.id;
            inner.delegate(job).await;
            inner.hub.cleanup().await;
            tracing::debug!(job_id = %id, "Delegation task finished");
        });
    }
}

/// Marks a job id as having a running delegation task; released on drop.
struct InFlight {
    inner: Arc<Inner>,
    id: JobId,
}

impl InFlight {
    fn acquire(inner: &Arc<Inner>, id: JobId) -> Option<Self> {
        let mut set = inner.in_flight.lock().ok()?;
        set.insert(id).then(|| Self {
            inner: inner.clone(),
            id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.inner.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

impl Inner {
    async fn delegate(&self, mut job: Job) {
        let deadline = Instant::now() + self.config.max_job_duration;

        match self.advance(&mut job, deadline).await {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => {
                tracing::info!(job_id = %job.id, status = %job.status, "Delegation interrupted by shutdown");
            }
            Err(Interrupt::TimedOut) => {
                let reason = format!(
                    "Timeout: converter did not finish within {}s",
                    self.config.max_job_duration.as_secs()
                );
                tracing::warn!(job_id = %job.id, "{reason}");
                self.transition(&mut job, |j| j.fail(reason)).await;
            }
        }
    }

    /// Drive `job` to a terminal state, stopping early on shutdown or when
    /// `deadline` passes. Store writes are never interrupted.
    async fn advance(&self, job: &mut Job, deadline: Instant) -> Result<(), Interrupt> {
        let resumable = job.status == JobStatus::Processing && job.converter_task_id.is_some();

        if !resumable {
            if !self.transition(job, Job::start_processing).await {
                return Ok(());
            }

            let request = ConversionRequest::from(&job.input);
            match self.interruptible(deadline, self.converter.submit(&request)).await? {
                Ok(task_id) => {
                    tracing::info!(job_id = %job.id, task_id = %task_id, "Conversion submitted");
                    self.transition(job, |j| j.record_submission(task_id)).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Converter rejected submission");
                    self.transition(job, |j| j.fail(e.to_string())).await;
                    return Ok(());
                }
            }
        }

        let Some(task_id) = job.converter_task_id.clone() else {
            return Ok(());
        };

        loop {
            self.interruptible(deadline, tokio::time::sleep(self.config.poll_interval))
                .await?;

            match self.interruptible(deadline, self.converter.poll(&task_id)).await? {
                Err(e) => {
                    tracing::warn!(job_id = %job.id, task_id = %task_id, error = %e, "Status poll failed, retrying");
                }
                Ok(ConverterStatus::Queued) => {
                    tracing::trace!(job_id = %job.id, "Conversion still queued");
                }
                Ok(ConverterStatus::InProgress(progress)) => match job.record_progress(progress) {
                    Ok(true) => self.commit(job).await,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Rejected progress update");
                        return Ok(());
                    }
                },
                Ok(ConverterStatus::Succeeded {
                    artifact,
                    expires_at,
                }) => {
                    tracing::info!(job_id = %job.id, task_id = %task_id, "Conversion completed");
                    self.transition(job, |j| j.complete(artifact, expires_at))
                        .await;
                    return Ok(());
                }
                Ok(ConverterStatus::Failed(reason)) => {
                    tracing::warn!(job_id = %job.id, task_id = %task_id, reason = %reason, "Conversion failed");
                    self.transition(job, |j| j.fail(reason)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Run `fut` unless shutdown is requested or `deadline` passes first.
    async fn interruptible<F: Future>(
        &self,
        deadline: Instant,
        fut: F,
    ) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(Interrupt::TimedOut),
            out = fut => Ok(out),
        }
    }

    /// Apply a lifecycle mutation and commit it. Returns `false` if the
    /// job refused the transition.
    async fn transition<F>(&self, job: &mut Job, apply: F) -> bool
    where
        F: FnOnce(&mut Job) -> Result<(), CoreError>,
    {
        if let Err(e) = apply(job) {
            tracing::error!(job_id = %job.id, status = %job.status, error = %e, "Illegal job transition");
            return false;
        }
        self.commit(job).await;
        true
    }

    /// Persist and publish the current revision of `job`.
    ///
    /// A terminal revision that fails to persist is retried until it lands
    /// or shutdown is requested; no later write would repair it.
    async fn commit(&self, job: &Job) {
        let persisted = match self.store.put(job).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job_id = %job.id, status = %job.status, error = %e, "Failed to persist job update");
                false
            }
        };
        self.hub.publish(job).await;

        if !persisted && job.is_terminal() {
            self.persist_terminal(job).await;
        }
    }

    async fn persist_terminal(&self, job: &Job) {
        let mut delay = TERMINAL_RETRY_INITIAL;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!(job_id = %job.id, status = %job.status, "Shutdown before terminal state was persisted");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.store.put(job).await {
                Ok(()) => {
                    tracing::info!(job_id = %job.id, status = %job.status, "Terminal state persisted after retry");
                    return;
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Stored record moved on, dropping terminal retry");
                    return;
                }
                Err(e) => {
                    delay = (delay * 2).min(TERMINAL_RETRY_MAX);
                    tracing::warn!(job_id = %job.id, error = %e, retry_in_ms = delay.as_millis() as u64, "Terminal write failed again");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use assert_matches::assert_matches;
    use omnidocs_converter::ConverterError;
    use omnidocs_core::job::{ArtifactRef, MSG_COMPLETED};
    use omnidocs_core::progress::ConversionProgress;

    use super::*;
    use crate::test_support::*;

    fn succeeded() -> Result<ConverterStatus, ConverterError> {
        Ok(ConverterStatus::Succeeded {
            artifact: ArtifactRef::Object {
                bucket: None,
                key: "exports/docs.zip".into(),
            },
            expires_at: None,
        })
    }

    fn in_progress(done: u32) -> Result<ConverterStatus, ConverterError> {
        Ok(ConverterStatus::InProgress(
            ConversionProgress::phase("Crawling documentation pages...")
                .with_counts(Some(done), Some(10)),
        ))
    }

    /// Statuses must only ever move forward through the lifecycle.
    fn assert_forward_only(history: &[Job]) {
        for pair in history.windows(2) {
            assert!(pair[0].status.rank() <= pair[1].status.rank());
            assert!(pair[0].updated_at < pair[1].updated_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_returns_before_the_converter_answers() {
        let h = harness(FakeConverter::new(SubmitBehavior::Hang));

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();

        let job = h.orchestrator.get(id).await.unwrap().unwrap();
        assert!(!job.is_terminal());
        assert!(h.orchestrator.is_running(id));

        h.orchestrator.shutdown(Duration::from_secs(1)).await;
        assert!(!h.orchestrator.is_running(id));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_url_persists_nothing() {
        let h = harness(FakeConverter::accepting("t"));

        let result = h.orchestrator.create(request("not a url")).await;

        assert_matches!(result, Err(CoreError::Validation(_)));
        assert!(h.orchestrator.list().await.unwrap().is_empty());
        assert_eq!(h.converter.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_conversion_completes_with_artifact() {
        let h = harness(
            FakeConverter::accepting("task-1").with_polls([
                Ok(ConverterStatus::Queued),
                in_progress(3),
                in_progress(3),
                in_progress(7),
                succeeded(),
            ]),
        );

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.message.as_deref(), Some(MSG_COMPLETED));
        assert!(job.artifact.is_some());
        assert!(job.error.is_none());
        assert_eq!(job.converter_task_id.as_deref(), Some("task-1"));

        let history = h.store.history(id).await;
        assert_forward_only(&history);
        let statuses: Vec<_> = history.iter().map(|j| j.status).collect();
        // pending, processing (start), processing (submitted),
        // processing (3/10), processing (7/10), completed
        assert_eq!(
            statuses,
            vec![
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Processing,
                JobStatus::Processing,
                JobStatus::Processing,
                JobStatus::Completed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_fails_the_job() {
        let h = harness(FakeConverter::new(SubmitBehavior::Reject(
            "API error: 500 - boom".into(),
        )));

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("API error: 500 - boom"));
        assert!(job.artifact.is_none());
        assert_eq!(h.converter.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_retried_and_never_persisted() {
        let h = harness(FakeConverter::accepting("task-1").with_polls([
            Err(ConverterError::TransientPoll("connection reset".into())),
            Err(ConverterError::TransientPoll("502".into())),
            succeeded(),
        ]));

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(h.converter.poll_calls.load(Ordering::SeqCst), 3);
        let history = h.store.history(id).await;
        assert!(history.iter().all(|j| j.error.is_none()));
        assert_eq!(history.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_fails_the_job_with_reason() {
        let h = harness(
            FakeConverter::accepting("task-1")
                .with_polls([Ok(ConverterStatus::Failed("site returned 403".into()))]),
        );

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("site returned 403"));
        assert!(job.artifact.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_a_job_that_never_finishes() {
        let mut config = test_config();
        config.max_job_duration = Duration::from_secs(5);
        // The script is empty, so every poll answers Queued.
        let h = harness_with(FakeConverter::accepting("task-1"), config);

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("Timeout: converter did not finish within 5s")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failures_do_not_stop_the_job() {
        let h = harness(FakeConverter::accepting("task-1").with_polls([succeeded()]));
        // Fails the initial Pending write and the start_processing write.
        h.store.fail_next_writes(2);

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let job = wait_for_terminal(&h.store, id).await;

        assert_eq!(job.status, JobStatus::Completed);
        let history = h.store.history(id).await;
        assert_eq!(history.first().map(|j| j.status), Some(JobStatus::Processing));
    }

    fn flaky_harness(
        store: Arc<FlakyStore>,
        converter: FakeConverter,
    ) -> (JobOrchestrator, JobEventHub) {
        let hub = JobEventHub::new();
        let orchestrator =
            JobOrchestrator::new(store, Arc::new(converter), hub.clone(), test_config());
        (orchestrator, hub)
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_terminal_write_is_retried_until_persisted() {
        let store = Arc::new(FlakyStore::default());
        store.fail_terminal_writes(3);
        let converter = FakeConverter::accepting("task-1").with_polls([succeeded()]);
        let (orchestrator, hub) = flaky_harness(store.clone(), converter);

        let id = orchestrator.create(request("https://docs.example.com")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let stored = store.stored(id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(store.terminal_write_attempts.load(Ordering::SeqCst), 4);
        assert!(!orchestrator.is_running(id));

        // A subscriber arriving after the hub channel closed still ends.
        let notifier =
            crate::StatusNotifier::new(store.clone(), hub, Duration::from_millis(50));
        let events = tokio::time::timeout(
            Duration::from_secs(5),
            futures::StreamExt::collect::<Vec<_>>(notifier.subscribe(id)),
        )
        .await
        .expect("late subscriber should see the terminal record");
        assert_eq!(events.len(), 1);
        assert!(events[0].is_final());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_terminal_write_retries() {
        let store = Arc::new(FlakyStore::default());
        store.fail_terminal_writes(usize::MAX);
        let converter = FakeConverter::accepting("task-1").with_polls([succeeded()]);
        let (orchestrator, _hub) = flaky_harness(store.clone(), converter);

        let id = orchestrator.create(request("https://docs.example.com")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(orchestrator.is_running(id));

        orchestrator.shutdown(Duration::from_secs(1)).await;

        assert!(!orchestrator.is_running(id));
        let stored = store.stored(id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_polls_a_processing_job_without_resubmitting() {
        let h = harness(FakeConverter::accepting("new-task").with_polls([succeeded()]));

        let mut job = new_job("https://docs.example.com");
        job.start_processing().unwrap();
        job.record_submission("old-task").unwrap();
        h.store.put(&job).await.unwrap();

        let mut finished = new_job("https://done.example.com");
        finished.start_processing().unwrap();
        finished.fail("earlier failure").unwrap();
        h.store.put(&finished).await.unwrap();

        assert_eq!(h.orchestrator.resume_active().await.unwrap(), 1);
        let resumed = wait_for_terminal(&h.store, job.id).await;

        assert_eq!(resumed.status, JobStatus::Completed);
        assert_eq!(resumed.converter_task_id.as_deref(), Some("old-task"));
        assert_eq!(h.converter.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_restarts_a_pending_job() {
        let h = harness(FakeConverter::accepting("task-9").with_polls([succeeded()]));
        let job = new_job("https://docs.example.com");
        h.store.put(&job).await.unwrap();

        h.orchestrator.resume_active().await.unwrap();
        let resumed = wait_for_terminal(&h.store, job.id).await;

        assert_eq!(resumed.status, JobStatus::Completed);
        assert_eq!(h.converter.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_running_job_is_not_delegated_twice() {
        let h = harness(FakeConverter::new(SubmitBehavior::Hang));
        let job = new_job("https://docs.example.com");
        h.store.put(&job).await.unwrap();

        h.orchestrator.resume_active().await.unwrap();
        h.orchestrator.resume_active().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.converter.submit_calls.load(Ordering::SeqCst), 1);
        h.orchestrator.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_leaves_job_processing_for_resume() {
        let h = harness(FakeConverter::accepting("task-1"));

        let id = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.orchestrator.shutdown(Duration::from_secs(1)).await;

        let job = h.orchestrator.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.converter_task_id.as_deref(), Some("task-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_requests_create_distinct_jobs() {
        let h = harness(FakeConverter::new(SubmitBehavior::Hang));

        let a = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();
        let b = h.orchestrator.create(request("https://docs.example.com")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(h.orchestrator.list().await.unwrap().len(), 2);
        h.orchestrator.shutdown(Duration::from_secs(1)).await;
    }
}
