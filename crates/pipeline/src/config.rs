use std::time::Duration;

/// Default converter status poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default upper bound on a job's delegation before it is failed.
pub const DEFAULT_MAX_JOB_DURATION: Duration = Duration::from_secs(3600);

/// Default interval at which status subscriptions re-read the store.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Timing knobs for delegation and status streaming.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poll_interval: Duration,
    pub max_job_duration: Duration,
    pub resync_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_job_duration: DEFAULT_MAX_JOB_DURATION,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}
