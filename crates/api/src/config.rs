use std::time::Duration;

use omnidocs_cloud::ObjectStoreConfig;
use omnidocs_pipeline::PipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In production,
/// override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for delegation tasks to stop on shutdown (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Base URL of the converter service.
    pub converter_api_url: String,
    /// Per-request timeout for converter calls in seconds (default: `30`).
    pub converter_timeout_secs: u64,
    /// Converter status poll interval in milliseconds (default: `2000`).
    pub poll_interval_ms: u64,
    /// Upper bound on a single job's delegation in seconds (default: `3600`).
    pub job_max_duration_secs: u64,
    /// Status stream store resync interval in milliseconds (default: `1000`).
    pub status_resync_interval_ms: u64,
    /// Path of the JSON job store, used when no database is configured.
    pub job_store_path: String,
    /// Postgres URL; selects the database job store when set.
    pub database_url: Option<String>,
    /// Object storage for artifacts; `None` unless `ARTIFACT_BUCKET` is set.
    pub object_store: Option<ObjectStoreConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `10`                    |
    /// | `CONVERTER_API_URL`         | `http://localhost:8000` |
    /// | `CONVERTER_TIMEOUT_SECS`    | `30`                    |
    /// | `POLL_INTERVAL_MS`          | `2000`                  |
    /// | `JOB_MAX_DURATION_SECS`     | `3600`                  |
    /// | `STATUS_RESYNC_INTERVAL_MS` | `1000`                  |
    /// | `JOB_STORE_PATH`            | `job-store.json`        |
    /// | `DATABASE_URL`              | unset (file store)      |
    /// | `ARTIFACT_BUCKET`           | unset (no object store) |
    /// | `S3_ENDPOINT_URL`           | unset                   |
    /// | `S3_REGION`                 | unset                   |
    /// | `S3_ACCESS_KEY_ID`          | unset                   |
    /// | `S3_SECRET_ACCESS_KEY`      | unset                   |
    /// | `R2_ACCOUNT_ID`             | unset                   |
    ///
    /// Panics on unparseable values, and on zero intervals or timeouts, so
    /// misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let object_store = optional_var("ARTIFACT_BUCKET").map(|bucket| ObjectStoreConfig {
            bucket,
            endpoint_url: optional_var("S3_ENDPOINT_URL"),
            region: optional_var("S3_REGION"),
            access_key_id: optional_var("S3_ACCESS_KEY_ID"),
            secret_access_key: optional_var("S3_SECRET_ACCESS_KEY"),
            r2_account_id: optional_var("R2_ACCOUNT_ID"),
        });

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: nonzero_u64_var("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: u64_var("SHUTDOWN_TIMEOUT_SECS", 10),
            converter_api_url: std::env::var("CONVERTER_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".into()),
            converter_timeout_secs: nonzero_u64_var("CONVERTER_TIMEOUT_SECS", 30),
            poll_interval_ms: nonzero_u64_var("POLL_INTERVAL_MS", 2000),
            job_max_duration_secs: nonzero_u64_var("JOB_MAX_DURATION_SECS", 3600),
            status_resync_interval_ms: nonzero_u64_var("STATUS_RESYNC_INTERVAL_MS", 1000),
            job_store_path: std::env::var("JOB_STORE_PATH")
                .unwrap_or_else(|_| "job-store.json".into()),
            database_url: optional_var("DATABASE_URL"),
            object_store,
        }
    }

    /// Delegation and streaming timings derived from this configuration.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_job_duration: Duration::from_secs(self.job_max_duration_secs),
            resync_interval: Duration::from_millis(self.status_resync_interval_ms),
        }
    }
}

fn u64_var(name: &str, default: u64) -> u64 {
    std::env::var(name).map_or(default, |raw| parse_u64(name, &raw))
}

/// Intervals and timeouts: zero would panic the interval timers or spin
/// the poll loop.
fn nonzero_u64_var(name: &str, default: u64) -> u64 {
    std::env::var(name).map_or(default, |raw| parse_nonzero_u64(name, &raw))
}

fn parse_u64(name: &str, raw: &str) -> u64 {
    raw.trim()
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid u64"))
}

fn parse_nonzero_u64(name: &str, raw: &str) -> u64 {
    match parse_u64(name, raw) {
        0 => panic!("{name} must be greater than zero"),
        value => value,
    }
}

/// Read a variable, treating empty values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
