//! Client for the external documentation converter service.
//!
//! - [`Converter`]: the submit / poll / download seam the orchestrator
//!   depends on.
//! - [`HttpConverter`]: the production implementation over the
//!   converter's REST API.
//! - [`messages`]: wire types and the mapping from the converter's task
//!   states to [`ConverterStatus`].

pub mod api;
pub mod error;
pub mod messages;

pub use api::HttpConverter;
pub use error::ConverterError;
pub use messages::ConversionRequest;

use async_trait::async_trait;
use omnidocs_core::job::ArtifactRef;
use omnidocs_core::progress::ConversionProgress;
use omnidocs_core::types::Timestamp;

/// Interpreted state of a delegated conversion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterStatus {
    /// Accepted but not started.
    Queued,
    /// Running; carries the latest progress report.
    InProgress(ConversionProgress),
    /// Finished; the artifact is ready.
    Succeeded {
        artifact: ArtifactRef,
        expires_at: Option<Timestamp>,
    },
    /// Finished unsuccessfully with a reason.
    Failed(String),
}

/// A file streamed back from the converter.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Filename from `Content-Disposition`, when the converter sent one.
    pub filename: Option<String>,
}

/// Delegation seam to the external converter. Stateless between calls.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Start a conversion and return the converter's task id.
    async fn submit(&self, request: &ConversionRequest) -> Result<String, ConverterError>;

    /// Fetch the current state of a task.
    async fn poll(&self, task_id: &str) -> Result<ConverterStatus, ConverterError>;

    /// Download the finished artifact of a task.
    async fn download(&self, task_id: &str) -> Result<DownloadedFile, ConverterError>;
}
