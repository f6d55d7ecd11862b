//! Job orchestration for documentation conversions.
//!
//! - [`JobOrchestrator`]: creates jobs and runs one delegation task per
//!   job against the external converter.
//! - [`StatusNotifier`]: per-subscription status streams fed by the job
//!   update hub, with a store resync fallback.
//! - [`ArtifactService`]: resolves a completed job's artifact from object
//!   storage or the converter.

pub mod artifact;
pub mod config;
pub mod notifier;
pub mod orchestrator;

#[cfg(test)]
mod test_support;

pub use artifact::{Artifact, ArtifactError, ArtifactService};
pub use config::PipelineConfig;
pub use notifier::StatusNotifier;
pub use orchestrator::JobOrchestrator;
