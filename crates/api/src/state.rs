use std::sync::Arc;

use omnidocs_cloud::ObjectStore;
use omnidocs_converter::Converter;
use omnidocs_db::JobStore;
use omnidocs_events::JobEventHub;
use omnidocs_pipeline::{ArtifactService, JobOrchestrator, StatusNotifier};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every component is `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Canonical job records.
    pub store: Arc<dyn JobStore>,
    pub orchestrator: JobOrchestrator,
    pub notifier: StatusNotifier,
    pub artifacts: ArtifactService,
}

impl AppState {
    /// Wire the pipeline components around one store and one converter.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        objects: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let pipeline = config.pipeline();
        let hub = JobEventHub::new();

        let orchestrator =
            JobOrchestrator::new(store.clone(), converter.clone(), hub.clone(), pipeline.clone());
        let notifier = StatusNotifier::new(store.clone(), hub, pipeline.resync_interval);
        let artifacts = ArtifactService::new(store.clone(), converter, objects);

        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            notifier,
            artifacts,
        }
    }
}
