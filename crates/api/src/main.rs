use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use omnidocs_api::config::ServerConfig;
use omnidocs_api::router::build_app_router;
use omnidocs_api::state::AppState;
use omnidocs_cloud::{ObjectStore, S3ObjectStore};
use omnidocs_converter::{Converter, HttpConverter};
use omnidocs_db::{FileJobStore, JobStore, PgJobStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "omnidocs_api=debug,omnidocs_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            let pool = omnidocs_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            omnidocs_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgJobStore::new(pool))
        }
        None => Arc::new(
            FileJobStore::open(&config.job_store_path)
                .await
                .expect("Failed to open job store file"),
        ),
    };

    store
        .health_check()
        .await
        .expect("Job store health check failed");

    // --- Converter ---
    let converter: Arc<dyn Converter> = Arc::new(
        HttpConverter::new(
            config.converter_api_url.clone(),
            Duration::from_secs(config.converter_timeout_secs),
        )
        .expect("Failed to build converter HTTP client"),
    );
    tracing::info!(url = %config.converter_api_url, "Converter client ready");

    // --- Object storage ---
    let objects: Option<Arc<dyn ObjectStore>> = match &config.object_store {
        Some(object_config) => Some(Arc::new(S3ObjectStore::from_config(object_config).await)),
        None => {
            tracing::info!("No ARTIFACT_BUCKET set, artifacts are downloaded from the converter");
            None
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), store, converter, objects);

    match state.orchestrator.resume_active().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Resumed unfinished jobs"),
        Err(e) => tracing::error!(error = %e, "Failed to resume unfinished jobs"),
    }

    let orchestrator = state.orchestrator.clone();
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping delegation tasks");
    orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
