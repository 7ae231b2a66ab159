//! Price Server - house price prediction service
//!
//! Loads the trained pipeline, feature schema and demographics once at
//! startup, then serves predictions and explanations over HTTP.

use anyhow::Result;
use price_lib::{
    artifacts::ArtifactStore,
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
};
use price_server::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting price-server");

    let config = ServiceConfig::load()?;
    info!(port = config.api_port, model_path = %config.model_path.display(), "Service configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.register(components::SCHEMA).await;
    health_registry.register(components::DEMOGRAPHICS).await;

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new("price-server");

    // Single load before any traffic is accepted
    let store = Arc::new(ArtifactStore::new());
    let snapshot = store.load(&config.artifact_paths());
    let status = snapshot.status();
    logger.log_artifacts_loaded(&status, snapshot.warnings());
    metrics.set_model_status(&status);
    health_registry.apply_snapshot(&snapshot).await;

    let app_state = Arc::new(api::AppState::new(
        store,
        &config,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
