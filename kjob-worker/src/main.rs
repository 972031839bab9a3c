//! Kubernetes job worker
//!
//! Connects to the cluster and the service mesh, then serves sessions until
//! interrupted. Every tracked job is deleted on shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kjob_worker::{Config, KubeGateway, SessionManager, WorkerError};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kjob_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kubernetes worker");

    let config = load_config()?;
    info!(
        "Loaded configuration: instance_id={}, namespace={}, server_url={}",
        config.instance_id, config.namespace, config.server_url
    );

    let gateway = KubeGateway::connect(&config.namespace)
        .await
        .map_err(|e| WorkerError::NotAvailable(format!("Kubernetes client unavailable: {}", e)))
        .context("Failed to connect to the cluster")?;
    info!("Connected to namespace {}", gateway.namespace());

    let registry = config.registry_client();
    if let Err(e) = registry.check_health().await {
        warn!(
            "Service registry at {} is not reachable yet: {}",
            registry.base_url(),
            e
        );
    }

    let manager = SessionManager::new(config, Arc::new(gateway), Arc::new(registry));
    info!(
        "{} ready, supporting {}",
        manager.name(),
        manager.supported_types().join(", ")
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    manager.shutdown().await;
    Ok(())
}

/// Loads configuration from environment variables
///
/// Unset variables take their defaults; a malformed one aborts start-up.
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
