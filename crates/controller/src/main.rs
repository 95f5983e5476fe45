//! Disruption Controller - conditional do-not-disrupt removal
//!
//! Watches for nodes that are due for removal (expired NodeClaims or
//! DisruptionBlocked events) and removes the do-not-disrupt annotation from
//! pods on those nodes whose disruption window is currently open.

use anyhow::{Context, Result};
use disruption_lib::{
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
    KubePatcher, KubeWorkloadLookup, Reconciler, ReconcilerSettings,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod controller;

use controller::{Controller, DeliverySettings};

const CONTROLLER_NAME: &str = "disruption-window-controller";
const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting disruption-controller");

    let config = config::ControllerConfig::load()?;
    info!(
        trigger_mode = %config.trigger_mode,
        dry_run = config.dry_run,
        concurrency = config.concurrency,
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCHER).await;
    health_registry.register(components::RECONCILER).await;

    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(CONTROLLER_NAME);
    logger.log_startup(
        CONTROLLER_VERSION,
        &config.trigger_mode.to_string(),
        config.dry_run,
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Reconciler::new(
        Arc::new(KubeWorkloadLookup::new(client.clone())),
        Arc::new(KubePatcher::new(client.clone())),
        Arc::new(metrics.clone()),
        ReconcilerSettings {
            dry_run: config.dry_run,
            ..Default::default()
        },
        logger.clone(),
    );

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let signal_logger = logger.clone();
    tokio::spawn(async move {
        let reason = tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT received",
            _ = sigterm.recv() => "SIGTERM received",
        };
        signal_logger.log_shutdown(reason);
        let _ = shutdown_tx.send(true);
    });

    let triggers =
        controller::trigger_stream(client, config.trigger_mode, health_registry.clone());
    let controller = Controller::new(
        Arc::new(reconciler),
        DeliverySettings {
            concurrency: config.concurrency,
            lookup_retry_attempts: config.lookup_retry_attempts,
            lookup_retry_backoff: config.lookup_retry_backoff(),
        },
        health_registry.clone(),
        logger,
    );

    health_registry.set_ready(true).await;
    controller.run(triggers, shutdown_rx).await;

    health_registry.set_ready(false).await;
    info!("Shutting down");

    Ok(())
}
