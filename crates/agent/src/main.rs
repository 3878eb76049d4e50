//! Job inventory agent
//!
//! Periodically collects per-job resource usage and requests across every
//! configured orchestrator cluster, and serves health, metrics and the
//! latest snapshot over HTTP.

use anyhow::{Context, Result};
use inventory_lib::{
    collector::CollectionLoopBuilder,
    health::HealthRegistry,
    observability::{InventoryMetrics, StructuredLogger},
    FleetDriver,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting inventory-agent");

    let config = config::InventoryConfig::load().context("Failed to load configuration")?;
    let fleet_config = config.to_fleet_config();
    info!(
        metrics = %fleet_config.metrics_address,
        clusters = fleet_config.clusters.len(),
        "Agent configured"
    );

    let logger = StructuredLogger::new(
        std::env::var("HOSTNAME").unwrap_or_else(|_| "inventory-agent".to_string()),
    );
    logger.log_startup(
        AGENT_VERSION,
        fleet_config.clusters.len(),
        config.poll_interval_secs,
    );

    let app_state = Arc::new(api::AppState::new(
        HealthRegistry::new(),
        InventoryMetrics::new(),
    ));

    let driver = Arc::new(FleetDriver::new(&fleet_config));
    let (collection_loop, mut reports) = CollectionLoopBuilder::new()
        .driver(driver)
        .interval(config.poll_interval())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));

    // Start health, metrics and snapshot server
    let api_state = Arc::clone(&app_state);
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, api_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    let consumer_state = Arc::clone(&app_state);
    let consumer_logger = logger.clone();
    let consumer_handle = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            for record in &report.records {
                consumer_logger.log_job_record(record);
            }
            for error in &report.errors {
                consumer_logger.log_collection_error(error);
            }
            consumer_logger.log_coverage_gaps(&report);
            consumer_logger.log_cycle(&report);
            consumer_state.observe_cycle(&report).await;
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    // The loop dropped its sender, so the consumer drains and exits.
    if let Err(e) = consumer_handle.await {
        error!(error = %e, "Report consumer task failed");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
