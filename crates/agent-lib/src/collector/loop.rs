//! Periodic fleet collection loop
//!
//! Runs the fleet driver at a fixed interval and hands every report to the
//! consumer over a channel. A cycle that overruns the interval delays the
//! next tick instead of queueing extra cycles.

use super::FleetDriver;
use super::FleetReport;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Time between the start of two cycles (default: 60 seconds)
    pub interval: Duration,
    /// Channel buffer size for fleet reports
    pub buffer_size: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            buffer_size: 4,
        }
    }
}

/// Periodically collects the whole fleet
pub struct CollectionLoop {
    driver: Arc<FleetDriver>,
    config: CollectionConfig,
    reports_tx: mpsc::Sender<FleetReport>,
}

impl CollectionLoop {
    /// Create a new collection loop and the receiver for its reports
    pub fn new(
        driver: Arc<FleetDriver>,
        config: CollectionConfig,
    ) -> (Self, mpsc::Receiver<FleetReport>) {
        let (reports_tx, reports_rx) = mpsc::channel(config.buffer_size.max(1));

        let loop_instance = Self {
            driver,
            config,
            reports_tx,
        };

        (loop_instance, reports_rx)
    }

    /// Run until a shutdown signal arrives or the report receiver is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            clusters = self.driver.cluster_count(),
            "Starting fleet collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cycle += 1;
                    let report = self.run_once().await;
                    debug!(
                        cycle = cycle,
                        records = report.records.len(),
                        errors = report.errors.len(),
                        "Collection cycle complete"
                    );

                    if self.reports_tx.send(report).await.is_err() {
                        warn!("Report receiver dropped, stopping collection loop");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down fleet collection loop");
                    break;
                }
            }
        }
    }

    /// Run a single cycle without sending the report
    pub async fn run_once(&self) -> FleetReport {
        self.driver.collect().await
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    driver: Option<Arc<FleetDriver>>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            driver: None,
            config: CollectionConfig::default(),
        }
    }

    /// Set the fleet driver
    pub fn driver(mut self, driver: Arc<FleetDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<(CollectionLoop, mpsc::Receiver<FleetReport>)> {
        let driver = self
            .driver
            .ok_or_else(|| anyhow::anyhow!("Fleet driver is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be non-zero");
        }

        Ok(CollectionLoop::new(driver, self.config))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
