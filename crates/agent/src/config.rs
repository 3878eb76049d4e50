//! Agent configuration

use anyhow::{Context, Result};
use inventory_lib::clients::normalize_address;
use inventory_lib::{CollectorSettings, FleetConfig, RequestSource};
use serde::Deserialize;
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/job-inventory/config.json";

/// A `url` + `port` pair as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Endpoint {
    #[serde(alias = "URL")]
    pub url: String,

    /// Kept as text; numeric ports are accepted too
    #[serde(default, alias = "Port")]
    pub port: String,
}

impl Endpoint {
    /// `url:port`, with `http://` added when the url has no scheme
    pub fn address(&self) -> String {
        let url = self.url.trim_end_matches('/');
        if self.port.is_empty() {
            normalize_address(url)
        } else {
            normalize_address(&format!("{}:{}", url, self.port))
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Metrics backend shared by every cluster
    #[serde(alias = "VictoriaMetrics", alias = "victoriametrics")]
    pub metrics: Endpoint,

    /// Orchestrator endpoints, one per cluster
    #[serde(default, alias = "Nomad", alias = "nomad")]
    pub clusters: Vec<Endpoint>,

    /// Time between collection cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Jobs collected concurrently within one cluster
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// API server port for health/metrics/snapshot
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub request_source: RequestSource,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_api_port() -> u16 {
    8080
}

impl InventoryConfig {
    /// Load configuration from the config file and environment
    ///
    /// The file path comes from `INVENTORY_CONFIG`; a missing file is fine as
    /// long as the environment supplies every required key.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("INVENTORY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("INVENTORY").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics.url.is_empty() {
            anyhow::bail!("metrics.url must be set");
        }
        if self.clusters.is_empty() {
            anyhow::bail!("At least one cluster must be configured");
        }
        if let Some(cluster) = self.clusters.iter().find(|c| c.url.is_empty()) {
            anyhow::bail!("Cluster with port {:?} has no url", cluster.port);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be non-zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be non-zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Immutable fleet configuration handed to the fleet driver
    pub fn to_fleet_config(&self) -> FleetConfig {
        FleetConfig {
            metrics_address: self.metrics.address(),
            clusters: self.clusters.iter().map(Endpoint::address).collect(),
            settings: CollectorSettings {
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                max_concurrent_jobs: self.max_concurrent_jobs.max(1),
                request_source: self.request_source,
            },
        }
    }
}
