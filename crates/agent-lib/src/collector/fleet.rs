//! Fan-out of the cluster collector over every configured cluster

use super::cluster::{ClusterCollector, ClusterReport, CollectorSettings};
use crate::error::CollectionError;
use crate::models::{Cluster, JobRecord, MetricKind};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Immutable configuration of one fleet collection
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    /// Metrics backend shared by every cluster
    pub metrics_address: String,
    /// Orchestrator addresses, one per cluster
    pub clusters: Vec<String>,
    pub settings: CollectorSettings,
}

impl FleetConfig {
    pub fn new(metrics_address: impl Into<String>, clusters: Vec<String>) -> Self {
        Self {
            metrics_address: metrics_address.into(),
            clusters,
            settings: CollectorSettings::default(),
        }
    }

    pub fn cluster_pairs(&self) -> Vec<Cluster> {
        self.clusters
            .iter()
            .map(|addr| Cluster::new(addr.clone(), self.metrics_address.clone()))
            .collect()
    }
}

/// Per-cluster outcome of one fleet cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: String,
    pub jobs: usize,
    pub errors: usize,
    /// False when the job directory could not be read
    pub listed: bool,
}

impl From<&ClusterReport> for ClusterSummary {
    fn from(report: &ClusterReport) -> Self {
        Self {
            cluster: report.cluster.clone(),
            jobs: report.records.len(),
            errors: report.errors.len(),
            listed: !report.is_failed(),
        }
    }
}

/// Combined output of one collection cycle over every cluster
#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    pub records: Vec<JobRecord>,
    pub errors: Vec<CollectionError>,
    pub clusters: Vec<ClusterSummary>,
    pub gaps_by_kind: BTreeMap<MetricKind, usize>,
    pub fallback_fetches: usize,
    pub collected_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed: Duration,
}

impl FleetReport {
    fn merge(&mut self, report: ClusterReport) {
        self.clusters.push(ClusterSummary::from(&report));
        for (kind, count) in report.gaps_by_kind {
            *self.gaps_by_kind.entry(kind).or_insert(0) += count;
        }
        self.fallback_fetches += report.fallback_fetches;
        self.records.extend(report.records);
        self.errors.extend(report.errors);
    }
}

/// Serializable view of the latest cycle, as served by the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub collected_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_ms: u64,
    pub clusters: Vec<ClusterSummary>,
    pub records: Vec<JobRecord>,
    pub errors: Vec<String>,
}

impl From<&FleetReport> for FleetSnapshot {
    fn from(report: &FleetReport) -> Self {
        Self {
            collected_at: report.collected_at,
            elapsed_ms: report.elapsed.as_millis() as u64,
            clusters: report.clusters.clone(),
            records: report.records.clone(),
            errors: report.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

enum Target {
    Ready(Arc<ClusterCollector>),
    Invalid { cluster: String, reason: String },
}

enum Pending {
    Running {
        cluster: String,
        handle: JoinHandle<ClusterReport>,
    },
    Done(ClusterReport),
}

/// Runs one cluster collector per cluster concurrently and joins them
pub struct FleetDriver {
    targets: Vec<Target>,
}

impl FleetDriver {
    /// Build HTTP clients for every configured cluster.
    ///
    /// A cluster whose address cannot be parsed is kept and reported as a
    /// failed cluster on every cycle instead of failing the whole fleet.
    pub fn new(config: &FleetConfig) -> Self {
        let targets = config
            .cluster_pairs()
            .into_iter()
            .map(|cluster| match ClusterCollector::connect(&cluster, config.settings.clone()) {
                Ok(collector) => Target::Ready(Arc::new(collector)),
                Err(e) => {
                    warn!(cluster = %cluster.orchestrator, error = %e, "Invalid cluster endpoint");
                    Target::Invalid {
                        cluster: cluster.orchestrator,
                        reason: format!("{:#}", e),
                    }
                }
            })
            .collect();

        Self { targets }
    }

    /// Drive pre-built collectors, e.g. over in-memory sources
    pub fn from_collectors(collectors: Vec<ClusterCollector>) -> Self {
        Self {
            targets: collectors
                .into_iter()
                .map(|c| Target::Ready(Arc::new(c)))
                .collect(),
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.targets.len()
    }

    /// Collect every cluster concurrently and wait for all of them.
    ///
    /// Clusters are joined in configuration order, so the combined report is
    /// deterministic for a given set of cluster reports.
    pub async fn collect(&self) -> FleetReport {
        let start = Instant::now();
        let collected_at = chrono::Utc::now();

        let mut pending = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            match target {
                Target::Ready(collector) => {
                    let collector = Arc::clone(collector);
                    let cluster = collector.address().to_string();
                    let handle = tokio::spawn(async move { collector.collect().await });
                    pending.push(Pending::Running { cluster, handle });
                }
                Target::Invalid { cluster, reason } => {
                    let error = CollectionError::InvalidEndpoint {
                        cluster: cluster.clone(),
                        reason: reason.clone(),
                    };
                    pending.push(Pending::Done(ClusterReport::failed(cluster, error)));
                }
            }
        }

        let mut fleet = FleetReport {
            collected_at: Some(collected_at),
            ..Default::default()
        };
        for entry in pending {
            let report = match entry {
                Pending::Done(report) => report,
                Pending::Running { cluster, handle } => match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        let error = CollectionError::TaskFailed {
                            cluster: cluster.clone(),
                            reason: e.to_string(),
                        };
                        ClusterReport::failed(&cluster, error)
                    }
                },
            };
            fleet.merge(report);
        }

        fleet.elapsed = start.elapsed();
        info!(
            clusters = fleet.clusters.len(),
            records = fleet.records.len(),
            errors = fleet.errors.len(),
            elapsed_ms = fleet.elapsed.as_millis() as u64,
            "Fleet collection complete"
        );
        fleet
    }
}

/// Collect a whole fleet once
pub async fn collect_fleet(config: &FleetConfig) -> Result<FleetReport> {
    if config.clusters.is_empty() {
        anyhow::bail!("No clusters configured");
    }
    Ok(FleetDriver::new(config).collect().await)
}
