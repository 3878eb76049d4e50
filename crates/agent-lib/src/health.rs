//! Health tracking for the inventory agent
//!
//! Each cluster is a component whose status follows the outcome of the most
//! recent collection cycle. The agent becomes ready after its first cycle.

use crate::collector::{ClusterSummary, FleetReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Last cycle collected every job without a failed query
    Healthy,
    /// Last cycle produced records, but some queries failed
    Degraded,
    /// Last cycle could not list the cluster's jobs
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the cluster still produced records
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Healthy => "healthy",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Health of one cluster as of its last cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub jobs: usize,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn from_summary(summary: &ClusterSummary) -> Self {
        let (status, message) = if !summary.listed {
            (
                ComponentStatus::Unhealthy,
                Some("Job listing failed".to_string()),
            )
        } else if summary.errors > 0 {
            (
                ComponentStatus::Degraded,
                Some(format!("{} queries failed", summary.errors)),
            )
        } else {
            (ComponentStatus::Healthy, None)
        };

        Self {
            status,
            message,
            jobs: summary.jobs,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub clusters: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Unhealthy only when no cluster is operational
    pub fn compute_status(clusters: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        if clusters.is_empty() {
            return ComponentStatus::Healthy;
        }
        if clusters.values().all(|c| !c.status.is_operational()) {
            return ComponentStatus::Unhealthy;
        }
        if clusters
            .values()
            .any(|c| c.status != ComponentStatus::Healthy)
        {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Registry of per-cluster health, shared between the loop and the API
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    clusters: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    cycles: Arc<RwLock<u64>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update every cluster from a finished cycle
    pub async fn observe_cycle(&self, report: &FleetReport) {
        let mut clusters = self.clusters.write().await;
        for summary in &report.clusters {
            clusters.insert(summary.cluster.clone(), ComponentHealth::from_summary(summary));
        }
        drop(clusters);

        *self.cycles.write().await += 1;
    }

    pub async fn cycles(&self) -> u64 {
        *self.cycles.read().await
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let clusters = self.clusters.read().await.clone();
        let status = HealthResponse::compute_status(&clusters);
        HealthResponse { status, clusters }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        if self.cycles().await == 0 {
            return ReadinessResponse {
                ready: false,
                reason: Some("No collection cycle completed yet".to_string()),
            };
        }

        if self.health().await.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("No cluster could be collected".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
