//! Clients for the orchestrator and metrics backend HTTP APIs
//!
//! Both clients are read-only and hold no per-cycle state, so one instance
//! is shared by every job task of a cluster. The traits are the seam the
//! reconciler and collector are written against.

mod http;
mod metrics;
mod orchestrator;

pub use http::{normalize_address, JsonEndpoint};
pub use metrics::{MetricsClient, QueryData, QueryResponse, Sample, SeriesLabels};
pub use orchestrator::OrchestratorClient;

use crate::error::QueryResult;
use crate::models::{AllocatedMetric, AllocationSpec, AllocationStats, Job, JobSpec, MetricKind};
use std::collections::{BTreeSet, HashMap, HashSet};

pub use async_trait::async_trait;

/// Queries against the time-series metrics backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Raw sum of `kind` over every series labelled with `job_name`.
    /// Returns 0 when the backend has no series for the job.
    async fn query_job_aggregate(&self, kind: MetricKind, job_name: &str) -> QueryResult<f64>;

    /// Raw per-allocation sums of an allocated-resource metric for `job_id`
    async fn query_allocation_aggregate(
        &self,
        metric: AllocatedMetric,
        job_id: &str,
    ) -> QueryResult<HashMap<String, f64>>;

    /// Every allocation id currently reported for `kind`, across all jobs
    async fn list_covered_allocations(&self, kind: MetricKind) -> QueryResult<HashSet<String>>;
}

/// Queries against the cluster orchestrator
#[async_trait]
pub trait OrchestratorSource: Send + Sync {
    /// Address used to label records and diagnostics for this cluster
    fn address(&self) -> &str;

    async fn list_jobs(&self) -> QueryResult<Vec<Job>>;

    /// `None` when the orchestrator no longer resolves the job
    async fn job_specification(&self, job_id: &str) -> QueryResult<Option<JobSpec>>;

    async fn list_allocations(&self, job_id: &str) -> QueryResult<BTreeSet<String>>;

    /// `None` when the allocation was already garbage-collected
    async fn allocation_stats(&self, alloc_id: &str) -> QueryResult<Option<AllocationStats>>;

    async fn allocation_spec(&self, alloc_id: &str) -> QueryResult<Option<AllocationSpec>>;
}
