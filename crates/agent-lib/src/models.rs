//! Core data models for the job inventory

use serde::{Deserialize, Serialize};

/// Divisor converting reported bytes into the megabytes used in every record
pub const BYTES_PER_MB: f64 = 1.049e6;

/// Convert a byte count reported by either backend into megabytes
pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}

/// An orchestrator endpoint paired with its metrics backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cluster {
    pub orchestrator: String,
    pub metrics: String,
}

impl Cluster {
    pub fn new(orchestrator: impl Into<String>, metrics: impl Into<String>) -> Self {
        Self {
            orchestrator: orchestrator.into(),
            metrics: metrics.into(),
        }
    }
}

/// Entry of the orchestrator's job directory (`GET /v1/jobs`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Datacenters", default)]
    pub datacenters: Vec<String>,
    #[serde(rename = "JobSummary", default)]
    pub summary: JobSummary,
}

impl Job {
    pub fn namespace(&self) -> &str {
        &self.summary.namespace
    }

    /// Datacenters joined into the single delimited field used by records
    pub fn datacenter_list(&self) -> String {
        self.datacenters.join(",")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "Namespace", default)]
    pub namespace: String,
}

/// Nested specification of a job (`GET /v1/job/{id}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "TaskGroups", default)]
    pub task_groups: Option<Vec<TaskGroup>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    #[serde(rename = "Count", default)]
    pub count: f64,
    #[serde(rename = "Tasks", default)]
    pub tasks: Option<Vec<Task>>,
    #[serde(rename = "EphemeralDisk", default)]
    pub ephemeral_disk: Option<EphemeralDisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "Resources", default)]
    pub resources: Resources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EphemeralDisk {
    #[serde(rename = "SizeMB", default)]
    pub size_mb: f64,
}

/// Resource request block shared by tasks and allocations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "CPU", default)]
    pub cpu: f64,
    #[serde(rename = "MemoryMB", default)]
    pub memory_mb: f64,
    #[serde(rename = "DiskMB", default)]
    pub disk_mb: f64,
    #[serde(rename = "IOPS", default)]
    pub iops: f64,
}

/// Allocation as recorded by the orchestrator (`GET /v1/allocation/{id}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationSpec {
    #[serde(rename = "Resources", default)]
    pub resources: Resources,
}

/// Allocation listing entry (`GET /v1/job/{id}/allocations`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,
}

/// Live usage snapshot from the node agent (`GET /v1/client/allocation/{id}/stats`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationStats {
    #[serde(rename = "ResourceUsage", default)]
    pub resource_usage: ResourceUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(rename = "MemoryStats", default)]
    pub memory_stats: MemoryStats,
    #[serde(rename = "CpuStats", default)]
    pub cpu_stats: CpuStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    #[serde(rename = "RSS", default)]
    pub rss: f64,
    #[serde(rename = "Cache", default)]
    pub cache: f64,
    #[serde(rename = "Swap", default)]
    pub swap: f64,
    #[serde(rename = "Usage", default)]
    pub usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(rename = "TotalTicks", default)]
    pub total_ticks: f64,
}

/// Observed usage metric kinds reconciled per job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Rss,
    Cache,
    Ticks,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Rss, MetricKind::Cache, MetricKind::Ticks];

    /// Series name exported by the node agents to the metrics backend
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricKind::Rss => "nomad_client_allocs_memory_rss_value",
            MetricKind::Cache => "nomad_client_allocs_memory_cache_value",
            MetricKind::Ticks => "nomad_client_allocs_cpu_total_ticks_value",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Rss => "rss",
            MetricKind::Cache => "cache",
            MetricKind::Ticks => "ticks",
        }
    }

    /// Convert a raw reported value into the record unit
    pub fn scale(&self, raw: f64) -> f64 {
        match self {
            MetricKind::Rss | MetricKind::Cache => bytes_to_mb(raw),
            MetricKind::Ticks => raw,
        }
    }

    /// Scaled value of this kind taken from a live allocation snapshot
    pub fn live_value(&self, stats: &AllocationStats) -> f64 {
        let usage = &stats.resource_usage;
        let raw = match self {
            MetricKind::Rss => usage.memory_stats.rss,
            MetricKind::Cache => usage.memory_stats.cache,
            MetricKind::Ticks => usage.cpu_stats.total_ticks,
        };
        self.scale(raw)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocated-resource series, used by the allocation-based request path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatedMetric {
    Cpu,
    Memory,
}

impl AllocatedMetric {
    pub fn metric_name(&self) -> &'static str {
        match self {
            AllocatedMetric::Cpu => "nomad_client_allocs_cpu_allocated_value",
            AllocatedMetric::Memory => "nomad_client_allocs_memory_allocated_value",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocatedMetric::Cpu => "cpu allocated",
            AllocatedMetric::Memory => "memory allocated",
        }
    }

    pub fn scale(&self, raw: f64) -> f64 {
        match self {
            AllocatedMetric::Cpu => raw,
            AllocatedMetric::Memory => bytes_to_mb(raw),
        }
    }
}

/// Reconciled observed usage for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub rss_mb: f64,
    pub cache_mb: f64,
    pub ticks: f64,
}

impl UsageTotals {
    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Rss => self.rss_mb,
            MetricKind::Cache => self.cache_mb,
            MetricKind::Ticks => self.ticks,
        }
    }

    pub fn add(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::Rss => self.rss_mb += value,
            MetricKind::Cache => self.cache_mb += value,
            MetricKind::Ticks => self.ticks += value,
        }
    }
}

/// Declared resource reservations for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedResources {
    pub cpu: f64,
    pub memory_mb: f64,
    pub disk_mb: f64,
    pub iops: f64,
}

/// Point-in-time resource record for one job, one per job per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub name: String,
    pub ticks_used: f64,
    pub cpu_requested: f64,
    pub rss_mb: f64,
    pub cache_mb: f64,
    pub memory_mb_requested: f64,
    pub disk_mb_requested: f64,
    pub iops_requested: f64,
    pub namespace: String,
    pub datacenters: String,
    pub collected_at: String,
}

/// Format used for `JobRecord::collected_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl JobRecord {
    pub fn new(
        job: &Job,
        usage: UsageTotals,
        requested: RequestedResources,
        collected_at: chrono::DateTime<chrono::Local>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            name: job.name.clone(),
            ticks_used: usage.ticks,
            cpu_requested: requested.cpu,
            rss_mb: usage.rss_mb,
            cache_mb: usage.cache_mb,
            memory_mb_requested: requested.memory_mb,
            disk_mb_requested: requested.disk_mb,
            iops_requested: requested.iops,
            namespace: job.namespace().to_string(),
            datacenters: job.datacenter_list(),
            collected_at: collected_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}
