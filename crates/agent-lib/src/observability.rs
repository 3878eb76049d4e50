//! Observability infrastructure for the inventory agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, jobs per cluster, query errors, coverage gaps)
//! - Structured JSON logging with tracing

use crate::collector::FleetReport;
use crate::error::CollectionError;
use crate::models::JobRecord;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle durations (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<InventoryMetricsInner> = OnceLock::new();

struct InventoryMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles: IntCounter,
    jobs_collected: IntGaugeVec,
    query_errors: IntCounterVec,
    coverage_gaps: IntCounterVec,
    fallback_fetches: IntCounter,
}

impl InventoryMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "job_inventory_cycle_duration_seconds",
                "Time spent collecting every configured cluster",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles: register_int_counter!(
                "job_inventory_cycles_total",
                "Number of completed collection cycles"
            )
            .expect("Failed to register cycles_total"),

            jobs_collected: register_int_gauge_vec!(
                "job_inventory_jobs_collected",
                "Job records produced for a cluster in the last cycle",
                &["cluster"]
            )
            .expect("Failed to register jobs_collected"),

            query_errors: register_int_counter_vec!(
                "job_inventory_query_errors_total",
                "Failed orchestrator or metrics backend queries",
                &["kind"]
            )
            .expect("Failed to register query_errors_total"),

            coverage_gaps: register_int_counter_vec!(
                "job_inventory_coverage_gaps_total",
                "Allocations known to the orchestrator but missing from the metrics backend",
                &["metric"]
            )
            .expect("Failed to register coverage_gaps_total"),

            fallback_fetches: register_int_counter!(
                "job_inventory_fallback_fetches_total",
                "Live allocation stats fetched to fill coverage gaps"
            )
            .expect("Failed to register fallback_fetches_total"),
        }
    }
}

/// Inventory metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct InventoryMetrics {
    _private: (),
}

impl Default for InventoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(InventoryMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &InventoryMetricsInner {
        GLOBAL_METRICS.get_or_init(InventoryMetricsInner::new)
    }

    /// Record everything a finished cycle reports
    pub fn record_cycle(&self, report: &FleetReport) {
        let inner = self.inner();
        inner
            .cycle_duration_seconds
            .observe(report.elapsed.as_secs_f64());
        inner.cycles.inc();

        for cluster in &report.clusters {
            inner
                .jobs_collected
                .with_label_values(&[cluster.cluster.as_str()])
                .set(cluster.jobs as i64);
        }

        for error in &report.errors {
            let kind = error.query_error().map(|e| e.kind()).unwrap_or("task");
            inner.query_errors.with_label_values(&[kind]).inc();
        }

        for (kind, count) in &report.gaps_by_kind {
            inner
                .coverage_gaps
                .with_label_values(&[kind.as_str()])
                .inc_by(*count as u64);
        }

        inner.fallback_fetches.inc_by(report.fallback_fetches as u64);
    }

    pub fn cycles(&self) -> u64 {
        self.inner().cycles.get()
    }
}

/// Structured logger for inventory events
///
/// Also serves as the default sink for produced job records.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, clusters: usize, interval_secs: u64) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            clusters = clusters,
            interval_secs = interval_secs,
            "Inventory agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Inventory agent shutting down"
        );
    }

    /// Log the outcome of a collection cycle
    pub fn log_cycle(&self, report: &FleetReport) {
        let gaps: usize = report.gaps_by_kind.values().sum();
        info!(
            event = "cycle_complete",
            instance = %self.instance,
            clusters = report.clusters.len(),
            records = report.records.len(),
            errors = report.errors.len(),
            coverage_gaps = gaps,
            fallback_fetches = report.fallback_fetches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Collection cycle complete"
        );
    }

    /// Log allocations the metrics backend missed, one event per metric kind
    pub fn log_coverage_gaps(&self, report: &FleetReport) {
        for (kind, count) in &report.gaps_by_kind {
            info!(
                event = "coverage_gap",
                instance = %self.instance,
                metric = %kind,
                allocations = *count,
                fallback_fetches = report.fallback_fetches,
                "Allocations missing from metrics backend"
            );
        }
    }

    /// Log a diagnostic collected during a cycle
    pub fn log_collection_error(&self, error: &CollectionError) {
        let kind = error.query_error().map(|e| e.kind()).unwrap_or("task");
        warn!(
            event = "query_failed",
            instance = %self.instance,
            cluster = %error.cluster(),
            error_kind = %kind,
            cluster_fatal = error.is_cluster_fatal(),
            error = %error,
            "Collection query failed"
        );
    }

    /// Emit one job record
    pub fn log_job_record(&self, record: &JobRecord) {
        info!(
            event = "job_record",
            instance = %self.instance,
            job_id = %record.job_id,
            name = %record.name,
            namespace = %record.namespace,
            datacenters = %record.datacenters,
            ticks_used = record.ticks_used,
            cpu_requested = record.cpu_requested,
            rss_mb = record.rss_mb,
            cache_mb = record.cache_mb,
            memory_mb_requested = record.memory_mb_requested,
            disk_mb_requested = record.disk_mb_requested,
            iops_requested = record.iops_requested,
            collected_at = %record.collected_at,
            "Job resource record"
        );
    }
}
