//! Tests for reconciliation and collection over in-memory sources

use super::*;
use crate::clients::{async_trait, MetricsSource, OrchestratorSource};
use crate::error::{CollectionError, QueryError, QueryResult};
use crate::models::{
    AllocatedMetric, AllocationSpec, AllocationStats, CpuStats, EphemeralDisk, Job, JobSpec,
    JobSummary, MemoryStats, MetricKind, Resources, ResourceUsage, Task, TaskGroup, BYTES_PER_MB,
};
use crate::reconciler::{UsageReconciler, UsageReport};
use crate::requests::{reconcile_allocated_requests, RequestSource};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn server_error(what: &str) -> QueryError {
    QueryError::Status {
        url: format!("http://mock/{}", what),
        status: 500,
    }
}

/// Metrics backend answering from fixed tables
#[derive(Default)]
struct MockMetrics {
    aggregates: HashMap<(MetricKind, String), f64>,
    covered: HashMap<MetricKind, HashSet<String>>,
    allocated: HashMap<(AllocatedMetric, String), HashMap<String, f64>>,
    failing: HashSet<MetricKind>,
    failing_coverage: HashSet<MetricKind>,
}

#[async_trait]
impl MetricsSource for MockMetrics {
    async fn query_job_aggregate(&self, kind: MetricKind, job_name: &str) -> QueryResult<f64> {
        if self.failing.contains(&kind) {
            return Err(server_error(kind.as_str()));
        }
        Ok(self
            .aggregates
            .get(&(kind, job_name.to_string()))
            .copied()
            .unwrap_or(0.0))
    }

    async fn query_allocation_aggregate(
        &self,
        metric: AllocatedMetric,
        job_id: &str,
    ) -> QueryResult<HashMap<String, f64>> {
        Ok(self
            .allocated
            .get(&(metric, job_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_covered_allocations(&self, kind: MetricKind) -> QueryResult<HashSet<String>> {
        if self.failing.contains(&kind) || self.failing_coverage.contains(&kind) {
            return Err(server_error(kind.as_str()));
        }
        Ok(self.covered.get(&kind).cloned().unwrap_or_default())
    }
}

/// Orchestrator answering from fixed tables, recording live-stats calls
#[derive(Default)]
struct MockOrchestrator {
    address: String,
    jobs: Option<Vec<Job>>,
    specs: HashMap<String, JobSpec>,
    allocations: HashMap<String, BTreeSet<String>>,
    failing_allocations: HashSet<String>,
    stats: HashMap<String, AllocationStats>,
    failing_stats: HashSet<String>,
    alloc_specs: HashMap<String, AllocationSpec>,
    stats_calls: Mutex<Vec<String>>,
    stats_in_flight: AtomicUsize,
    max_stats_in_flight: AtomicUsize,
    spec_calls: AtomicUsize,
}

impl MockOrchestrator {
    fn stats_calls(&self) -> Vec<String> {
        self.stats_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrchestratorSource for MockOrchestrator {
    fn address(&self) -> &str {
        &self.address
    }

    async fn list_jobs(&self) -> QueryResult<Vec<Job>> {
        self.jobs
            .clone()
            .ok_or_else(|| QueryError::Transport {
                url: format!("http://{}/v1/jobs", self.address),
                reason: "connection refused".into(),
            })
    }

    async fn job_specification(&self, job_id: &str) -> QueryResult<Option<JobSpec>> {
        self.spec_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.specs.get(job_id).cloned())
    }

    async fn list_allocations(&self, job_id: &str) -> QueryResult<BTreeSet<String>> {
        if self.failing_allocations.contains(job_id) {
            return Err(server_error("allocations"));
        }
        Ok(self.allocations.get(job_id).cloned().unwrap_or_default())
    }

    async fn allocation_stats(&self, alloc_id: &str) -> QueryResult<Option<AllocationStats>> {
        self.stats_calls.lock().unwrap().push(alloc_id.to_string());
        let in_flight = self.stats_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_stats_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.stats_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_stats.contains(alloc_id) {
            return Err(QueryError::Timeout {
                url: format!("http://mock/v1/client/allocation/{}/stats", alloc_id),
            });
        }
        Ok(self.stats.get(alloc_id).cloned())
    }

    async fn allocation_spec(&self, alloc_id: &str) -> QueryResult<Option<AllocationSpec>> {
        Ok(self.alloc_specs.get(alloc_id).cloned())
    }
}

/// Usage of one allocation: rss and cache in whole MB, ticks unscaled
#[derive(Clone, Copy)]
struct Usage {
    rss_mb: f64,
    cache_mb: f64,
    ticks: f64,
}

impl Usage {
    fn raw(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Rss => self.rss_mb * BYTES_PER_MB,
            MetricKind::Cache => self.cache_mb * BYTES_PER_MB,
            MetricKind::Ticks => self.ticks,
        }
    }

    fn stats(&self) -> AllocationStats {
        AllocationStats {
            resource_usage: ResourceUsage {
                memory_stats: MemoryStats {
                    rss: self.raw(MetricKind::Rss),
                    cache: self.raw(MetricKind::Cache),
                    ..Default::default()
                },
                cpu_stats: CpuStats {
                    total_ticks: self.ticks,
                },
            },
        }
    }
}

fn job(id: &str, datacenters: &[&str], namespace: &str) -> Job {
    Job {
        id: id.to_string(),
        name: id.to_string(),
        datacenters: datacenters.iter().map(|s| s.to_string()).collect(),
        summary: JobSummary {
            namespace: namespace.to_string(),
        },
    }
}

/// Build sources for one job whose allocations are scraped per `covered`.
///
/// The backend aggregate for a kind sums exactly the covered allocations,
/// the way a real backend would.
fn scenario(
    job_id: &str,
    allocs: &[(&str, Usage)],
    covered: impl Fn(MetricKind, &str) -> bool,
) -> (MockMetrics, MockOrchestrator) {
    let mut metrics = MockMetrics::default();
    let mut orchestrator = MockOrchestrator {
        address: "nomad-test:4646".into(),
        jobs: Some(vec![job(job_id, &["dc1"], "default")]),
        ..Default::default()
    };

    orchestrator.allocations.insert(
        job_id.to_string(),
        allocs.iter().map(|(id, _)| id.to_string()).collect(),
    );

    for kind in MetricKind::ALL {
        let mut sum = 0.0;
        let set = metrics.covered.entry(kind).or_default();
        for (id, usage) in allocs {
            if covered(kind, *id) {
                set.insert(id.to_string());
                sum += usage.raw(kind);
            }
        }
        // Allocations of unrelated jobs are part of the global covered set
        set.insert("other-job-alloc".to_string());
        if sum > 0.0 {
            metrics.aggregates.insert((kind, job_id.to_string()), sum);
        }
    }

    for (id, usage) in allocs {
        orchestrator.stats.insert(id.to_string(), usage.stats());
    }

    (metrics, orchestrator)
}

fn sample_allocs() -> Vec<(&'static str, Usage)> {
    vec![
        ("a1", Usage { rss_mb: 100.0, cache_mb: 10.0, ticks: 1500.0 }),
        ("a2", Usage { rss_mb: 250.0, cache_mb: 0.0, ticks: 300.0 }),
        ("a3", Usage { rss_mb: 75.0, cache_mb: 32.0, ticks: 42.0 }),
        ("a4", Usage { rss_mb: 512.0, cache_mb: 64.0, ticks: 9000.0 }),
    ]
}

async fn reconcile(
    metrics: &MockMetrics,
    orchestrator: &MockOrchestrator,
    job_id: &str,
) -> UsageReport {
    UsageReconciler::new(metrics, orchestrator)
        .reconcile(job_id, job_id)
        .await
}

#[tokio::test]
async fn test_totals_are_consistent_under_any_coverage_split() {
    let allocs = sample_allocs();

    let (m, o) = scenario("web", &allocs, |_, _| true);
    let full = reconcile(&m, &o, "web").await;
    assert!(o.stats_calls().is_empty());
    assert!(full.issues.is_empty());

    let splits: Vec<Box<dyn Fn(MetricKind, &str) -> bool>> = vec![
        Box::new(|_: MetricKind, _: &str| false),
        Box::new(|_: MetricKind, id: &str| id == "a1" || id == "a3"),
        Box::new(|kind: MetricKind, id: &str| match kind {
            MetricKind::Rss => id != "a2",
            MetricKind::Cache => id == "a4",
            MetricKind::Ticks => true,
        }),
        Box::new(|kind: MetricKind, id: &str| (kind == MetricKind::Ticks) == (id == "a1")),
    ];

    for split in splits {
        let (m, o) = scenario("web", &allocs, split);
        let report = reconcile(&m, &o, "web").await;
        assert_eq!(report.totals, full.totals);
        assert!(report.issues.is_empty());
    }

    assert_eq!(full.totals.rss_mb, 937.0);
    assert_eq!(full.totals.cache_mb, 106.0);
    assert_eq!(full.totals.ticks, 10842.0);
}

#[tokio::test]
async fn test_zero_allocation_job() {
    let (m, o) = scenario("idle", &[], |_, _| true);
    let report = reconcile(&m, &o, "idle").await;

    assert_eq!(report.totals.rss_mb, 0.0);
    assert_eq!(report.totals.cache_mb, 0.0);
    assert_eq!(report.totals.ticks, 0.0);
    assert_eq!(report.fallback_fetches, 0);
    assert!(o.stats_calls().is_empty());
}

#[tokio::test]
async fn test_fully_covered_job_issues_no_fallback() {
    let (m, o) = scenario("web", &sample_allocs(), |_, _| true);
    let report = reconcile(&m, &o, "web").await;

    assert_eq!(report.fallback_fetches, 0);
    assert!(report.gaps_by_kind.is_empty());
    assert!(o.stats_calls().is_empty());
}

#[tokio::test]
async fn test_fully_uncovered_job_uses_live_stats_only() {
    let allocs = sample_allocs();
    let (m, o) = scenario("web", &allocs, |_, _| false);
    assert!(m.aggregates.is_empty());

    let report = reconcile(&m, &o, "web").await;

    let live_rss: f64 = allocs.iter().map(|(_, u)| u.rss_mb).sum();
    let live_ticks: f64 = allocs.iter().map(|(_, u)| u.ticks).sum();
    assert_eq!(report.totals.rss_mb, live_rss);
    assert_eq!(report.totals.ticks, live_ticks);
    assert_eq!(report.gaps_by_kind.get(&MetricKind::Cache), Some(&4));
    assert_eq!(report.fallback_fetches, 4);
}

#[tokio::test]
async fn test_allocation_missing_several_kinds_is_fetched_once() {
    let allocs = sample_allocs();
    let (m, o) = scenario("web", &allocs, |_, id| id != "a2");

    let report = reconcile(&m, &o, "web").await;

    assert_eq!(o.stats_calls(), vec!["a2".to_string()]);
    assert_eq!(report.fallback_fetches, 1);
    for kind in MetricKind::ALL {
        assert_eq!(report.gaps_by_kind.get(&kind), Some(&1));
    }
}

#[tokio::test]
async fn test_live_stats_fetches_are_bounded() {
    let ids: Vec<String> = (0..20).map(|i| format!("alloc-{:02}", i)).collect();
    let usage = Usage { rss_mb: 10.0, cache_mb: 1.0, ticks: 5.0 };
    let allocs: Vec<(&str, Usage)> = ids.iter().map(|id| (id.as_str(), usage)).collect();
    let (m, o) = scenario("batch", &allocs, |_, _| false);

    let report = UsageReconciler::new(&m, &o)
        .with_fallback_concurrency(3)
        .reconcile("batch", "batch")
        .await;

    assert_eq!(o.stats_calls().len(), 20);
    assert_eq!(report.fallback_fetches, 20);
    assert_eq!(report.totals.rss_mb, 200.0);
    assert_eq!(report.totals.ticks, 100.0);
    let peak = o.max_stats_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak in-flight stats calls was {}", peak);
}

#[tokio::test]
async fn test_rss_reconciles_to_megabytes() {
    let mut metrics = MockMetrics::default();
    metrics
        .aggregates
        .insert((MetricKind::Rss, "big".to_string()), 1.049e9);
    let orchestrator = MockOrchestrator::default();

    let report = reconcile(&metrics, &orchestrator, "big").await;
    assert_eq!(report.totals.rss_mb, 1000.0);
}

#[tokio::test]
async fn test_failing_cache_query_keeps_rss_and_ticks() {
    let allocs = sample_allocs();
    let (mut m, o) = scenario("web", &allocs, |_, _| true);
    m.failing.insert(MetricKind::Cache);

    let report = reconcile(&m, &o, "web").await;

    assert_eq!(report.totals.rss_mb, 937.0);
    assert_eq!(report.totals.ticks, 10842.0);
    assert_eq!(report.totals.cache_mb, 0.0);
    assert_eq!(report.issues.len(), 2);
    assert!(report.issues.iter().all(|i| i.scope.starts_with("cache")));
    assert!(o.stats_calls().is_empty());
}

#[tokio::test]
async fn test_failed_coverage_query_records_no_gaps() {
    let allocs = sample_allocs();
    let (mut m, o) = scenario("web", &allocs, |kind, id| kind != MetricKind::Rss || id == "a1");
    m.failing_coverage.insert(MetricKind::Rss);

    let report = reconcile(&m, &o, "web").await;

    // Only the aggregate over a1 is counted, no allocation is double counted
    assert_eq!(report.totals.rss_mb, 100.0);
    assert!(report.gaps_by_kind.get(&MetricKind::Rss).is_none());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].scope, "rss coverage");
}

#[tokio::test]
async fn test_collected_allocation_contributes_zero() {
    let allocs = sample_allocs();
    let (m, mut o) = scenario("web", &allocs, |_, id| id != "a4");
    o.stats.remove("a4");

    let report = reconcile(&m, &o, "web").await;

    assert_eq!(report.totals.rss_mb, 937.0 - 512.0);
    assert!(report.issues.is_empty());
    assert_eq!(o.stats_calls(), vec!["a4".to_string()]);
}

#[tokio::test]
async fn test_live_stats_failure_is_reported() {
    let allocs = sample_allocs();
    let (m, mut o) = scenario("web", &allocs, |_, id| id != "a3" && id != "a4");
    o.failing_stats.insert("a3".to_string());

    let report = reconcile(&m, &o, "web").await;

    assert_eq!(report.totals.rss_mb, 937.0 - 75.0);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].scope, "allocation stats a3");
    assert_eq!(report.issues[0].error.kind(), "timeout");
}

#[tokio::test]
async fn test_allocation_listing_failure_keeps_aggregates() {
    let allocs = sample_allocs();
    let (m, mut o) = scenario("web", &allocs, |_, id| id == "a1");
    o.failing_allocations.insert("web".to_string());

    let report = reconcile(&m, &o, "web").await;

    assert_eq!(report.totals.rss_mb, 100.0);
    assert_eq!(report.fallback_fetches, 0);
    assert_eq!(report.issues[0].scope, "allocation listing");
}

fn settings() -> CollectorSettings {
    CollectorSettings {
        max_concurrent_jobs: 2,
        ..Default::default()
    }
}

fn spec(count: f64, cpu: f64, memory_mb: f64, disk_mb: f64) -> JobSpec {
    JobSpec {
        task_groups: Some(vec![TaskGroup {
            count,
            tasks: Some(vec![Task {
                resources: Resources {
                    cpu,
                    memory_mb,
                    disk_mb: 0.0,
                    iops: 0.0,
                },
            }]),
            ephemeral_disk: Some(EphemeralDisk { size_mb: disk_mb }),
        }]),
    }
}

#[tokio::test]
async fn test_cluster_collects_every_job() {
    let (mut m, mut o) = scenario("web", &sample_allocs(), |_, id| id != "a2");
    o.jobs = Some(vec![
        job("web", &["dc1", "dc2"], "prod"),
        job("cron", &["dc1"], "batch"),
    ]);
    o.specs.insert("web".into(), spec(3.0, 500.0, 256.0, 300.0));
    m.failing.insert(MetricKind::Ticks);

    let collector = ClusterCollector::new(Arc::new(o), Arc::new(m), settings());
    let mut report = collector.collect().await;
    report.records.sort_by(|a, b| a.job_id.cmp(&b.job_id));

    assert_eq!(report.records.len(), 2);
    assert!(!report.is_failed());

    let cron = &report.records[0];
    assert_eq!(cron.job_id, "cron");
    assert_eq!(cron.cpu_requested, 0.0);
    assert_eq!(cron.rss_mb, 0.0);

    let web = &report.records[1];
    assert_eq!(web.datacenters, "dc1,dc2");
    assert_eq!(web.namespace, "prod");
    assert_eq!(web.cpu_requested, 1500.0);
    assert_eq!(web.memory_mb_requested, 768.0);
    assert_eq!(web.disk_mb_requested, 900.0);
    assert_eq!(web.rss_mb, 937.0);
    assert_eq!(web.collected_at.len(), "2024-01-01 00:00:00".len());

    // Ticks failed for both jobs, everything else degraded gracefully
    assert!(report
        .errors
        .iter()
        .all(|e| matches!(e, CollectionError::Job { scope, .. } if scope.starts_with("ticks"))));
    assert_eq!(report.fallback_fetches, 1);
}

#[tokio::test]
async fn test_cluster_without_job_listing_is_failed() {
    let orchestrator = MockOrchestrator {
        address: "nomad-down:4646".into(),
        jobs: None,
        ..Default::default()
    };
    let collector = ClusterCollector::new(
        Arc::new(orchestrator),
        Arc::new(MockMetrics::default()),
        settings(),
    );

    let report = collector.collect().await;

    assert!(report.records.is_empty());
    assert!(report.is_failed());
    assert!(matches!(
        report.errors.as_slice(),
        [CollectionError::ListJobs { cluster, .. }] if cluster == "nomad-down:4646"
    ));
}

#[tokio::test]
async fn test_allocation_based_requests_fall_back_to_allocation_spec() {
    let mut metrics = MockMetrics::default();
    metrics.allocated.insert(
        (AllocatedMetric::Cpu, "web".to_string()),
        HashMap::from([("a1".to_string(), 500.0), ("a2".to_string(), 500.0)]),
    );
    metrics.allocated.insert(
        (AllocatedMetric::Memory, "web".to_string()),
        HashMap::from([("a1".to_string(), 256.0 * BYTES_PER_MB)]),
    );

    let mut orchestrator = MockOrchestrator::default();
    orchestrator.allocations.insert(
        "web".into(),
        ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect(),
    );
    orchestrator.specs.insert("web".into(), spec(3.0, 500.0, 256.0, 300.0));
    for id in ["a1", "a2", "a3"] {
        orchestrator.alloc_specs.insert(
            id.to_string(),
            AllocationSpec {
                resources: Resources {
                    cpu: 500.0,
                    memory_mb: 256.0,
                    ..Default::default()
                },
            },
        );
    }

    let report = reconcile_allocated_requests(&metrics, &orchestrator, "web").await;

    assert!(report.issues.is_empty());
    assert_eq!(report.requested.cpu, 1500.0);
    assert_eq!(report.requested.memory_mb, 768.0);
    assert_eq!(report.requested.disk_mb, 900.0);
    assert_eq!(orchestrator.spec_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cluster_uses_configured_request_source() {
    let (mut m, mut o) = scenario("web", &[], |_, _| true);
    m.allocated.insert(
        (AllocatedMetric::Cpu, "web".to_string()),
        HashMap::from([("gone".to_string(), 120.0)]),
    );
    o.specs.insert("web".into(), spec(1.0, 500.0, 256.0, 300.0));

    let collector = ClusterCollector::new(
        Arc::new(o),
        Arc::new(m),
        CollectorSettings {
            request_source: RequestSource::Allocations,
            ..settings()
        },
    );
    let report = collector.collect().await;

    assert_eq!(report.records[0].cpu_requested, 120.0);
    assert_eq!(report.records[0].memory_mb_requested, 0.0);
    assert_eq!(report.records[0].disk_mb_requested, 300.0);
}

#[tokio::test]
async fn test_fleet_joins_every_cluster() {
    let (m1, o1) = scenario("web", &sample_allocs(), |_, _| true);
    let (m2, mut o2) = scenario("api", &sample_allocs(), |_, _| false);
    o2.address = "nomad-b:4646".into();
    let down = MockOrchestrator {
        address: "nomad-c:4646".into(),
        ..Default::default()
    };

    let driver = FleetDriver::from_collectors(vec![
        ClusterCollector::new(Arc::new(o1), Arc::new(m1), settings()),
        ClusterCollector::new(Arc::new(o2), Arc::new(m2), settings()),
        ClusterCollector::new(Arc::new(down), Arc::new(MockMetrics::default()), settings()),
    ]);

    let report = driver.collect().await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].rss_mb, report.records[1].rss_mb);
    assert_eq!(report.clusters.len(), 3);
    assert!(report.clusters[0].listed);
    assert!(!report.clusters[2].listed);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.fallback_fetches, 4);
    assert_eq!(report.gaps_by_kind.get(&MetricKind::Rss), Some(&4));
}

#[tokio::test]
async fn test_fleet_reports_invalid_endpoint() {
    let config = FleetConfig::new("vm:8428", vec!["http://[::1".to_string()]);
    let driver = FleetDriver::new(&config);

    let report = driver.collect().await;

    assert!(report.records.is_empty());
    assert!(matches!(
        report.errors.as_slice(),
        [CollectionError::InvalidEndpoint { .. }]
    ));
    assert!(!report.clusters[0].listed);
}

#[tokio::test]
async fn test_collect_fleet_requires_clusters() {
    let config = FleetConfig::new("vm:8428", vec![]);
    assert!(collect_fleet(&config).await.is_err());
}
