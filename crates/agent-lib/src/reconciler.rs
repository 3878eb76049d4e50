//! Usage reconciliation between the metrics backend and the orchestrator
//!
//! The metrics backend lags behind the orchestrator: freshly scheduled or
//! just-stopped allocations may not have been scraped yet. For every usage
//! kind the job-level aggregate is taken from the backend, and every
//! allocation the orchestrator knows about but the backend does not report
//! is recorded as a coverage gap. Gaps are then filled from the node agents'
//! live stats in a single pass, fetching each allocation at most once.

use crate::clients::{MetricsSource, OrchestratorSource};
use crate::error::JobIssue;
use crate::models::{MetricKind, UsageTotals};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::Semaphore;
use tracing::debug;

/// Live-stats requests in flight at once for a single job
pub const DEFAULT_FALLBACK_CONCURRENCY: usize = 8;

/// Allocations known to the orchestrator but missing from the metrics
/// backend, with the kinds each one is missing.
///
/// Owned by a single job's reconciliation and dropped after the fallback pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CoverageGaps {
    gaps: BTreeMap<String, Vec<MetricKind>>,
}

impl CoverageGaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, alloc_id: &str, kind: MetricKind) {
        let kinds = self.gaps.entry(alloc_id.to_string()).or_default();
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    /// Record a gap for every allocation of the job absent from `covered`
    pub fn detect(
        &mut self,
        kind: MetricKind,
        allocations: &BTreeSet<String>,
        covered: &HashSet<String>,
    ) {
        for alloc_id in allocations {
            if !covered.contains(alloc_id) {
                self.record(alloc_id, kind);
            }
        }
    }

    /// Kinds missing for one allocation
    pub fn kinds_for(&self, alloc_id: &str) -> &[MetricKind] {
        self.gaps.get(alloc_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allocations(&self) -> impl Iterator<Item = &str> {
        self.gaps.keys().map(String::as_str)
    }

    /// Number of allocations with at least one gap
    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Number of (allocation, kind) gap entries per kind
    pub fn count_by_kind(&self) -> BTreeMap<MetricKind, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.gaps.values().flatten() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Outcome of reconciling one job's usage
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UsageReport {
    pub totals: UsageTotals,
    pub issues: Vec<JobIssue>,
    pub gaps_by_kind: BTreeMap<MetricKind, usize>,
    /// Live-stats calls issued during the fallback pass
    pub fallback_fetches: usize,
}

/// Reconciles observed usage for the jobs of one cluster
pub struct UsageReconciler<'a> {
    metrics: &'a dyn MetricsSource,
    orchestrator: &'a dyn OrchestratorSource,
    fallback_concurrency: usize,
}

impl<'a> UsageReconciler<'a> {
    pub fn new(metrics: &'a dyn MetricsSource, orchestrator: &'a dyn OrchestratorSource) -> Self {
        Self {
            metrics,
            orchestrator,
            fallback_concurrency: DEFAULT_FALLBACK_CONCURRENCY,
        }
    }

    /// Cap the live-stats requests issued concurrently by the fallback pass
    pub fn with_fallback_concurrency(mut self, limit: usize) -> Self {
        self.fallback_concurrency = limit.max(1);
        self
    }

    /// Compute rss (MB), cache (MB) and CPU ticks for one job.
    ///
    /// Query failures degrade the affected contribution to zero and are
    /// returned in `UsageReport::issues`.
    pub async fn reconcile(&self, job_id: &str, name: &str) -> UsageReport {
        let mut report = UsageReport::default();

        let allocations = match self.orchestrator.list_allocations(job_id).await {
            Ok(allocations) => allocations,
            Err(e) => {
                report.issues.push(JobIssue::new("allocation listing", e));
                BTreeSet::new()
            }
        };

        let mut gaps = CoverageGaps::new();
        for kind in MetricKind::ALL {
            match self.metrics.query_job_aggregate(kind, name).await {
                Ok(raw) => report.totals.add(kind, kind.scale(raw)),
                Err(e) => report
                    .issues
                    .push(JobIssue::new(format!("{} aggregate", kind), e)),
            }

            if allocations.is_empty() {
                continue;
            }

            // Without the covered set we cannot tell which allocations the
            // aggregate already includes, so no gaps are recorded for this kind.
            match self.metrics.list_covered_allocations(kind).await {
                Ok(covered) => gaps.detect(kind, &allocations, &covered),
                Err(e) => report
                    .issues
                    .push(JobIssue::new(format!("{} coverage", kind), e)),
            }
        }

        report.gaps_by_kind = gaps.count_by_kind();
        if !gaps.is_empty() {
            debug!(
                job_id = %job_id,
                allocations = gaps.len(),
                "Filling coverage gaps from live allocation stats"
            );
            self.fill_gaps(&gaps, &mut report).await;
        }

        report
    }

    /// Add live-stats values for every gap entry, one fetch per allocation
    async fn fill_gaps(&self, gaps: &CoverageGaps, report: &mut UsageReport) {
        let alloc_ids: Vec<&str> = gaps.allocations().collect();
        let permits = Semaphore::new(self.fallback_concurrency);
        let fetches = alloc_ids.iter().map(|alloc_id| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok();
                self.orchestrator.allocation_stats(alloc_id).await
            }
        });
        let results = join_all(fetches).await;
        report.fallback_fetches += alloc_ids.len();

        for (alloc_id, result) in alloc_ids.into_iter().zip(results) {
            match result {
                Ok(Some(stats)) => {
                    for kind in gaps.kinds_for(alloc_id) {
                        report.totals.add(*kind, kind.live_value(&stats));
                    }
                }
                Ok(None) => {
                    debug!(alloc_id = %alloc_id, "Allocation already collected, counting zero");
                }
                Err(e) => report
                    .issues
                    .push(JobIssue::new(format!("allocation stats {}", alloc_id), e)),
            }
        }
    }
}
