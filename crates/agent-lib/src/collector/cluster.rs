//! Per-cluster collection: one JobRecord per job in the directory

use crate::clients::{MetricsClient, MetricsSource, OrchestratorClient, OrchestratorSource};
use crate::error::{CollectionError, JobIssue};
use crate::models::{Cluster, Job, JobRecord, MetricKind};
use crate::reconciler::UsageReconciler;
use crate::requests::{
    reconcile_allocated_requests, requested_from_spec, RequestReport, RequestSource,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Settings shared by every cluster collector of a fleet
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    /// Timeout enforced on every HTTP call
    pub request_timeout: Duration,
    /// Jobs of one cluster collected concurrently
    pub max_concurrent_jobs: usize,
    pub request_source: RequestSource,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_concurrent_jobs: 8,
            request_source: RequestSource::Spec,
        }
    }
}

/// Everything produced by collecting one cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterReport {
    pub cluster: String,
    pub records: Vec<JobRecord>,
    pub errors: Vec<CollectionError>,
    pub gaps_by_kind: BTreeMap<MetricKind, usize>,
    pub fallback_fetches: usize,
}

impl ClusterReport {
    pub(crate) fn failed(cluster: &str, error: CollectionError) -> Self {
        Self {
            cluster: cluster.to_string(),
            errors: vec![error],
            ..Default::default()
        }
    }

    /// True when the job directory itself could not be read
    pub fn is_failed(&self) -> bool {
        self.errors.iter().any(CollectionError::is_cluster_fatal)
    }
}

struct JobOutcome {
    record: JobRecord,
    issues: Vec<JobIssue>,
    gaps_by_kind: BTreeMap<MetricKind, usize>,
    fallback_fetches: usize,
}

/// Collects job records for one orchestrator / metrics backend pair
pub struct ClusterCollector {
    orchestrator: Arc<dyn OrchestratorSource>,
    metrics: Arc<dyn MetricsSource>,
    settings: CollectorSettings,
}

impl ClusterCollector {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorSource>,
        metrics: Arc<dyn MetricsSource>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            orchestrator,
            metrics,
            settings,
        }
    }

    /// Build HTTP clients for a cluster
    pub fn connect(cluster: &Cluster, settings: CollectorSettings) -> anyhow::Result<Self> {
        let orchestrator =
            OrchestratorClient::new(&cluster.orchestrator, settings.request_timeout)?;
        let metrics = MetricsClient::new(&cluster.metrics, settings.request_timeout)?;
        Ok(Self::new(Arc::new(orchestrator), Arc::new(metrics), settings))
    }

    pub fn address(&self) -> &str {
        self.orchestrator.address()
    }

    /// Collect every job of the cluster.
    ///
    /// Only a failure to list jobs leaves the report without records; any
    /// other failure zeroes the affected field and is kept as a diagnostic.
    pub async fn collect(&self) -> ClusterReport {
        let cluster = self.address().to_string();

        let jobs = match self.orchestrator.list_jobs().await {
            Ok(jobs) => jobs,
            Err(source) => {
                warn!(cluster = %cluster, error = %source, "Failed to list jobs");
                let error = CollectionError::ListJobs {
                    cluster: cluster.clone(),
                    source,
                };
                return ClusterReport::failed(&cluster, error);
            }
        };
        info!(cluster = %cluster, jobs = jobs.len(), "Collecting cluster");

        let permits = Semaphore::new(self.settings.max_concurrent_jobs.max(1));
        let outcomes = join_all(jobs.iter().map(|job| self.collect_job(job, &permits))).await;

        let mut report = ClusterReport {
            cluster: cluster.clone(),
            ..Default::default()
        };
        for outcome in outcomes {
            for (kind, count) in outcome.gaps_by_kind {
                *report.gaps_by_kind.entry(kind).or_insert(0) += count;
            }
            report.fallback_fetches += outcome.fallback_fetches;
            report.errors.extend(
                outcome
                    .issues
                    .into_iter()
                    .map(|issue| issue.into_collection_error(&cluster, &outcome.record.job_id)),
            );
            report.records.push(outcome.record);
        }

        report
    }

    async fn collect_job(&self, job: &Job, permits: &Semaphore) -> JobOutcome {
        let _permit = permits.acquire().await.ok();
        debug!(job_id = %job.id, "Collecting job");
        let reconciler = UsageReconciler::new(self.metrics.as_ref(), self.orchestrator.as_ref());

        let (usage, requests) = tokio::join!(
            reconciler.reconcile(&job.id, &job.name),
            self.requested(&job.id)
        );

        let mut issues = usage.issues;
        issues.extend(requests.issues);

        JobOutcome {
            record: JobRecord::new(job, usage.totals, requests.requested, chrono::Local::now()),
            issues,
            gaps_by_kind: usage.gaps_by_kind,
            fallback_fetches: usage.fallback_fetches,
        }
    }

    async fn requested(&self, job_id: &str) -> RequestReport {
        match self.settings.request_source {
            RequestSource::Spec => requested_from_spec(self.orchestrator.as_ref(), job_id).await,
            RequestSource::Allocations => {
                reconcile_allocated_requests(
                    self.metrics.as_ref(),
                    self.orchestrator.as_ref(),
                    job_id,
                )
                .await
            }
        }
    }
}

/// Collect one cluster given its orchestrator and metrics backend addresses
pub async fn collect_cluster(
    cluster_addr: &str,
    metrics_addr: &str,
    settings: CollectorSettings,
) -> (Vec<JobRecord>, Vec<CollectionError>) {
    let cluster = Cluster::new(cluster_addr, metrics_addr);
    match ClusterCollector::connect(&cluster, settings) {
        Ok(collector) => {
            let report = collector.collect().await;
            (report.records, report.errors)
        }
        Err(e) => (
            Vec::new(),
            vec![CollectionError::InvalidEndpoint {
                cluster: cluster_addr.to_string(),
                reason: format!("{:#}", e),
            }],
        ),
    }
}
