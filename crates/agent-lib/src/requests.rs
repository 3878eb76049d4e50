//! Requested resource totals for a job
//!
//! The primary path derives requests from the job specification alone.
//! The allocation-based path mirrors the usage reconciler: per-allocation
//! "allocated" series from the metrics backend, with the allocation's own
//! resource block as fallback. It is off unless configured.

use crate::clients::{MetricsSource, OrchestratorSource};
use crate::error::JobIssue;
use crate::models::{AllocatedMetric, JobSpec, RequestedResources};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Where requested CPU and memory come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    /// Task group counts times task resources from the job specification
    #[default]
    Spec,
    /// Per-allocation allocated series with allocation spec fallback
    Allocations,
}

/// Sum requested resources over a job specification.
///
/// CPU, memory and IOPS are per task, disk is per task group. Every value
/// is scaled by the group's replica count. A missing spec yields zeros.
pub fn aggregate_requests(spec: Option<&JobSpec>) -> RequestedResources {
    let mut requested = RequestedResources::default();

    let groups = match spec.and_then(|s| s.task_groups.as_ref()) {
        Some(groups) => groups,
        None => return requested,
    };

    for group in groups {
        for task in group.tasks.iter().flatten() {
            requested.cpu += group.count * task.resources.cpu;
            requested.memory_mb += group.count * task.resources.memory_mb;
            requested.iops += group.count * task.resources.iops;
        }
        if let Some(disk) = &group.ephemeral_disk {
            requested.disk_mb += group.count * disk.size_mb;
        }
    }

    requested
}

/// Outcome of computing one job's requested resources
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestReport {
    pub requested: RequestedResources,
    pub issues: Vec<JobIssue>,
}

/// Fetch the job specification and aggregate it
pub async fn requested_from_spec(
    orchestrator: &dyn OrchestratorSource,
    job_id: &str,
) -> RequestReport {
    match orchestrator.job_specification(job_id).await {
        Ok(spec) => {
            if spec.is_none() {
                debug!(job_id = %job_id, "Job has no specification, requests are zero");
            }
            RequestReport {
                requested: aggregate_requests(spec.as_ref()),
                issues: Vec::new(),
            }
        }
        Err(e) => RequestReport {
            requested: RequestedResources::default(),
            issues: vec![JobIssue::new("job specification", e)],
        },
    }
}

/// Requested resources with CPU and memory taken from per-allocation series.
///
/// Allocations the backend does not report fall back to the resource block
/// recorded on the allocation. Disk and IOPS have no allocated series and
/// always come from the specification.
pub async fn reconcile_allocated_requests(
    metrics: &dyn MetricsSource,
    orchestrator: &dyn OrchestratorSource,
    job_id: &str,
) -> RequestReport {
    let mut report = requested_from_spec(orchestrator, job_id).await;
    report.requested.cpu = 0.0;
    report.requested.memory_mb = 0.0;

    let allocations = match orchestrator.list_allocations(job_id).await {
        Ok(allocations) => allocations,
        Err(e) => {
            report.issues.push(JobIssue::new("allocation listing", e));
            BTreeSet::new()
        }
    };

    let mut reported: HashMap<AllocatedMetric, HashMap<String, f64>> = HashMap::new();
    for metric in [AllocatedMetric::Cpu, AllocatedMetric::Memory] {
        let values = match metrics.query_allocation_aggregate(metric, job_id).await {
            Ok(values) => values,
            Err(e) => {
                report
                    .issues
                    .push(JobIssue::new(format!("{} by allocation", metric.as_str()), e));
                HashMap::new()
            }
        };
        let total: f64 = values.values().map(|raw| metric.scale(*raw)).sum();
        add_allocated(&mut report.requested, metric, total);
        reported.insert(metric, values);
    }

    for alloc_id in &allocations {
        let missing: Vec<AllocatedMetric> = [AllocatedMetric::Cpu, AllocatedMetric::Memory]
            .into_iter()
            .filter(|metric| {
                reported
                    .get(metric)
                    .map(|values| !values.contains_key(alloc_id))
                    .unwrap_or(true)
            })
            .collect();
        if missing.is_empty() {
            continue;
        }

        match orchestrator.allocation_spec(alloc_id).await {
            Ok(Some(spec)) => {
                for metric in missing {
                    let value = match metric {
                        AllocatedMetric::Cpu => spec.resources.cpu,
                        AllocatedMetric::Memory => spec.resources.memory_mb,
                    };
                    add_allocated(&mut report.requested, metric, value);
                }
            }
            Ok(None) => {}
            Err(e) => report
                .issues
                .push(JobIssue::new(format!("allocation spec {}", alloc_id), e)),
        }
    }

    report
}

fn add_allocated(requested: &mut RequestedResources, metric: AllocatedMetric, value: f64) {
    match metric {
        AllocatedMetric::Cpu => requested.cpu += value,
        AllocatedMetric::Memory => requested.memory_mb += value,
    }
}
