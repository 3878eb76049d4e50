//! One-shot fleet collection

use anyhow::{Context, Result};
use colored::Colorize;
use inventory_lib::{collect_fleet, CollectorSettings, FleetConfig, RequestSource};
use std::time::Duration;

use crate::output::{print_info, print_records, print_warning, OutputFormat};

/// Resolved arguments of `jobinv collect`
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub metrics: Option<String>,
    pub clusters: Vec<String>,
    pub timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub request_source: RequestSource,
}

impl CollectOptions {
    pub fn to_fleet_config(&self) -> Result<FleetConfig> {
        let metrics = self
            .metrics
            .clone()
            .context("No metrics backend given; pass --metrics or set it in the config file")?;
        if self.clusters.is_empty() {
            anyhow::bail!("No cluster given; pass --cluster or set clusters in the config file");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("--timeout-secs must be non-zero");
        }

        Ok(FleetConfig {
            metrics_address: metrics,
            clusters: self.clusters.clone(),
            settings: CollectorSettings {
                request_timeout: Duration::from_secs(self.timeout_secs),
                max_concurrent_jobs: self.max_concurrent_jobs.max(1),
                request_source: self.request_source,
            },
        })
    }
}

/// Collect every configured cluster once and print the records
pub async fn run_collect(
    options: CollectOptions,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = options.to_fleet_config()?;
    if verbose {
        print_info(&format!(
            "Collecting {} cluster(s) against {}",
            config.clusters.len(),
            config.metrics_address
        ));
    }

    let report = collect_fleet(&config).await?;

    print_records(&report.records, format)?;

    for error in &report.errors {
        print_warning(&error.to_string());
    }

    if verbose {
        let gaps: usize = report.gaps_by_kind.values().sum();
        print_info(&format!(
            "{} coverage gap(s), {} live stats fetch(es), {} ms",
            gaps,
            report.fallback_fetches,
            report.elapsed.as_millis()
        ));
        for cluster in &report.clusters {
            let state = if cluster.listed {
                "listed".green()
            } else {
                "failed".red()
            };
            println!(
                "  {} {} jobs={} errors={}",
                cluster.cluster.cyan(),
                state,
                cluster.jobs,
                cluster.errors
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CollectOptions {
        CollectOptions {
            metrics: Some("vm:8428".into()),
            clusters: vec!["nomad:4646".into()],
            timeout_secs: 5,
            max_concurrent_jobs: 0,
            request_source: RequestSource::Allocations,
        }
    }

    #[test]
    fn test_to_fleet_config() {
        let config = options().to_fleet_config().unwrap();
        assert_eq!(config.metrics_address, "vm:8428");
        assert_eq!(config.settings.request_timeout, Duration::from_secs(5));
        assert_eq!(config.settings.max_concurrent_jobs, 1);
        assert_eq!(config.settings.request_source, RequestSource::Allocations);
    }

    #[test]
    fn test_requires_metrics_and_clusters() {
        let mut missing_metrics = options();
        missing_metrics.metrics = None;
        assert!(missing_metrics.to_fleet_config().is_err());

        let mut missing_clusters = options();
        missing_clusters.clusters.clear();
        assert!(missing_clusters.to_fleet_config().is_err());
    }
}
