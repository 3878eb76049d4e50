//! Job Inventory CLI
//!
//! A command-line tool for running one-shot collections against a fleet and
//! for querying a running inventory agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{agent, collect};
use inventory_lib::RequestSource;
use std::path::PathBuf;

/// Job Inventory CLI
#[derive(Parser)]
#[command(name = "jobinv")]
#[command(author, version, about = "CLI for the Job Resource Inventory", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via JOBINV_API_URL env var)
    #[arg(long, env = "JOBINV_API_URL")]
    pub api_url: Option<String>,

    /// Path to the CLI config file (defaults to ~/.config/jobinv/config.json)
    #[arg(long, env = "JOBINV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect every job of the given clusters once and print the records
    Collect {
        /// Metrics backend address (host:port or URL)
        #[arg(long, short)]
        metrics: Option<String>,

        /// Orchestrator address; repeat for several clusters
        #[arg(long = "cluster", short)]
        clusters: Vec<String>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Jobs collected concurrently within one cluster
        #[arg(long, default_value_t = 8)]
        max_concurrent_jobs: usize,

        /// Where requested CPU and memory come from
        #[arg(long, default_value = "spec")]
        request_source: RequestSourceArg,
    },

    /// Show the latest job records held by a running agent
    Jobs {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by job ID or name substring
        #[arg(long, short)]
        job: Option<String>,
    },

    /// Show per-cluster health of a running agent
    Status,
}

/// Command-line spelling of the request source
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RequestSourceArg {
    /// Job specification only
    Spec,
    /// Per-allocation allocated series, spec fallback
    Allocations,
}

impl From<RequestSourceArg> for RequestSource {
    fn from(arg: RequestSourceArg) -> Self {
        match arg {
            RequestSourceArg::Spec => RequestSource::Spec,
            RequestSourceArg::Allocations => RequestSource::Allocations,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Collect {
            metrics,
            clusters,
            timeout_secs,
            max_concurrent_jobs,
            request_source,
        } => {
            let options = collect::CollectOptions {
                metrics: metrics.or(settings.metrics),
                clusters: if clusters.is_empty() {
                    settings.clusters
                } else {
                    clusters
                },
                timeout_secs,
                max_concurrent_jobs,
                request_source: request_source.into(),
            };
            collect::run_collect(options, cli.format, cli.verbose).await?;
        }
        Commands::Jobs { namespace, job } => {
            let client = client::ApiClient::new(&resolve_api_url(cli.api_url, settings.api_url))?;
            agent::show_jobs(&client, namespace, job, cli.format).await?;
        }
        Commands::Status => {
            let client = client::ApiClient::new(&resolve_api_url(cli.api_url, settings.api_url))?;
            agent::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}

fn resolve_api_url(flag: Option<String>, configured: Option<String>) -> String {
    flag.or(configured)
        .unwrap_or_else(|| config::DEFAULT_API_URL.to_string())
}
