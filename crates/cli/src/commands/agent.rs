//! Commands that query a running inventory agent

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, print_error, print_records, print_success, print_warning, OutputFormat,
};

/// Row for the cluster health table
#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Jobs")]
    jobs: usize,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the latest records, optionally filtered
pub async fn show_jobs(
    client: &ApiClient,
    namespace: Option<String>,
    job: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = client.jobs().await?;

    let records: Vec<_> = snapshot
        .records
        .into_iter()
        .filter(|r| namespace.as_deref().map_or(true, |ns| r.namespace == ns))
        .filter(|r| {
            job.as_deref()
                .map_or(true, |j| r.job_id.contains(j) || r.name.contains(j))
        })
        .collect();

    if let OutputFormat::Table = format {
        if let Some(collected_at) = snapshot.collected_at {
            println!(
                "Collected at {} in {} ms",
                collected_at.to_rfc3339().cyan(),
                snapshot.elapsed_ms
            );
        }
    }

    print_records(&records, format)?;

    for error in &snapshot.errors {
        print_warning(error);
    }

    Ok(())
}

/// Show per-cluster health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Table => {
            println!("{}", "Inventory Agent Status".bold());
            println!("{}", "=".repeat(40));
            println!("Overall: {}", color_status(health.status.as_str()));
            println!();

            if health.clusters.is_empty() {
                print_warning("No collection cycle completed yet");
                return Ok(());
            }

            let mut clusters: Vec<_> = health.clusters.into_iter().collect();
            clusters.sort_by(|a, b| a.0.cmp(&b.0));

            let rows: Vec<ClusterRow> = clusters
                .into_iter()
                .map(|(cluster, c)| ClusterRow {
                    cluster,
                    status: color_status(c.status.as_str()),
                    jobs: c.jobs,
                    message: c.message.unwrap_or_default(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if health.status.is_operational() {
                print_success("Agent is collecting");
            } else {
                print_error("No cluster could be collected");
            }
        }
    }

    Ok(())
}
