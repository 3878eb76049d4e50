//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use inventory_lib::JobRecord;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row for the job records table
#[derive(Tabled)]
pub struct JobRow {
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "DCs")]
    datacenters: String,
    #[tabled(rename = "Ticks")]
    ticks: String,
    #[tabled(rename = "CPU Req")]
    cpu_requested: String,
    #[tabled(rename = "RSS")]
    rss: String,
    #[tabled(rename = "Cache")]
    cache: String,
    #[tabled(rename = "Mem Req")]
    memory_requested: String,
    #[tabled(rename = "Disk Req")]
    disk_requested: String,
    #[tabled(rename = "IOPS")]
    iops: String,
}

impl From<&JobRecord> for JobRow {
    fn from(record: &JobRecord) -> Self {
        Self {
            job: record.job_id.clone(),
            namespace: record.namespace.clone(),
            datacenters: record.datacenters.clone(),
            ticks: format!("{:.0}", record.ticks_used),
            cpu_requested: format!("{:.0}", record.cpu_requested),
            rss: format_mb(record.rss_mb),
            cache: format_mb(record.cache_mb),
            memory_requested: format_mb(record.memory_mb_requested),
            disk_requested: format_mb(record.disk_mb_requested),
            iops: format!("{:.0}", record.iops_requested),
        }
    }
}

/// Print job records as a table or JSON
pub fn print_records(records: &[JobRecord], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if records.is_empty() {
                println!("{}", "No jobs found".yellow());
                return Ok(());
            }
            let rows: Vec<JobRow> = records.iter().map(JobRow::from).collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
            println!("\nTotal: {} jobs", records.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format megabytes as human-readable string
pub fn format_mb(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.2}G", mb / 1024.0)
    } else {
        format!("{:.1}M", mb)
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}
