//! PromQL-compatible metrics backend client

use super::http::JsonEndpoint;
use super::{async_trait, MetricsSource};
use crate::error::{QueryError, QueryResult};
use crate::models::{AllocatedMetric, MetricKind};
use anyhow::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Envelope of `GET /api/v1/query`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Sample>,
}

/// One instant-vector sample: labels plus `[timestamp, "number"]`
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: SeriesLabels,
    pub value: (f64, String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesLabels {
    #[serde(default)]
    pub alloc_id: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
}

impl Sample {
    pub fn parse_value(&self, url: &str) -> QueryResult<f64> {
        self.value.1.parse::<f64>().map_err(|e| QueryError::Decode {
            url: url.to_string(),
            reason: format!("sample value '{}': {}", self.value.1, e),
        })
    }
}

/// Escape a string for use inside a double-quoted PromQL label matcher
fn label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Client for the metrics backend's instant query endpoint
#[derive(Debug, Clone)]
pub struct MetricsClient {
    endpoint: JsonEndpoint,
}

impl MetricsClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(address, timeout)?,
        })
    }

    pub fn address(&self) -> &str {
        self.endpoint.address()
    }

    fn query_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.url(&["api", "v1", "query"]);
        url.query_pairs_mut().append_pair("query", query);
        url
    }

    /// Run an instant query and return its samples
    pub async fn instant_query(&self, query: &str) -> QueryResult<(String, Vec<Sample>)> {
        let url = self.query_url(query);
        let url_str = url.to_string();
        debug!(query = %query, "Querying metrics backend");

        let response: QueryResponse = self
            .endpoint
            .get_json(url)
            .await?
            .ok_or_else(|| QueryError::Status {
                url: url_str.clone(),
                status: 404,
            })?;

        if response.status != "success" {
            return Err(QueryError::Backend {
                url: url_str,
                status: match response.error {
                    Some(reason) => format!("{}: {}", response.status, reason),
                    None => response.status,
                },
            });
        }

        let samples = response.data.map(|d| d.result).unwrap_or_default();
        Ok((url_str, samples))
    }
}

#[async_trait]
impl MetricsSource for MetricsClient {
    async fn query_job_aggregate(&self, kind: MetricKind, job_name: &str) -> QueryResult<f64> {
        let query = format!(
            "sum({}{{job=\"{}\"}}) by (job)",
            kind.metric_name(),
            label_value(job_name)
        );
        let (url, samples) = self.instant_query(&query).await?;

        match samples.first() {
            Some(sample) => sample.parse_value(&url),
            None => Ok(0.0),
        }
    }

    async fn query_allocation_aggregate(
        &self,
        metric: AllocatedMetric,
        job_id: &str,
    ) -> QueryResult<HashMap<String, f64>> {
        let query = format!(
            "sum({}{{job=\"{}\"}}) by (alloc_id)",
            metric.metric_name(),
            label_value(job_id)
        );
        let (url, samples) = self.instant_query(&query).await?;

        let mut values = HashMap::with_capacity(samples.len());
        for sample in &samples {
            if let Some(alloc_id) = &sample.metric.alloc_id {
                values.insert(alloc_id.clone(), sample.parse_value(&url)?);
            }
        }
        Ok(values)
    }

    async fn list_covered_allocations(&self, kind: MetricKind) -> QueryResult<HashSet<String>> {
        let (_, samples) = self.instant_query(kind.metric_name()).await?;

        Ok(samples
            .into_iter()
            .filter_map(|sample| sample.metric.alloc_id)
            .collect())
    }
}
