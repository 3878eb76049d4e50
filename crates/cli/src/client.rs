//! API client for communicating with a running inventory agent

use anyhow::{Context, Result};
use inventory_lib::{FleetSnapshot, HealthResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

/// API client for the agent's HTTP surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Latest job records collected by the agent
    pub async fn jobs(&self) -> Result<FleetSnapshot> {
        self.get("api/v1/jobs").await
    }

    /// Per-cluster health.
    ///
    /// `/healthz` answers 503 with a full body when no cluster is
    /// operational, so the body is decoded regardless of status.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }
}
