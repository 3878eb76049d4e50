//! Shared JSON-over-HTTP plumbing with an enforced per-request timeout

use crate::error::{QueryError, QueryResult};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Prefix bare `host:port` addresses with `http://`
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// A base URL plus an HTTP client configured with a request timeout
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: Client,
    base_url: Url,
    address: String,
}

impl JsonEndpoint {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&normalize_address(address))
            .with_context(|| format!("Invalid endpoint address '{}'", address))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Endpoint address '{}' cannot carry a path", address);
        }

        Ok(Self {
            client,
            base_url,
            address: address.to_string(),
        })
    }

    /// Address as configured, without normalization
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Build a URL under the base, percent-encoding each path segment
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a JSON document. A 404 maps to `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> QueryResult<Option<T>> {
        let url_str = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| QueryError::from_reqwest(&url_str, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(QueryError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| QueryError::from_reqwest(&url_str, e))?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| QueryError::Decode {
                url: url_str,
                reason: e.to_string(),
            })
    }
}
