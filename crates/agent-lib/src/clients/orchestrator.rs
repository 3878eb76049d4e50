//! Orchestrator HTTP API client

use super::http::JsonEndpoint;
use super::{async_trait, OrchestratorSource};
use crate::error::QueryResult;
use crate::models::{AllocationSpec, AllocationStats, AllocationStub, Job, JobSpec};
use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

/// Read-only client for one orchestrator cluster
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    endpoint: JsonEndpoint,
}

impl OrchestratorClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(address, timeout)?,
        })
    }
}

#[async_trait]
impl OrchestratorSource for OrchestratorClient {
    fn address(&self) -> &str {
        self.endpoint.address()
    }

    async fn list_jobs(&self) -> QueryResult<Vec<Job>> {
        let url = self.endpoint.url(&["v1", "jobs"]);
        Ok(self.endpoint.get_json(url).await?.unwrap_or_default())
    }

    async fn job_specification(&self, job_id: &str) -> QueryResult<Option<JobSpec>> {
        let url = self.endpoint.url(&["v1", "job", job_id]);
        self.endpoint.get_json(url).await
    }

    async fn list_allocations(&self, job_id: &str) -> QueryResult<BTreeSet<String>> {
        let url = self.endpoint.url(&["v1", "job", job_id, "allocations"]);
        let allocs: Option<Vec<AllocationStub>> = self.endpoint.get_json(url).await?;

        Ok(allocs
            .unwrap_or_default()
            .into_iter()
            .map(|alloc| alloc.id)
            .collect())
    }

    async fn allocation_stats(&self, alloc_id: &str) -> QueryResult<Option<AllocationStats>> {
        let url = self
            .endpoint
            .url(&["v1", "client", "allocation", alloc_id, "stats"]);
        self.endpoint.get_json(url).await
    }

    async fn allocation_spec(&self, alloc_id: &str) -> QueryResult<Option<AllocationSpec>> {
        let url = self.endpoint.url(&["v1", "allocation", alloc_id]);
        self.endpoint.get_json(url).await
    }
}
