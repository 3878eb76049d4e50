//! Error types for inventory collection
//!
//! A failed query never aborts a collection cycle on its own. Callers
//! substitute a zero contribution and keep the error as a diagnostic.

use thiserror::Error;

/// Result type alias for single backend queries
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Failure of a single HTTP query against the orchestrator or metrics backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("metrics backend reported status '{status}' for {url}")]
    Backend { url: String, status: String },
}

impl QueryError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Transport { .. } => "transport",
            QueryError::Timeout { .. } => "timeout",
            QueryError::Status { .. } => "status",
            QueryError::Decode { .. } => "decode",
            QueryError::Backend { .. } => "backend",
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QueryError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            QueryError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            QueryError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// A diagnostic produced while collecting one cluster
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectionError {
    /// A query scoped to one job (or one of its allocations) failed
    #[error("cluster {cluster}, job {job_id}: {scope}: {source}")]
    Job {
        cluster: String,
        job_id: String,
        scope: String,
        #[source]
        source: QueryError,
    },

    /// The job directory could not be listed, nothing was collected
    #[error("cluster {cluster}: listing jobs failed: {source}")]
    ListJobs {
        cluster: String,
        #[source]
        source: QueryError,
    },

    /// The task collecting a cluster did not finish
    #[error("cluster {cluster}: collection task failed: {reason}")]
    TaskFailed { cluster: String, reason: String },

    /// Clients for the cluster could not be built from its address
    #[error("cluster {cluster}: invalid endpoint: {reason}")]
    InvalidEndpoint { cluster: String, reason: String },
}

impl CollectionError {
    pub fn cluster(&self) -> &str {
        match self {
            CollectionError::Job { cluster, .. }
            | CollectionError::ListJobs { cluster, .. }
            | CollectionError::TaskFailed { cluster, .. }
            | CollectionError::InvalidEndpoint { cluster, .. } => cluster,
        }
    }

    /// True when the whole cluster produced no records
    pub fn is_cluster_fatal(&self) -> bool {
        !matches!(self, CollectionError::Job { .. })
    }

    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            CollectionError::Job { source, .. } | CollectionError::ListJobs { source, .. } => {
                Some(source)
            }
            CollectionError::TaskFailed { .. } | CollectionError::InvalidEndpoint { .. } => None,
        }
    }
}

/// Query failures scoped to one job, before the cluster address is attached
#[derive(Debug, Clone, PartialEq)]
pub struct JobIssue {
    pub scope: String,
    pub error: QueryError,
}

impl JobIssue {
    pub fn new(scope: impl Into<String>, error: QueryError) -> Self {
        Self {
            scope: scope.into(),
            error,
        }
    }

    pub fn into_collection_error(self, cluster: &str, job_id: &str) -> CollectionError {
        CollectionError::Job {
            cluster: cluster.to_string(),
            job_id: job_id.to_string(),
            scope: self.scope,
            source: self.error,
        }
    }
}
