//! Job resource inventory library
//!
//! This crate provides the core functionality for:
//! - Querying the orchestrator and the metrics backend
//! - Reconciling observed usage across both sources
//! - Aggregating requested resources from job specifications
//! - Collecting per-job records across a fleet of clusters
//! - Health checks and observability

pub mod clients;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod reconciler;
pub mod requests;

pub use collector::{
    collect_cluster, collect_fleet, ClusterCollector, CollectorSettings, FleetConfig, FleetDriver,
    FleetReport, FleetSnapshot,
};
pub use error::{CollectionError, QueryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{InventoryMetrics, StructuredLogger};
pub use requests::RequestSource;
