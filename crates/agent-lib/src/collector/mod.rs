//! Collection of job records across clusters
//!
//! This module drives the reconciler and request aggregator for every job
//! of a cluster, fans that out over every configured cluster, and runs the
//! whole fleet periodically.

mod cluster;
mod fleet;
mod r#loop;

#[cfg(test)]
mod tests;

pub use cluster::{collect_cluster, ClusterCollector, ClusterReport, CollectorSettings};
pub use fleet::{
    collect_fleet, ClusterSummary, FleetConfig, FleetDriver, FleetReport, FleetSnapshot,
};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder};
