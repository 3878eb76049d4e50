pub mod agent;
pub mod collect;
