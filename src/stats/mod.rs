//! Statistics for connections and the registry

pub mod metrics;

pub use metrics::{ConnectionCounters, ConnectionStats, RegistryStats};
