//! # portlink
//!
//! Port-connection manager for a robotics visualization shell.
//!
//! A [`Connection`] binds a named stream exposed by a producer (a running
//! middleware task) to a consumer: a [`Sink`] such as a widget, a plain
//! callback, or both. The connection polls the stream on its own timer,
//! drains every sample that arrived since the last tick, and forwards them in
//! arrival order. When the producer goes away the subscription intent
//! survives: the [`ConnectionRegistry`] watchdog re-attaches auto-reconnecting
//! connections once the producer is reachable again.
//!
//! ```text
//!      ConnectionRegistry (Arc)             PortLocator
//!   ┌────────────────────────────┐      ┌──────────────────┐
//!   │ connections: Vec<Arc<..>>  │      │ MemoryBus /      │
//!   │ watchdog (every 2s) ───────┼──┐   │ ReplayLog / ...  │
//!   └─────────────┬──────────────┘  │   └────────┬─────────┘
//!                 │                 │ attach()   │ resolve("P.S")
//!                 ▼                 ▼            ▼
//!           [Connection] ── poll timer ──► StreamReader::read_new()
//!                 │
//!                 └──► transform ──► Sink::update(sample, "P.S") / callback
//! ```
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use portlink::memory::MemoryBus;
//! use portlink::{ConnectionRegistry, Delivery, RegistryConfig};
//!
//! # async fn example() -> portlink::error::Result<()> {
//! let bus = Arc::new(MemoryBus::new());
//! let registry = Arc::new(ConnectionRegistry::with_config(
//!     bus.clone(),
//!     RegistryConfig::default(),
//! ));
//! let _watchdog = registry.spawn_watchdog();
//!
//! // The producer does not need to be running yet
//! let delivery = Delivery::callback(|sample, stream| {
//!     println!("{stream}: {} bytes", sample.data.len());
//! });
//! registry.connect_port_to("odometry", "pose", delivery, None)?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod memory;
pub mod port;
pub mod registry;
pub mod replay;
pub mod sample;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{
    Connection, ConnectionBuilder, ConnectionError, ConnectionEvent, ConnectionState, Delivery,
    Policy, Sink, SinkCapabilities, SinkPath, SourceKind,
};
pub use port::{PortHandle, PortLocator, ReaderPolicy, StreamIdentity, StreamReader};
pub use registry::{BulkReport, ConnectionRegistry, RegistryConfig, Target};
pub use sample::Sample;
