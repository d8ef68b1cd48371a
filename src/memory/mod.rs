//! In-process middleware bus
//!
//! A [`MemoryBus`] is a [`PortLocator`](crate::port::PortLocator) backed by
//! producers living in the same process. It is the reference implementation
//! of the locator/reader contracts and drives the tests and demos.
//!
//! # Architecture
//!
//! ```text
//!                 MemoryBus
//!     ┌──────────────────────────────┐
//!     │ producers: HashMap<Name,     │
//!     │   Producer {                 │
//!     │     ports: HashMap<Name,     │
//!     │       Arc<MemoryPort> {      │
//!     │         tx: broadcast::Tx    │
//!     │       }>                     │
//!     │   }>                         │
//!     └──────────────┬───────────────┘
//!                    │
//!      ┌─────────────┼─────────────┐
//!      ▼             ▼             ▼
//!  [write()]   [MemoryReader]  [MemoryReader]
//!              try_recv()      try_recv()
//! ```
//!
//! Stopping a producer closes its ports, so every reader observes
//! [`ReadError::Disconnected`](crate::port::ReadError::Disconnected) once it
//! has drained the samples queued before the stop.

pub mod bus;
pub mod config;
pub mod error;
pub mod port;

pub use bus::MemoryBus;
pub use config::BusConfig;
pub use error::BusError;
pub use port::{MemoryPort, MemoryReader};
