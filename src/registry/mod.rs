//! Connection registry and watchdog
//!
//! The registry is the shell's explicit list of connections. Widgets and
//! tools connect streams through it, bulk operations (re)attach or close
//! whole groups, and the watchdog brings dead auto-reconnecting connections
//! back once their producer is reachable again.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ConnectionRegistry>
//!                 ┌──────────────────────────────┐
//!                 │ locator: Arc<dyn PortLocator>│
//!                 │ connections: Vec<Arc<..>>    │
//!                 │ replays: Vec<Arc<ReplayLog>> │
//!                 └──────┬────────────────┬──────┘
//!                        │                │ every 2s
//!   connect_port_to() ───┤                ▼
//!   connect_all()        │        watchdog_tick()
//!   reconnect_to(sink)   │          auto_reconnect && !fault
//!   disconnect_from(..)  │          && sink active && !is_alive()
//!                        ▼                │
//!                  [Connection] ◄── attach()
//! ```
//!
//! Every bulk operation takes a snapshot of the list first, so connections
//! and user code are never called with the registry lock held.

pub mod config;
pub mod store;
pub mod target;

pub use config::RegistryConfig;
pub use store::ConnectionRegistry;
pub use target::{BulkReport, Target};
