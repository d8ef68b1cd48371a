//! Port connections
//!
//! A [`Connection`] is one subscription: a stream identity bound to a
//! [`Delivery`] target, polled by its own timer.
//!
//! # State machine
//!
//! ```text
//!               attach() ok
//!   Unresolved ─────────────► Live ──── close() ───► Closed
//!       ▲                       │
//!       └───────────────────────┘
//!   disconnect() / sink hidden / read failure /
//!   transform type mismatch / liveness lost
//! ```
//!
//! The poll timer runs iff the connection is `Live`. Every stop or restart
//! of the timer bumps an epoch counter that the timer task checks before
//! each tick, so a tick may disconnect its own connection and the old timer
//! never fires again. A separate generation counter changes only on
//! teardown; a batch being forwarded stops when it changes, so restarting
//! the timer at a new rate never drops samples.

pub mod builder;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod sink;
pub mod state;

pub use builder::ConnectionBuilder;
pub use config::Policy;
pub use error::ConnectionError;
pub use event::{ConnectionEvent, DetachReason};
pub use handle::Connection;
pub use sink::{Callback, Delivery, Sink, SinkCapabilities, SinkPath, Transform};
pub use state::{ConnectionState, SourceKind};
