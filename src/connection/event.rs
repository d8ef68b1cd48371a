//! Connection lifecycle events

use super::error::ConnectionError;

/// Why a connection left the `Live` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// `disconnect()` was called
    Requested,
    /// The owner closed the connection
    Closed,
    /// The sink reported itself inactive during a tick
    SinkInactive,
    /// The producer stopped being reachable
    LivenessLost,
    /// A tick or re-attach failed
    Failed,
}

/// Events published on a connection's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connection became live
    Attached {
        /// Stream name ("P.S")
        stream: String,
    },
    /// Connection stopped polling
    Detached {
        /// Stream name ("P.S")
        stream: String,
        /// Why it stopped
        reason: DetachReason,
    },
    /// A background failure occurred
    Failed(ConnectionError),
}
