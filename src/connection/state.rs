//! Connection state types

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle, poll timer stopped
    Unresolved,
    /// Handle present, poll timer running
    Live,
    /// Closed by its owner (terminal)
    Closed,
}

/// Kind of source behind a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A running producer, re-resolved through a locator
    Live,
    /// A replay log port, always reachable
    Replay,
}
