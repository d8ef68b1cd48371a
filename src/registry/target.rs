//! Scopes and results of bulk registry operations

use std::sync::Arc;

use crate::connection::{Connection, ConnectionError, Sink};
use crate::port::StreamIdentity;

/// Selects connections for a scoped registry operation
#[derive(Clone)]
pub enum Target {
    /// Connections delivering to this sink or to a sink nested in it
    Sink(Arc<dyn Sink>),
    /// Connections subscribed to this stream
    Stream(StreamIdentity),
}

impl Target {
    pub(crate) fn matches(&self, connection: &Connection) -> bool {
        match self {
            Target::Sink(sink) => connection.delivery().belongs_to(sink),
            Target::Stream(identity) => connection.identity() == identity,
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Sink(sink) => match sink.path() {
                Some(path) => write!(f, "Target::Sink({})", path),
                None => write!(f, "Target::Sink(<unnamed>)"),
            },
            Target::Stream(identity) => write!(f, "Target::Stream({})", identity),
        }
    }
}

/// Outcome of a bulk attach
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Connections an attach was attempted on
    pub attempted: usize,
    /// Attaches that succeeded
    pub attached: usize,
    /// Attaches that failed
    pub failed: usize,
}

impl BulkReport {
    pub(crate) fn record(&mut self, result: &Result<(), ConnectionError>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.attached += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Check if every attempted attach succeeded
    pub fn all_attached(&self) -> bool {
        self.failed == 0
    }
}
