//! Locator, handle and reader traits

use std::sync::Arc;

use crate::sample::Sample;

use super::error::{LocateError, ReadError};
use super::identity::StreamIdentity;

/// How a reader queues samples between two reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderPolicy {
    /// Only the newest sample is kept
    Data,
    /// Every sample is kept and delivered in arrival order
    #[default]
    Buffer,
}

/// Resolves stream identities against the middleware's live registry
pub trait PortLocator: Send + Sync {
    /// Check whether a producer is currently running and reachable
    fn reachable(&self, producer: &str) -> bool;

    /// Resolve a stream to a readable handle
    ///
    /// Returns `Ok(None)` when the producer or stream is not available right
    /// now. Must be cheap to call repeatedly while the producer is absent.
    fn resolve(&self, identity: &StreamIdentity)
        -> Result<Option<Arc<dyn PortHandle>>, LocateError>;
}

/// A resolved reference to a readable stream
pub trait PortHandle: Send + Sync {
    /// Identity of the stream behind this handle
    fn identity(&self) -> &StreamIdentity;

    /// Declared sample type of the stream
    fn type_name(&self) -> &str;

    /// Open a new reader on this stream
    fn reader(&self, policy: ReaderPolicy) -> Result<Box<dyn StreamReader>, ReadError>;

    /// Allocate an empty sample suitable as a read buffer
    fn new_sample(&self) -> Sample {
        Sample::empty(self.type_name())
    }
}

/// Reads samples into a caller-owned buffer
pub trait StreamReader: Send {
    /// Read the next unread sample into `buffer`
    ///
    /// Returns `Ok(true)` if the buffer was filled with a new sample and
    /// `Ok(false)` if nothing new is available. Callers loop until `false` to
    /// drain the backlog; samples come out in arrival order.
    fn read_new(&mut self, buffer: &mut Sample) -> Result<bool, ReadError>;
}
