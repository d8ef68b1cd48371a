//! Sample type moved from producers to sinks
//!
//! Samples are dynamically typed: every stream declares one sample type name
//! (e.g. `/base/samples/RigidBodyState`) and every sample carries the name of
//! the type it holds, so a transform that changes the type can be detected.

use std::sync::Arc;

use bytes::Bytes;

/// A single sample read from a stream
///
/// This is designed to be cheap to clone due to `Bytes` reference counting.
/// Readers overwrite a caller-owned buffer in place; a consumer that needs to
/// keep a sample past the next read clones it, which only bumps a refcount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Name of the sample type
    pub type_name: Arc<str>,
    /// Producer timestamp in microseconds
    pub timestamp: u64,
    /// Encoded payload (zero-copy via reference counting)
    pub data: Bytes,
}

impl Sample {
    /// Create a sample
    pub fn new(type_name: impl Into<Arc<str>>, timestamp: u64, data: impl Into<Bytes>) -> Self {
        Self {
            type_name: type_name.into(),
            timestamp,
            data: data.into(),
        }
    }

    /// Create an empty sample of the given type, used as a reusable read buffer
    pub fn empty(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            timestamp: 0,
            data: Bytes::new(),
        }
    }

    /// Check whether this sample holds the given type
    pub fn is_type(&self, type_name: &str) -> bool {
        &*self.type_name == type_name
    }

    /// Overwrite this buffer with the contents of another sample
    pub fn assign(&mut self, other: &Sample) {
        if !Arc::ptr_eq(&self.type_name, &other.type_name) {
            self.type_name = Arc::clone(&other.type_name);
        }
        self.timestamp = other.timestamp;
        self.data = other.data.clone();
    }
}
