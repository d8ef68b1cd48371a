//! Port boundary error types

/// Error type for port resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    /// Identity cannot name any stream (empty or invalid names)
    MalformedIdentity(String),
}

impl std::fmt::Display for LocateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocateError::MalformedIdentity(name) => write!(f, "Malformed stream identity: {}", name),
        }
    }
}

impl std::error::Error for LocateError {}

/// Error type for reading from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The producer side of the stream went away
    Disconnected,
    /// A sample could not be decoded
    Corrupt(String),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Disconnected => write!(f, "Stream disconnected"),
            ReadError::Corrupt(reason) => write!(f, "Corrupt sample: {}", reason),
        }
    }
}

impl std::error::Error for ReadError {}
