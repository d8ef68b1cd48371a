//! Error types for portlink

use crate::connection::ConnectionError;
use crate::memory::BusError;
use crate::port::{LocateError, ReadError};
use crate::replay::ReplayError;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for portlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection error
    Connection(ConnectionError),
    /// Stream identity could not be resolved
    Locate(LocateError),
    /// Stream read error
    Read(ReadError),
    /// In-memory middleware error
    Bus(BusError),
    /// Replay log error
    Replay(ReplayError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Locate(e) => write!(f, "Locate error: {}", e),
            Error::Read(e) => write!(f, "Read error: {}", e),
            Error::Bus(e) => write!(f, "Bus error: {}", e),
            Error::Replay(e) => write!(f, "Replay error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => Some(e),
            Error::Locate(e) => Some(e),
            Error::Read(e) => Some(e),
            Error::Bus(e) => Some(e),
            Error::Replay(e) => Some(e),
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<LocateError> for Error {
    fn from(err: LocateError) -> Self {
        Error::Locate(err)
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        Error::Read(err)
    }
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Bus(err)
    }
}

impl From<ReplayError> for Error {
    fn from(err: ReplayError) -> Self {
        Error::Replay(err)
    }
}
