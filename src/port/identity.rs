//! Stream identity (producer + stream name)

use std::str::FromStr;

use super::error::LocateError;

/// Identifies a stream independently of whether it can currently be resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    /// Producer (task) name, e.g. "odometry"
    pub producer: String,
    /// Stream (port) name, e.g. "pose_samples"
    pub stream: String,
}

impl StreamIdentity {
    /// Create a new stream identity
    pub fn new(producer: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            stream: stream.into(),
        }
    }

    /// Check that both names are usable for resolution
    ///
    /// Names must be non-empty and free of whitespace. The producer name may
    /// not contain `.` since that separates it from the stream in `"P.S"`.
    pub fn validate(&self) -> Result<(), LocateError> {
        fn bad(name: &str) -> bool {
            name.is_empty() || name.chars().any(char::is_whitespace)
        }

        if bad(&self.producer) || bad(&self.stream) || self.producer.contains('.') {
            return Err(LocateError::MalformedIdentity(self.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.producer, self.stream)
    }
}

impl FromStr for StreamIdentity {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (producer, stream) = s
            .split_once('.')
            .ok_or_else(|| LocateError::MalformedIdentity(s.to_string()))?;
        let identity = Self::new(producer, stream);
        identity.validate()?;
        Ok(identity)
    }
}
