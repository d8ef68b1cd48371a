//! Connection error types

/// Error type for connection operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Producer or stream is not reachable right now (recoverable)
    ResolutionFailure {
        /// Stream name ("P.S")
        stream: String,
        /// Why resolution failed
        reason: String,
    },
    /// Transform returned a sample of the wrong type (fatal, never retried)
    TransformTypeMismatch {
        /// Stream name ("P.S")
        stream: String,
        /// Declared sample type of the stream
        expected: String,
        /// Type returned by the transform
        actual: String,
    },
    /// Reading from the stream failed mid-tick
    ReadFailure {
        /// Stream name ("P.S")
        stream: String,
        /// Why the read failed
        reason: String,
    },
    /// User code (sink, callback or transform) panicked
    CallbackPanicked {
        /// Stream name ("P.S")
        stream: String,
    },
    /// Unsupported sink or target passed to a connect request
    InvalidHandleType(String),
    /// Policy cannot drive a poll timer
    InvalidPolicy(String),
    /// Connection was closed by its owner
    Closed {
        /// Stream name ("P.S")
        stream: String,
    },
    /// Poll timer requested outside of a tokio runtime
    NoRuntime,
}

impl ConnectionError {
    /// Check whether the watchdog may retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConnectionError::ResolutionFailure { .. }
                | ConnectionError::ReadFailure { .. }
                | ConnectionError::CallbackPanicked { .. }
        )
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::ResolutionFailure { stream, reason } => {
                write!(f, "Cannot resolve {}: {}", stream, reason)
            }
            ConnectionError::TransformTypeMismatch {
                stream,
                expected,
                actual,
            } => write!(
                f,
                "{}: transform returned {} but {} was expected",
                stream, actual, expected
            ),
            ConnectionError::ReadFailure { stream, reason } => {
                write!(f, "Could not read on {}: {}", stream, reason)
            }
            ConnectionError::CallbackPanicked { stream } => {
                write!(f, "Sample handler panicked on {}", stream)
            }
            ConnectionError::InvalidHandleType(what) => write!(f, "Cannot handle {}", what),
            ConnectionError::InvalidPolicy(reason) => write!(f, "Invalid policy: {}", reason),
            ConnectionError::Closed { stream } => write!(f, "Connection closed: {}", stream),
            ConnectionError::NoRuntime => write!(f, "No tokio runtime to drive the poll timer"),
        }
    }
}

impl std::error::Error for ConnectionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable() {
        let resolution = ConnectionError::ResolutionFailure {
            stream: "odometry.pose".into(),
            reason: "producer not reachable".into(),
        };
        let mismatch = ConnectionError::TransformTypeMismatch {
            stream: "odometry.pose".into(),
            expected: "/Pose".into(),
            actual: "/Other".into(),
        };

        assert!(resolution.is_recoverable());
        assert!(!mismatch.is_recoverable());
        assert!(!ConnectionError::InvalidHandleType("sink".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = ConnectionError::TransformTypeMismatch {
            stream: "odometry.pose".into(),
            expected: "/Pose".into(),
            actual: "/Other".into(),
        };

        assert_eq!(
            err.to_string(),
            "odometry.pose: transform returned /Other but /Pose was expected"
        );
    }
}
