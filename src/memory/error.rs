//! Bus error types

/// Error type for bus operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Producer is not running
    ProducerNotRunning(String),
    /// Producer was started twice
    ProducerAlreadyRunning(String),
    /// Producer has no port with that name
    PortNotFound(String),
    /// Sample type does not match the port's declared type
    TypeMismatch {
        /// Declared type of the port
        expected: String,
        /// Type of the rejected sample
        actual: String,
    },
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::ProducerNotRunning(name) => write!(f, "Producer not running: {}", name),
            BusError::ProducerAlreadyRunning(name) => {
                write!(f, "Producer already running: {}", name)
            }
            BusError::PortNotFound(name) => write!(f, "Port not found: {}", name),
            BusError::TypeMismatch { expected, actual } => {
                write!(f, "Sample type mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for BusError {}
