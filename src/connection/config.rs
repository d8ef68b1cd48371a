//! Per-connection policy

use std::time::Duration;

use crate::port::ReaderPolicy;

use super::error::ConnectionError;

/// Default poll rate in Hz
pub const DEFAULT_UPDATE_FREQUENCY: f64 = 8.0;

/// Polling and recovery policy of a connection
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Poll rate in Hz (must be positive)
    pub update_frequency: f64,

    /// Let the registry watchdog re-attach the connection when it dies
    pub auto_reconnect: bool,

    /// Queueing policy of the stream reader
    pub reader: ReaderPolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            update_frequency: DEFAULT_UPDATE_FREQUENCY,
            auto_reconnect: false,
            reader: ReaderPolicy::Buffer,
        }
    }
}

impl Policy {
    /// Set the poll rate in Hz
    pub fn update_frequency(mut self, hz: f64) -> Self {
        self.update_frequency = hz;
        self
    }

    /// Enable or disable watchdog reconnects
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reader queueing policy
    pub fn reader(mut self, reader: ReaderPolicy) -> Self {
        self.reader = reader;
        self
    }

    /// Poll timer period (`1 / update_frequency`)
    ///
    /// Falls back to the default rate if the frequency is invalid.
    pub fn period(&self) -> Duration {
        period_of(self.update_frequency)
            .unwrap_or_else(|| Duration::from_secs_f64(1.0 / DEFAULT_UPDATE_FREQUENCY))
    }

    /// Check that the policy can drive a timer
    pub fn validate(&self) -> Result<(), ConnectionError> {
        validate_frequency(self.update_frequency)
    }
}

fn period_of(hz: f64) -> Option<Duration> {
    if !hz.is_finite() || hz <= 0.0 {
        return None;
    }
    // Rates so high the period rounds to zero are rejected too
    Duration::try_from_secs_f64(1.0 / hz)
        .ok()
        .filter(|period| !period.is_zero())
}

pub(super) fn validate_frequency(hz: f64) -> Result<(), ConnectionError> {
    if period_of(hz).is_none() {
        return Err(ConnectionError::InvalidPolicy(format!(
            "update frequency must be a positive number of Hz, got {}",
            hz
        )));
    }
    Ok(())
}
