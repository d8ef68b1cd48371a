//! Registry configuration

use std::time::Duration;

use crate::connection::builder::DEFAULT_EVENT_CAPACITY;
use crate::connection::Policy;

/// Default interval between watchdog scans
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(2000);

/// Shortest accepted interval between watchdog scans
pub const MIN_WATCHDOG_INTERVAL: Duration = Duration::from_millis(10);

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How often the watchdog looks for dead connections
    pub watchdog_interval: Duration,

    /// Policy for connections created without one
    pub default_policy: Policy,

    /// Whether connections made by name reconnect automatically
    pub named_auto_reconnect: bool,

    /// Event channel capacity of connections created by the registry
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            default_policy: Policy::default(),
            named_auto_reconnect: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Set the watchdog interval
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval.max(MIN_WATCHDOG_INTERVAL);
        self
    }

    /// Set the default connection policy
    pub fn default_policy(mut self, policy: Policy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Set whether connections made by name reconnect automatically
    pub fn named_auto_reconnect(mut self, enabled: bool) -> Self {
        self.named_auto_reconnect = enabled;
        self
    }

    /// Set the per-connection event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Policy for a connection made by name without an explicit policy
    pub(crate) fn named_policy(&self) -> Policy {
        self.default_policy
            .clone()
            .auto_reconnect(self.named_auto_reconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.watchdog_interval, Duration::from_secs(2));
        assert!(config.named_auto_reconnect);
        assert!(!config.default_policy.auto_reconnect);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_named_policy() {
        let config = RegistryConfig::default()
            .default_policy(Policy::default().update_frequency(20.0));

        let policy = config.named_policy();
        assert!(policy.auto_reconnect);
        assert_eq!(policy.update_frequency, 20.0);

        let policy = config.named_auto_reconnect(false).named_policy();
        assert!(!policy.auto_reconnect);
    }

    #[test]
    fn test_builder_watchdog_interval_floor() {
        let config = RegistryConfig::default().watchdog_interval(Duration::ZERO);
        assert_eq!(config.watchdog_interval, MIN_WATCHDOG_INTERVAL);

        let config = RegistryConfig::default().watchdog_interval(Duration::from_secs(5));
        assert_eq!(config.watchdog_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_event_capacity_floor() {
        let config = RegistryConfig::default().event_capacity(0);

        assert_eq!(config.event_capacity, 1);
    }
}
