//! Bus configuration

/// Configuration for a [`MemoryBus`](super::MemoryBus)
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Samples queued per port before slow readers start lagging
    pub port_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { port_capacity: 256 }
    }
}

impl BusConfig {
    /// Set the per-port queue capacity (at least 1)
    pub fn port_capacity(mut self, capacity: usize) -> Self {
        self.port_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(BusConfig::default().port_capacity, 256);
    }

    #[test]
    fn test_port_capacity_floor() {
        assert_eq!(BusConfig::default().port_capacity(0).port_capacity, 1);
        assert_eq!(BusConfig::default().port_capacity(16).port_capacity, 16);
    }
}
