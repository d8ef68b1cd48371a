//! In-process producer registry
//!
//! Keeps track of running producers and their ports, and answers the
//! locator queries of the connection core.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::port::{LocateError, PortHandle, PortLocator, StreamIdentity};
use crate::sample::Sample;

use super::config::BusConfig;
use super::error::BusError;
use super::port::MemoryPort;

/// A running producer and its ports
struct Producer {
    ports: HashMap<String, Arc<MemoryPort>>,
    started_at: Instant,
}

/// Registry of in-process producers
///
/// Thread-safe via `RwLock`. Locator queries only take the read lock.
pub struct MemoryBus {
    /// Map of producer name to producer
    producers: RwLock<HashMap<String, Producer>>,

    /// Configuration
    config: BusConfig,
}

impl MemoryBus {
    /// Create a new bus with default configuration
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a new bus with custom configuration
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            producers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the bus configuration
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Producer>> {
        self.producers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<String, Producer>> {
        self.producers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a producer with no ports
    pub fn start_producer(&self, name: &str) -> Result<(), BusError> {
        let mut producers = self.write_lock();

        if producers.contains_key(name) {
            return Err(BusError::ProducerAlreadyRunning(name.to_string()));
        }

        producers.insert(
            name.to_string(),
            Producer {
                ports: HashMap::new(),
                started_at: Instant::now(),
            },
        );

        tracing::info!(producer = name, "Producer started");
        Ok(())
    }

    /// Add an output port to a running producer
    ///
    /// Adding a port that already exists with the same type returns the
    /// existing port.
    pub fn add_port(
        &self,
        producer: &str,
        stream: &str,
        type_name: &str,
    ) -> Result<Arc<MemoryPort>, BusError> {
        let mut producers = self.write_lock();

        let entry = producers
            .get_mut(producer)
            .ok_or_else(|| BusError::ProducerNotRunning(producer.to_string()))?;

        if let Some(existing) = entry.ports.get(stream) {
            if existing.type_name() != type_name {
                return Err(BusError::TypeMismatch {
                    expected: existing.type_name().to_string(),
                    actual: type_name.to_string(),
                });
            }
            return Ok(Arc::clone(existing));
        }

        let identity = StreamIdentity::new(producer, stream);
        let port = Arc::new(MemoryPort::new(
            identity,
            type_name,
            self.config.port_capacity,
        ));
        entry.ports.insert(stream.to_string(), Arc::clone(&port));

        tracing::debug!(
            producer = producer,
            stream = stream,
            type_name = type_name,
            "Port added"
        );

        Ok(port)
    }

    /// Stop a producer, closing all of its ports
    ///
    /// Returns false if the producer was not running.
    pub fn stop_producer(&self, name: &str) -> bool {
        let removed = self.write_lock().remove(name);

        match removed {
            Some(producer) => {
                for port in producer.ports.values() {
                    port.close();
                }
                tracing::info!(
                    producer = name,
                    ports = producer.ports.len(),
                    uptime_ms = producer.started_at.elapsed().as_millis() as u64,
                    "Producer stopped"
                );
                true
            }
            None => false,
        }
    }

    /// Look up a port of a running producer
    pub fn port(&self, identity: &StreamIdentity) -> Option<Arc<MemoryPort>> {
        self.read()
            .get(&identity.producer)
            .and_then(|p| p.ports.get(&identity.stream))
            .cloned()
    }

    /// Publish a sample on a port
    ///
    /// Returns the number of readers that received it.
    pub fn write(&self, identity: &StreamIdentity, sample: Sample) -> Result<usize, BusError> {
        let port = {
            let producers = self.read();
            let producer = producers
                .get(&identity.producer)
                .ok_or_else(|| BusError::ProducerNotRunning(identity.producer.clone()))?;
            producer
                .ports
                .get(&identity.stream)
                .cloned()
                .ok_or_else(|| BusError::PortNotFound(identity.to_string()))?
        };

        port.write(sample)
    }

    /// Names of all running producers
    pub fn producers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PortLocator for MemoryBus {
    fn reachable(&self, producer: &str) -> bool {
        self.read().contains_key(producer)
    }

    fn resolve(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<Arc<dyn PortHandle>>, LocateError> {
        identity.validate()?;

        Ok(self
            .port(identity)
            .map(|port| port as Arc<dyn PortHandle>))
    }
}
