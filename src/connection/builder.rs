//! Connection builder

use std::sync::Arc;

use crate::port::{PortHandle, PortLocator, StreamIdentity};
use crate::sample::Sample;

use super::config::Policy;
use super::error::ConnectionError;
use super::handle::{Connection, Source};
use super::sink::{Delivery, Transform};

/// Default capacity of a connection's event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Builder for a [`Connection`]
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
///
/// use portlink::memory::MemoryBus;
/// use portlink::{Connection, Delivery, Policy, StreamIdentity};
///
/// # async fn example() -> Result<(), portlink::ConnectionError> {
/// let bus = Arc::new(MemoryBus::new());
/// let connection = Connection::builder(StreamIdentity::new("odometry", "pose"))
///     .policy(Policy::default().update_frequency(20.0).auto_reconnect(true))
///     .delivery(Delivery::callback(|sample, stream| {
///         println!("{stream} @ {}", sample.timestamp);
///     }))
///     .live(bus)?;
///
/// // Fails quietly while the producer is not running
/// let _ = connection.attach();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionBuilder {
    identity: StreamIdentity,
    policy: Policy,
    delivery: Delivery,
    transform: Option<Transform>,
    event_capacity: usize,
}

impl Connection {
    /// Start building a connection to `identity`
    pub fn builder(identity: StreamIdentity) -> ConnectionBuilder {
        ConnectionBuilder {
            identity,
            policy: Policy::default(),
            delivery: Delivery::Headless,
            transform: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ConnectionBuilder {
    /// Set the polling and recovery policy
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the delivery target
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Apply a transform to every sample before delivery
    ///
    /// The transform must return a sample of the stream's declared type. It
    /// runs without the connection lock held.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Sample, &str) -> Sample + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Set the capacity of the event channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), ConnectionError> {
        self.policy.validate()?;
        self.delivery.validate()
    }

    /// Build a connection to a running (or future) producer
    ///
    /// The connection starts `Unresolved`; call
    /// [`attach`](Connection::attach) to start polling.
    pub fn live(self, locator: Arc<dyn PortLocator>) -> Result<Arc<Connection>, ConnectionError> {
        self.validate()?;

        Ok(Connection::new(
            self.identity,
            Source::Live(locator),
            self.delivery,
            self.transform,
            self.policy,
            self.event_capacity,
        ))
    }

    /// Build a connection to a replay log port
    ///
    /// The stream identity is taken from the port.
    pub fn replay(self, port: Arc<dyn PortHandle>) -> Result<Arc<Connection>, ConnectionError> {
        self.validate()?;

        Ok(Connection::new(
            port.identity().clone(),
            Source::Replay(port),
            self.delivery,
            self.transform,
            self.policy,
            self.event_capacity,
        ))
    }
}
