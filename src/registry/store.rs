//! Connection registry implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::connection::{Connection, ConnectionError, ConnectionState, Delivery, Policy, Sink};
use crate::error::Result;
use crate::port::{PortHandle, PortLocator, StreamIdentity};
use crate::replay::ReplayLog;
use crate::stats::RegistryStats;

use super::config::{RegistryConfig, MIN_WATCHDOG_INTERVAL};
use super::target::{BulkReport, Target};

/// Holds every connection of the shell
///
/// Connections are kept in insertion order. Duplicate streams are allowed
/// and independent. Bulk operations work on a snapshot and never call into
/// a connection while holding the registry lock.
pub struct ConnectionRegistry {
    /// Resolves live streams
    locator: Arc<dyn PortLocator>,

    /// Registered connections
    connections: RwLock<Vec<Arc<Connection>>>,

    /// Replay logs preferred over live producers for named connects
    replays: RwLock<Vec<Arc<ReplayLog>>>,

    /// Set once the registry is shut down; stops the watchdog
    shut_down: AtomicBool,

    /// Configuration
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Create a new registry with default configuration
    pub fn new(locator: Arc<dyn PortLocator>) -> Self {
        Self::with_config(locator, RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(locator: Arc<dyn PortLocator>, config: RegistryConfig) -> Self {
        Self {
            locator,
            connections: RwLock::new(Vec::new()),
            replays: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Connection>>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Connection>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection
    pub fn add(&self, connection: Arc<Connection>) {
        tracing::debug!(
            stream = %connection.name(),
            id = connection.id(),
            "Connection registered"
        );
        self.write().push(connection);
    }

    /// Close and unregister a connection
    ///
    /// Returns false if it was not registered.
    pub fn remove(&self, connection: &Arc<Connection>) -> bool {
        let removed = {
            let mut connections = self.write();
            let before = connections.len();
            connections.retain(|c| !Arc::ptr_eq(c, connection));
            connections.len() != before
        };

        if removed {
            connection.close();
        }
        removed
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no connection is registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of the registered connections, in insertion order
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.read().clone()
    }

    /// Registered connections subscribed to `identity`
    pub fn find(&self, identity: &StreamIdentity) -> Vec<Arc<Connection>> {
        self.read()
            .iter()
            .filter(|c| c.identity() == identity)
            .cloned()
            .collect()
    }

    /// Prefer `log` over live producers for connects by name
    pub fn use_replay(&self, log: Arc<ReplayLog>) {
        let mut replays = self.replays.write().unwrap_or_else(PoisonError::into_inner);

        if replays.iter().any(|l| Arc::ptr_eq(l, &log)) {
            return;
        }
        tracing::info!(log = %log.name(), streams = log.streams().len(), "Using replay log");
        replays.push(log);
    }

    /// Stop preferring any replay log
    pub fn clear_replays(&self) {
        self.replays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn replay_port(&self, identity: &StreamIdentity) -> Option<Arc<dyn PortHandle>> {
        let replays = self.replays.read().unwrap_or_else(PoisonError::into_inner);

        replays.iter().find_map(|log| {
            log.port(&identity.producer, &identity.stream)
                .map(|port| port as Arc<dyn PortHandle>)
        })
    }

    /// Connect a stream by name
    ///
    /// The producer does not need to be running: if the attach fails the
    /// connection is registered anyway and left to the watchdog. A stream
    /// found in a replay log registered with [`use_replay`](Self::use_replay)
    /// is connected to the log instead.
    ///
    /// Without an explicit policy the connection reconnects automatically
    /// (see [`RegistryConfig::named_auto_reconnect`]).
    pub fn connect_port_to(
        &self,
        producer: &str,
        stream: &str,
        delivery: Delivery,
        policy: Option<Policy>,
    ) -> Result<Arc<Connection>> {
        let identity = StreamIdentity::new(producer, stream);
        identity.validate()?;

        if let Some(port) = self.replay_port(&identity) {
            return Ok(self.connect_replay(port, delivery, policy)?);
        }

        let connection = Connection::builder(identity)
            .policy(policy.unwrap_or_else(|| self.config.named_policy()))
            .delivery(delivery)
            .event_capacity(self.config.event_capacity)
            .live(Arc::clone(&self.locator))?;

        match connection.attach() {
            Ok(()) => {}
            Err(ConnectionError::NoRuntime) => return Err(ConnectionError::NoRuntime.into()),
            Err(error) => {
                tracing::debug!(
                    stream = %connection.name(),
                    error = %error,
                    "Connection deferred until the producer is reachable"
                );
            }
        }

        self.add(Arc::clone(&connection));
        Ok(connection)
    }

    /// Connect an already resolved port
    ///
    /// The attach must succeed; nothing is registered otherwise. Later
    /// attaches re-resolve the stream through the registry's locator.
    pub fn connect_port(
        &self,
        port: Arc<dyn PortHandle>,
        delivery: Delivery,
        policy: Option<Policy>,
    ) -> std::result::Result<Arc<Connection>, ConnectionError> {
        let connection = Connection::builder(port.identity().clone())
            .policy(policy.unwrap_or_else(|| self.config.default_policy.clone()))
            .delivery(delivery)
            .event_capacity(self.config.event_capacity)
            .live(Arc::clone(&self.locator))?;

        connection.attach()?;
        self.add(Arc::clone(&connection));
        Ok(connection)
    }

    /// Connect a replay log port
    ///
    /// The attach must succeed; nothing is registered otherwise.
    pub fn connect_replay(
        &self,
        port: Arc<dyn PortHandle>,
        delivery: Delivery,
        policy: Option<Policy>,
    ) -> std::result::Result<Arc<Connection>, ConnectionError> {
        let connection = Connection::builder(port.identity().clone())
            .policy(policy.unwrap_or_else(|| self.config.default_policy.clone()))
            .delivery(delivery)
            .event_capacity(self.config.event_capacity)
            .replay(port)?;

        connection.attach()?;
        self.add(Arc::clone(&connection));
        Ok(connection)
    }

    /// Attach every connection that is not alive
    pub fn connect_all(&self) -> BulkReport {
        self.attach_each(|_| true, false)
    }

    /// Re-attach every connection, alive or not
    ///
    /// One failing connection does not stop the others.
    pub fn reconnect_all(&self) -> BulkReport {
        self.attach_each(|_| true, true)
    }

    /// Attach the connections of `sink` (and nested sinks) that are not alive
    pub fn connect_to(&self, sink: &Arc<dyn Sink>) -> BulkReport {
        self.attach_each(|c| c.delivery().belongs_to(sink), false)
    }

    /// Re-attach every connection of `sink` (and nested sinks)
    pub fn reconnect_to(&self, sink: &Arc<dyn Sink>) -> BulkReport {
        self.attach_each(|c| c.delivery().belongs_to(sink), true)
    }

    fn attach_each(&self, scope: impl Fn(&Connection) -> bool, force: bool) -> BulkReport {
        let mut report = BulkReport::default();

        for connection in self.connections() {
            if connection.state() == ConnectionState::Closed || !scope(&connection) {
                continue;
            }
            if !force && connection.is_alive() {
                continue;
            }
            report.record(&connection.attach());
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                attached = report.attached,
                failed = report.failed,
                "Bulk attach finished"
            );
        }
        report
    }

    /// Close and unregister every connection matching `target`
    ///
    /// Returns the number of connections removed.
    pub fn disconnect_from(&self, target: &Target) -> usize {
        let removed: Vec<Arc<Connection>> = {
            let mut connections = self.write();
            let (removed, kept): (Vec<_>, Vec<_>) =
                connections.drain(..).partition(|c| target.matches(c));
            *connections = kept;
            removed
        };

        for connection in &removed {
            connection.close();
        }

        tracing::info!(scope = ?target, removed = removed.len(), "Disconnected target");
        removed.len()
    }

    /// Close and unregister every connection
    pub fn disconnect_all(&self) -> usize {
        let removed = std::mem::take(&mut *self.write());

        for connection in &removed {
            connection.close();
        }

        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "Disconnected all connections");
        }
        removed.len()
    }

    /// Close everything and stop the watchdog
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.disconnect_all();
        self.clear_replays();
        tracing::info!("Connection registry shut down");
    }

    /// Check if [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Retry every dead auto-reconnecting connection once
    ///
    /// Skips closed and faulted connections and those whose sink is
    /// inactive.
    pub fn watchdog_tick(&self) -> BulkReport {
        let mut report = BulkReport::default();

        for connection in self.connections() {
            if !connection.auto_reconnect()
                || connection.state() == ConnectionState::Closed
                || connection.fault().is_some()
                || !connection.is_sink_active()
                || connection.is_alive()
            {
                continue;
            }

            tracing::warn!(
                stream = %connection.name(),
                "lost connection to {}, trying to reconnect",
                connection.name()
            );
            report.record(&connection.attach());
        }

        report
    }

    /// Spawn the background watchdog
    ///
    /// Runs [`watchdog_tick`](Self::watchdog_tick) every
    /// `watchdog_interval` until the registry is shut down.
    pub fn spawn_watchdog(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        // Fields set directly skip the builder floor
        let interval = registry.config.watchdog_interval.max(MIN_WATCHDOG_INTERVAL);

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if registry.is_shut_down() {
                    break;
                }

                let report = registry.watchdog_tick();
                if report.attached > 0 {
                    tracing::info!(reattached = report.attached, "Watchdog reconnected streams");
                }
            }
        })
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();

        for connection in self.connections() {
            stats.total += 1;
            match connection.state() {
                ConnectionState::Live => stats.live += 1,
                ConnectionState::Unresolved => stats.unresolved += 1,
                ConnectionState::Closed => stats.closed += 1,
            }
        }

        stats
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
