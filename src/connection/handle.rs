//! Connection handle and poll loop

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::port::{PortHandle, PortLocator, ReaderPolicy, StreamIdentity, StreamReader};
use crate::sample::Sample;
use crate::stats::{ConnectionCounters, ConnectionStats};

use super::config::{validate_frequency, Policy};
use super::error::ConnectionError;
use super::event::{ConnectionEvent, DetachReason};
use super::sink::{Delivery, Sink, Transform};
use super::state::{ConnectionState, SourceKind};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where a connection gets its port from
pub(super) enum Source {
    /// Re-resolved through the locator on every attach
    Live(Arc<dyn PortLocator>),
    /// Fixed replay log port
    Replay(Arc<dyn PortHandle>),
}

/// Mutable state, guarded by the connection lock
struct Inner {
    state: ConnectionState,
    policy: Policy,
    port: Option<Arc<dyn PortHandle>>,
    reader: Option<Box<dyn StreamReader>>,
    /// Reusable read buffer
    buffer: Option<Sample>,
    /// Reusable per-tick batch
    batch: Vec<Sample>,
    timer: Option<JoinHandle<()>>,
    /// Runtime the timer was last spawned on
    runtime: Option<Handle>,
    /// Fatal error; the watchdog leaves faulted connections alone
    fault: Option<ConnectionError>,
}

/// Result of the locked part of a tick
enum Drained {
    /// Nothing to do (not live or no reader)
    Idle,
    /// Sink went inactive; the connection was torn down
    SinkInactive { was_running: bool },
    /// Raw samples ready to transform and forward
    Batch {
        samples: Vec<Sample>,
        /// Declared type of the port the samples came from
        expected: Arc<str>,
        generation: u64,
    },
    /// Draining failed in the given teardown generation
    Failed(ConnectionError, u64),
}

/// One subscription from a stream to a delivery target
///
/// Created through [`Connection::builder`]. Connections are shared as
/// `Arc<Connection>`; the poll timer only holds a weak reference, so
/// dropping the last `Arc` stops polling.
pub struct Connection {
    id: u64,
    identity: StreamIdentity,
    /// Textual identity ("P.S") handed to sinks
    name: String,
    source: Source,
    delivery: Delivery,
    transform: Option<Transform>,
    inner: Mutex<Inner>,
    /// Bumped on every timer stop/start
    epoch: AtomicU64,
    /// Bumped on every teardown; a timer restart leaves it alone
    generation: AtomicU64,
    counters: ConnectionCounters,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Connection {
    pub(super) fn new(
        identity: StreamIdentity,
        source: Source,
        delivery: Delivery,
        transform: Option<Transform>,
        policy: Policy,
        event_capacity: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let initial_port = match &source {
            Source::Replay(port) => Some(Arc::clone(port)),
            Source::Live(_) => None,
        };

        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            name: identity.to_string(),
            identity,
            source,
            delivery,
            transform,
            inner: Mutex::new(Inner {
                state: ConnectionState::Unresolved,
                policy,
                port: initial_port,
                reader: None,
                buffer: None,
                batch: Vec::new(),
                timer: None,
                runtime: None,
                fault: None,
            }),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            counters: ConnectionCounters::new(),
            events,
        })
    }

    /// Process-unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stream this connection subscribes to
    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Stream name as handed to sinks ("P.S")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live producer or replay log
    pub fn kind(&self) -> SourceKind {
        match self.source {
            Source::Live(_) => SourceKind::Live,
            Source::Replay(_) => SourceKind::Replay,
        }
    }

    /// Delivery target
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Sink, if the delivery has one
    pub fn sink(&self) -> Option<&Arc<dyn Sink>> {
        self.delivery.sink_ref()
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Current policy
    pub fn policy(&self) -> Policy {
        self.lock().policy.clone()
    }

    /// Whether the watchdog may re-attach this connection
    pub fn auto_reconnect(&self) -> bool {
        self.lock().policy.auto_reconnect
    }

    /// Enable or disable watchdog reconnects
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.lock().policy.auto_reconnect = enabled;
    }

    /// Whether the poll timer is running
    pub fn is_timer_running(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Fatal error that stopped this connection, if any
    pub fn fault(&self) -> Option<ConnectionError> {
        self.lock().fault.clone()
    }

    /// Snapshot of the connection counters
    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Resolve the stream and start polling
    ///
    /// A failure is a normal outcome while the producer is absent: the
    /// connection stays `Unresolved` and any partial resources are released.
    /// Attaching a live connection re-resolves it and swaps the reader
    /// without restarting the timer. A successful attach clears a previous
    /// fault.
    pub fn attach(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let mut inner = self.lock();

        if inner.state == ConnectionState::Closed {
            return Err(ConnectionError::Closed {
                stream: self.name.clone(),
            });
        }
        let was_live = inner.state == ConnectionState::Live;

        let result = match self.open(inner.policy.reader) {
            Ok((port, reader)) => {
                let reuse = inner
                    .buffer
                    .as_ref()
                    .is_some_and(|buffer| buffer.is_type(port.type_name()));
                if !reuse {
                    inner.buffer = Some(port.new_sample());
                }
                inner.port = Some(port);
                inner.reader = Some(reader);

                if inner.timer.is_none() {
                    self.start_timer(&mut inner)
                } else {
                    Ok(())
                }
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                inner.state = ConnectionState::Live;
                inner.fault = None;
                let period = inner.policy.period();
                drop(inner);

                self.counters.on_attach(true);
                tracing::info!(
                    stream = %self.name,
                    kind = ?self.kind(),
                    period_ms = period.as_millis() as u64,
                    reattached = was_live,
                    "Connection attached"
                );
                let _ = self.events.send(ConnectionEvent::Attached {
                    stream: self.name.clone(),
                });
                Ok(())
            }
            Err(error) => {
                let was_running = self.teardown(&mut inner, ConnectionState::Unresolved);
                drop(inner);

                self.counters.on_attach(false);
                tracing::warn!(stream = %self.name, error = %error, "Failed to attach");
                if was_running {
                    self.detached(DetachReason::Failed);
                }
                Err(error)
            }
        }
    }

    /// Check if the sink still wants samples
    ///
    /// Always true without a sink; a panicking sink counts as inactive.
    pub fn is_sink_active(&self) -> bool {
        self.guarded(|| self.delivery.is_active()).unwrap_or(false)
    }

    /// Attach only if the connection is not alive
    ///
    /// Returns whether an attach was performed.
    pub fn ensure_attached(self: &Arc<Self>) -> Result<bool, ConnectionError> {
        if self.is_alive() {
            return Ok(false);
        }
        self.attach().map(|()| true)
    }

    /// Run one poll cycle
    ///
    /// Checks the sink, drains every available sample, applies the
    /// transform and forwards the batch in arrival order. Returns the number
    /// of samples forwarded. Failures tear the connection down and are
    /// returned, logged and published as [`ConnectionEvent::Failed`]; they
    /// never escape the poll timer.
    pub fn tick(&self) -> Result<usize, ConnectionError> {
        self.run_tick(None)
    }

    /// Stop polling; the connection stays eligible for reconnects
    ///
    /// Idempotent. The sink hears `disconnected` only if polling was running.
    pub fn disconnect(&self) {
        self.shutdown(ConnectionState::Unresolved, DetachReason::Requested);
    }

    /// Stop polling for good
    pub fn close(&self) {
        self.shutdown(ConnectionState::Closed, DetachReason::Closed);
    }

    /// Check if the connection is polling a reachable source
    ///
    /// For live sources the producer must still be reachable; if it is not,
    /// the connection drops to `Unresolved` so it never keeps polling a stale
    /// handle. Replay sources are alive as long as their timer runs.
    pub fn is_alive(&self) -> bool {
        let mut inner = self.lock();

        if inner.timer.is_none() {
            return false;
        }

        let reachable = match &self.source {
            Source::Live(locator) => locator.reachable(&self.identity.producer),
            Source::Replay(_) => true,
        };
        if reachable {
            return true;
        }

        let was_running = self.teardown(&mut inner, ConnectionState::Unresolved);
        drop(inner);

        tracing::warn!(stream = %self.name, "Producer no longer reachable");
        if was_running {
            self.detached(DetachReason::LivenessLost);
        }
        false
    }

    /// Change the poll rate
    ///
    /// A live connection restarts its timer at the new period. Queued
    /// samples stay in the reader, so none are skipped or read twice.
    pub fn set_update_frequency(self: &Arc<Self>, hz: f64) -> Result<(), ConnectionError> {
        validate_frequency(hz)?;

        let mut inner = self.lock();
        inner.policy.update_frequency = hz;

        if inner.timer.is_none() {
            return Ok(());
        }

        self.stop_timer(&mut inner);
        if let Err(error) = self.start_timer(&mut inner) {
            self.teardown(&mut inner, ConnectionState::Unresolved);
            drop(inner);
            self.detached(DetachReason::Failed);
            return Err(error);
        }

        tracing::debug!(stream = %self.name, hz = hz, "Update frequency changed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolution_failure(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::ResolutionFailure {
            stream: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Resolve the port and open a reader on it
    fn open(
        &self,
        policy: ReaderPolicy,
    ) -> Result<(Arc<dyn PortHandle>, Box<dyn StreamReader>), ConnectionError> {
        let port = match &self.source {
            Source::Live(locator) => {
                if !locator.reachable(&self.identity.producer) {
                    return Err(self.resolution_failure("producer not reachable"));
                }
                match locator.resolve(&self.identity) {
                    Ok(Some(port)) => port,
                    Ok(None) => return Err(self.resolution_failure("stream not found")),
                    Err(e) => return Err(self.resolution_failure(e.to_string())),
                }
            }
            Source::Replay(port) => Arc::clone(port),
        };

        let reader = port
            .reader(policy)
            .map_err(|e| self.resolution_failure(e.to_string()))?;

        Ok((port, reader))
    }

    /// Spawn the poll timer
    fn start_timer(self: &Arc<Self>, inner: &mut Inner) -> Result<(), ConnectionError> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => inner.runtime.clone().ok_or(ConnectionError::NoRuntime)?,
        };

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let period = inner.policy.period();
        let weak = Arc::downgrade(self);

        let timer = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(connection) = weak.upgrade() else {
                    break;
                };
                if connection.epoch.load(Ordering::SeqCst) != epoch {
                    break;
                }
                // Failures are logged and contained by the tick itself
                let _ = connection.run_tick(Some(epoch));
            }
        });

        inner.runtime = Some(runtime);
        inner.timer = Some(timer);
        Ok(())
    }

    /// Stop the poll timer; returns whether it was running
    ///
    /// Safe to call from inside the timer's own tick: the epoch bump makes
    /// the timer loop exit before its next tick.
    fn stop_timer(&self, inner: &mut Inner) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        match inner.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Stop polling and release the reader; returns whether polling was running
    fn teardown(&self, inner: &mut Inner, next: ConnectionState) -> bool {
        let was_running = self.stop_timer(inner);
        self.generation.fetch_add(1, Ordering::SeqCst);

        inner.reader = None;
        if let Source::Live(_) = self.source {
            inner.port = None;
        }
        if inner.state != ConnectionState::Closed {
            inner.state = next;
        }

        was_running
    }

    fn shutdown(&self, next: ConnectionState, reason: DetachReason) {
        let mut inner = self.lock();

        if inner.state == ConnectionState::Closed {
            return;
        }

        let was_running = self.teardown(&mut inner, next);
        if next == ConnectionState::Closed {
            inner.buffer = None;
            inner.batch = Vec::new();
        }
        drop(inner);

        if was_running {
            tracing::info!(stream = %self.name, reason = ?reason, "Connection detached");
            self.detached(reason);
        }
    }

    /// Notify the sink and event subscribers that polling stopped
    fn detached(&self, reason: DetachReason) {
        if let Err(error) = self.guarded(|| self.delivery.notify_disconnected(&self.name)) {
            tracing::warn!(stream = %self.name, error = %error, "Sink failed on disconnect");
        }

        let _ = self.events.send(ConnectionEvent::Detached {
            stream: self.name.clone(),
            reason,
        });
    }

    /// Run user or middleware code, turning a panic into an error
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> Result<T, ConnectionError> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|_| ConnectionError::CallbackPanicked {
            stream: self.name.clone(),
        })
    }

    /// Check if a tick scheduled under `timer_epoch` may run
    fn is_current(&self, inner: &Inner, timer_epoch: Option<u64>) -> bool {
        inner.state == ConnectionState::Live
            && timer_epoch.map_or(true, |epoch| self.epoch.load(Ordering::SeqCst) == epoch)
    }

    fn run_tick(&self, timer_epoch: Option<u64>) -> Result<usize, ConnectionError> {
        if !self.is_current(&self.lock(), timer_epoch) {
            return Ok(0);
        }

        // The sink is consulted before anything is read, and outside the
        // lock so it may call back into this connection
        let active = match self.guarded(|| self.delivery.is_active()) {
            Ok(active) => active,
            Err(error) => {
                let generation = self.generation.load(Ordering::SeqCst);
                return Err(self.fail(error, generation));
            }
        };

        let drained = {
            let mut inner = self.lock();

            if !self.is_current(&inner, timer_epoch) {
                Drained::Idle
            } else {
                self.counters.on_tick();
                if active {
                    self.drain(&mut inner)
                } else {
                    let was_running = self.teardown(&mut inner, ConnectionState::Unresolved);
                    Drained::SinkInactive { was_running }
                }
            }
        };

        match drained {
            Drained::Idle => Ok(0),
            Drained::SinkInactive { was_running } => {
                tracing::debug!(stream = %self.name, "Sink inactive, disconnecting");
                if was_running {
                    self.detached(DetachReason::SinkInactive);
                }
                Ok(0)
            }
            Drained::Failed(error, generation) => Err(self.fail(error, generation)),
            Drained::Batch {
                samples,
                expected,
                generation,
            } => self.forward(samples, &expected, generation),
        }
    }

    /// Read every available sample into a batch
    fn drain(&self, inner: &mut Inner) -> Drained {
        let generation = self.generation.load(Ordering::SeqCst);

        let Inner {
            port,
            reader,
            buffer,
            batch,
            ..
        } = inner;
        let (Some(port), Some(reader), Some(buffer)) =
            (port.as_ref(), reader.as_mut(), buffer.as_mut())
        else {
            return Drained::Idle;
        };

        let mut samples = std::mem::take(batch);
        loop {
            match self.guarded(|| reader.read_new(buffer)) {
                Ok(Ok(true)) => samples.push(buffer.clone()),
                Ok(Ok(false)) => break,
                Ok(Err(e)) => {
                    let error = ConnectionError::ReadFailure {
                        stream: self.name.clone(),
                        reason: e.to_string(),
                    };
                    return Drained::Failed(error, generation);
                }
                Err(error) => return Drained::Failed(error, generation),
            }
        }

        Drained::Batch {
            samples,
            expected: Arc::from(port.type_name()),
            generation,
        }
    }

    /// Apply the transform to a whole batch, checking the result types
    fn transform_batch(
        &self,
        samples: &mut [Sample],
        expected: &str,
    ) -> Result<(), ConnectionError> {
        let Some(transform) = &self.transform else {
            return Ok(());
        };

        for sample in samples.iter_mut() {
            let transformed = self.guarded(|| transform(&*sample, &self.name))?;
            if !transformed.is_type(expected) {
                return Err(ConnectionError::TransformTypeMismatch {
                    stream: self.name.clone(),
                    expected: expected.to_string(),
                    actual: transformed.type_name.to_string(),
                });
            }
            *sample = transformed;
        }
        Ok(())
    }

    /// Transform a drained batch and hand it to the delivery target
    ///
    /// Runs without the connection lock. A failing transform forwards
    /// nothing; a teardown from inside a handler stops the rest of the batch.
    fn forward(
        &self,
        mut batch: Vec<Sample>,
        expected: &str,
        generation: u64,
    ) -> Result<usize, ConnectionError> {
        if let Err(error) = self.transform_batch(&mut batch, expected) {
            return Err(self.fail(error, generation));
        }

        let mut forwarded = 0;
        for sample in &batch {
            if self.generation.load(Ordering::SeqCst) != generation {
                break;
            }
            if let Err(error) = self.guarded(|| self.delivery.deliver(sample, &self.name)) {
                self.counters.on_forwarded(forwarded);
                return Err(self.fail(error, generation));
            }
            forwarded += 1;
        }
        self.counters.on_forwarded(forwarded);

        if forwarded > 0 {
            tracing::trace!(stream = %self.name, samples = forwarded, "Samples forwarded");
        }

        batch.clear();
        let mut inner = self.lock();
        if inner.batch.capacity() < batch.capacity() {
            inner.batch = batch;
        }

        Ok(forwarded)
    }

    /// Tear down after a tick failure
    ///
    /// Only acts if no teardown happened since `generation`, so a stale
    /// failure cannot kill a connection that was re-attached meanwhile.
    fn fail(&self, error: ConnectionError, generation: u64) -> ConnectionError {
        let mut inner = self.lock();

        let current = self.generation.load(Ordering::SeqCst) == generation;
        let was_running = if current && inner.state == ConnectionState::Live {
            self.teardown(&mut inner, ConnectionState::Unresolved)
        } else {
            false
        };
        if matches!(error, ConnectionError::TransformTypeMismatch { .. }) {
            inner.fault = Some(error.clone());
        }
        drop(inner);

        self.counters.on_tick_failure();
        if error.is_recoverable() {
            tracing::warn!(stream = %self.name, error = %error, "Connection failed, disconnecting");
        } else {
            tracing::error!(stream = %self.name, error = %error, "Connection failed, disconnecting");
        }

        let _ = self.events.send(ConnectionEvent::Failed(error.clone()));
        if was_running {
            self.detached(DetachReason::Failed);
        }
        error
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("stream", &self.name)
            .field("kind", &self.kind())
            .field("delivery", &self.delivery)
            .field("state", &self.state())
            .finish()
    }
}
