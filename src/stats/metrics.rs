//! Statistics and metrics for port connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters updated by a connection
#[derive(Debug)]
pub struct ConnectionCounters {
    created_at: Instant,
    ticks: AtomicU64,
    samples_forwarded: AtomicU64,
    attach_attempts: AtomicU64,
    attach_failures: AtomicU64,
    tick_failures: AtomicU64,
}

impl ConnectionCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            ticks: AtomicU64::new(0),
            samples_forwarded: AtomicU64::new(0),
            attach_attempts: AtomicU64::new(0),
            attach_failures: AtomicU64::new(0),
            tick_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_forwarded(&self, count: usize) {
        self.samples_forwarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn on_attach(&self, ok: bool) {
        self.attach_attempts.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.attach_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn on_tick_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters
    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            age: self.created_at.elapsed(),
            ticks: self.ticks.load(Ordering::Relaxed),
            samples_forwarded: self.samples_forwarded.load(Ordering::Relaxed),
            attach_attempts: self.attach_attempts.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            tick_failures: self.tick_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Time since the connection was created
    pub age: Duration,
    /// Poll ticks that found the connection live
    pub ticks: u64,
    /// Samples handed to the sink or callback
    pub samples_forwarded: u64,
    /// Calls to attach (explicit or watchdog)
    pub attach_attempts: u64,
    /// Attach calls that failed
    pub attach_failures: u64,
    /// Ticks that ended in a read, transform or handler failure
    pub tick_failures: u64,
}

impl ConnectionStats {
    /// Average samples per tick
    pub fn samples_per_tick(&self) -> f64 {
        if self.ticks > 0 {
            self.samples_forwarded as f64 / self.ticks as f64
        } else {
            0.0
        }
    }
}

/// Registry-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered connections
    pub total: usize,
    /// Connections currently polling
    pub live: usize,
    /// Connections waiting for their producer
    pub unresolved: usize,
    /// Closed connections still registered
    pub closed: usize,
}
