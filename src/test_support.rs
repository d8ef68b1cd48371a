//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::{Sink, SinkCapabilities, SinkPath};
use crate::memory::{MemoryBus, MemoryPort};
use crate::port::StreamIdentity;
use crate::sample::Sample;

pub(crate) const POSE: &str = "/base/samples/RigidBodyState";

pub(crate) fn pose(timestamp: u64) -> Sample {
    Sample::new(POSE, timestamp, timestamp.to_le_bytes().to_vec())
}

pub(crate) fn pose_id() -> StreamIdentity {
    StreamIdentity::new("odometry", "pose")
}

/// Bus with `odometry.pose` running
pub(crate) fn bus_with_pose() -> (Arc<MemoryBus>, Arc<MemoryPort>) {
    let bus = Arc::new(MemoryBus::new());
    let port = start_pose(&bus);
    (bus, port)
}

/// (Re)start the `odometry` producer with its `pose` port
pub(crate) fn start_pose(bus: &MemoryBus) -> Arc<MemoryPort> {
    bus.start_producer("odometry").unwrap();
    bus.add_port("odometry", "pose", POSE).unwrap()
}

/// Widget-like sink recording everything it receives
pub(crate) struct RecordingSink {
    path: Option<SinkPath>,
    shown: AtomicBool,
    received: Mutex<Vec<(u64, String)>>,
    disconnects: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub(crate) fn at(path: &str) -> Arc<Self> {
        Self::build(Some(SinkPath::new(path)))
    }

    fn build(path: Option<SinkPath>) -> Arc<Self> {
        Arc::new(Self {
            path,
            shown: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn hide(&self) {
        self.shown.store(false, Ordering::SeqCst);
    }

    pub(crate) fn show(&self) {
        self.shown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn timestamps(&self) -> Vec<u64> {
        self.received.lock().unwrap().iter().map(|(ts, _)| *ts).collect()
    }

    pub(crate) fn streams(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, stream)| stream.clone())
            .collect()
    }

    pub(crate) fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::ALL
    }

    fn update(&self, sample: &Sample, stream: &str) {
        self.received
            .lock()
            .unwrap()
            .push((sample.timestamp, stream.to_string()));
    }

    fn visible(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }

    fn disconnected(&self, stream: &str) {
        self.disconnects.lock().unwrap().push(stream.to_string());
    }

    fn path(&self) -> Option<SinkPath> {
        self.path.clone()
    }
}
