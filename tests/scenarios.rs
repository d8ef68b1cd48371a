//! End-to-end connection scenarios against the in-memory middleware

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use portlink::memory::MemoryBus;
use portlink::replay::ReplayLog;
use portlink::{
    ConnectionError, ConnectionRegistry, ConnectionState, Delivery, Policy, RegistryConfig,
    Sample, Sink, SinkCapabilities, SinkPath, StreamIdentity, Target,
};

const POSE: &str = "/base/samples/RigidBodyState";

fn pose(timestamp: u64) -> Sample {
    Sample::new(POSE, timestamp, timestamp.to_le_bytes().to_vec())
}

#[derive(Default)]
struct Widget {
    path: Option<SinkPath>,
    hidden: AtomicBool,
    seen: Mutex<Vec<(String, u64)>>,
    disconnects: Mutex<Vec<String>>,
}

impl Widget {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn at(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Some(SinkPath::new(path)),
            ..Self::default()
        })
    }

    fn seen(&self) -> Vec<(String, u64)> {
        self.seen.lock().unwrap().clone()
    }

    fn timestamps(&self) -> Vec<u64> {
        self.seen().into_iter().map(|(_, ts)| ts).collect()
    }
}

impl Sink for Widget {
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::ALL
    }

    fn update(&self, sample: &Sample, stream: &str) {
        self.seen
            .lock()
            .unwrap()
            .push((stream.to_string(), sample.timestamp));
    }

    fn visible(&self) -> bool {
        !self.hidden.load(Ordering::SeqCst)
    }

    fn disconnected(&self, stream: &str) {
        self.disconnects.lock().unwrap().push(stream.to_string());
    }

    fn path(&self) -> Option<SinkPath> {
        self.path.clone()
    }
}

fn setup() -> (Arc<MemoryBus>, Arc<ConnectionRegistry>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let bus = Arc::new(MemoryBus::new());
    let registry = Arc::new(ConnectionRegistry::new(bus.clone()));
    (bus, registry)
}

#[tokio::test(start_paused = true)]
async fn test_producer_appears_later() {
    let (bus, registry) = setup();
    let _watchdog = registry.spawn_watchdog();
    let widget = Widget::new();

    let connection = assert_ok!(registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(widget.clone()),
        None
    ));
    assert_eq!(connection.state(), ConnectionState::Unresolved);
    assert!(!connection.is_alive());

    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));

    // Watchdog runs every 2s
    tokio::time::sleep(Duration::from_millis(2050)).await;
    assert_eq!(connection.state(), ConnectionState::Live);

    assert_ok!(port.write(pose(42)));
    tokio::time::sleep(Duration::from_millis(130)).await;

    assert_eq!(widget.seen(), vec![("odometry.pose".to_string(), 42)]);
}

#[tokio::test(start_paused = true)]
async fn test_producer_restart_reconnects() {
    let (bus, registry) = setup();
    let _watchdog = registry.spawn_watchdog();
    let widget = Widget::new();

    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));
    let connection = assert_ok!(registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(widget.clone()),
        None
    ));
    assert!(connection.is_alive());

    assert_ok!(port.write(pose(1)));
    tokio::time::sleep(Duration::from_millis(130)).await;

    bus.stop_producer("odometry");
    tokio::time::sleep(Duration::from_millis(130)).await;
    assert_eq!(connection.state(), ConnectionState::Unresolved);
    assert_eq!(
        *widget.disconnects.lock().unwrap(),
        vec!["odometry.pose".to_string()]
    );

    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(connection.is_alive());

    assert_ok!(port.write(pose(2)));
    tokio::time::sleep(Duration::from_millis(130)).await;
    assert_eq!(widget.timestamps(), vec![1, 2]);
}

#[tokio::test]
async fn test_reconnect_all_isolates_failures() {
    let (bus, registry) = setup();
    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));

    let a = assert_ok!(registry.connect_port_to("odometry", "pose", Delivery::Headless, None));
    let b = assert_ok!(registry.connect_port_to("odometry", "pose", Delivery::Headless, None));
    let c = assert_ok!(registry.connect_port_to("laser", "scan", Delivery::Headless, None));
    assert!(a.is_alive() && b.is_alive());
    assert_eq!(c.state(), ConnectionState::Unresolved);

    let report = registry.reconnect_all();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.attached, 2);
    assert_eq!(report.failed, 1);
    assert!(a.is_alive());
    assert!(b.is_alive());
    assert!(!c.is_alive());
    assert_eq!(port.reader_count(), 2);
}

#[tokio::test]
async fn test_transform_mismatch_reported_once() {
    let (bus, registry) = setup();
    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));
    let widget = Widget::new();

    let connection = assert_ok!(portlink::Connection::builder(StreamIdentity::new(
        "odometry", "pose"
    ))
    .policy(Policy::default().auto_reconnect(true))
    .delivery(Delivery::sink(widget.clone()))
    .transform(|sample, _| Sample::new("/base/Twist", sample.timestamp, sample.data.clone()))
    .live(bus.clone()));
    assert_ok!(connection.attach());
    registry.add(connection.clone());

    let mut events = connection.subscribe_events();
    assert_ok!(port.write(pose(1)));
    let error = assert_err!(connection.tick());
    assert!(matches!(error, ConnectionError::TransformTypeMismatch { .. }));

    // Never retried by the watchdog
    for _ in 0..5 {
        registry.watchdog_tick();
        assert_ok!(port.write(pose(2)));
        assert_eq!(assert_ok!(connection.tick()), 0);
    }

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, portlink::ConnectionEvent::Failed(_)) {
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
    assert!(widget.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hidden_widget_stops_polling() {
    let (bus, registry) = setup();
    let _watchdog = registry.spawn_watchdog();
    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));
    let widget = Widget::new();

    let connection = assert_ok!(registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(widget.clone()),
        None
    ));

    widget.hidden.store(true, Ordering::SeqCst);
    assert_ok!(port.write(pose(1)));
    tokio::time::sleep(Duration::from_millis(130)).await;

    assert!(widget.seen().is_empty());
    assert!(!connection.is_timer_running());

    // Watchdog leaves it alone while hidden, picks it up once shown
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!connection.is_alive());

    widget.hidden.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(connection.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_frequency_change_keeps_queue() {
    let (bus, registry) = setup();
    assert_ok!(bus.start_producer("odometry"));
    let port = assert_ok!(bus.add_port("odometry", "pose", POSE));
    let widget = Widget::new();

    let connection = assert_ok!(registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(widget.clone()),
        None
    ));

    for ts in 1..=5 {
        assert_ok!(port.write(pose(ts)));
    }
    assert_ok!(connection.set_update_frequency(1.0));
    for ts in 6..=8 {
        assert_ok!(port.write(pose(ts)));
    }

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(widget.timestamps(), (1..=8).collect::<Vec<_>>());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(widget.timestamps().len(), 8);
}

#[tokio::test]
async fn test_replay_passes() {
    let (_bus, registry) = setup();
    let mut builder = ReplayLog::builder("run-1");
    for ts in 1..=3 {
        builder = assert_ok!(builder.record("odometry", "pose", pose(ts)));
        let scan = Sample::new("/Scan", ts, Vec::<u8>::new());
        builder = assert_ok!(builder.record("laser", "scan", scan));
    }
    let log = Arc::new(builder.build());
    registry.use_replay(log.clone());

    let widget = Widget::new();
    let connection = assert_ok!(registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(widget.clone()),
        None
    ));
    assert!(connection.is_alive());

    // Forward pass: every sample once
    log.step(log.len());
    assert_ok!(connection.tick());
    assert_ok!(connection.tick());
    assert_eq!(widget.timestamps(), vec![1, 2, 3]);

    // Backwards seek replays from the sample current at the new position
    log.seek(2);
    log.step(log.len());
    assert_ok!(connection.tick());
    assert_eq!(widget.timestamps(), vec![1, 2, 3, 1, 2, 3]);
}

#[tokio::test]
async fn test_disconnect_from_widget_tree() {
    let (bus, registry) = setup();
    assert_ok!(bus.start_producer("odometry"));
    assert_ok!(bus.add_port("odometry", "pose", POSE));

    let panel = Widget::at("main/panel");
    let plot = Widget::at("main/panel/plot");
    let table = Widget::at("main/table");

    for widget in [&panel, &plot, &table] {
        assert_ok!(registry.connect_port_to(
            "odometry",
            "pose",
            Delivery::sink((*widget).clone()),
            None
        ));
    }

    let removed = registry.disconnect_from(&Target::Sink(panel.clone()));

    assert_eq!(removed, 2);
    assert_eq!(registry.len(), 1);
    assert_eq!(plot.disconnects.lock().unwrap().len(), 1);
    assert!(table.disconnects.lock().unwrap().is_empty());
}

#[test]
fn test_registry_config_defaults() {
    let config = RegistryConfig::default();

    assert_eq!(config.watchdog_interval, Duration::from_secs(2));
    assert_eq!(config.default_policy.period(), Duration::from_millis(125));
}
