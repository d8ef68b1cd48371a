//! Stream monitor example
//!
//! Run with: cargo run --example monitor
//!
//! Simulates a producer that comes and goes while a "widget" stays
//! subscribed to its pose stream:
//!
//! - The widget connects before the producer exists (deferred connect)
//! - The registry watchdog attaches it once the producer starts
//! - The producer restarts; the watchdog reconnects after ~2s
//! - A replay log is connected alongside and stepped manually
//!
//! Set `RUST_LOG=portlink=debug` for per-connection detail.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portlink::memory::MemoryBus;
use portlink::replay::ReplayLog;
use portlink::{
    ConnectionRegistry, Delivery, Policy, RegistryConfig, Sample, Sink, SinkCapabilities,
    SinkPath,
};

const POSE: &str = "/base/samples/RigidBodyState";

/// Widget that prints what it receives
struct PosePlot {
    path: SinkPath,
    received: AtomicU64,
}

impl PosePlot {
    fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: SinkPath::new(path),
            received: AtomicU64::new(0),
        })
    }
}

impl Sink for PosePlot {
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::ALL
    }

    fn update(&self, sample: &Sample, stream: &str) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[{}] {} t={} ({} bytes, #{})",
            self.path,
            stream,
            sample.timestamp,
            sample.data.len(),
            count
        );
    }

    fn disconnected(&self, stream: &str) {
        println!("[{}] {} disconnected", self.path, stream);
    }

    fn path(&self) -> Option<SinkPath> {
        Some(self.path.clone())
    }
}

fn pose(timestamp: u64) -> Sample {
    Sample::new(POSE, timestamp, timestamp.to_le_bytes().to_vec())
}

/// Publish samples at ~20 Hz for `duration`
async fn publish(bus: &MemoryBus, from: u64, duration: Duration) -> u64 {
    let port = match bus.add_port("odometry", "pose", POSE) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("Cannot add port: {}", e);
            return from;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let steps = (duration.as_millis() / 50) as u64;
    for ts in from..from + steps {
        ticker.tick().await;
        if let Err(e) = port.write(pose(ts)) {
            eprintln!("Write failed: {}", e);
            break;
        }
    }
    from + steps
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portlink=info".parse()?)
                .add_directive("monitor=debug".parse()?),
        )
        .init();

    let bus = Arc::new(MemoryBus::new());
    let registry = Arc::new(ConnectionRegistry::with_config(
        bus.clone(),
        RegistryConfig::default().default_policy(Policy::default().update_frequency(4.0)),
    ));
    let watchdog = registry.spawn_watchdog();

    // Connect before the producer exists
    let plot = PosePlot::new("main/pose_plot");
    let connection = registry.connect_port_to(
        "odometry",
        "pose",
        Delivery::sink(plot.clone()),
        Some(Policy::default().update_frequency(4.0).auto_reconnect(true)),
    )?;
    println!("Connected {} ({:?})", connection.name(), connection.state());

    bus.start_producer("odometry")?;
    let next = publish(&bus, 0, Duration::from_secs(4)).await;

    println!("\n=== Producer restart ===\n");
    bus.stop_producer("odometry");
    tokio::time::sleep(Duration::from_millis(500)).await;
    bus.start_producer("odometry")?;
    publish(&bus, next, Duration::from_secs(4)).await;

    println!("\n=== Replay ===\n");
    let mut builder = ReplayLog::builder("run-1");
    for ts in 1000..1010 {
        builder = builder.record("replay", "pose", pose(ts))?;
    }
    let log = Arc::new(builder.build());
    if let Some(port) = log.port("replay", "pose") {
        let replay_plot = PosePlot::new("main/replay_plot");
        registry.connect_replay(port, Delivery::sink(replay_plot), None)?;
    }
    for _ in 0..log.len() {
        log.step(1);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let stats = registry.stats();
    println!(
        "\nRegistry: total={} live={} unresolved={} closed={}",
        stats.total, stats.live, stats.unresolved, stats.closed
    );
    let conn_stats = connection.stats();
    println!(
        "{}: ticks={} forwarded={} attaches={} ({} failed) avg/tick={:.2}",
        connection.name(),
        conn_stats.ticks,
        conn_stats.samples_forwarded,
        conn_stats.attach_attempts,
        conn_stats.attach_failures,
        conn_stats.samples_per_tick()
    );

    registry.shutdown();
    watchdog.await?;
    Ok(())
}
