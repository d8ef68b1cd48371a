//! Sinks, callbacks and transforms
//!
//! A sink is whatever consumes samples, typically a widget. The core only
//! relies on three optional capabilities, declared up front through
//! [`SinkCapabilities`] instead of being probed at runtime:
//!
//! - `update`: accepts a sample together with the stream name
//! - `visible`: reports whether the sink still wants samples
//! - `disconnected`: wants to hear when its connection stops polling

use std::sync::Arc;

use crate::sample::Sample;

use super::error::ConnectionError;

/// Handler receiving a sample and the stream name ("P.S")
pub type Callback = Arc<dyn Fn(&Sample, &str) + Send + Sync>;

/// Pure transform applied to every sample before delivery
///
/// The result must have the same sample type as the stream.
pub type Transform = Arc<dyn Fn(&Sample, &str) -> Sample + Send + Sync>;

/// Capabilities a sink implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCapabilities {
    /// `Sink::update` handles samples
    pub update: bool,
    /// `Sink::visible` reports activity
    pub visible: bool,
    /// `Sink::disconnected` wants detach notifications
    pub disconnected: bool,
}

impl SinkCapabilities {
    /// No capability at all
    pub const NONE: Self = Self {
        update: false,
        visible: false,
        disconnected: false,
    };

    /// Every capability
    pub const ALL: Self = Self {
        update: true,
        visible: true,
        disconnected: true,
    };
}

/// Hierarchical sink path, e.g. `main/panel/plot`
///
/// Used to scope bulk operations to a sink and everything nested in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkPath(String);

impl SinkPath {
    /// Create a path from `/`-separated segments
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    /// Path of a child element
    pub fn child(&self, name: &str) -> Self {
        Self::new(format!("{}/{}", self.0, name))
    }

    /// Check if this path equals `ancestor` or is nested inside it
    pub fn is_within(&self, ancestor: &SinkPath) -> bool {
        match self.0.strip_prefix(&ancestor.0) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || ancestor.0.is_empty(),
            None => false,
        }
    }

    /// Path as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SinkPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A consumer of samples
///
/// Only the methods whose capability is declared are ever called.
pub trait Sink: Send + Sync {
    /// Capabilities this sink implements
    fn capabilities(&self) -> SinkCapabilities;

    /// Handle a sample read from `stream`
    fn update(&self, _sample: &Sample, _stream: &str) {}

    /// Whether the sink still wants samples (e.g. the widget is shown)
    fn visible(&self) -> bool {
        true
    }

    /// Called once when a connection feeding this sink stops polling
    fn disconnected(&self, _stream: &str) {}

    /// Stable path identifying this sink for scoped operations
    fn path(&self) -> Option<SinkPath> {
        None
    }
}

/// Where a connection delivers its samples
#[derive(Clone, Default)]
pub enum Delivery {
    /// Samples are drained and dropped
    #[default]
    Headless,
    /// Samples go to `Sink::update`
    Sink(Arc<dyn Sink>),
    /// Samples go to a callback
    Callback(Callback),
    /// Samples go to the callback; the sink supplies visibility, identity
    /// and detach notifications
    Both(Arc<dyn Sink>, Callback),
}

impl Delivery {
    /// Deliver to a sink's `update`
    pub fn sink(sink: Arc<dyn Sink>) -> Self {
        Delivery::Sink(sink)
    }

    /// Deliver to a callback
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Sample, &str) + Send + Sync + 'static,
    {
        Delivery::Callback(Arc::new(f))
    }

    /// Deliver to a callback on behalf of a sink
    pub fn both<F>(sink: Arc<dyn Sink>, f: F) -> Self
    where
        F: Fn(&Sample, &str) + Send + Sync + 'static,
    {
        Delivery::Both(sink, Arc::new(f))
    }

    /// The sink, if any
    pub fn sink_ref(&self) -> Option<&Arc<dyn Sink>> {
        match self {
            Delivery::Sink(sink) | Delivery::Both(sink, _) => Some(sink),
            Delivery::Headless | Delivery::Callback(_) => None,
        }
    }

    /// Reject targets that cannot handle samples
    pub(crate) fn validate(&self) -> Result<(), ConnectionError> {
        match self {
            Delivery::Sink(sink) if !sink.capabilities().update => {
                let what = match sink.path() {
                    Some(path) => format!("sink {} without an update handler or callback", path),
                    None => "sink without an update handler or callback".to_string(),
                };
                Err(ConnectionError::InvalidHandleType(what))
            }
            _ => Ok(()),
        }
    }

    /// Check if the sink (if any) still wants samples
    pub(crate) fn is_active(&self) -> bool {
        match self.sink_ref() {
            Some(sink) if sink.capabilities().visible => sink.visible(),
            _ => true,
        }
    }

    /// Forward one sample
    pub(crate) fn deliver(&self, sample: &Sample, stream: &str) {
        match self {
            Delivery::Headless => {}
            Delivery::Sink(sink) => sink.update(sample, stream),
            Delivery::Callback(f) | Delivery::Both(_, f) => f(sample, stream),
        }
    }

    /// Tell the sink its connection stopped polling
    pub(crate) fn notify_disconnected(&self, stream: &str) {
        if let Some(sink) = self.sink_ref() {
            if sink.capabilities().disconnected {
                sink.disconnected(stream);
            }
        }
    }

    /// Check if this delivery belongs to `scope` (same sink or nested in it)
    pub(crate) fn belongs_to(&self, scope: &Arc<dyn Sink>) -> bool {
        let Some(sink) = self.sink_ref() else {
            return false;
        };

        if std::ptr::addr_eq(Arc::as_ptr(sink), Arc::as_ptr(scope)) {
            return true;
        }

        match (sink.path(), scope.path()) {
            (Some(path), Some(ancestor)) => path.is_within(&ancestor),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = |sink: &Arc<dyn Sink>| sink.path().map(|p| p.to_string());
        match self {
            Delivery::Headless => write!(f, "Headless"),
            Delivery::Sink(sink) => f.debug_tuple("Sink").field(&path(sink)).finish(),
            Delivery::Callback(_) => write!(f, "Callback"),
            Delivery::Both(sink, _) => f.debug_tuple("Both").field(&path(sink)).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    struct Widget {
        path: SinkPath,
        caps: SinkCapabilities,
        shown: AtomicBool,
        updates: AtomicUsize,
    }

    impl Widget {
        fn new(path: &str, caps: SinkCapabilities) -> Arc<Self> {
            Arc::new(Self {
                path: SinkPath::new(path),
                caps,
                shown: AtomicBool::new(true),
                updates: AtomicUsize::new(0),
            })
        }
    }

    impl Sink for Widget {
        fn capabilities(&self) -> SinkCapabilities {
            self.caps
        }

        fn update(&self, _sample: &Sample, _stream: &str) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }

        fn visible(&self) -> bool {
            self.shown.load(Ordering::Relaxed)
        }

        fn path(&self) -> Option<SinkPath> {
            Some(self.path.clone())
        }
    }

    #[test]
    fn test_sink_path_nesting() {
        let panel = SinkPath::new("main/panel");

        assert!(SinkPath::new("main/panel").is_within(&panel));
        assert!(SinkPath::new("main/panel/plot").is_within(&panel));
        assert!(panel.child("plot").is_within(&panel));
        assert!(!SinkPath::new("main/panel2").is_within(&panel));
        assert!(!SinkPath::new("main").is_within(&panel));
        assert_eq!(SinkPath::new("/main/panel/").as_str(), "main/panel");
    }

    #[test]
    fn test_validate_requires_update_or_callback() {
        let mute = Widget::new("main/label", SinkCapabilities::NONE);

        let sink_only = Delivery::sink(mute.clone());
        assert!(matches!(
            sink_only.validate(),
            Err(ConnectionError::InvalidHandleType(_))
        ));

        let with_callback = Delivery::both(mute, |_, _| {});
        assert!(with_callback.validate().is_ok());
        assert!(Delivery::Headless.validate().is_ok());
    }

    #[test]
    fn test_visibility_only_with_capability() {
        let widget = Widget::new("main/plot", SinkCapabilities::ALL);
        let blind = Widget::new(
            "main/other",
            SinkCapabilities {
                update: true,
                ..SinkCapabilities::NONE
            },
        );
        widget.shown.store(false, Ordering::Relaxed);
        blind.shown.store(false, Ordering::Relaxed);

        assert!(!Delivery::sink(widget).is_active());
        // Without the capability, visible() is never consulted
        assert!(Delivery::sink(blind).is_active());
        assert!(Delivery::callback(|_, _| {}).is_active());
    }

    #[test]
    fn test_both_routes_to_callback() {
        let widget = Widget::new("main/plot", SinkCapabilities::ALL);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let delivery = Delivery::both(widget.clone(), move |_, stream| {
            assert_eq!(stream, "odometry.pose");
            counter.fetch_add(1, Ordering::Relaxed);
        });

        delivery.deliver(&Sample::empty("/Pose"), "odometry.pose");

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(widget.updates.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_belongs_to() {
        let panel: Arc<dyn Sink> = Widget::new("main/panel", SinkCapabilities::ALL);
        let plot: Arc<dyn Sink> = Widget::new("main/panel/plot", SinkCapabilities::ALL);
        let other: Arc<dyn Sink> = Widget::new("main/other", SinkCapabilities::ALL);

        assert!(Delivery::sink(plot.clone()).belongs_to(&panel));
        assert!(Delivery::sink(panel.clone()).belongs_to(&panel));
        assert!(!Delivery::sink(other).belongs_to(&panel));
        assert!(!Delivery::sink(panel).belongs_to(&plot));
        assert!(!Delivery::callback(|_, _| {}).belongs_to(&plot));
    }
}
