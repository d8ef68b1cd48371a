//! Log replay sources
//!
//! A [`ReplayLog`] holds samples recorded from several streams on one merged
//! timeline, plus a replay position moved by the operator (`step`, `seek`,
//! `rewind`). Its ports are consumed by replay connections, whose liveness
//! only depends on their own poll timer: a log is always reachable.
//!
//! # Delivery semantics
//!
//! Each [`LogReader`] owns its cursor into the timeline. Entries are
//! delivered at most once per forward pass, so polling a paused log never
//! repeats a sample. After a seek (in either direction) a reader first
//! delivers the stream's current sample at the new position once, then
//! continues with entries replayed afterwards. A backwards seek is therefore
//! the only way a reader sees the same sample twice.

pub mod log;
pub mod reader;

pub use log::{LogPort, ReplayError, ReplayLog, ReplayLogBuilder};
pub use reader::LogReader;
