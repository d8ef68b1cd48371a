//! Replay log and its ports

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::port::{
    LocateError, PortHandle, PortLocator, ReadError, ReaderPolicy, StreamIdentity, StreamReader,
};
use crate::sample::Sample;

use super::reader::LogReader;

/// Error type for building a replay log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// A stream was recorded with two different sample types
    TypeMismatch {
        /// Stream name ("P.S")
        stream: String,
        /// Type of the first recorded sample
        expected: String,
        /// Type of the offending sample
        actual: String,
    },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::TypeMismatch {
                stream,
                expected,
                actual,
            } => write!(
                f,
                "Recorded sample type mismatch on {}: expected {}, got {}",
                stream, expected, actual
            ),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Replay position shared by a log and its readers
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Cursor {
    /// Number of timeline entries replayed so far
    pub position: usize,
    /// Bumped on every seek
    pub generation: u64,
}

/// Merged timeline shared by a log and its ports
pub(super) struct Timeline {
    /// (stream index, sample) ordered by timestamp
    pub entries: Vec<(usize, Sample)>,
    cursor: Mutex<Cursor>,
}

impl Timeline {
    pub(super) fn cursor(&self) -> Cursor {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index of the last entry of `stream` before `position`
    pub(super) fn last_before(&self, stream: usize, position: usize) -> Option<usize> {
        self.entries[..position.min(self.entries.len())]
            .iter()
            .rposition(|(index, _)| *index == stream)
    }
}

/// A recorded stream inside a [`ReplayLog`]
pub struct LogPort {
    identity: StreamIdentity,
    type_name: Arc<str>,
    index: usize,
    timeline: Arc<Timeline>,
}

impl LogPort {
    /// Number of samples recorded for this stream
    pub fn sample_count(&self) -> usize {
        self.timeline
            .entries
            .iter()
            .filter(|(index, _)| *index == self.index)
            .count()
    }
}

impl PortHandle for LogPort {
    fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn reader(&self, policy: ReaderPolicy) -> Result<Box<dyn StreamReader>, ReadError> {
        Ok(Box::new(LogReader::new(
            self.index,
            Arc::clone(&self.timeline),
            policy,
        )))
    }
}

/// Builder for a [`ReplayLog`]
pub struct ReplayLogBuilder {
    name: String,
    streams: Vec<(StreamIdentity, Arc<str>)>,
    entries: Vec<(usize, Sample)>,
}

impl ReplayLogBuilder {
    /// Record a sample for a stream
    ///
    /// The first sample of a stream fixes its type.
    pub fn record(
        mut self,
        producer: &str,
        stream: &str,
        sample: Sample,
    ) -> Result<Self, ReplayError> {
        let identity = StreamIdentity::new(producer, stream);

        let index = match self.streams.iter().position(|(id, _)| *id == identity) {
            Some(index) => {
                let expected = &self.streams[index].1;
                if !sample.is_type(expected) {
                    return Err(ReplayError::TypeMismatch {
                        stream: identity.to_string(),
                        expected: expected.to_string(),
                        actual: sample.type_name.to_string(),
                    });
                }
                index
            }
            None => {
                self.streams
                    .push((identity, Arc::clone(&sample.type_name)));
                self.streams.len() - 1
            }
        };

        self.entries.push((index, sample));
        Ok(self)
    }

    /// Build the log, ordering the timeline by timestamp
    pub fn build(mut self) -> ReplayLog {
        // Stable sort keeps recording order for equal timestamps
        self.entries.sort_by_key(|(_, sample)| sample.timestamp);

        let timeline = Arc::new(Timeline {
            entries: self.entries,
            cursor: Mutex::new(Cursor::default()),
        });

        let ports = self
            .streams
            .into_iter()
            .enumerate()
            .map(|(index, (identity, type_name))| {
                let port = Arc::new(LogPort {
                    identity: identity.clone(),
                    type_name,
                    index,
                    timeline: Arc::clone(&timeline),
                });
                (identity, port)
            })
            .collect();

        ReplayLog {
            name: self.name,
            ports,
            timeline,
        }
    }
}

/// A recorded log replayed on demand
pub struct ReplayLog {
    name: String,
    ports: HashMap<StreamIdentity, Arc<LogPort>>,
    timeline: Arc<Timeline>,
}

impl ReplayLog {
    /// Start building a log
    pub fn builder(name: impl Into<String>) -> ReplayLogBuilder {
        ReplayLogBuilder {
            name: name.into(),
            streams: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Log name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of timeline entries
    pub fn len(&self) -> usize {
        self.timeline.entries.len()
    }

    /// Check if the log holds no samples
    pub fn is_empty(&self) -> bool {
        self.timeline.entries.is_empty()
    }

    /// Current replay position (entries replayed so far)
    pub fn position(&self) -> usize {
        self.timeline.cursor().position
    }

    /// Check if the whole log has been replayed
    pub fn at_end(&self) -> bool {
        self.position() >= self.len()
    }

    /// Replay the next `count` entries
    ///
    /// Returns the new position.
    pub fn step(&self, count: usize) -> usize {
        let mut cursor = self.timeline.lock();
        cursor.position = (cursor.position + count).min(self.len());
        cursor.position
    }

    /// Jump to a position
    pub fn seek(&self, position: usize) {
        let mut cursor = self.timeline.lock();
        cursor.position = position.min(self.len());
        cursor.generation += 1;

        tracing::debug!(log = %self.name, position = cursor.position, "Replay seek");
    }

    /// Jump back to the start
    pub fn rewind(&self) {
        self.seek(0);
    }

    /// Look up a recorded stream
    pub fn port(&self, producer: &str, stream: &str) -> Option<Arc<LogPort>> {
        self.ports
            .get(&StreamIdentity::new(producer, stream))
            .cloned()
    }

    /// Check if a stream was recorded
    pub fn has_port(&self, producer: &str, stream: &str) -> bool {
        self.port(producer, stream).is_some()
    }

    /// All recorded streams
    pub fn streams(&self) -> Vec<StreamIdentity> {
        let mut streams: Vec<StreamIdentity> = self.ports.keys().cloned().collect();
        streams.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        streams
    }
}

impl PortLocator for ReplayLog {
    fn reachable(&self, producer: &str) -> bool {
        self.ports.keys().any(|id| id.producer == producer)
    }

    fn resolve(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<Arc<dyn PortHandle>>, LocateError> {
        identity.validate()?;

        Ok(self
            .ports
            .get(identity)
            .map(|port| Arc::clone(port) as Arc<dyn PortHandle>))
    }
}
