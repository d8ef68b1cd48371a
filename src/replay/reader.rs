//! Reader adapter over a replay log

use std::sync::Arc;

use crate::port::{ReadError, ReaderPolicy, StreamReader};
use crate::sample::Sample;

use super::log::Timeline;

/// Reads one recorded stream, tracking its own replay cursor
pub struct LogReader {
    stream: usize,
    timeline: Arc<Timeline>,
    policy: ReaderPolicy,
    /// Next timeline index to inspect
    next: usize,
    /// Seek generation this reader has caught up with
    generation: u64,
}

impl LogReader {
    pub(super) fn new(stream: usize, timeline: Arc<Timeline>, policy: ReaderPolicy) -> Self {
        let cursor = timeline.cursor();
        // A new reader starts with the stream's current sample
        let next = timeline
            .last_before(stream, cursor.position)
            .unwrap_or(cursor.position);

        Self {
            stream,
            timeline,
            policy,
            next,
            generation: cursor.generation,
        }
    }
}

impl StreamReader for LogReader {
    fn read_new(&mut self, buffer: &mut Sample) -> Result<bool, ReadError> {
        let cursor = self.timeline.cursor();

        if cursor.generation != self.generation {
            self.generation = cursor.generation;
            self.next = self
                .timeline
                .last_before(self.stream, cursor.position)
                .unwrap_or(cursor.position);
        }

        let end = cursor.position.min(self.timeline.entries.len());
        if self.next >= end {
            return Ok(false);
        }

        let pending = &self.timeline.entries[self.next..end];
        let found = match self.policy {
            ReaderPolicy::Buffer => pending.iter().position(|(s, _)| *s == self.stream),
            ReaderPolicy::Data => pending.iter().rposition(|(s, _)| *s == self.stream),
        };

        match found {
            Some(offset) => {
                let index = self.next + offset;
                buffer.assign(&self.timeline.entries[index].1);
                self.next = match self.policy {
                    ReaderPolicy::Buffer => index + 1,
                    ReaderPolicy::Data => end,
                };
                Ok(true)
            }
            None => {
                self.next = end;
                Ok(false)
            }
        }
    }
}
