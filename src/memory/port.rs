//! Bus ports and their readers

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::port::{PortHandle, ReadError, ReaderPolicy, StreamIdentity, StreamReader};
use crate::sample::Sample;

use super::error::BusError;

/// A typed output port of an in-process producer
pub struct MemoryPort {
    identity: StreamIdentity,
    type_name: Arc<str>,
    /// Broadcast sender for fan-out to readers (None once closed)
    tx: RwLock<Option<broadcast::Sender<Sample>>>,
}

impl MemoryPort {
    pub(super) fn new(identity: StreamIdentity, type_name: &str, capacity: usize) -> Self {
        // broadcast::channel rejects a zero capacity
        let (tx, _) = broadcast::channel(capacity.max(1));

        Self {
            identity,
            type_name: Arc::from(type_name),
            tx: RwLock::new(Some(tx)),
        }
    }

    /// Publish a sample to every open reader
    ///
    /// Returns the number of readers that received the sample.
    pub fn write(&self, sample: Sample) -> Result<usize, BusError> {
        if !sample.is_type(&self.type_name) {
            return Err(BusError::TypeMismatch {
                expected: self.type_name.to_string(),
                actual: sample.type_name.to_string(),
            });
        }

        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            // send() fails only when there are no readers
            Some(tx) => Ok(tx.send(sample).unwrap_or(0)),
            None => Err(BusError::ProducerNotRunning(self.identity.producer.clone())),
        }
    }

    /// Number of readers currently open on this port
    pub fn reader_count(&self) -> usize {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Check if the port still accepts samples
    pub fn is_open(&self) -> bool {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Close the port; readers see `Disconnected` after draining
    pub(super) fn close(&self) {
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl PortHandle for MemoryPort {
    fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn reader(&self, policy: ReaderPolicy) -> Result<Box<dyn StreamReader>, ReadError> {
        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let rx = tx.as_ref().ok_or(ReadError::Disconnected)?.subscribe();

        Ok(Box::new(MemoryReader {
            stream: self.identity.to_string(),
            rx,
            policy,
        }))
    }
}

/// Reader adapter over a port's broadcast receiver
pub struct MemoryReader {
    stream: String,
    rx: broadcast::Receiver<Sample>,
    policy: ReaderPolicy,
}

impl MemoryReader {
    fn read_next(&mut self, buffer: &mut Sample) -> Result<bool, ReadError> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => {
                    buffer.assign(&sample);
                    return Ok(true);
                }
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Closed) => return Err(ReadError::Disconnected),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        stream = %self.stream,
                        skipped = skipped,
                        "Reader lagged, skipping to oldest queued sample"
                    );
                }
            }
        }
    }

    fn read_latest(&mut self, buffer: &mut Sample) -> Result<bool, ReadError> {
        let mut found = false;
        loop {
            match self.read_next(buffer) {
                Ok(true) => found = true,
                Ok(false) => return Ok(found),
                // Deliver what we have; the disconnect surfaces on the next read
                Err(ReadError::Disconnected) if found => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }
}

impl StreamReader for MemoryReader {
    fn read_new(&mut self, buffer: &mut Sample) -> Result<bool, ReadError> {
        match self.policy {
            ReaderPolicy::Buffer => self.read_next(buffer),
            ReaderPolicy::Data => self.read_latest(buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port() -> MemoryPort {
        MemoryPort::new(StreamIdentity::new("odometry", "pose"), "/Pose", 8)
    }

    fn pose(ts: u64) -> Sample {
        Sample::new("/Pose", ts, vec![ts as u8])
    }

    #[test]
    fn test_buffer_reader_in_order() {
        let port = port();
        let mut reader = port.reader(ReaderPolicy::Buffer).unwrap();
        let mut buffer = port.new_sample();

        port.write(pose(1)).unwrap();
        port.write(pose(2)).unwrap();

        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(buffer.timestamp, 1);
        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(buffer.timestamp, 2);
        assert!(!reader.read_new(&mut buffer).unwrap());
    }

    #[test]
    fn test_data_reader_newest_only() {
        let port = port();
        let mut reader = port.reader(ReaderPolicy::Data).unwrap();
        let mut buffer = port.new_sample();

        for ts in 1..=3 {
            port.write(pose(ts)).unwrap();
        }

        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(buffer.timestamp, 3);
        assert!(!reader.read_new(&mut buffer).unwrap());
    }

    #[test]
    fn test_write_type_mismatch() {
        let port = port();
        let result = port.write(Sample::new("/Other", 0, Vec::<u8>::new()));

        assert!(matches!(result, Err(BusError::TypeMismatch { .. })));
    }

    #[test]
    fn test_close_disconnects_after_drain() {
        let port = port();
        let mut reader = port.reader(ReaderPolicy::Buffer).unwrap();
        let mut buffer = port.new_sample();

        port.write(pose(1)).unwrap();
        port.close();

        assert!(!port.is_open());
        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(reader.read_new(&mut buffer), Err(ReadError::Disconnected));
        assert!(port.reader(ReaderPolicy::Buffer).is_err());
    }

    #[test]
    fn test_reader_count_tracks_drops() {
        let port = port();
        assert_eq!(port.reader_count(), 0);

        let reader = port.reader(ReaderPolicy::Buffer).unwrap();
        assert_eq!(port.reader_count(), 1);

        drop(reader);
        assert_eq!(port.reader_count(), 0);
    }

    #[test]
    fn test_lagged_reader_skips() {
        let port = MemoryPort::new(StreamIdentity::new("odometry", "pose"), "/Pose", 2);
        let mut reader = port.reader(ReaderPolicy::Buffer).unwrap();
        let mut buffer = port.new_sample();

        for ts in 1..=5 {
            port.write(pose(ts)).unwrap();
        }

        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(buffer.timestamp, 4);
        assert!(reader.read_new(&mut buffer).unwrap());
        assert_eq!(buffer.timestamp, 5);
        assert!(!reader.read_new(&mut buffer).unwrap());
    }
}
