//! Destinations for serialized batches.

use crate::core::{Result, VigilError};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Accepts one serialized batch per reporting tick.
///
/// `buffer` holds a JSON array of `record_count` put records. Implementations
/// should hand the batch off quickly; the reporter does not retry a failed send.
pub trait Sink: Send + Sync {
    fn send(&self, buffer: &[u8], record_count: usize) -> Result<()>;
}

impl<F> Sink for F
where
    F: Fn(&[u8], usize) -> Result<()> + Send + Sync,
{
    fn send(&self, buffer: &[u8], record_count: usize) -> Result<()> {
        self(buffer, record_count)
    }
}

/// Writes each batch followed by a newline
#[derive(Debug)]
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl WriterSink<File> {
    /// Appends batches to `path`, creating it if needed
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| VigilError::sink(format!("Failed to open {:?}: {}", path, e)))?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn send(&self, buffer: &[u8], _record_count: usize) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(buffer)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// One batch as delivered to a [`ChannelSink`] receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub payload: Vec<u8>,
    pub records: usize,
}

/// Hands batches to a channel for the embedding application to ship
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Batch>,
}

impl ChannelSink {
    /// Unbounded channel sink and its receiving end
    pub fn new() -> (Self, Receiver<Batch>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Bounded channel; a full channel fails the send and the batch is dropped
    pub fn bounded(capacity: usize) -> (Self, Receiver<Batch>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn send(&self, buffer: &[u8], record_count: usize) -> Result<()> {
        self.tx
            .try_send(Batch {
                payload: buffer.to_vec(),
                records: record_count,
            })
            .map_err(|e| VigilError::sink(format!("Batch channel unavailable: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_appends_newline() {
        let sink = WriterSink::new(Vec::new());
        sink.send(b"[1]", 1).unwrap();
        sink.send(b"[2]", 1).unwrap();
        assert_eq!(sink.into_inner(), b"[1]\n[2]\n".to_vec());
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batches.jsonl");
        let sink = WriterSink::append(&path).unwrap();
        sink.send(b"[]", 0).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]\n");
    }

    #[test]
    fn test_channel_sink() {
        let (sink, rx) = ChannelSink::new();
        sink.send(b"[{}]", 1).unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.records, 1);
        assert_eq!(batch.payload, b"[{}]".to_vec());
    }

    #[test]
    fn test_full_channel_fails() {
        let (sink, _rx) = ChannelSink::bounded(1);
        sink.send(b"[]", 0).unwrap();
        assert!(matches!(sink.send(b"[]", 0), Err(VigilError::Sink(_))));
    }
}
