//! Encoded output consumers
//!
//! The encoder hands every delivery to a type-erased [`Sink`]; which object
//! receives it is decided when the sink is built.

use std::io::Write;
use tracing::{debug, warn};

/// Consumer of encoded bytes
pub trait Sink {
    /// Take one delivery
    fn consume(&mut self, data: &[u8]);
}

impl<F> Sink for F
where
    F: FnMut(&[u8]),
{
    fn consume(&mut self, data: &[u8]) {
        self(data)
    }
}

impl Sink for Vec<u8> {
    fn consume(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

/// Sink bound to one method of a target object
///
/// Empty deliveries are dropped before they reach the target.
pub struct MethodSink<T> {
    target: T,
    method: fn(&mut T, &[u8]),
}

impl<T> MethodSink<T> {
    /// Bind `method` of `target`
    pub fn new(target: T, method: fn(&mut T, &[u8])) -> Self {
        Self { target, method }
    }

    /// The bound object
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Unbind and return the target
    pub fn into_target(self) -> T {
        self.target
    }
}

impl<T> Sink for MethodSink<T> {
    fn consume(&mut self, data: &[u8]) {
        if !data.is_empty() {
            (self.method)(&mut self.target, data);
        }
    }
}

/// Sink writing every delivery to an [`io::Write`](std::io::Write)
///
/// Write failures are logged and counted, never propagated to the encoder.
pub struct WriterSink<W: Write> {
    writer: W,
    bytes_written: u64,
    write_errors: u64,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            write_errors: 0,
        }
    }

    /// Total bytes accepted by the writer
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of failed writes
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Flush and return the writer
    pub fn into_inner(mut self) -> W {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush encoded output: {}", e);
        }
        self.writer
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn consume(&mut self, data: &[u8]) {
        match self.writer.write_all(data) {
            Ok(()) => {
                self.bytes_written += data.len() as u64;
                debug!("Wrote {} bytes of encoded data", data.len());
            }
            Err(e) => {
                self.write_errors += 1;
                warn!("Failed to write encoded data: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        chunks: Vec<Vec<u8>>,
    }

    impl Recorder {
        fn record(&mut self, data: &[u8]) {
            self.chunks.push(data.to_vec());
        }
    }

    #[test]
    fn test_method_sink_skips_empty() {
        let mut sink = MethodSink::new(Recorder { chunks: Vec::new() }, Recorder::record);
        sink.consume(&[1, 2, 3]);
        sink.consume(&[]);
        sink.consume(&[4]);
        assert_eq!(sink.target().chunks, vec![vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn test_closure_sink() {
        let mut total = 0;
        {
            let mut sink = |data: &[u8]| total += data.len();
            sink.consume(&[0; 5]);
            sink.consume(&[0; 2]);
        }
        assert_eq!(total, 7);
    }

    #[test]
    fn test_writer_sink_counts() {
        let mut sink = WriterSink::new(Vec::new());
        sink.consume(&[0, 0, 1, 0x65]);
        assert_eq!(sink.bytes_written(), 4);
        assert_eq!(sink.into_inner(), vec![0, 0, 1, 0x65]);
    }
}
