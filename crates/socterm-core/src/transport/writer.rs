//! Single-writer queue for the transport's write side.
//!
//! The dispatcher (handshake ACK, transfer size fields, file payloads) and
//! the input relay both write to the target. Instead of relying on the two
//! never overlapping in time, every write goes through one bounded channel
//! drained by one dedicated thread, so ordering and exclusivity are explicit
//! and a slow link backpressures the producer instead of buffering a whole
//! file payload in memory.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error};

use super::traits::{ConsoleTransport, TransportError};

/// Queued chunks before `send` blocks on the drain rate.
const QUEUE_DEPTH: usize = 64;

enum WriteOp {
    Data(Vec<u8>),
    /// Barrier: acknowledged once every op queued before it hit the wire.
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Cloneable handle feeding the writer thread.
#[derive(Clone)]
pub struct TransportWriter {
    tx: mpsc::SyncSender<WriteOp>,
    error: Arc<Mutex<Option<TransportError>>>,
}

impl TransportWriter {
    /// Enqueue bytes for the target, blocking while the queue is full. Fails
    /// once the writer thread has died, returning the write error that
    /// killed it.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.tx
            .send(WriteOp::Data(data.into()))
            .map_err(|_| self.dead())
    }

    /// Wait until everything queued so far has actually been written to the
    /// transport. Returns the write error if the writer died before then.
    pub fn flush(&self) -> Result<(), TransportError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.tx
            .send(WriteOp::Flush(ack_tx))
            .map_err(|_| self.dead())?;
        ack_rx.recv().map_err(|_| self.dead())
    }

    /// Ask the writer thread to exit after draining queued writes.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WriteOp::Shutdown);
    }

    /// Remove and return the parked write error, if any.
    pub fn take_error(&self) -> Option<TransportError> {
        self.error.lock().unwrap().take()
    }

    fn dead(&self) -> TransportError {
        self.take_error().unwrap_or(TransportError::Disconnected)
    }
}

/// Start the writer thread draining the queue into `transport`.
pub fn spawn(
    transport: Arc<dyn ConsoleTransport>,
) -> std::io::Result<(TransportWriter, thread::JoinHandle<()>)> {
    let (tx, rx) = mpsc::sync_channel::<WriteOp>(QUEUE_DEPTH);
    let error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&error);

    let handle = thread::Builder::new()
        .name("transport-writer".into())
        .spawn(move || {
            while let Ok(op) = rx.recv() {
                match op {
                    WriteOp::Data(data) => {
                        if let Err(e) = transport.write(&data) {
                            error!(error = %e, "Transport write failed, writer exiting");
                            *slot.lock().unwrap() = Some(e);
                            // Dropping rx fails queued flushes and later sends.
                            return;
                        }
                    }
                    WriteOp::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    WriteOp::Shutdown => {
                        debug!("Transport writer shutting down");
                        return;
                    }
                }
            }
        })?;

    Ok((TransportWriter { tx, error }, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_writes_preserve_order() {
        let mock = Arc::new(MockTransport::new());
        let (writer, handle) = spawn(mock.clone() as Arc<dyn ConsoleTransport>).unwrap();

        writer.send(b"one ".to_vec()).unwrap();
        writer.send(b"two".to_vec()).unwrap();
        writer.shutdown();
        handle.join().unwrap();

        assert_eq!(mock.written(), b"one two");
    }

    #[test]
    fn test_write_error_is_parked() {
        let mock = Arc::new(MockTransport::new());
        mock.disconnect();
        let (writer, handle) = spawn(mock.clone() as Arc<dyn ConsoleTransport>).unwrap();

        // First send reaches the dead transport and kills the thread.
        let _ = writer.send(b"x".to_vec());
        handle.join().unwrap();

        // Later sends fail, surfacing the parked cause.
        let err = writer.send(b"y".to_vec()).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[test]
    fn test_flush_waits_for_drain() {
        let mock = Arc::new(MockTransport::new());
        let (writer, handle) = spawn(mock.clone() as Arc<dyn ConsoleTransport>).unwrap();

        writer.send(b"abc".to_vec()).unwrap();
        writer.send(b"def".to_vec()).unwrap();
        writer.flush().unwrap();
        // Everything queued before the flush is on the wire already.
        assert_eq!(mock.written(), b"abcdef");

        writer.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_flush_surfaces_write_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.disconnect();
        let (writer, handle) = spawn(mock.clone() as Arc<dyn ConsoleTransport>).unwrap();

        let _ = writer.send(b"x".to_vec());
        let err = writer.flush().unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));

        handle.join().unwrap();
    }
}
