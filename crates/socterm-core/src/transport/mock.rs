//! Mock transport for testing dispatch and transfer logic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{ConsoleTransport, TransportError};

/// Mock transport with queued reads and captured writes.
///
/// An empty read queue reports `ReadFailed` rather than blocking, so a test
/// that under-queues fails instead of hanging. `disconnect()` switches both
/// directions to `Disconnected`.
pub struct MockTransport {
    read_queue: Arc<Mutex<VecDeque<u8>>>,
    write_log: Arc<Mutex<Vec<u8>>>,
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue bytes to be returned by subsequent reads.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.read_queue.lock().unwrap().extend(bytes.iter().copied());
    }

    /// All bytes written so far, flattened in order.
    pub fn written(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().clone()
    }

    pub fn clear_written(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate the peer going away.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleTransport for MockTransport {
    fn read_byte(&self) -> Result<u8, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.read_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::ReadFailed("mock read queue empty".into()))
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn is_open(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_queue() {
        let mock = MockTransport::new();
        mock.queue_bytes(b"ab");

        assert_eq!(mock.read_byte().unwrap(), b'a');
        assert_eq!(mock.read_byte().unwrap(), b'b');
        assert!(mock.read_byte().is_err());
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b" World").unwrap();
        assert_eq!(mock.written(), b"Hello World");
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_open());

        mock.disconnect();
        assert!(!mock.is_open());
        assert!(matches!(
            mock.read_byte(),
            Err(TransportError::Disconnected)
        ));
        assert!(mock.write(b"x").is_err());
    }
}
