//! File transfer over the console transport itself.
//!
//! Both directions are target-initiated: the target has already sent the
//! request byte and the file name by the time these run. The host side either
//! announces a size and streams the file out (send), or reads a size and
//! sinks exactly that many bytes (receive). The size field is 4-byte
//! little-endian; a send waits for the target's ACK before streaming.

use std::fs::File;
use std::io::{Read, Write};

use tracing::{debug, info};

use crate::transport::{ConsoleTransport, TransportError, TransportWriter};

use super::{await_ack, read_blocking, read_size, size_field, TransferError};

const CHUNK: usize = 4096;

/// Send a local file to the target (FRX): size, ACK gate, payload.
///
/// Returns the number of payload bytes sent.
pub fn send_file<T: ConsoleTransport + ?Sized>(
    transport: &T,
    writer: &TransportWriter,
    name: &str,
) -> Result<u64, TransferError> {
    let mut file = File::open(name).map_err(|e| TransferError::File {
        path: name.to_string(),
        source: e,
    })?;
    let size = file
        .metadata()
        .map_err(|e| TransferError::File {
            path: name.to_string(),
            source: e,
        })?
        .len();
    let size32 = u32::try_from(size).map_err(|_| TransferError::TooLarge { size })?;

    info!(file = %name, bytes = size, "Sending file size");
    writer.send(size_field(size32).to_vec())?;
    writer.flush()?;

    // Flow-control gate: the target must be ready before payload flows.
    await_ack(transport)?;

    let mut sent = 0u64;
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| TransferError::File {
            path: name.to_string(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        writer.send(buf[..n].to_vec())?;
        sent += n as u64;
    }
    // The transfer is done only once the payload is on the wire, not merely
    // queued; a transport death during the payload must fail the transfer.
    writer.flush()?;
    debug!(file = %name, bytes = sent, "File payload written");
    Ok(sent)
}

/// Receive a file from the target (FTX): size, then exactly that many bytes.
///
/// Returns the number of payload bytes received.
pub fn receive_file<T: ConsoleTransport + ?Sized>(
    transport: &T,
    name: &str,
) -> Result<u64, TransferError> {
    let size = read_size(transport)?;
    info!(file = %name, bytes = size, "Receiving file");

    let mut file = File::create(name).map_err(|e| TransferError::File {
        path: name.to_string(),
        source: e,
    })?;

    let mut remaining = size as u64;
    let mut buf = vec![0u8; CHUNK];
    while remaining > 0 {
        let want = remaining.min(CHUNK as u64) as usize;
        for slot in buf[..want].iter_mut() {
            *slot = match read_blocking(transport) {
                Ok(b) => b,
                Err(TransportError::Disconnected) => {
                    return Err(TransportError::Disconnected.into());
                }
                Err(e) => return Err(TransferError::Stream(e.to_string())),
            };
        }
        file.write_all(&buf[..want]).map_err(|e| TransferError::File {
            path: name.to_string(),
            source: e,
        })?;
        remaining -= want as u64;
    }

    Ok(size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::ACK;
    use crate::transport::{writer, MockTransport};
    use crate::xfer::size_field;
    use std::sync::Arc;

    fn writer_for(mock: &Arc<MockTransport>) -> (TransportWriter, std::thread::JoinHandle<()>) {
        writer::spawn(Arc::clone(mock) as Arc<dyn ConsoleTransport>).unwrap()
    }

    #[test]
    fn test_send_file_waits_for_ack_then_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"payload bytes").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.queue_bytes(&[ACK]);
        let (tx, join) = writer_for(&mock);

        let sent = send_file(mock.as_ref(), &tx, path.to_str().unwrap()).unwrap();
        tx.shutdown();
        join.join().unwrap();

        assert_eq!(sent, 13);
        let mut expected = size_field(13).to_vec();
        expected.extend_from_slice(b"payload bytes");
        assert_eq!(mock.written(), expected);
    }

    #[test]
    fn test_send_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.queue_bytes(&[ACK]);
        let (tx, join) = writer_for(&mock);

        let sent = send_file(mock.as_ref(), &tx, path.to_str().unwrap()).unwrap();
        tx.shutdown();
        join.join().unwrap();

        assert_eq!(sent, 0);
        assert_eq!(mock.written(), size_field(0).to_vec());
    }

    #[test]
    fn test_receive_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bin");

        let mock = MockTransport::new();
        mock.queue_bytes(&size_field(5));
        mock.queue_bytes(b"hello");

        let got = receive_file(&mock, path.to_str().unwrap()).unwrap();
        assert_eq!(got, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_receive_zero_byte_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.bin");

        let mock = MockTransport::new();
        mock.queue_bytes(&size_field(0));

        assert_eq!(receive_file(&mock, path.to_str().unwrap()).unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn test_receive_truncated_payload_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");

        let mock = MockTransport::new();
        mock.queue_bytes(&size_field(10));
        mock.queue_bytes(b"abc");

        let err = receive_file(&mock, path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TransferError::Stream(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_send_reports_dead_transport() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doomed.bin");
        std::fs::write(&path, b"never arrives").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.disconnect();
        let (tx, join) = writer_for(&mock);

        // The writer queue must not swallow the death: send_file errors
        // instead of reporting success for bytes that never hit the wire.
        let err = send_file(mock.as_ref(), &tx, path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TransferError::Transport(_)));

        join.join().unwrap();
    }

    #[test]
    fn test_missing_local_file() {
        let mock = Arc::new(MockTransport::new());
        let (tx, join) = writer_for(&mock);

        let err = send_file(mock.as_ref(), &tx, "/nonexistent/really.bin").unwrap_err();
        tx.shutdown();
        join.join().unwrap();

        assert!(matches!(err, TransferError::File { .. }));
    }
}
