//! Ethernet-session file transfer.
//!
//! The request byte, the file name and the 4-byte size still travel over the
//! console transport; only the payload streams over a TCP connection to the
//! target's companion process, opened fresh for each transfer. A one-byte
//! direction handshake decides who streams first: the sender runs
//! `sync_ack_first` (SYN out, ACK back), the receiver `sync_ack_last`
//! (SYN in, ACK out). The socket is dropped unconditionally on exit.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::protocol::constants::{ACK, SYN};
use crate::protocol::MacAddr;
use crate::session::SessionConfig;
use crate::transport::{ConsoleTransport, TransportWriter};

use super::{await_ack, read_size, size_field, TransferError};

/// Where and how to reach the target's Ethernet companion.
#[derive(Debug, Clone)]
pub struct EthernetEndpoint {
    pub addr: SocketAddr,
    pub peer_mac: MacAddr,
    pub iface: String,
    pub timeout: Duration,
}

impl EthernetEndpoint {
    /// Build an endpoint from session configuration. One instance per
    /// transfer; a bad config fails the transfer, not the session.
    pub fn from_config(config: &SessionConfig) -> Result<Self, TransferError> {
        let addr = config
            .eth_addr
            .to_socket_addrs()
            .map_err(|e| TransferError::Endpoint(format!("{}: {e}", config.eth_addr)))?
            .next()
            .ok_or_else(|| {
                TransferError::Endpoint(format!("{} resolves to nothing", config.eth_addr))
            })?;
        let peer_mac: MacAddr = config
            .console_mac
            .parse()
            .map_err(|e| TransferError::Endpoint(format!("{e}")))?;
        Ok(Self {
            addr,
            peer_mac,
            iface: config.eth_iface.clone().unwrap_or_default(),
            timeout: Duration::from_millis(config.socket_timeout_ms),
        })
    }

    /// Open the per-transfer TCP connection.
    pub fn connect(&self) -> Result<TcpStream, TransferError> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)
            .map_err(|e| TransferError::Endpoint(format!("connect {}: {e}", self.addr)))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| TransferError::Endpoint(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransferError::Endpoint(e.to_string()))?;
        debug!(addr = %self.addr, "Ethernet session connected");
        Ok(stream)
    }
}

/// Sender side of the direction handshake: SYN out, wait for ACK.
pub fn sync_ack_first(stream: &mut TcpStream) -> Result<(), TransferError> {
    stream
        .write_all(&[SYN])
        .map_err(|e| TransferError::Stream(format!("sync write: {e}")))?;
    let mut buf = [0u8; 1];
    stream
        .read_exact(&mut buf)
        .map_err(|e| TransferError::Stream(format!("sync reply: {e}")))?;
    if buf[0] != ACK {
        return Err(TransferError::Stream(format!(
            "unexpected sync reply 0x{:02x}",
            buf[0]
        )));
    }
    Ok(())
}

/// Receiver side of the direction handshake: wait for SYN, answer ACK.
pub fn sync_ack_last(stream: &mut TcpStream) -> Result<(), TransferError> {
    let mut buf = [0u8; 1];
    stream
        .read_exact(&mut buf)
        .map_err(|e| TransferError::Stream(format!("sync read: {e}")))?;
    if buf[0] != SYN {
        return Err(TransferError::Stream(format!(
            "unexpected sync byte 0x{:02x}",
            buf[0]
        )));
    }
    stream
        .write_all(&[ACK])
        .map_err(|e| TransferError::Stream(format!("sync ack: {e}")))?;
    Ok(())
}

/// Send a local file to the target over an Ethernet session (EFRX).
pub fn send_file_session<T: ConsoleTransport + ?Sized>(
    transport: &T,
    writer: &TransportWriter,
    endpoint: &EthernetEndpoint,
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

    info!(file = %name, bytes = size, "Sending file size for ethernet transfer");
    writer.send(size_field(size32).to_vec())?;
    writer.flush()?;
    await_ack(transport)?;

    let mut stream = endpoint.connect()?;
    sync_ack_first(&mut stream)?;

    let sent = std::io::copy(&mut file, &mut stream)
        .map_err(|e| TransferError::Stream(format!("payload: {e}")))?;
    debug!(file = %name, bytes = sent, "Ethernet payload sent");
    Ok(sent)
}

/// Receive a file from the target over an Ethernet session (EFTX).
pub fn receive_file_session<T: ConsoleTransport + ?Sized>(
    transport: &T,
    endpoint: &EthernetEndpoint,
    name: &str,
) -> Result<u64, TransferError> {
    let size = read_size(transport)?;
    info!(file = %name, bytes = size, "Receiving file over ethernet");

    let mut stream = endpoint.connect()?;
    sync_ack_last(&mut stream)?;

    let mut file = File::create(name).map_err(|e| TransferError::File {
        path: name.to_string(),
        source: e,
    })?;
    let copied = std::io::copy(&mut (&mut stream).take(size as u64), &mut file)
        .map_err(|e| TransferError::Stream(format!("payload: {e}")))?;
    if copied != size as u64 {
        return Err(TransferError::Stream(format!(
            "connection closed mid-transfer: got {copied} of {size} bytes"
        )));
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{writer, MockTransport};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    fn endpoint_for(addr: SocketAddr) -> EthernetEndpoint {
        EthernetEndpoint {
            addr,
            peer_mac: "88431eafa897".parse().unwrap(),
            iface: String::new(),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_receive_session_preserves_content() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Companion: announce SYN, wait for ACK, stream the payload.
        let companion = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(&[SYN]).unwrap();
            let mut buf = [0u8; 1];
            sock.read_exact(&mut buf).unwrap();
            assert_eq!(buf[0], ACK);
            sock.write_all(b"ethernet payload").unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eth.bin");
        let mock = MockTransport::new();
        mock.queue_bytes(&size_field(16));

        let got =
            receive_file_session(&mock, &endpoint_for(addr), path.to_str().unwrap()).unwrap();
        companion.join().unwrap();

        assert_eq!(got, 16);
        assert_eq!(std::fs::read(&path).unwrap(), b"ethernet payload");
    }

    #[test]
    fn test_receive_session_disconnect_mid_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Companion drops the socket after half the promised payload.
        let companion = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(&[SYN]).unwrap();
            let mut buf = [0u8; 1];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(b"half").unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");
        let mock = MockTransport::new();
        mock.queue_bytes(&size_field(8));

        let err = receive_file_session(&mock, &endpoint_for(addr), path.to_str().unwrap())
            .unwrap_err();
        companion.join().unwrap();

        assert!(matches!(err, TransferError::Stream(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_send_session_streams_after_sync() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let companion = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1];
            sock.read_exact(&mut buf).unwrap();
            assert_eq!(buf[0], SYN);
            sock.write_all(&[ACK]).unwrap();
            let mut payload = Vec::new();
            sock.read_to_end(&mut payload).unwrap();
            payload
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("send.bin");
        std::fs::write(&path, b"outbound data").unwrap();

        let mock = Arc::new(MockTransport::new());
        mock.queue_bytes(&[ACK]);
        let (tx, join) = writer::spawn(Arc::clone(&mock) as Arc<dyn ConsoleTransport>).unwrap();

        let sent = send_file_session(
            mock.as_ref(),
            &tx,
            &endpoint_for(addr),
            path.to_str().unwrap(),
        )
        .unwrap();
        tx.shutdown();
        join.join().unwrap();

        assert_eq!(sent, 13);
        assert_eq!(companion.join().unwrap(), b"outbound data");
        assert_eq!(mock.written(), size_field(13).to_vec());
    }

    #[test]
    fn test_connect_refused_is_transfer_error() {
        // Bind then drop to get an address nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = endpoint_for(addr).connect().unwrap_err();
        assert!(matches!(err, TransferError::Endpoint(_)));
    }
}
