//! File transfer module.
//!
//! `plain` moves payloads over the console transport itself; `ethernet`
//! moves them over a per-transfer TCP session while the name and size still
//! travel over the transport. Both share the framing helpers here.

pub mod ethernet;
pub mod plain;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::trace;

use crate::protocol::constants::{ACK, MAX_NAME_LEN, NUL, SIZE_FIELD_LEN};
use crate::transport::{ConsoleTransport, TransportError};

pub use ethernet::EthernetEndpoint;

/// A malformed multi-byte payload. Stray single bytes are never errors (the
/// dispatcher prints them), so desync only exists for truncated fields.
#[derive(Error, Debug)]
pub enum ProtocolDesyncError {
    #[error("size field truncated: got {got} of {SIZE_FIELD_LEN} bytes")]
    TruncatedSize { got: usize },

    #[error("file name not terminated after {got} bytes")]
    UnterminatedName { got: usize },
}

/// A failure local to one transfer. Recovered at the dispatch boundary
/// unless it wraps a fatal transport condition.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("file {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },

    #[error("file too large for 32-bit size field: {size} bytes")]
    TooLarge { size: u64 },

    #[error(transparent)]
    Desync(#[from] ProtocolDesyncError),

    #[error("ethernet endpoint: {0}")]
    Endpoint(String),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TransferError {
    /// True when the underlying transport is unusable and the session must
    /// shut down instead of resuming dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::Transport(TransportError::Disconnected)
        )
    }
}

/// Read one byte, looping over retryable timeouts.
pub(crate) fn read_blocking<T: ConsoleTransport + ?Sized>(
    transport: &T,
) -> Result<u8, TransportError> {
    loop {
        match transport.read_byte() {
            Err(TransportError::Timeout) => continue,
            other => return other,
        }
    }
}

/// Read the NUL-terminated file name from the transport.
pub fn recv_name<T: ConsoleTransport + ?Sized>(transport: &T) -> Result<String, TransferError> {
    let mut bytes = Vec::new();
    loop {
        let b = match read_blocking(transport) {
            Ok(b) => b,
            Err(TransportError::Disconnected) => {
                return Err(TransportError::Disconnected.into());
            }
            Err(_) => {
                return Err(ProtocolDesyncError::UnterminatedName { got: bytes.len() }.into());
            }
        };
        if b == NUL {
            break;
        }
        bytes.push(b);
        if bytes.len() > MAX_NAME_LEN {
            return Err(ProtocolDesyncError::UnterminatedName { got: bytes.len() }.into());
        }
    }
    // Names are 8-bit text; map each byte to its Latin-1 code point.
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Read the 4-byte little-endian size field from the transport.
pub(crate) fn read_size<T: ConsoleTransport + ?Sized>(transport: &T) -> Result<u32, TransferError> {
    let mut buf = [0u8; SIZE_FIELD_LEN];
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = match read_blocking(transport) {
            Ok(b) => b,
            Err(TransportError::Disconnected) => {
                return Err(TransportError::Disconnected.into());
            }
            Err(_) => return Err(ProtocolDesyncError::TruncatedSize { got: i }.into()),
        };
    }
    Ok(LittleEndian::read_u32(&buf))
}

/// Encode the 4-byte little-endian size field.
pub(crate) fn size_field(size: u32) -> [u8; SIZE_FIELD_LEN] {
    let mut buf = [0u8; SIZE_FIELD_LEN];
    LittleEndian::write_u32(&mut buf, size);
    buf
}

/// Block until the target answers ACK. Anything else on the wire before the
/// ACK is skipped, matching the target's own loose framing.
pub(crate) fn await_ack<T: ConsoleTransport + ?Sized>(transport: &T) -> Result<(), TransferError> {
    loop {
        let b = read_blocking(transport).map_err(TransferError::Transport)?;
        if b == ACK {
            return Ok(());
        }
        trace!(byte = b, "Skipping byte while waiting for ACK");
    }
}
