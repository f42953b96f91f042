//! Transport layer abstraction.
//!
//! Defines the `ConsoleTransport` trait for the byte channel to the target,
//! allowing different backends (serial device, simulation FIFOs, mock).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("transport closed by peer")]
    Disconnected,

    #[error("read timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte channel to the target.
///
/// The read and write directions are independent: the dispatcher blocks on
/// `read_byte` while the writer task drains the write side concurrently.
/// Implementations must not let the two directions contend on one handle.
pub trait ConsoleTransport: Send + Sync {
    /// Read one byte, blocking until it arrives.
    ///
    /// `Timeout` is retryable; callers loop on it. `Disconnected` means the
    /// channel is unusable and the session must shut down.
    fn read_byte(&self) -> Result<u8, TransportError>;

    /// Write raw bytes to the target.
    fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Check whether the underlying channel is still usable.
    fn is_open(&self) -> bool;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}
