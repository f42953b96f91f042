//! Ethernet frame relay between the simulated target and a real interface.
//!
//! Two independent pumps, one per direction:
//!
//! - soc -> eth: frames read from the `soc2eth` FIFO go to the host
//!   interface unmodified.
//! - eth -> soc: frames captured on the host interface go to the `eth2soc`
//!   FIFO with their destination MAC rewritten to the configured inject MAC.
//!
//! FIFOs are byte streams, so frames on the pipes carry a 2-byte LE length
//! prefix. Each pump polls its cancellation flag between reads so session
//! teardown can stop and join it.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::protocol::constants::{ETH_HEADER_LEN, MAX_FRAME_LEN};
use crate::protocol::MacAddr;
use crate::task::CancelFlag;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too short for an ethernet header: {len} bytes")]
    InvalidFrame { len: usize },

    #[error("packet socket: {0}")]
    Socket(String),

    #[error("cancelled while waiting for pipe peer: {path}")]
    Cancelled { path: String },

    #[error("frame relay is only supported on Linux")]
    Unsupported,
}

/// Source of complete frames. `Ok(None)` means nothing arrived yet; the pump
/// re-checks its cancellation flag and retries.
pub trait FrameRx: Send {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RelayError>;
}

/// Sink for complete frames.
pub trait FrameTx: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError>;
}

/// Overwrite the destination MAC field (bytes 0..6) in place.
pub fn rewrite_dest_mac(frame: &mut [u8], mac: MacAddr) -> Result<(), RelayError> {
    if frame.len() < ETH_HEADER_LEN {
        return Err(RelayError::InvalidFrame { len: frame.len() });
    }
    frame[..6].copy_from_slice(&mac.octets());
    Ok(())
}

/// Move frames from `rx` to `tx` until cancelled. Length validation only;
/// payload and CRC are the frame producer's concern.
pub fn pump<R: FrameRx, T: FrameTx>(
    mut rx: R,
    mut tx: T,
    rewrite: Option<MacAddr>,
    cancel: &CancelFlag,
) -> Result<(), RelayError> {
    let mut buf = [0u8; MAX_FRAME_LEN];
    while !cancel.is_cancelled() {
        let n = match rx.recv(&mut buf)? {
            Some(n) => n,
            None => continue,
        };
        if n < ETH_HEADER_LEN || n > MAX_FRAME_LEN {
            warn!(len = n, "Dropping frame with bad length");
            continue;
        }
        if let Some(mac) = rewrite {
            rewrite_dest_mac(&mut buf[..n], mac)?;
        }
        tx.send(&buf[..n])?;
        trace!(len = n, rewritten = rewrite.is_some(), "Frame relayed");
    }
    debug!("Frame pump cancelled");
    Ok(())
}

/// Length prefix on the pipe: 2-byte LE frame length.
const LEN_PREFIX: usize = 2;

/// How long a pump sleeps when its source has nothing yet.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Frame source reading length-prefixed frames from a FIFO.
///
/// The FIFO is opened non-blocking so the pump stays cancellable; partial
/// frames accumulate in an internal buffer until complete.
pub struct FifoFrameRx {
    file: std::fs::File,
    pending: Vec<u8>,
    path: PathBuf,
}

#[cfg(unix)]
impl FifoFrameRx {
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        use std::os::unix::fs::OpenOptionsExt;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(Self {
            file,
            pending: Vec::new(),
            path: path.to_path_buf(),
        })
    }
}

impl FrameRx for FifoFrameRx {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RelayError> {
        // Flush a complete frame out of the accumulator first.
        if let Some(n) = self.take_frame(buf)? {
            return Ok(Some(n));
        }

        let mut chunk = [0u8; 4096];
        match self.file.read(&mut chunk) {
            // No writer attached yet, or the writer went away; either way
            // there is nothing to read right now.
            Ok(0) => {
                std::thread::sleep(POLL_INTERVAL);
                Ok(None)
            }
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                self.take_frame(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl FifoFrameRx {
    fn take_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RelayError> {
        if self.pending.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = LittleEndian::read_u16(&self.pending[..LEN_PREFIX]) as usize;
        if len > MAX_FRAME_LEN {
            warn!(path = %self.path.display(), len = len, "Oversized frame on pipe, resyncing");
            self.pending.clear();
            return Ok(None);
        }
        if self.pending.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        buf[..len].copy_from_slice(&self.pending[LEN_PREFIX..LEN_PREFIX + len]);
        self.pending.drain(..LEN_PREFIX + len);
        Ok(Some(len))
    }
}

/// Frame sink writing length-prefixed frames into a FIFO.
pub struct FifoFrameTx {
    file: std::fs::File,
}

#[cfg(unix)]
impl FifoFrameTx {
    /// Open the write end. A FIFO write-open fails until a reader exists, so
    /// retry until the simulator attaches or the relay is cancelled.
    pub fn open(path: &Path, cancel: &CancelFlag) -> Result<Self, RelayError> {
        use std::os::unix::fs::OpenOptionsExt;
        loop {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled {
                    path: path.display().to_string(),
                });
            }
            match std::fs::OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
            {
                Ok(file) => return Ok(Self { file }),
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl FrameTx for FifoFrameTx {
    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError> {
        let mut prefix = [0u8; LEN_PREFIX];
        LittleEndian::write_u16(&mut prefix, frame.len() as u16);
        write_all_retry(&mut self.file, &prefix)?;
        write_all_retry(&mut self.file, frame)?;
        self.file.flush()?;
        Ok(())
    }
}

/// `write_all` that rides out a full non-blocking pipe.
fn write_all_retry(file: &mut std::fs::File, mut data: &[u8]) -> Result<(), RelayError> {
    while !data.is_empty() {
        match file.write(data) {
            Ok(0) => {
                return Err(RelayError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "pipe accepts no data",
                )))
            }
            Ok(n) => data = &data[n..],
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
