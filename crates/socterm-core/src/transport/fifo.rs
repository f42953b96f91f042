//! Simulation-channel transport over a pair of named pipes.
//!
//! The simulator writes console output into one FIFO and reads console input
//! from the other. Each direction is opened independently so the dispatcher
//! and the writer task never contend on the same handle.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::traits::{ConsoleTransport, TransportError};

/// Reads give up after this long so the session loop can poll for
/// background failures, matching the serial backend.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct FifoTransport {
    reader: Mutex<File>,
    writer: Mutex<File>,
    read_path: PathBuf,
    write_path: PathBuf,
    open: AtomicBool,
}

impl FifoTransport {
    /// Open the simulation channel.
    ///
    /// FIFO opens block until the peer attaches its end. The simulator side
    /// opens its read end (our write pipe) first, so we open read-then-write
    /// to pair up without deadlocking.
    pub fn open(read_path: &Path, write_path: &Path) -> Result<Self, TransportError> {
        let reader = File::open(read_path).map_err(|e| TransportError::OpenFailed {
            path: read_path.display().to_string(),
            message: e.to_string(),
        })?;
        let writer = OpenOptions::new().write(true).open(write_path).map_err(|e| {
            TransportError::OpenFailed {
                path: write_path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        // The blocking open guaranteed a writer existed; switch the read end
        // to non-blocking afterwards so reads can time out instead of
        // stalling the session loop until the simulator speaks.
        #[cfg(unix)]
        set_nonblocking(&reader).map_err(|e| TransportError::OpenFailed {
            path: read_path.display().to_string(),
            message: e.to_string(),
        })?;

        info!(
            rx = %read_path.display(),
            tx = %write_path.display(),
            "Simulation FIFOs opened"
        );

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_path: read_path.to_path_buf(),
            write_path: write_path.to_path_buf(),
            open: AtomicBool::new(true),
        })
    }
}

#[cfg(unix)]
fn set_nonblocking(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl ConsoleTransport for FifoTransport {
    fn read_byte(&self) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            let mut file = self.reader.lock().unwrap();
            match file.read(&mut buf) {
                // EOF on a FIFO means the simulator closed its end.
                Ok(0) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(TransportError::Disconnected);
                }
                Ok(_) => return Ok(buf[0]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::Interrupted =>
                {
                    drop(file);
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReadFailed(e.to_string()));
                }
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut file = self.writer.lock().unwrap();
        file.write_all(data).map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            TransportError::WriteFailed(e.to_string())
        })?;
        file.flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes = data.len(), "FIFO write complete");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!(
            "fifo {} / {}",
            self.read_path.display(),
            self.write_path.display()
        )
    }
}
