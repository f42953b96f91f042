//! Serial-device transport backed by the `serialport` crate.

use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use super::traits::{ConsoleTransport, TransportError};

/// Read timeout on the device handle. The dispatcher treats `Timeout` as
/// retryable, so this only bounds how often the loop wakes up.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial transport.
///
/// One device, two cloned handles: the dispatcher reads on one while the
/// writer task writes on the other, so the directions never share a lock.
pub struct SerialTransport {
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    device: String,
}

impl SerialTransport {
    pub fn open(device: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                path: device.to_string(),
                message: e.to_string(),
            })?;

        let writer = port.try_clone().map_err(|e| TransportError::OpenFailed {
            path: device.to_string(),
            message: format!("cannot clone handle: {e}"),
        })?;

        info!(device = %device, baud = baud, "Serial port opened");

        Ok(Self {
            reader: Mutex::new(port),
            writer: Mutex::new(writer),
            device: device.to_string(),
        })
    }
}

impl ConsoleTransport for SerialTransport {
    fn read_byte(&self) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        let mut port = self.reader.lock().unwrap();
        match port.read(&mut buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(_) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut port = self.writer.lock().unwrap();
        port.write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        port.flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes = data.len(), "Serial write complete");
        Ok(())
    }

    fn is_open(&self) -> bool {
        // serialport reports disconnection through read/write errors.
        true
    }

    fn describe(&self) -> String {
        format!("serial {}", self.device)
    }
}
