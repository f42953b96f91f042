//! Raw AF_PACKET socket bound to one host interface (Linux only).

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::time::Duration;

use tracing::info;

use super::frames::{FrameRx, FrameTx, RelayError};

/// Raw packet socket carrying whole Ethernet frames.
///
/// The receive side has `SO_RCVTIMEO` set so a relay pump blocked in `recv`
/// wakes up regularly to check its cancellation flag.
pub struct PacketSocket {
    fd: RawFd,
    iface: String,
}

impl PacketSocket {
    pub fn open(iface: &str, read_timeout: Duration) -> Result<Self, RelayError> {
        let proto = (libc::ETH_P_ALL as u16).to_be();

        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, proto as libc::c_int) };
        if fd < 0 {
            return Err(RelayError::Socket(format!(
                "socket(AF_PACKET): {}",
                std::io::Error::last_os_error()
            )));
        }
        let socket = Self {
            fd,
            iface: iface.to_string(),
        };

        let name = CString::new(iface)
            .map_err(|_| RelayError::Socket(format!("bad interface name {iface:?}")))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(RelayError::Socket(format!(
                "no such interface {iface:?}: {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = proto;
        addr.sll_ifindex = ifindex as libc::c_int;

        let rc = unsafe {
            libc::bind(
                socket.fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(RelayError::Socket(format!(
                "bind {iface}: {}",
                std::io::Error::last_os_error()
            )));
        }

        let tv = libc::timeval {
            tv_sec: read_timeout.as_secs() as libc::time_t,
            tv_usec: read_timeout.subsec_micros() as libc::suseconds_t,
        };
        let rc = unsafe {
            libc::setsockopt(
                socket.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(RelayError::Socket(format!(
                "SO_RCVTIMEO: {}",
                std::io::Error::last_os_error()
            )));
        }

        info!(iface = %iface, "Packet socket bound");
        Ok(socket)
    }
}

impl FrameRx for PacketSocket {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RelayError> {
        let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            return match err.kind() {
                std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted => Ok(None),
                _ => Err(RelayError::Socket(format!("recv on {}: {err}", self.iface))),
            };
        }
        Ok(Some(n as usize))
    }
}

impl FrameTx for PacketSocket {
    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError> {
        let n = unsafe {
            libc::send(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if n < 0 {
            return Err(RelayError::Socket(format!(
                "send on {}: {}",
                self.iface,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
