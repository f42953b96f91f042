//! Background relays running alongside the dispatch loop.

pub mod frames;
pub mod input;
#[cfg(target_os = "linux")]
pub mod packet;

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::MacAddr;
use crate::task::{CancelFlag, ErrorSlot, TaskHandle};

pub use frames::{FrameRx, FrameTx, RelayError};

/// Everything the frame relay needs to run.
#[derive(Debug, Clone)]
pub struct FrameRelayConfig {
    /// Host network interface name.
    pub iface: String,
    /// Pipe carrying frames out of the simulator.
    pub soc2eth: PathBuf,
    /// Pipe carrying frames into the simulator.
    pub eth2soc: PathBuf,
    /// Destination MAC written onto frames injected toward the simulator.
    pub inject_mac: MacAddr,
    /// Receive timeout on the packet socket; bounds cancellation latency.
    pub timeout: Duration,
}

/// Start both relay pumps. Sockets and the outbound pipe are opened here so
/// permission problems fail the session up front; the inbound pipe's write
/// end is opened inside its pump, where waiting for the simulator to attach
/// is cancellable.
#[cfg(target_os = "linux")]
pub fn start_frame_relay(
    config: &FrameRelayConfig,
    cancel: &CancelFlag,
    errors: &ErrorSlot,
) -> Result<Vec<TaskHandle>, RelayError> {
    use self::frames::{pump, FifoFrameRx, FifoFrameTx};
    use self::packet::PacketSocket;

    let soc_rx = FifoFrameRx::open(&config.soc2eth)?;
    let eth_tx = PacketSocket::open(&config.iface, config.timeout)?;
    let eth_rx = PacketSocket::open(&config.iface, config.timeout)?;

    let soc2eth = TaskHandle::spawn(
        "frame-relay-soc2eth",
        cancel.clone(),
        errors.clone(),
        move |flag| {
            pump(soc_rx, eth_tx, None, flag)?;
            Ok(())
        },
    )
    .map_err(RelayError::Io)?;

    let eth2soc_path = config.eth2soc.clone();
    let inject_mac = config.inject_mac;
    let eth2soc = TaskHandle::spawn(
        "frame-relay-eth2soc",
        cancel.clone(),
        errors.clone(),
        move |flag| {
            let soc_tx = FifoFrameTx::open(&eth2soc_path, flag)?;
            pump(eth_rx, soc_tx, Some(inject_mac), flag)?;
            Ok(())
        },
    )
    .map_err(RelayError::Io)?;

    Ok(vec![soc2eth, eth2soc])
}

#[cfg(not(target_os = "linux"))]
pub fn start_frame_relay(
    _config: &FrameRelayConfig,
    _cancel: &CancelFlag,
    _errors: &ErrorSlot,
) -> Result<Vec<TaskHandle>, RelayError> {
    Err(RelayError::Unsupported)
}
