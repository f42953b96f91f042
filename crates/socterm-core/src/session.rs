//! Console session - high-level orchestrator.
//!
//! Owns the transport, the writer task, the dispatch loop and every
//! background task, and tears all of it down on EOT or on a transport
//! failure. One `Session` per process run.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::dispatch::{handle_byte, DispatchContext, DispatchState, HandleResult, SessionState};
use crate::events::{ConsoleEvent, ConsoleObserver, TracingObserver};
use crate::hooks::{NullHooks, SessionHooks};
use crate::protocol::constants::{
    DEFAULT_CONSOLE_MAC, DEFAULT_ETH2SOC_FIFO, DEFAULT_ETH_ADDR, DEFAULT_INJECT_MAC,
    DEFAULT_RX_FIFO, DEFAULT_SOC2ETH_FIFO, DEFAULT_SOCKET_TIMEOUT_MS, DEFAULT_TX_FIFO,
};
use crate::protocol::MacAddr;
use crate::relay::{self, FrameRelayConfig};
use crate::task::{CancelFlag, ErrorSlot, TaskHandle};
use crate::transport::{
    writer, ConsoleTransport, FifoTransport, SerialTransport, TransportError, TransportWriter,
};

/// Configuration for a console session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device path; absent means simulation mode over FIFOs.
    pub serial_device: Option<String>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// FIFO carrying target output to the console (simulation mode).
    pub rx_fifo: PathBuf,
    /// FIFO carrying console input to the target (simulation mode).
    pub tx_fifo: PathBuf,
    /// Host network interface for Ethernet transfers and the frame relay.
    pub eth_iface: Option<String>,
    /// MAC address the console identifies itself with.
    pub console_mac: String,
    /// Destination MAC written onto frames injected toward the simulator.
    pub inject_mac: String,
    /// Pipe carrying frames out of the simulator.
    pub soc2eth_fifo: PathBuf,
    /// Pipe carrying frames into the simulator.
    pub eth2soc_fifo: PathBuf,
    /// TCP address of the Ethernet-session companion process.
    pub eth_addr: String,
    /// Socket timeout in milliseconds (connect, read).
    pub socket_timeout_ms: u64,
    /// Tunnel the simulated network interface onto the host network.
    pub tunnel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serial_device: None,
            baud_rate: 115_200,
            rx_fifo: PathBuf::from(DEFAULT_RX_FIFO),
            tx_fifo: PathBuf::from(DEFAULT_TX_FIFO),
            eth_iface: None,
            console_mac: DEFAULT_CONSOLE_MAC.to_string(),
            inject_mac: DEFAULT_INJECT_MAC.to_string(),
            soc2eth_fifo: PathBuf::from(DEFAULT_SOC2ETH_FIFO),
            eth2soc_fifo: PathBuf::from(DEFAULT_ETH2SOC_FIFO),
            eth_addr: DEFAULT_ETH_ADDR.to_string(),
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            tunnel: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.as_ref().display()))?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// True when driving a simulation instead of a real device.
    pub fn is_simulation(&self) -> bool {
        self.serial_device.is_none()
    }

    fn open_transport(&self) -> Result<Arc<dyn ConsoleTransport>, TransportError> {
        match &self.serial_device {
            Some(device) => Ok(Arc::new(SerialTransport::open(device, self.baud_rate)?)),
            None => Ok(Arc::new(FifoTransport::open(&self.rx_fifo, &self.tx_fifo)?)),
        }
    }

    fn frame_relay_config(&self) -> Result<FrameRelayConfig> {
        let iface = self
            .eth_iface
            .clone()
            .ok_or_else(|| anyhow!("--tunnel requires an interface name"))?;
        let inject_mac: MacAddr = self
            .inject_mac
            .parse()
            .map_err(|e| anyhow!("inject MAC: {e}"))?;
        Ok(FrameRelayConfig {
            iface,
            soc2eth: self.soc2eth_fifo.clone(),
            eth2soc: self.eth2soc_fifo.clone(),
            inject_mac,
            timeout: Duration::from_millis(self.socket_timeout_ms),
        })
    }
}

/// Console session.
pub struct Session<O: ConsoleObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    hooks: Arc<dyn SessionHooks>,
}

impl Session<TracingObserver> {
    /// Create a session with the default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: ConsoleObserver + 'static> Session<O> {
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            hooks: Arc::new(NullHooks),
        }
    }

    /// Install deployment hooks; defaults to no-ops.
    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run the session until EOT or a fatal transport error.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<()> {
        self.hooks.on_session_start();

        let transport = self.config.open_transport()?;
        self.observer.on_event(&ConsoleEvent::SessionStarted {
            transport: transport.describe(),
        });

        let errors = ErrorSlot::new();
        let (writer, writer_join) = writer::spawn(Arc::clone(&transport))?;

        let mut tasks: Vec<TaskHandle> = Vec::new();
        if self.config.tunnel {
            if !self.config.is_simulation() {
                warn!("Tunnel flag ignored outside simulation mode");
            } else {
                let relay_config = self.config.frame_relay_config()?;
                self.hooks.on_ethernet_tunnel_start();
                let relay_tasks =
                    relay::start_frame_relay(&relay_config, &CancelFlag::new(), &errors)
                        .context("starting frame relay")?;
                tasks.extend(relay_tasks);
                self.observer.on_event(&ConsoleEvent::RelayStarted {
                    iface: relay_config.iface,
                });
            }
        }

        let result = self.dispatch_loop(transport.as_ref(), &writer, &errors, &mut tasks);

        // Teardown runs on every exit path. Errors raised past this point
        // are cancellation fallout, not session failures.
        info!("Shutting down session");
        errors.close();
        for task in tasks.drain(..) {
            task.shutdown();
        }
        writer.shutdown();
        if writer_join.join().is_err() {
            error!("Transport writer panicked");
        }
        self.hooks.on_session_end();

        result?;
        if let Some(e) = writer.take_error() {
            return Err(anyhow::Error::new(e).context("transport writer"));
        }
        if let Some((task, e)) = errors.take() {
            return Err(e.context(format!("background task {task}")));
        }
        Ok(())
    }

    fn dispatch_loop(
        &self,
        transport: &dyn ConsoleTransport,
        writer: &TransportWriter,
        errors: &ErrorSlot,
        tasks: &mut Vec<TaskHandle>,
    ) -> Result<()> {
        let mut state = DispatchState::new();
        let mut stdout = std::io::stdout();

        loop {
            if let Some((task, e)) = errors.take() {
                self.observer.on_event(&ConsoleEvent::BackgroundError {
                    task: task.to_string(),
                    message: format!("{e:#}"),
                });
                return Err(e.context(format!("background task {task}")));
            }

            let byte = match transport.read_byte() {
                Ok(b) => b,
                Err(TransportError::Timeout) => continue,
                Err(e) => {
                    error!(error = %e, "Transport failed, terminating session");
                    return Err(e.into());
                }
            };

            let mut ctx = DispatchContext {
                transport,
                writer,
                observer: self.observer.as_ref(),
                hooks: self.hooks.as_ref(),
                state: &mut state,
                config: &self.config,
                console: &mut stdout,
            };

            match handle_byte(byte, &mut ctx)? {
                HandleResult::Continue => {}
                HandleResult::TerminalMode => {
                    let cancel = CancelFlag::new();
                    tasks.push(relay::input::start(writer.clone(), cancel)?);
                    state.goto_state(SessionState::TerminalPassthrough);
                    info!("Start reading user input");
                }
                HandleResult::Shutdown => {
                    info!(transfers = state.transfers_completed, "Dispatch finished");
                    let _ = stdout.flush();
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.is_simulation());
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.rx_fifo, PathBuf::from("soc2cnsl"));
        assert_eq!(config.socket_timeout_ms, 100);
        assert!(!config.tunnel);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socterm.toml");

        let mut config = SessionConfig::default();
        config.serial_device = Some("/dev/ttyUSB0".to_string());
        config.tunnel = true;
        config.eth_iface = Some("eth0".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.serial_device.as_deref(), Some("/dev/ttyUSB0"));
        assert!(loaded.tunnel);
        assert_eq!(loaded.eth_iface.as_deref(), Some("eth0"));
        assert!(!loaded.is_simulation());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "baud_rate = 57600\n").unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.baud_rate, 57_600);
        assert_eq!(loaded.console_mac, DEFAULT_CONSOLE_MAC);
    }

    #[cfg(unix)]
    #[test]
    fn test_session_runs_to_eot_over_fifos() {
        use crate::events::NullObserver;
        use crate::protocol::constants::{ACK, ENQ, EOT};
        use std::io::{Read, Write};

        fn mkfifo(path: &std::path::Path) {
            use std::os::unix::ffi::OsStrExt;
            let c = std::ffi::CString::new(path.as_os_str().as_bytes()).unwrap();
            assert_eq!(unsafe { libc::mkfifo(c.as_ptr(), 0o600) }, 0);
        }

        let dir = tempfile::tempdir().unwrap();
        let rx = dir.path().join("soc2cnsl");
        let tx = dir.path().join("cnsl2soc");
        mkfifo(&rx);
        mkfifo(&tx);

        // Two full cycles over the same pipes: handshake, EOT, clean return.
        for _ in 0..2 {
            let (rx_t, tx_t) = (rx.clone(), tx.clone());
            let target = std::thread::spawn(move || {
                let mut w = std::fs::OpenOptions::new().write(true).open(&rx_t).unwrap();
                let mut r = std::fs::File::open(&tx_t).unwrap();
                w.write_all(&[ENQ]).unwrap();
                let mut ack = [0u8; 1];
                r.read_exact(&mut ack).unwrap();
                w.write_all(&[EOT]).unwrap();
                ack[0]
            });

            let mut config = SessionConfig::default();
            config.rx_fifo = rx.clone();
            config.tx_fifo = tx.clone();
            let mut session = Session::with_observer(config, Arc::new(NullObserver));
            session.run().unwrap();

            assert_eq!(target.join().unwrap(), ACK);
        }
    }

    #[test]
    fn test_frame_relay_config_requires_iface() {
        let mut config = SessionConfig::default();
        config.tunnel = true;
        assert!(config.frame_relay_config().is_err());

        config.eth_iface = Some("tap0".to_string());
        let relay = config.frame_relay_config().unwrap();
        assert_eq!(relay.iface, "tap0");
        assert_eq!(relay.inject_mac.octets(), [0x01, 0x60, 0x6e, 0x11, 0x02, 0x0f]);
    }
}
