use std::sync::Arc;

use clap::Parser;
use socterm_core::{Session, SessionConfig};
use tracing::{error, info};

mod raw_mode;

use raw_mode::TerminalHooks;

#[derive(Parser, Debug)]
#[command(author, version, about = "SoC console bridge", long_about = None)]
struct Args {
    /// Serial device to attach to (e.g. /dev/ttyUSB0); omit for simulation mode
    #[arg(short, long)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// FIFO carrying target output (simulation mode)
    #[arg(long)]
    rx_fifo: Option<String>,

    /// FIFO carrying target input (simulation mode)
    #[arg(long)]
    tx_fifo: Option<String>,

    /// Host network interface for Ethernet transfers and tunneling
    #[arg(short, long)]
    iface: Option<String>,

    /// MAC address this console identifies itself with
    #[arg(long)]
    console_mac: Option<String>,

    /// Destination MAC rewritten onto frames injected toward the simulator
    #[arg(long)]
    inject_mac: Option<String>,

    /// Pipe carrying frames out of the simulator
    #[arg(long)]
    soc2eth_fifo: Option<String>,

    /// Pipe carrying frames into the simulator
    #[arg(long)]
    eth2soc_fifo: Option<String>,

    /// TCP address of the Ethernet transfer companion
    #[arg(long)]
    eth_addr: Option<String>,

    /// Socket timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Tunnel the simulated network interface onto the host interface
    #[arg(short, long)]
    tunnel: bool,

    /// Load settings from a TOML config file; flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)?,
            None => SessionConfig::default(),
        };

        if self.serial.is_some() {
            config.serial_device = self.serial;
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(p) = self.rx_fifo {
            config.rx_fifo = p.into();
        }
        if let Some(p) = self.tx_fifo {
            config.tx_fifo = p.into();
        }
        if self.iface.is_some() {
            config.eth_iface = self.iface;
        }
        if let Some(mac) = self.console_mac {
            config.console_mac = mac;
        }
        if let Some(mac) = self.inject_mac {
            config.inject_mac = mac;
        }
        if let Some(p) = self.soc2eth_fifo {
            config.soc2eth_fifo = p.into();
        }
        if let Some(p) = self.eth2soc_fifo {
            config.eth2soc_fifo = p.into();
        }
        if let Some(addr) = self.eth_addr {
            config.eth_addr = addr;
        }
        if let Some(ms) = self.timeout_ms {
            config.socket_timeout_ms = ms;
        }
        if self.tunnel {
            config.tunnel = true;
        }
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting socterm...");

    let config = match args.into_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let mut session = Session::new(config).with_hooks(Arc::new(TerminalHooks::new()));
    if let Err(e) = session.run() {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}
