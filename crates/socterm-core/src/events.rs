//! Event system for UI decoupling.
//!
//! Lets a frontend observe session activity without coupling it to the
//! dispatch loop. Pass-through console bytes are not events; they go straight
//! to the console sink, unbuffered.

use std::fmt;

/// Which way a file transfer moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    TargetToHost,
    HostToTarget,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::TargetToHost => write!(f, "target->host"),
            TransferDirection::HostToTarget => write!(f, "host->target"),
        }
    }
}

/// Which channel carries the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferChannel {
    Transport,
    Ethernet,
}

impl fmt::Display for TransferChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferChannel::Transport => write!(f, "transport"),
            TransferChannel::Ethernet => write!(f, "ethernet"),
        }
    }
}

/// Events emitted by a console session.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    /// Session started on the named transport.
    SessionStarted { transport: String },
    /// ENQ/ACK handshake completed.
    HandshakeComplete,
    /// A duplicate ENQ arrived after the handshake and was ignored.
    EnqIgnored,
    /// A file transfer began.
    TransferStarted {
        name: String,
        direction: TransferDirection,
        channel: TransferChannel,
    },
    /// A file transfer finished.
    TransferCompleted {
        name: String,
        bytes: u64,
        direction: TransferDirection,
        channel: TransferChannel,
    },
    /// A file transfer was aborted; the session continues.
    TransferFailed { name: String, reason: String },
    /// The session switched to raw terminal pass-through.
    TerminalMode,
    /// The frame relay was started on the named interface.
    RelayStarted { iface: String },
    /// A background task failed.
    BackgroundError { task: String, message: String },
    /// EOT received; the session is shutting down.
    Exiting,
}

/// Observer trait for receiving console events.
pub trait ConsoleObserver: Send + Sync {
    fn on_event(&self, event: &ConsoleEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ConsoleObserver for NullObserver {
    fn on_event(&self, _event: &ConsoleEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ConsoleObserver for TracingObserver {
    fn on_event(&self, event: &ConsoleEvent) {
        match event {
            ConsoleEvent::SessionStarted { transport } => {
                tracing::info!(transport = %transport, "Session started");
            }
            ConsoleEvent::HandshakeComplete => {
                tracing::info!("Handshake complete, ACK sent");
            }
            ConsoleEvent::EnqIgnored => {
                tracing::debug!("Duplicate ENQ ignored");
            }
            ConsoleEvent::TransferStarted {
                name,
                direction,
                channel,
            } => {
                tracing::info!(file = %name, direction = %direction, channel = %channel, "Transfer started");
            }
            ConsoleEvent::TransferCompleted {
                name,
                bytes,
                direction,
                channel,
            } => {
                tracing::info!(file = %name, bytes = bytes, direction = %direction, channel = %channel, "Transfer complete");
            }
            ConsoleEvent::TransferFailed { name, reason } => {
                tracing::error!(file = %name, reason = %reason, "Transfer failed");
            }
            ConsoleEvent::TerminalMode => {
                tracing::info!("Entering terminal pass-through mode");
            }
            ConsoleEvent::RelayStarted { iface } => {
                tracing::info!(iface = %iface, "Frame relay started");
            }
            ConsoleEvent::BackgroundError { task, message } => {
                tracing::error!(task = %task, "Background task failed: {}", message);
            }
            ConsoleEvent::Exiting => {
                tracing::info!("EOT received, exiting");
            }
        }
    }
}
