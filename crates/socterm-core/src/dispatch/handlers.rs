//! Command dispatch: one control byte in, one action out.
//!
//! The default branch prints the byte and continues, so the protocol heals
//! itself after any stray byte; only the listed control codes do more.

use std::io::Write;

use tracing::{debug, error, info};

use crate::events::{
    ConsoleEvent, ConsoleObserver, TransferChannel, TransferDirection,
};
use crate::hooks::SessionHooks;
use crate::protocol::constants::{self, DC1, ENQ, EOT, EFRX, EFTX, FRX, FTX, PROG_NAME};
use crate::session::SessionConfig;
use crate::transport::{ConsoleTransport, TransportError, TransportWriter};
use crate::xfer::{self, EthernetEndpoint, TransferError};

use super::machine::{DispatchState, SessionState};

/// Outcome of handling one byte.
#[derive(Debug, PartialEq, Eq)]
pub enum HandleResult {
    /// Keep dispatching.
    Continue,
    /// DC1 processed; the session must start the input relay and switch
    /// state to `TerminalPassthrough`.
    TerminalMode,
    /// EOT processed; the session shuts down.
    Shutdown,
}

/// Everything a handler can touch.
pub struct DispatchContext<'a, T: ConsoleTransport + ?Sized, O: ConsoleObserver> {
    pub transport: &'a T,
    pub writer: &'a TransportWriter,
    pub observer: &'a O,
    pub hooks: &'a dyn SessionHooks,
    pub state: &'a mut DispatchState,
    pub config: &'a SessionConfig,
    /// Sink for pass-through console output; stdout in production.
    pub console: &'a mut dyn Write,
}

/// Handle one byte from the target.
pub fn handle_byte<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    byte: u8,
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    match ctx.state.state {
        SessionState::Terminated => Ok(HandleResult::Shutdown),
        // Pass-through keeps the whole command table live; a duplicate ENQ
        // is absorbed by the latch and transfers still work. Only DC1
        // changes meaning: the input relay is already running.
        state => match byte {
            ENQ => handle_enq(ctx),
            EOT => handle_eot(ctx),
            FTX => handle_plain_receive(ctx),
            FRX => handle_plain_send(ctx),
            EFTX => handle_ethernet_receive(ctx),
            EFRX => handle_ethernet_send(ctx),
            DC1 if state == SessionState::Active => handle_dc1(ctx),
            DC1 => {
                debug!("DC1 in pass-through, input relay already running");
                Ok(HandleResult::Continue)
            }
            _ => {
                print_byte(ctx, byte);
                Ok(HandleResult::Continue)
            }
        },
    }
}

/// ENQ - handshake. ACK exactly once; later ENQs are ignored with a
/// diagnostic.
fn handle_enq<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    if ctx.state.got_enq {
        debug!("ENQ after handshake, not re-ACKing");
        ctx.observer.on_event(&ConsoleEvent::EnqIgnored);
        return Ok(HandleResult::Continue);
    }
    ctx.state.got_enq = true;
    ctx.writer.send(vec![constants::ACK])?;
    info!("ENQ received, handshake ACK sent");
    ctx.observer.on_event(&ConsoleEvent::HandshakeComplete);
    Ok(HandleResult::Continue)
}

/// EOT - print the exit notice and shut the session down.
fn handle_eot<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    let _ = writeln!(ctx.console, "{PROG_NAME}: exiting...");
    let _ = ctx.console.flush();
    ctx.observer.on_event(&ConsoleEvent::Exiting);
    ctx.state.goto_state(SessionState::Terminated);
    Ok(HandleResult::Shutdown)
}

/// DC1 - leave command mode for raw terminal pass-through.
fn handle_dc1<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    info!("DC1 received, switching to terminal pass-through");
    ctx.hooks.on_file_transfer_end();
    ctx.hooks.on_terminal_mode();
    ctx.observer.on_event(&ConsoleEvent::TerminalMode);
    Ok(HandleResult::TerminalMode)
}

fn handle_plain_receive<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    info!("Got file receive request");
    run_transfer(
        ctx,
        TransferDirection::TargetToHost,
        TransferChannel::Transport,
        |ctx, name| xfer::plain::receive_file(ctx.transport, name),
    )
}

fn handle_plain_send<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    info!("Got file send request");
    run_transfer(
        ctx,
        TransferDirection::HostToTarget,
        TransferChannel::Transport,
        |ctx, name| xfer::plain::send_file(ctx.transport, ctx.writer, name),
    )
}

fn handle_ethernet_receive<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    info!("Got file receive by ethernet request");
    run_transfer(
        ctx,
        TransferDirection::TargetToHost,
        TransferChannel::Ethernet,
        |ctx, name| {
            let endpoint = EthernetEndpoint::from_config(ctx.config)?;
            xfer::ethernet::receive_file_session(ctx.transport, &endpoint, name)
        },
    )
}

fn handle_ethernet_send<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
) -> Result<HandleResult, TransportError> {
    info!("Got file send by ethernet request");
    run_transfer(
        ctx,
        TransferDirection::HostToTarget,
        TransferChannel::Ethernet,
        |ctx, name| {
            let endpoint = EthernetEndpoint::from_config(ctx.config)?;
            xfer::ethernet::send_file_session(ctx.transport, ctx.writer, &endpoint, name)
        },
    )
}

/// Shared transfer shape: read the file name, run the payload move, and hold
/// the error boundary. A `TransferError` is logged and dispatch resumes; a
/// dead transport propagates as fatal.
fn run_transfer<T, O, F>(
    ctx: &mut DispatchContext<'_, T, O>,
    direction: TransferDirection,
    channel: TransferChannel,
    transfer: F,
) -> Result<HandleResult, TransportError>
where
    T: ConsoleTransport + ?Sized,
    O: ConsoleObserver,
    F: FnOnce(&mut DispatchContext<'_, T, O>, &str) -> Result<u64, TransferError>,
{
    let name = match xfer::recv_name(ctx.transport) {
        Ok(name) => name,
        Err(e) => return transfer_failed(ctx, "<unknown>", e),
    };

    ctx.observer.on_event(&ConsoleEvent::TransferStarted {
        name: name.clone(),
        direction,
        channel,
    });

    match transfer(ctx, &name) {
        Ok(bytes) => {
            ctx.state.transfers_completed += 1;
            ctx.observer.on_event(&ConsoleEvent::TransferCompleted {
                name,
                bytes,
                direction,
                channel,
            });
            Ok(HandleResult::Continue)
        }
        Err(e) => transfer_failed(ctx, &name, e),
    }
}

fn transfer_failed<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
    name: &str,
    err: TransferError,
) -> Result<HandleResult, TransportError> {
    if err.is_fatal() {
        error!(file = %name, error = %err, "Transport lost during transfer");
        return Err(TransportError::Disconnected);
    }
    error!(file = %name, error = %err, "Transfer aborted, resuming dispatch");
    ctx.observer.on_event(&ConsoleEvent::TransferFailed {
        name: name.to_string(),
        reason: err.to_string(),
    });
    Ok(HandleResult::Continue)
}

/// Default branch: the byte is console output. Offer it to the hooks, then
/// print it as its 8-bit code point, unbuffered.
fn print_byte<T: ConsoleTransport + ?Sized, O: ConsoleObserver>(
    ctx: &mut DispatchContext<'_, T, O>,
    byte: u8,
) {
    if ctx.hooks.on_console_byte(byte) {
        return;
    }
    let mut utf8 = [0u8; 4];
    let encoded = (byte as char).encode_utf8(&mut utf8);
    let _ = ctx.console.write_all(encoded.as_bytes());
    let _ = ctx.console.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::hooks::NullHooks;
    use crate::protocol::constants::ACK;
    use crate::transport::{writer, MockTransport};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Harness {
        mock: Arc<MockTransport>,
        writer: TransportWriter,
        join: std::thread::JoinHandle<()>,
        state: DispatchState,
        config: SessionConfig,
        console: Vec<u8>,
    }

    impl Harness {
        fn new() -> Self {
            let mock = Arc::new(MockTransport::new());
            let (writer, join) =
                writer::spawn(Arc::clone(&mock) as Arc<dyn ConsoleTransport>).unwrap();
            Self {
                mock,
                writer,
                join,
                state: DispatchState::new(),
                config: SessionConfig::default(),
                console: Vec::new(),
            }
        }

        fn handle(&mut self, byte: u8, hooks: &dyn SessionHooks) -> HandleResult {
            let mut ctx = DispatchContext {
                transport: self.mock.as_ref(),
                writer: &self.writer,
                observer: &NullObserver,
                hooks,
                state: &mut self.state,
                config: &self.config,
                console: &mut self.console,
            };
            handle_byte(byte, &mut ctx).unwrap()
        }

        /// Drain the writer queue and return everything written to the
        /// transport.
        fn finish(self) -> (Vec<u8>, Vec<u8>) {
            self.writer.shutdown();
            self.join.join().unwrap();
            (self.mock.written(), self.console)
        }
    }

    #[test]
    fn test_passthrough_prints_verbatim_in_order() {
        let mut h = Harness::new();
        for &b in b"Hello, SoC!\n" {
            assert_eq!(h.handle(b, &NullHooks), HandleResult::Continue);
        }
        assert_eq!(h.state.state, SessionState::Active);
        assert!(!h.state.got_enq);

        let (written, console) = h.finish();
        assert!(written.is_empty());
        assert_eq!(console, b"Hello, SoC!\n");
    }

    #[test]
    fn test_handshake_idempotent() {
        let mut h = Harness::new();
        h.handle(ENQ, &NullHooks);
        h.handle(ENQ, &NullHooks);
        assert!(h.state.got_enq);

        let (written, _) = h.finish();
        assert_eq!(written, vec![ACK]);
    }

    #[test]
    fn test_eot_prints_notice_and_terminates() {
        let mut h = Harness::new();
        assert_eq!(h.handle(EOT, &NullHooks), HandleResult::Shutdown);
        assert_eq!(h.state.state, SessionState::Terminated);

        let (_, console) = h.finish();
        assert_eq!(console, b"socterm: exiting...\n");
    }

    #[test]
    fn test_console_byte_hook_consumes() {
        struct Eater(AtomicUsize);
        impl SessionHooks for Eater {
            fn on_console_byte(&self, _byte: u8) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                true
            }
        }

        let hooks = Eater(AtomicUsize::new(0));
        let mut h = Harness::new();
        h.handle(b'x', &hooks);
        assert_eq!(hooks.0.load(Ordering::SeqCst), 1);

        let (_, console) = h.finish();
        assert!(console.is_empty());
    }

    #[test]
    fn test_enq_a_dc1_enq_scenario() {
        struct Recorder {
            transfer_end: AtomicBool,
            terminal_mode: AtomicBool,
        }
        impl SessionHooks for Recorder {
            fn on_file_transfer_end(&self) {
                self.transfer_end.store(true, Ordering::SeqCst);
            }
            fn on_terminal_mode(&self) {
                self.terminal_mode.store(true, Ordering::SeqCst);
            }
        }

        let hooks = Recorder {
            transfer_end: AtomicBool::new(false),
            terminal_mode: AtomicBool::new(false),
        };
        let mut h = Harness::new();

        assert_eq!(h.handle(ENQ, &hooks), HandleResult::Continue);
        assert_eq!(h.handle(b'A', &hooks), HandleResult::Continue);
        assert_eq!(h.handle(DC1, &hooks), HandleResult::TerminalMode);
        // The session flips state when it starts the input relay.
        h.state.goto_state(SessionState::TerminalPassthrough);
        assert_eq!(h.handle(ENQ, &hooks), HandleResult::Continue);

        assert!(hooks.transfer_end.load(Ordering::SeqCst));
        assert!(hooks.terminal_mode.load(Ordering::SeqCst));

        let (written, console) = h.finish();
        // Exactly one ACK, from the first ENQ only.
        assert_eq!(written.iter().filter(|&&b| b == ACK).count(), 1);
        assert_eq!(written, vec![ACK]);
        // 'A' printed; the post-DC1 ENQ is absorbed by the latch, not echoed.
        assert_eq!(console, b"A");
    }

    #[test]
    fn test_passthrough_enq_is_silent() {
        let mut h = Harness::new();
        h.handle(ENQ, &NullHooks);
        h.state.goto_state(SessionState::TerminalPassthrough);

        assert_eq!(h.handle(ENQ, &NullHooks), HandleResult::Continue);

        let (written, console) = h.finish();
        assert_eq!(written, vec![ACK]);
        assert!(console.is_empty());
    }

    #[test]
    fn test_passthrough_still_services_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.bin");
        let name = path.to_str().unwrap();

        let mut h = Harness::new();
        h.state.goto_state(SessionState::TerminalPassthrough);
        h.mock.queue_bytes(name.as_bytes());
        h.mock.queue_bytes(&[0x00]);
        h.mock.queue_bytes(&3u32.to_le_bytes());
        h.mock.queue_bytes(b"abc");

        assert_eq!(h.handle(FTX, &NullHooks), HandleResult::Continue);
        assert_eq!(h.state.state, SessionState::TerminalPassthrough);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_transfer_failure_resumes_dispatch() {
        let mut h = Harness::new();
        // FTX with a name but a truncated size field.
        h.mock.queue_bytes(b"f.bin\x00");
        h.mock.queue_bytes(&[0x01]);
        assert_eq!(h.handle(FTX, &NullHooks), HandleResult::Continue);
        assert_eq!(h.state.state, SessionState::Active);
        assert_eq!(h.state.transfers_completed, 0);
    }

    #[test]
    fn test_transfer_with_dead_transport_is_fatal() {
        let mock = Arc::new(MockTransport::new());
        let (tx, join) = writer::spawn(Arc::clone(&mock) as Arc<dyn ConsoleTransport>).unwrap();
        let mut state = DispatchState::new();
        let config = SessionConfig::default();
        let mut console = Vec::new();

        mock.disconnect();
        let mut ctx = DispatchContext {
            transport: mock.as_ref(),
            writer: &tx,
            observer: &NullObserver,
            hooks: &NullHooks,
            state: &mut state,
            config: &config,
            console: &mut console,
        };
        let err = handle_byte(FTX, &mut ctx).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));

        tx.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_plain_receive_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recv.bin");
        let name = path.to_str().unwrap();

        let mut h = Harness::new();
        h.mock.queue_bytes(name.as_bytes());
        h.mock.queue_bytes(&[0x00]);
        h.mock.queue_bytes(&4u32.to_le_bytes());
        h.mock.queue_bytes(b"data");

        assert_eq!(h.handle(FTX, &NullHooks), HandleResult::Continue);
        assert_eq!(h.state.transfers_completed, 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }
}
