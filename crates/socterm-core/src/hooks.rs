//! Pluggable session hooks.
//!
//! A deployment can override keystroke handling or wrap mode switches without
//! touching the core: implement `SessionHooks` and hand it to the `Session`.
//! Every method defaults to a no-op.

/// Extension points called at fixed places in the session lifecycle.
pub trait SessionHooks: Send + Sync {
    /// Called once before the dispatch loop starts.
    fn on_session_start(&self) {}

    /// Called once during shutdown, after background tasks are stopped.
    fn on_session_end(&self) {}

    /// Called when DC1 ends file-transfer bookkeeping.
    fn on_file_transfer_end(&self) {}

    /// Called when the session switches to terminal pass-through.
    fn on_terminal_mode(&self) {}

    /// Offered every non-command byte before it is printed.
    /// Return `true` to consume the byte and suppress the default print.
    fn on_console_byte(&self, _byte: u8) -> bool {
        false
    }

    /// Called just before the Ethernet frame relay starts.
    fn on_ethernet_tunnel_start(&self) {}
}

/// Default hooks: everything is a no-op.
pub struct NullHooks;

impl SessionHooks for NullHooks {}
