//! Terminal raw mode management.

use std::sync::Mutex;

use socterm_core::SessionHooks;
use tracing::{debug, warn};

/// Guard that enables raw mode on creation and restores the terminal on drop.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        debug!("Terminal raw mode enabled");
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

/// Session hooks that put the local terminal into raw mode while the
/// session is in pass-through, so keystrokes reach the target unmangled.
pub struct TerminalHooks {
    guard: Mutex<Option<RawModeGuard>>,
}

impl TerminalHooks {
    pub fn new() -> Self {
        Self {
            guard: Mutex::new(None),
        }
    }
}

impl SessionHooks for TerminalHooks {
    fn on_terminal_mode(&self) {
        let mut guard = self.guard.lock().unwrap();
        if guard.is_none() {
            match RawModeGuard::enable() {
                Ok(g) => *guard = Some(g),
                Err(e) => warn!(error = %e, "Could not enable raw mode, input stays line-buffered"),
            }
        }
    }

    fn on_session_end(&self) {
        // Dropping the guard restores the terminal.
        self.guard.lock().unwrap().take();
    }
}
