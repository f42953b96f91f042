//! Session state machine.

use std::fmt;

use tracing::info;

/// Mode of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Command dispatch (default).
    #[default]
    Active,
    /// Raw terminal pass-through after DC1; keystrokes are forwarded and
    /// the command table stays live, but DC1 itself becomes a no-op.
    TerminalPassthrough,
    /// Absorbing exit state after EOT.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "ACTIVE"),
            SessionState::TerminalPassthrough => write!(f, "TERMINAL_PASSTHROUGH"),
            SessionState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Mutable dispatch state for one session.
#[derive(Debug, Default)]
pub struct DispatchState {
    pub state: SessionState,
    /// Handshake latch; transitions false -> true exactly once. ACK is
    /// emitted only on that transition.
    pub got_enq: bool,
    /// Completed transfers, for status reporting.
    pub transfers_completed: u64,
}

impl DispatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goto_state(&mut self, new_state: SessionState) {
        info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
    }
}
