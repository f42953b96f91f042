//! Command dispatch module.

pub mod handlers;
pub mod machine;

pub use handlers::{handle_byte, DispatchContext, HandleResult};
pub use machine::{DispatchState, SessionState};
