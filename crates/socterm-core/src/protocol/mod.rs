//! Protocol module - control bytes and addressing.

pub mod constants;
pub mod mac;

pub use constants::*;
pub use mac::{MacAddr, ParseMacError};
