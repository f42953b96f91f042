//! Core library for the SoC console bridge.
//!
//! Implements the byte-oriented control protocol spoken by the target
//! firmware: the ENQ/ACK handshake, file transfers in both directions
//! (plain and Ethernet-assisted), the terminal passthrough mode, and the
//! background relays that tunnel a simulated network interface onto a
//! real host interface.
//!
//! The [`session::Session`] type ties it all together; everything below
//! it is usable on its own with any [`transport::ConsoleTransport`].

pub mod dispatch;
pub mod events;
pub mod hooks;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod task;
pub mod transport;
pub mod xfer;

pub use events::{ConsoleEvent, ConsoleObserver, NullObserver, TracingObserver};
pub use hooks::{NullHooks, SessionHooks};
pub use session::{Session, SessionConfig};
pub use transport::{ConsoleTransport, TransportError};
