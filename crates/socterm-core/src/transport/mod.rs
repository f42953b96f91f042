//! Transport layer module.

pub mod fifo;
pub mod mock;
pub mod serial;
pub mod traits;
pub mod writer;

pub use fifo::FifoTransport;
pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use traits::{ConsoleTransport, TransportError};
pub use writer::TransportWriter;
