//! Control-byte constants for the console protocol.
//!
//! The target drives the session with single-byte commands; everything the
//! dispatcher recognizes is listed here. Any other byte is console output.

/// Handshake initiation (target -> host).
pub const ENQ: u8 = 0x05;

/// Acknowledgment, used for the handshake reply and as the flow-control
/// gate before a host -> target file stream starts.
pub const ACK: u8 = 0x06;

/// End of transmission: the target is done, the session shuts down.
pub const EOT: u8 = 0x04;

/// Target sends a file to the host over the transport.
pub const FTX: u8 = 0x07;

/// Target requests a file from the host over the transport.
pub const FRX: u8 = 0x08;

/// Switch the session into raw terminal pass-through.
pub const DC1: u8 = 0x11;

/// Target sends a file to the host over an Ethernet session.
pub const EFTX: u8 = 0x12;

/// Target requests a file from the host over an Ethernet session.
pub const EFRX: u8 = 0x13;

/// Direction handshake byte for the Ethernet session.
pub const SYN: u8 = 0x16;

/// File names on the wire are NUL-terminated.
pub const NUL: u8 = 0x00;

/// The file size field is a 4-byte little-endian unsigned integer.
pub const SIZE_FIELD_LEN: usize = 4;

/// Upper bound accepted for a file name before declaring desync.
pub const MAX_NAME_LEN: usize = 4096;

/// Ethernet header: destination MAC (6) + source MAC (6) + ethertype (2).
pub const ETH_HEADER_LEN: usize = 14;

/// Largest frame the relay will carry (1500-byte MTU plus header and tag).
pub const MAX_FRAME_LEN: usize = 1518;

/// MAC address the console identifies itself with toward the target.
pub const DEFAULT_CONSOLE_MAC: &str = "88:43:1e:af:a8:97";

/// MAC written into the destination field of frames injected toward the
/// simulated target.
pub const DEFAULT_INJECT_MAC: &str = "01:60:6e:11:02:0f";

// Default named-pipe names used when driving a simulation.
pub const DEFAULT_RX_FIFO: &str = "soc2cnsl";
pub const DEFAULT_TX_FIFO: &str = "cnsl2soc";
pub const DEFAULT_SOC2ETH_FIFO: &str = "soc2eth";
pub const DEFAULT_ETH2SOC_FIFO: &str = "eth2soc";

/// Default TCP address of the Ethernet-session companion process.
pub const DEFAULT_ETH_ADDR: &str = "127.0.0.1:50507";

/// Default socket timeout in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 100;

/// Program name used in user-visible status lines.
pub const PROG_NAME: &str = "socterm";

/// Human-readable name of a control byte, if it is one.
pub fn command_name(byte: u8) -> Option<&'static str> {
    match byte {
        ENQ => Some("ENQ"),
        ACK => Some("ACK"),
        EOT => Some("EOT"),
        FTX => Some("FTX"),
        FRX => Some("FRX"),
        DC1 => Some("DC1"),
        EFTX => Some("EFTX"),
        EFRX => Some("EFRX"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(ENQ), Some("ENQ"));
        assert_eq!(command_name(EFRX), Some("EFRX"));
        assert_eq!(command_name(b'A'), None);
    }
}
