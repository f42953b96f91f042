//! MAC address parsing and formatting.
//!
//! Configuration accepts both colon-separated (`88:43:1e:af:a8:97`) and
//! bare-hex (`88431eafa897`) forms.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid MAC address {input:?}: {reason}")]
pub struct ParseMacError {
    pub input: String,
    pub reason: &'static str,
}

/// 6-byte hardware address.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != 12 {
            return Err(ParseMacError {
                input: s.to_string(),
                reason: "expected 12 hex digits",
            });
        }
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| ParseMacError {
                input: s.to_string(),
                reason: "non-hex digit",
            })?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_form() {
        let mac: MacAddr = "88:43:1e:af:a8:97".parse().unwrap();
        assert_eq!(mac.octets(), [0x88, 0x43, 0x1e, 0xaf, 0xa8, 0x97]);
    }

    #[test]
    fn test_parse_bare_form() {
        let mac: MacAddr = "01606e11020f".parse().unwrap();
        assert_eq!(mac.octets(), [0x01, 0x60, 0x6e, 0x11, 0x02, 0x0f]);
    }

    #[test]
    fn test_display_round_trip() {
        let mac: MacAddr = "88431eafa897".parse().unwrap();
        assert_eq!(mac.to_string(), "88:43:1e:af:a8:97");
        assert_eq!(mac.to_string().parse::<MacAddr>().unwrap(), mac);
    }

    #[test]
    fn test_reject_garbage() {
        assert!("88:43".parse::<MacAddr>().is_err());
        assert!("zz431eafa897".parse::<MacAddr>().is_err());
    }
}
