//! Bluetooth device address

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a device address in bytes
pub const BD_ADDR_LEN: usize = 6;

/// A 48-bit device address, stored least significant byte first as it
/// appears on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; BD_ADDR_LEN],
}

impl BdAddr {
    pub const ZERO: BdAddr = BdAddr {
        bytes: [0; BD_ADDR_LEN],
    };

    pub const fn new(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; BD_ADDR_LEN] = slice.get(..BD_ADDR_LEN)?.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0; BD_ADDR_LEN]
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Errors from parsing a `XX:XX:XX:XX:XX:XX` address
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BdAddrParseError {
    #[error("Address must have six colon separated octets")]
    InvalidFormat,

    #[error("Invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for BdAddr {
    type Err = BdAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        if octets.len() != BD_ADDR_LEN || octets.iter().any(|o| o.len() != 2) {
            return Err(BdAddrParseError::InvalidFormat);
        }

        let mut bytes = [0u8; BD_ADDR_LEN];
        hex::decode_to_slice(octets.concat(), &mut bytes)?;
        bytes.reverse();
        Ok(Self { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_most_significant_first() {
        let addr = BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(addr.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_parse_round_trips_display() {
        let addr: BdAddr = "C0:FF:EE:00:12:34".parse().unwrap();
        assert_eq!(addr.bytes, [0x34, 0x12, 0x00, 0xEE, 0xFF, 0xC0]);
        assert_eq!(addr.to_string(), "C0:FF:EE:00:12:34");

        assert_eq!("C0:FF:EE".parse::<BdAddr>(), Err(BdAddrParseError::InvalidFormat));
        assert!(matches!(
            "C0:FF:EE:00:12:XY".parse::<BdAddr>(),
            Err(BdAddrParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_from_slice() {
        assert_eq!(BdAddr::from_slice(&[1, 2, 3]), None);
        assert_eq!(
            BdAddr::from_slice(&[1, 2, 3, 4, 5, 6, 7]),
            Some(BdAddr::new([1, 2, 3, 4, 5, 6]))
        );
        assert!(BdAddr::ZERO.is_zero());
    }
}
