//! Bluetooth UUIDs
//!
//! Services, characteristics and descriptors are reported with 16-, 32- or
//! 128-bit UUIDs. All of them are stored here in their 128-bit form, with the
//! short forms expanded over the Bluetooth base UUID, so a 16-bit UUID and its
//! expanded 128-bit spelling compare equal.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Mask covering the 32 bits a short UUID occupies in the base UUID
const SHORT_MASK: u128 = 0xFFFF_FFFF << 96;

/// A Bluetooth UUID, stored as 128 bits
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(u128);

impl Uuid {
    /// Expand a 16-bit SIG-assigned UUID
    pub const fn from_u16(uuid16: u16) -> Self {
        Uuid(BASE_UUID | ((uuid16 as u128) << 96))
    }

    /// Expand a 32-bit SIG-assigned UUID
    pub const fn from_u32(uuid32: u32) -> Self {
        Uuid(BASE_UUID | ((uuid32 as u128) << 96))
    }

    /// A full 128-bit UUID
    pub const fn from_u128(value: u128) -> Self {
        Uuid(value)
    }

    /// 16 bytes in over-the-air (little-endian) order
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid(u128::from_le_bytes(bytes))
    }

    /// 16 bytes in textual (big-endian) order
    pub const fn from_bytes_be(bytes: [u8; 16]) -> Self {
        Uuid(u128::from_be_bytes(bytes))
    }

    /// Parse a little-endian UUID of 2, 4 or 16 bytes
    pub fn from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(LittleEndian::read_u16(slice))),
            4 => Some(Uuid::from_u32(LittleEndian::read_u32(slice))),
            16 => Some(Uuid(LittleEndian::read_u128(slice))),
            _ => None,
        }
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    pub const fn to_bytes_le(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    fn is_sig_assigned(&self) -> bool {
        self.0 & !SHORT_MASK == BASE_UUID
    }

    /// The 32-bit short form, if this UUID is derived from the base UUID
    pub fn as_u32(&self) -> Option<u32> {
        self.is_sig_assigned().then(|| (self.0 >> 96) as u32)
    }

    /// The 16-bit short form, if this UUID has one
    pub fn as_u16(&self) -> Option<u16> {
        self.as_u32().and_then(|value| u16::try_from(value).ok())
    }

    /// Encode in the shortest little-endian form
    pub fn to_compact_le(&self) -> Vec<u8> {
        if let Some(uuid16) = self.as_u16() {
            uuid16.to_le_bytes().to_vec()
        } else if let Some(uuid32) = self.as_u32() {
            uuid32.to_le_bytes().to_vec()
        } else {
            self.to_bytes_le().to_vec()
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<u32> for Uuid {
    fn from(uuid32: u32) -> Self {
        Uuid::from_u32(uuid32)
    }
}

impl From<u128> for Uuid {
    fn from(value: u128) -> Self {
        Uuid::from_u128(value)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.as_u16(), self.as_u32()) {
            (Some(uuid16), _) => write!(f, "Uuid(0x{:04X})", uuid16),
            (None, Some(uuid32)) => write!(f, "Uuid(0x{:08X})", uuid32),
            _ => write!(f, "Uuid({})", self),
        }
    }
}

/// Errors from parsing a textual UUID
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UuidParseError {
    #[error("UUID must have 4, 8 or 32 hex digits, found {0}")]
    InvalidLength(usize),

    #[error("Invalid hex in UUID: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Accepts `180D`, `0x180d`, `0000180D` and the hyphenated 128-bit form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let digits: String = s.chars().filter(|c| *c != '-').collect();

        let mut bytes = [0u8; 16];
        match digits.len() {
            4 => {
                hex::decode_to_slice(&digits, &mut bytes[..2])?;
                Ok(Uuid::from_u16(u16::from_be_bytes([bytes[0], bytes[1]])))
            }
            8 => {
                hex::decode_to_slice(&digits, &mut bytes[..4])?;
                Ok(Uuid::from_u32(u32::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            32 => {
                hex::decode_to_slice(&digits, &mut bytes)?;
                Ok(Uuid::from_bytes_be(bytes))
            }
            len => Err(UuidParseError::InvalidLength(len)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_forms_expand_over_base() {
        let heart_rate = Uuid::from_u16(0x180D);
        assert_eq!(heart_rate.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(heart_rate.as_u16(), Some(0x180D));
        assert_eq!(heart_rate.as_u32(), Some(0x180D));
        assert_eq!(heart_rate, Uuid::from_u32(0x180D));
        assert_eq!(heart_rate, 0x180Du16);
    }

    #[test]
    fn test_vendor_uuid_has_no_short_form() {
        let vendor = Uuid::from_u128(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E);
        assert_eq!(vendor.as_u16(), None);
        assert_eq!(vendor.as_u32(), None);
        assert_eq!(vendor.to_compact_le().len(), 16);
        assert_eq!(format!("{:?}", vendor), "Uuid(6e400001-b5a3-f393-e0a9-e50e24dcca9e)");
    }

    #[test]
    fn test_from_slice_le() {
        assert_eq!(Uuid::from_slice_le(&[0x0D, 0x18]), Some(Uuid::from_u16(0x180D)));
        assert_eq!(
            Uuid::from_slice_le(&[0x78, 0x56, 0x34, 0x12]),
            Some(Uuid::from_u32(0x1234_5678))
        );

        let vendor = Uuid::from_u128(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E);
        assert_eq!(Uuid::from_slice_le(&vendor.to_bytes_le()), Some(vendor));
        assert_eq!(Uuid::from_slice_le(&[1, 2, 3]), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("180D".parse::<Uuid>(), Ok(Uuid::from_u16(0x180D)));
        assert_eq!("0x2a37".parse::<Uuid>(), Ok(Uuid::from_u16(0x2A37)));
        assert_eq!("12345678".parse::<Uuid>(), Ok(Uuid::from_u32(0x1234_5678)));
        assert_eq!(
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e".parse::<Uuid>(),
            Ok(Uuid::from_u128(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E))
        );
        assert_eq!("123".parse::<Uuid>(), Err(UuidParseError::InvalidLength(3)));
        assert!(matches!(
            "zz0d".parse::<Uuid>(),
            Err(UuidParseError::InvalidHex(_))
        ));
    }
}
