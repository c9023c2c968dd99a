//! Records reported by the discovery service
//!
//! These are the per-item payloads of [`DiscoveryEvent`](super::DiscoveryEvent)
//! and the data stored in every node of the attribute tree.

use crate::uuid::Uuid;
use bitflags::bitflags;
use std::fmt;

/// Lowest valid attribute handle
pub const HANDLE_MIN: u16 = 0x0001;
/// Highest valid attribute handle
pub const HANDLE_MAX: u16 = 0xFFFF;

/// An inclusive range of attribute handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

impl HandleRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// The whole attribute table
    pub const fn all() -> Self {
        Self::new(HANDLE_MIN, HANDLE_MAX)
    }

    pub fn contains(&self, handle: u16) -> bool {
        self.start <= handle && handle <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for HandleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}..=0x{:04X}", self.start, self.end)
    }
}

bitflags! {
    /// Characteristic properties from the characteristic declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperty: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharacteristicProperty {
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(&self) -> bool {
        self.intersects(Self::WRITE | Self::WRITE_WITHOUT_RESPONSE)
    }

    pub fn can_notify(&self) -> bool {
        self.contains(Self::NOTIFY)
    }

    pub fn can_indicate(&self) -> bool {
        self.contains(Self::INDICATE)
    }
}

/// A primary service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattService {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid,
}

impl GattService {
    pub fn new(start_handle: u16, end_handle: u16, uuid: impl Into<Uuid>) -> Self {
        Self {
            start_handle,
            end_handle,
            uuid: uuid.into(),
        }
    }

    pub fn range(&self) -> HandleRange {
        HandleRange::new(self.start_handle, self.end_handle)
    }
}

/// An include declaration inside a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattIncludedService {
    /// Handle of the include declaration itself
    pub handle: u16,
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid,
}

impl GattIncludedService {
    pub fn new(handle: u16, start_handle: u16, end_handle: u16, uuid: impl Into<Uuid>) -> Self {
        Self {
            handle,
            start_handle,
            end_handle,
            uuid: uuid.into(),
        }
    }
}

/// A characteristic declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub declaration_handle: u16,
    pub value_handle: u16,
    pub properties: CharacteristicProperty,
    pub uuid: Uuid,
}

impl GattCharacteristic {
    pub fn new(
        declaration_handle: u16,
        value_handle: u16,
        properties: CharacteristicProperty,
        uuid: impl Into<Uuid>,
    ) -> Self {
        Self {
            declaration_handle,
            value_handle,
            properties,
            uuid: uuid.into(),
        }
    }
}

/// A characteristic descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattDescriptor {
    pub handle: u16,
    pub uuid: Uuid,
}

impl GattDescriptor {
    pub fn new(handle: u16, uuid: impl Into<Uuid>) -> Self {
        Self {
            handle,
            uuid: uuid.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_range() {
        let range = HandleRange::new(0x0010, 0x0014);
        assert!(range.contains(0x0010));
        assert!(range.contains(0x0014));
        assert!(!range.contains(0x0015));
        assert!(!range.is_empty());
        assert!(HandleRange::new(5, 4).is_empty());
        assert_eq!(HandleRange::all().to_string(), "0x0001..=0xFFFF");
    }

    #[test]
    fn test_characteristic_properties() {
        let props = CharacteristicProperty::from_bits_truncate(0x1A);
        assert!(props.can_read());
        assert!(props.can_write());
        assert!(props.can_notify());
        assert!(!props.can_indicate());
        assert!(CharacteristicProperty::WRITE_WITHOUT_RESPONSE.can_write());
    }
}
