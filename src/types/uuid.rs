//! UUID types.

use crate::codec;

/// A 16-bit or 128-bit UUID.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Uuid {
    /// 16-bit UUID
    Uuid16([u8; 2]),
    /// 128-bit UUID
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Create a new 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a new 128-bit UUID.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// Decode a UUID from the contents of an attribute value.
    ///
    /// Accepts exactly 2 or 16 little-endian bytes; anything else is how a
    /// misbehaving peer looks, so it is rejected rather than guessed at.
    pub fn from_att_value(value: &[u8]) -> Result<Self, codec::Error> {
        match value.len() {
            2 => Ok(Self::Uuid16([value[0], value[1]])),
            16 => {
                let mut bytes = [0; 16];
                bytes.copy_from_slice(value);
                Ok(Self::Uuid128(bytes))
            }
            _ => Err(codec::Error::InvalidValue),
        }
    }

    /// Get the raw little-endian UUID bytes.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Uuid16(uuid) => uuid,
            Self::Uuid128(uuid) => uuid,
        }
    }

    /// Get the 16-bit UUID value, if this is a short UUID.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Self::Uuid16(data) => Some(u16::from_le_bytes(*data)),
            Self::Uuid128(_) => None,
        }
    }
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Self::new_short(data)
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(data: [u8; 16]) -> Self {
        Self::Uuid128(data)
    }
}
