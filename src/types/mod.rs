//! Common types.

use crate::types::uuid::Uuid;

mod primitives;
pub mod uuid;

/// A discovered primary service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// First attribute handle of the service.
    pub start_handle: u16,
    /// Last attribute handle of the service group.
    pub end_handle: u16,
    /// Service UUID.
    pub uuid: Uuid,
}

/// A discovered included service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedService {
    /// Handle of the include declaration attribute.
    pub handle: u16,
    /// First attribute handle of the included service.
    pub start_handle: u16,
    /// Last attribute handle of the included service.
    pub end_handle: u16,
    /// UUID of the included service.
    pub uuid: Uuid,
}

/// A discovered characteristic.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    /// Handle of the characteristic declaration attribute.
    pub def_handle: u16,
    /// Handle of the characteristic value attribute.
    pub val_handle: u16,
    /// Raw characteristic properties bit field.
    pub properties: u8,
    /// Characteristic UUID.
    pub uuid: Uuid,
}

/// A discovered characteristic descriptor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// Handle of the descriptor attribute.
    pub handle: u16,
    /// Descriptor UUID.
    pub uuid: Uuid,
}

/// A chunk of attribute value data delivered by a read-class procedure.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttrValue<'d> {
    /// Attribute handle the data belongs to.
    pub handle: u16,
    /// Offset of this chunk within the attribute value.
    pub offset: u16,
    /// The data.
    pub value: &'d [u8],
}

/// A borrowed (handle, value) pair, as passed to reliable writes and
/// multiple-handle notifications.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct HandleValue<'d> {
    /// Target attribute handle.
    pub handle: u16,
    /// The value to send.
    pub value: &'d [u8],
}
