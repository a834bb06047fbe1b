//! Attribute Protocol types shared with the transport.
//!
//! The PDU codec itself lives in the transport; the engine consumes its
//! output through the pre-decoded entry structs below and produces requests
//! through [`AttTransport`](crate::transport::AttTransport).

use num_enum::TryFromPrimitive;
use thiserror::Error;

use crate::types::uuid::Uuid;

/// The fixed L2CAP channel identifier of the unenhanced ATT bearer.
pub const ATT_CID: u16 = 0x0004;

/// Attribute type of the Primary Service declaration.
pub const PRIMARY_SERVICE: u16 = 0x2800;
/// Attribute type of the Include declaration.
pub const INCLUDE: u16 = 0x2802;
/// Attribute type of the Characteristic declaration.
pub const CHARACTERISTIC: u16 = 0x2803;

// Include declaration value lengths: start + end, optionally + 16-bit UUID.
pub(crate) const INC_SVC_LEN_NO_UUID: usize = 4;
pub(crate) const INC_SVC_LEN_UUID: usize = 6;

// Characteristic declaration value lengths: properties + value handle +
// 16- or 128-bit UUID.
pub(crate) const CHR_DECL_LEN_UUID16: usize = 5;
pub(crate) const CHR_DECL_LEN_UUID128: usize = 19;

// Prepare Write request overhead: opcode + handle + offset.
pub(crate) const PREP_WRITE_BASE_LEN: usize = 5;

/// Attribute Error Code
///
/// The error codes of the `ATT_ERROR_RSP` PDU, Bluetooth Core Specification
/// Vol 3, Part F, 3.4.1.1.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, Error)]
#[repr(u8)]
pub enum AttErrorCode {
    /// The attribute handle was not valid on this server.
    #[error("invalid handle")]
    InvalidHandle = 0x01,
    /// The attribute cannot be read.
    #[error("read not permitted")]
    ReadNotPermitted = 0x02,
    /// The attribute cannot be written.
    #[error("write not permitted")]
    WriteNotPermitted = 0x03,
    /// The attribute PDU was invalid.
    #[error("invalid PDU")]
    InvalidPdu = 0x04,
    /// The attribute requires authentication before it can be accessed.
    #[error("insufficient authentication")]
    InsufficientAuthentication = 0x05,
    /// The server does not support the request.
    #[error("request not supported")]
    RequestNotSupported = 0x06,
    /// The specified offset was past the end of the attribute.
    #[error("invalid offset")]
    InvalidOffset = 0x07,
    /// The attribute requires authorization before it can be accessed.
    #[error("insufficient authorization")]
    InsufficientAuthorization = 0x08,
    /// Too many prepare writes have been queued.
    #[error("prepare queue full")]
    PrepareQueueFull = 0x09,
    /// No attribute found within the given handle range.
    #[error("attribute not found")]
    AttributeNotFound = 0x0A,
    /// The attribute cannot be read with a Read Blob request.
    #[error("attribute not long")]
    AttributeNotLong = 0x0B,
    /// The encryption key size used on this link is too short.
    #[error("insufficient encryption key size")]
    InsufficientEncryptionKeySize = 0x0C,
    /// The attribute value length is invalid for the operation.
    #[error("invalid attribute value length")]
    InvalidAttributeValueLength = 0x0D,
    /// The request encountered an unlikely error and could not complete.
    #[error("unlikely error")]
    UnlikelyError = 0x0E,
    /// The attribute requires encryption before it can be accessed.
    #[error("insufficient encryption")]
    InsufficientEncryption = 0x0F,
    /// The attribute type is not a supported grouping attribute.
    #[error("unsupported group type")]
    UnsupportedGroupType = 0x10,
    /// The server had insufficient resources to complete the request.
    #[error("insufficient resources")]
    InsufficientResources = 0x11,
    /// The server requests the client to rediscover the database.
    #[error("database out of sync")]
    DatabaseOutOfSync = 0x12,
    /// The attribute parameter value was not allowed.
    #[error("value not allowed")]
    ValueNotAllowed = 0x13,
}

/// One attribute data entry of a Read By Group Type response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct GroupAttrData<'d> {
    /// Handle of the grouping attribute.
    pub att_handle: u16,
    /// End handle of the group.
    pub end_group_handle: u16,
    /// Raw attribute value bytes.
    pub value: &'d [u8],
}

/// One attribute data entry of a Read By Type response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct TypeAttrData<'d> {
    /// Handle of the attribute.
    pub att_handle: u16,
    /// Raw attribute value bytes.
    pub value: &'d [u8],
}

/// One handles information entry of a Find By Type Value response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct HandleInfo {
    /// Found attribute handle.
    pub attr_handle: u16,
    /// End handle of the group the attribute starts.
    pub group_end_handle: u16,
}

/// One information data entry of a Find Information response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct InfoData {
    /// Attribute handle.
    pub attr_handle: u16,
    /// Attribute type.
    pub uuid: Uuid,
}

/// The echo carried by a Prepare Write response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct PrepEcho<'d> {
    /// Echoed attribute handle.
    pub handle: u16,
    /// Echoed value offset.
    pub offset: u16,
    /// Echoed part value.
    pub value: &'d [u8],
}
