//! A BLE GATT client procedure engine.
//!
//! `gattling` turns application-level GATT requests — discover services,
//! read a long value, write reliably, indicate — into the sequences of ATT
//! request/response exchanges the Bluetooth Core Specification (Vol 3,
//! Parts F and G) prescribes, tracks every in-flight procedure, correlates
//! incoming ATT events back to the procedure they belong to, and reports
//! outcomes through a delegate trait.
//!
//! The engine is deliberately narrow: it does not encode or decode ATT
//! PDUs, own an L2CAP channel, manage connections or keys, or depend on
//! any executor. Those live behind the [`AttTransport`],
//! [`ConnectionOps`], [`GattCache`] and [`SecurityOps`] traits, which is
//! what makes the engine itself fully testable against mocks.
//!
//! Procedures and their payload buffers come from fixed pools sized in
//! [`config`]; nothing allocates. Initiating an operation hands the first
//! request to the transport and returns; progress is driven by the
//! transport's `rx_*` entry points and by [`GattClient::timer`], which
//! also enforces the 30 second ATT transaction timeout and retries
//! procedures stalled on transient buffer exhaustion.

#![no_std]
#![warn(missing_docs)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod att;
mod cache;
mod channel;
mod client;
mod codec;
pub mod config;
mod connection;
mod cursor;
mod events;
mod proc;
mod security;
mod table;
mod transport;
pub mod types;

pub use cache::GattCache;
pub use client::GattClient;
pub use connection::ConnectionOps;
pub use events::ClientEvents;
pub use security::{LocalKeys, SecurityOps};
pub use transport::{AttTransport, TxError};

pub mod prelude {
    //! Convenience include of most commonly used types.
    pub use bt_hci::param::{ConnHandle, DisconnectReason};

    pub use crate::att::AttErrorCode;
    pub use crate::types::uuid::Uuid;
    pub use crate::types::{AttrValue, Characteristic, Descriptor, HandleValue, IncludedService, Service};
    pub use crate::{
        AttTransport, ClientEvents, ConnectionOps, Error, GattCache, GattClient, LocalKeys, SecurityOps, TxError,
    };
}

/// How a GATT client procedure can fail.
///
/// Every procedure surfaces at most one of these, through its single
/// terminal callback; initiation errors are returned synchronously
/// instead and produce no callback.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The 30 second ATT transaction timeout expired. The engine also
    /// terminates the underlying connection, as the Core Specification
    /// requires.
    Timeout,
    /// The connection went away while the procedure was active.
    NotConnected,
    /// A record or buffer pool was exhausted.
    OutOfMemory,
    /// The peer violated the protocol (handles out of order, a wrong
    /// prepare-write echo, an unexpected PDU). The procedure is aborted;
    /// the link stays up.
    BadData,
    /// The peer answered with an ATT error response.
    Att {
        /// The error code from the response.
        code: att::AttErrorCode,
        /// The attribute handle the peer reported, 0 if none.
        handle: u16,
    },
    /// The operation is not supported.
    NotSupported,
    /// A parameter was out of range, e.g. too many handles for a
    /// read-multiple.
    InvalidArgument,
    /// Signed write: no CSRK is stored for the peer.
    AuthenticationRequired,
    /// Signed write: the link is already encrypted, so signing is
    /// disallowed.
    Encrypted,
    /// The transport failed unrecoverably.
    Transport,
}

impl From<TxError> for Error {
    fn from(e: TxError) -> Self {
        match e {
            TxError::OutOfMemory => Error::OutOfMemory,
            TxError::NotConnected => Error::NotConnected,
            TxError::Failed => Error::Transport,
        }
    }
}
