//! Compile-time configuration.
//!
//! These constants bound the engine's memory use. They are deliberately
//! plain `const` items: every record, table and buffer in this crate is
//! statically sized from them, so changing a value here resizes the whole
//! engine at compile time.

use embassy_time::Duration;

/// Maximum number of concurrently active GATT client procedures.
///
/// One record is held per in-flight procedure, across all connections and
/// bearers. Initiating a procedure when all records are in use fails with
/// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
///
/// Default: 4.
pub const MAX_PROCS: usize = 4;

/// Maximum number of attribute handles in a read-multiple request.
///
/// Default: 8.
pub const READ_MAX_ATTRS: usize = 8;

/// Maximum number of attributes in a reliable write.
///
/// Default: 4.
pub const WRITE_MAX_ATTRS: usize = 4;

/// Maximum length of an attribute value, as defined by the Attribute
/// Protocol (Vol 3, Part F, 3.2.9).
///
/// Bounds the payload buffers owned by write-class procedure records and
/// the per-handle split of variable-length read-multiple responses.
///
/// Default: 512.
pub const ATT_VALUE_MAX_LEN: usize = 512;

/// Capacity of the Enhanced ATT bearer registry, across all connections.
///
/// With no bearers registered, every procedure uses the fixed ATT channel.
///
/// Default: 2.
pub const EATT_CHANS_MAX: usize = 2;

/// The maximum time to wait for a single ATT response. The Core
/// Specification defines this as the ATT transaction timeout (Vol 3,
/// Part F, 3.3.3); expiry requires the connection to be terminated.
///
/// Default: 30 seconds.
pub const UNRESPONSIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a procedure stalled on transient resource exhaustion waits
/// before its request is retried.
///
/// Default: 1000 ms.
pub const RESUME_RATE: Duration = Duration::from_millis(1000);
