//! The outgoing half of the engine's contract with the ATT transport.
//!
//! The transport owns PDU encoding, L2CAP framing and flow control. The
//! engine only ever asks it to send one well-formed request or command and
//! cares about exactly three outcomes: sent, transiently out of buffers
//! (the procedure stalls and retries later), or failed for good.

use bt_hci::param::ConnHandle;

use crate::types::uuid::Uuid;

/// Why a transmission did not happen.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// Transient buffer exhaustion; the same request may succeed later.
    OutOfMemory,
    /// The connection identified by the handle no longer exists.
    NotConnected,
    /// Unrecoverable transport failure.
    Failed,
}

/// ATT client request and command transmission.
///
/// One method per PDU form the engine produces. Payloads are borrowed; a
/// transport that needs to buffer must copy before returning. Methods take
/// the L2CAP CID to use where Enhanced ATT bearers are permitted; MTU
/// exchange and signed writes are restricted to the fixed ATT channel by
/// the protocol and take no CID.
pub trait AttTransport {
    /// Send an Exchange MTU request carrying our receive MTU.
    fn tx_mtu(&self, conn: ConnHandle, mtu: u16) -> Result<(), TxError>;

    /// Send a Read request.
    fn tx_read(&self, conn: ConnHandle, cid: u16, handle: u16) -> Result<(), TxError>;

    /// Send a Read Blob request.
    fn tx_read_blob(&self, conn: ConnHandle, cid: u16, handle: u16, offset: u16) -> Result<(), TxError>;

    /// Send a Read By Type request over `[start, end]`.
    fn tx_read_type(&self, conn: ConnHandle, cid: u16, start: u16, end: u16, attr_type: &Uuid) -> Result<(), TxError>;

    /// Send a Read By Group Type request over `[start, end]`.
    fn tx_read_group_type(
        &self,
        conn: ConnHandle,
        cid: u16,
        start: u16,
        end: u16,
        group_type: &Uuid,
    ) -> Result<(), TxError>;

    /// Send a Find Information request over `[start, end]`.
    fn tx_find_info(&self, conn: ConnHandle, cid: u16, start: u16, end: u16) -> Result<(), TxError>;

    /// Send a Find By Type Value request over `[start, end]`.
    fn tx_find_type_value(
        &self,
        conn: ConnHandle,
        cid: u16,
        start: u16,
        end: u16,
        attr_type: u16,
        value: &[u8],
    ) -> Result<(), TxError>;

    /// Send a Read Multiple (`variable == false`) or Read Multiple Variable
    /// Length (`variable == true`) request.
    fn tx_read_mult(&self, conn: ConnHandle, cid: u16, handles: &[u16], variable: bool) -> Result<(), TxError>;

    /// Send a Write command.
    fn tx_write_cmd(&self, conn: ConnHandle, cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError>;

    /// Send a Write request.
    fn tx_write_req(&self, conn: ConnHandle, cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError>;

    /// Send a Signed Write command, authenticated with the given CSRK and
    /// sign counter.
    fn tx_signed_write_cmd(
        &self,
        conn: ConnHandle,
        handle: u16,
        csrk: &[u8; 16],
        counter: u32,
        value: &[u8],
    ) -> Result<(), TxError>;

    /// Send a Prepare Write request for one part of a queued write.
    fn tx_prep_write(&self, conn: ConnHandle, cid: u16, handle: u16, offset: u16, value: &[u8])
        -> Result<(), TxError>;

    /// Send an Execute Write request; `commit == false` cancels the queue.
    fn tx_exec_write(&self, conn: ConnHandle, cid: u16, commit: bool) -> Result<(), TxError>;

    /// Send a Handle Value notification.
    fn tx_notify(&self, conn: ConnHandle, cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError>;

    /// Send a Multiple Handle Value notification with a pre-packed batch of
    /// (handle, length, value) records.
    fn tx_notify_mult(&self, conn: ConnHandle, cid: u16, batch: &[u8]) -> Result<(), TxError>;

    /// Send a Handle Value indication.
    fn tx_indicate(&self, conn: ConnHandle, cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError>;
}
