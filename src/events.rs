//! Application event delegate.

use core::ops::ControlFlow;

use bt_hci::param::ConnHandle;

use crate::types::{AttrValue, Characteristic, Descriptor, IncludedService, Service};
use crate::Error;

/// Receives the outcomes of GATT client procedures.
///
/// One delegate serves the whole engine; the `token` passed at initiation
/// is echoed into every callback of that procedure so applications can
/// route results without shared state. All methods default to doing
/// nothing, so an application implements only what it uses.
///
/// Callbacks are always invoked with no engine lock held and are free to
/// re-enter the engine to initiate further procedures.
///
/// Streaming procedures deliver `Ok(Some(item))` per result in ascending
/// handle order, then a final `Ok(None)` marking the end of the stream, or
/// a single `Err` instead; a terminal outcome is delivered exactly once.
/// Returning [`ControlFlow::Break`] from a data callback aborts the
/// procedure early, with no further callbacks.
pub trait ClientEvents {
    /// Outcome of an MTU exchange: the peer's advertised MTU.
    fn on_mtu(&self, conn: ConnHandle, token: usize, result: Result<u16, Error>) {
        let _ = (conn, token, result);
    }

    /// A discovered primary service, from either service discovery variant.
    fn on_service(
        &self,
        conn: ConnHandle,
        token: usize,
        result: Result<Option<Service>, Error>,
    ) -> ControlFlow<()> {
        let _ = (conn, token, result);
        ControlFlow::Continue(())
    }

    /// A discovered included service.
    fn on_included_service(
        &self,
        conn: ConnHandle,
        token: usize,
        result: Result<Option<IncludedService>, Error>,
    ) -> ControlFlow<()> {
        let _ = (conn, token, result);
        ControlFlow::Continue(())
    }

    /// A discovered characteristic, from either characteristic discovery
    /// variant.
    fn on_characteristic(
        &self,
        conn: ConnHandle,
        token: usize,
        result: Result<Option<Characteristic>, Error>,
    ) -> ControlFlow<()> {
        let _ = (conn, token, result);
        ControlFlow::Continue(())
    }

    /// A discovered descriptor of the characteristic with the given value
    /// handle.
    fn on_descriptor(
        &self,
        conn: ConnHandle,
        token: usize,
        chr_val_handle: u16,
        result: Result<Option<Descriptor>, Error>,
    ) -> ControlFlow<()> {
        let _ = (conn, token, chr_val_handle, result);
        ControlFlow::Continue(())
    }

    /// Data from a read, read-by-uuid or read-long procedure.
    ///
    /// A plain read completes with its single data callback and sends no
    /// end-of-stream marker; read-by-uuid and read-long stream chunks and
    /// finish with `Ok(None)`.
    fn on_read(
        &self,
        conn: ConnHandle,
        token: usize,
        result: Result<Option<AttrValue<'_>>, Error>,
    ) -> ControlFlow<()> {
        let _ = (conn, token, result);
        ControlFlow::Continue(())
    }

    /// The concatenated response of a fixed read-multiple. Splitting the
    /// buffer is the caller's job, since only it knows the attribute sizes.
    fn on_read_multiple(&self, conn: ConnHandle, token: usize, result: Result<&[u8], Error>) {
        let _ = (conn, token, result);
    }

    /// The per-handle values of a variable-length read-multiple, in request
    /// order. Handles the peer sent no record for carry an empty value.
    fn on_read_multiple_var(&self, conn: ConnHandle, token: usize, result: Result<&[AttrValue<'_>], Error>) {
        let _ = (conn, token, result);
    }

    /// Outcome of a write or long write to `handle`.
    fn on_write(&self, conn: ConnHandle, token: usize, handle: u16, result: Result<(), Error>) {
        let _ = (conn, token, handle, result);
    }

    /// Outcome of a reliable write covering `handles`.
    fn on_write_reliable(&self, conn: ConnHandle, token: usize, handles: &[u16], result: Result<(), Error>) {
        let _ = (conn, token, handles, result);
    }

    /// Outcome of an indication: `Ok` on confirmation, `Err` if the peer
    /// answered with an error response instead (the indication slot is
    /// released either way).
    fn on_indicate(&self, conn: ConnHandle, chr_val_handle: u16, result: Result<(), Error>) {
        let _ = (conn, chr_val_handle, result);
    }

    /// A notification transmission was attempted.
    fn on_notify_tx(&self, conn: ConnHandle, chr_val_handle: u16, result: Result<(), Error>) {
        let _ = (conn, chr_val_handle, result);
    }
}
