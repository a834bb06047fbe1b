//! Read procedures: single, by UUID, long, and multiple.

use core::ops::ControlFlow;

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use super::{GattClient, Verdict};
use crate::att::TypeAttrData;
use crate::config;
use crate::cursor::ReadCursor;
use crate::proc::{Proc, ProcState};
use crate::transport::AttTransport;
use crate::types::uuid::Uuid;
use crate::types::AttrValue;
use crate::Error;

impl<M: RawMutex, T: AttTransport> GattClient<'_, M, T> {
    /// Read the value of a single attribute. The value arrives in one
    /// [`on_read`](crate::ClientEvents::on_read) callback.
    pub fn read(&self, conn: ConnHandle, attr_handle: u16, token: usize) -> Result<(), Error> {
        info!("[gatt] read att_handle={}", attr_handle);

        self.launch(conn, token, ProcState::Read { handle: attr_handle }, |cid| {
            self.transport.tx_read(conn, cid, attr_handle)
        })
    }

    /// Read the values of the attributes with the given type in
    /// `[start_handle, end_handle]`. One request; every matching value the
    /// peer fits into its response is streamed to the delegate.
    pub fn read_by_uuid(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        uuid: &Uuid,
        token: usize,
    ) -> Result<(), Error> {
        info!("[gatt] read by uuid start={} end={}", start_handle, end_handle);

        let state = ProcState::ReadUuid {
            uuid: uuid.clone(),
            start_handle,
            end_handle,
        };
        self.launch(conn, token, state, |cid| {
            self.transport.tx_read_type(conn, cid, start_handle, end_handle, uuid)
        })
    }

    /// Read an attribute value that may be longer than a single response,
    /// starting at `offset`. Chunks stream to the delegate in offset
    /// order; the stream ends when a chunk comes back shorter than
    /// `MTU - 1` bytes.
    pub fn read_long(&self, conn: ConnHandle, attr_handle: u16, offset: u16, token: usize) -> Result<(), Error> {
        info!("[gatt] read long att_handle={} offset={}", attr_handle, offset);

        let state = ProcState::ReadLong {
            handle: attr_handle,
            offset,
        };
        self.launch(conn, token, state, |cid| {
            if offset == 0 {
                self.transport.tx_read(conn, cid, attr_handle)
            } else {
                self.transport.tx_read_blob(conn, cid, attr_handle, offset)
            }
        })
    }

    /// Read several attribute values in one exchange. The peer returns a
    /// single concatenated buffer; only the caller can know where one
    /// value ends and the next begins.
    pub fn read_mult(&self, conn: ConnHandle, handles: &[u16], token: usize) -> Result<(), Error> {
        self.read_mult_inner(conn, handles, false, token)
    }

    /// Read several variable-length attribute values in one exchange. The
    /// response is split into per-handle values before delivery.
    pub fn read_mult_var(&self, conn: ConnHandle, handles: &[u16], token: usize) -> Result<(), Error> {
        self.read_mult_inner(conn, handles, true, token)
    }

    fn read_mult_inner(&self, conn: ConnHandle, handles: &[u16], variable: bool, token: usize) -> Result<(), Error> {
        info!("[gatt] read multiple variable={}", variable);

        let stored: Vec<u16, { config::READ_MAX_ATTRS }> =
            Vec::from_slice(handles).map_err(|_| Error::InvalidArgument)?;
        if stored.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let state = ProcState::ReadMult {
            handles: stored,
            variable,
        };
        self.launch(conn, token, state, |cid| {
            self.transport.tx_read_mult(conn, cid, handles, variable)
        })
    }

    pub(super) fn read_rx_rsp(&self, proc: &mut Proc, result: Result<&[u8], Error>) -> Verdict {
        let ProcState::Read { handle } = &proc.state else {
            unreachable!()
        };
        let handle = *handle;
        let result = result.map(|value| {
            Some(AttrValue {
                handle,
                offset: 0,
                value,
            })
        });
        if let Err(e) = &result {
            self.note_out_of_sync(proc.conn, e);
        }
        let _ = self.events.on_read(proc.conn, proc.token, result);
        Verdict::Done
    }

    pub(super) fn read_uuid_rx_adata(&self, proc: &mut Proc, adata: &TypeAttrData<'_>) -> Verdict {
        let attr = AttrValue {
            handle: adata.att_handle,
            offset: 0,
            value: adata.value,
        };
        match self.events.on_read(proc.conn, proc.token, Ok(Some(attr))) {
            ControlFlow::Continue(()) => Verdict::Continue,
            ControlFlow::Break(()) => Verdict::Done,
        }
    }

    pub(super) fn read_uuid_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        // A single exchange; identically-typed attributes beyond what the
        // response could carry are not chased with a follow-up.
        let result = status.map(|()| None);
        let _ = self.events.on_read(proc.conn, proc.token, result);
        Verdict::Done
    }

    pub(super) fn read_long_rx_rsp(&self, proc: &mut Proc, result: Result<&[u8], Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let cid = proc.cid;
        let ProcState::ReadLong { handle, offset } = &mut proc.state else {
            unreachable!()
        };

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.note_out_of_sync(conn, &e);
                let _ = self.events.on_read(conn, token, Err(e));
                return Verdict::Done;
            }
        };

        let attr = AttrValue {
            handle: *handle,
            offset: *offset,
            value: data,
        };
        if let ControlFlow::Break(()) = self.events.on_read(conn, token, Ok(Some(attr))) {
            return Verdict::Done;
        }

        let mtu = self.connections.att_mtu(conn, cid);
        if mtu == 0 {
            let _ = self.events.on_read(conn, token, Err(Error::NotConnected));
            return Verdict::Done;
        }
        if data.len() < mtu as usize - 1 {
            // Shorter than the bearer allows: that was the last chunk.
            let _ = self.events.on_read(conn, token, Ok(None));
            return Verdict::Done;
        }

        *offset = offset.wrapping_add(data.len() as u16);
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_read(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    pub(super) fn read_mult_rx_rsp(&self, proc: &mut Proc, result: Result<&[u8], Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::ReadMult { handles, variable } = &proc.state else {
            unreachable!()
        };

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.note_out_of_sync(conn, &e);
                if *variable {
                    self.events.on_read_multiple_var(conn, token, Err(e));
                } else {
                    self.events.on_read_multiple(conn, token, Err(e));
                }
                return Verdict::Done;
            }
        };

        if !*variable {
            self.events.on_read_multiple(conn, token, Ok(data));
            return Verdict::Done;
        }

        // Variable-length form: a sequence of (length, value) records in
        // request order. Handles the peer ran out of space for get an
        // empty value.
        let mut attrs: Vec<AttrValue<'_>, { config::READ_MAX_ATTRS }> = Vec::new();
        let mut r = ReadCursor::new(data);
        for &handle in handles {
            let value = if r.available() >= 2 {
                let len = unwrap!(r.read::<u16>()) as usize;
                if len > config::ATT_VALUE_MAX_LEN || r.available() < len {
                    self.events.on_read_multiple_var(conn, token, Err(Error::BadData));
                    return Verdict::Done;
                }
                unwrap!(r.slice(len))
            } else {
                &[][..]
            };
            let _ = attrs.push(AttrValue {
                handle,
                offset: 0,
                value,
            });
        }
        self.events.on_read_multiple_var(conn, token, Ok(&attrs));
        Verdict::Done
    }
}
