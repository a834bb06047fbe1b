//! Write procedures: command, signed command, request, long, reliable.

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use super::{GattClient, Verdict};
use crate::att::{PrepEcho, PREP_WRITE_BASE_LEN};
use crate::config;
use crate::proc::{Payload, Proc, ProcOp, ProcState, WriteAttr};
use crate::transport::AttTransport;
use crate::types::HandleValue;
use crate::Error;

/// What a prepare-write echo told us.
enum Prep {
    /// Echo verified; this many bytes are now queued server-side.
    Advance(u16),
    /// Echoed bytes differ from what was sent.
    Mismatch,
    Failed(Error),
}

impl<M: RawMutex, T: AttTransport> GattClient<'_, M, T> {
    /// Write an attribute value without acknowledgement. Fire and forget;
    /// no procedure record, no callback.
    pub fn write_no_rsp(&self, conn: ConnHandle, attr_handle: u16, value: &[u8]) -> Result<(), Error> {
        info!("[gatt] write no rsp att_handle={} len={}", attr_handle, value.len());

        let cid = self.with_state(|s| s.chans.pick_transient(conn));
        let res = self.transport.tx_write_cmd(conn, cid, attr_handle, value);
        self.with_state(|s| s.chans.release(conn, cid));
        res.map_err(Into::into)
    }

    /// Write an attribute value authenticated with our stored CSRK.
    ///
    /// Signing is only meaningful on an unencrypted link: fails with
    /// [`Error::Encrypted`] when the link is already encrypted and with
    /// [`Error::AuthenticationRequired`] when no CSRK is stored for the
    /// peer.
    pub fn signed_write(&self, conn: ConnHandle, attr_handle: u16, value: &[u8]) -> Result<(), Error> {
        info!("[gatt] signed write att_handle={} len={}", attr_handle, value.len());

        if !self.connections.is_connected(conn) {
            return Err(Error::NotConnected);
        }
        if self.connections.is_encrypted(conn) {
            return Err(Error::Encrypted);
        }
        let keys = self
            .security
            .and_then(|s| s.local_keys(conn))
            .ok_or(Error::AuthenticationRequired)?;

        self.transport
            .tx_signed_write_cmd(conn, attr_handle, &keys.csrk, keys.sign_counter, value)
            .map_err(Into::into)
    }

    /// Write an attribute value and wait for the acknowledgement, which
    /// arrives via [`on_write`](crate::ClientEvents::on_write).
    pub fn write(&self, conn: ConnHandle, attr_handle: u16, value: &[u8], token: usize) -> Result<(), Error> {
        info!("[gatt] write att_handle={} len={}", attr_handle, value.len());

        #[cfg(feature = "auto-pair")]
        let retained = Payload::from_slice(value).map_err(|_| Error::InvalidArgument)?;

        let state = ProcState::Write {
            handle: attr_handle,
            #[cfg(feature = "auto-pair")]
            retained,
        };
        self.launch(conn, token, state, |cid| {
            self.transport.tx_write_req(conn, cid, attr_handle, value)
        })
    }

    /// Write an attribute value longer than a single request, starting at
    /// `offset`, using the prepare/execute write queue. Every echoed part
    /// is verified byte-for-byte before the next goes out.
    pub fn write_long(
        &self,
        conn: ConnHandle,
        attr_handle: u16,
        offset: u16,
        value: &[u8],
        token: usize,
    ) -> Result<(), Error> {
        info!("[gatt] write long att_handle={} len={}", attr_handle, value.len());

        let payload = Payload::from_slice(value).map_err(|_| Error::InvalidArgument)?;
        if offset as usize > payload.len() {
            return Err(Error::InvalidArgument);
        }

        let cid = self.pick_channel(conn, ProcOp::WriteLong);
        let part = match self.first_part(conn, cid, value.len() - offset as usize) {
            Ok(part) => part,
            Err(e) => {
                self.with_state(|s| s.chans.release(conn, cid));
                return Err(e);
            }
        };

        let state = ProcState::WriteLong {
            attr: WriteAttr {
                handle: attr_handle,
                offset,
                value: payload,
            },
            length: part as u16,
        };
        self.launch_on(conn, token, cid, state, |cid| {
            if part == 0 {
                self.transport.tx_exec_write(conn, cid, true)
            } else {
                let from = offset as usize;
                self.transport
                    .tx_prep_write(conn, cid, attr_handle, offset, &value[from..from + part])
            }
        })
    }

    /// Atomically write several attribute values: each is queued with
    /// verified prepare writes, then the whole queue is committed with one
    /// execute write.
    pub fn write_reliable(&self, conn: ConnHandle, attrs: &[HandleValue<'_>], token: usize) -> Result<(), Error> {
        info!("[gatt] write reliable num_attrs={}", attrs.len());

        if attrs.is_empty() || attrs.len() > config::WRITE_MAX_ATTRS {
            return Err(Error::InvalidArgument);
        }
        let mut stored: Vec<WriteAttr, { config::WRITE_MAX_ATTRS }> = Vec::new();
        for attr in attrs {
            let value = Payload::from_slice(attr.value).map_err(|_| Error::InvalidArgument)?;
            let _ = stored.push(WriteAttr {
                handle: attr.handle,
                offset: 0,
                value,
            });
        }

        let cid = self.pick_channel(conn, ProcOp::WriteReliable);
        let part = match self.first_part(conn, cid, attrs[0].value.len()) {
            Ok(part) => part,
            Err(e) => {
                self.with_state(|s| s.chans.release(conn, cid));
                return Err(e);
            }
        };

        let state = ProcState::WriteReliable {
            attrs: stored,
            cur_attr: 0,
            length: part as u16,
        };
        let first = attrs[0];
        self.launch_on(conn, token, cid, state, |cid| {
            self.transport
                .tx_prep_write(conn, cid, first.handle, 0, &first.value[..part])
        })
    }

    /// How much of `remaining` fits into the first prepare write on `cid`.
    fn first_part(&self, conn: ConnHandle, cid: u16, remaining: usize) -> Result<usize, Error> {
        let mtu = self.connections.att_mtu(conn, cid) as usize;
        if mtu <= PREP_WRITE_BASE_LEN {
            return Err(Error::NotConnected);
        }
        Ok(remaining.min(mtu - PREP_WRITE_BASE_LEN))
    }

    pub(super) fn write_rx_rsp(&self, proc: &Proc) -> Verdict {
        let ProcState::Write { handle, .. } = &proc.state else {
            unreachable!()
        };
        self.events.on_write(proc.conn, proc.token, *handle, Ok(()));
        Verdict::Done
    }

    pub(super) fn write_long_rx_prep(&self, proc: &mut Proc, result: Result<PrepEcho<'_>, Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let cid = proc.cid;

        let outcome = {
            let ProcState::WriteLong { attr, length } = &mut proc.state else {
                unreachable!()
            };
            if attr.offset as usize >= attr.value.len() {
                // Expecting an execute write response, not a prepare
                // response.
                Prep::Failed(Error::BadData)
            } else {
                verify_echo(attr, *length, result)
            }
        };

        match outcome {
            Prep::Advance(len) => {
                let handle = {
                    let ProcState::WriteLong { attr, .. } = &mut proc.state else {
                        unreachable!()
                    };
                    attr.offset += len;
                    attr.handle
                };
                match self.next_round(proc) {
                    Ok(()) => Verdict::Continue,
                    Err(e) => {
                        self.events.on_write(conn, token, handle, Err(e));
                        Verdict::Done
                    }
                }
            }
            Prep::Mismatch => {
                // The server did not queue what was sent; erase the queue
                // before reporting. This also covers a mismatch on the
                // very first part, where nothing is known to be queued.
                let _ = self.transport.tx_exec_write(conn, cid, false);
                let ProcState::WriteLong { attr, .. } = &proc.state else {
                    unreachable!()
                };
                self.events.on_write(conn, token, attr.handle, Err(Error::BadData));
                Verdict::Done
            }
            Prep::Failed(e) => {
                self.deliver_failure(proc, e);
                Verdict::Done
            }
        }
    }

    pub(super) fn write_long_rx_exec(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let (handle, pending) = {
            let ProcState::WriteLong { attr, .. } = &proc.state else {
                unreachable!()
            };
            (attr.handle, (attr.offset as usize) < attr.value.len())
        };

        if pending {
            // An execute write response while parts were still owed.
            self.deliver_failure(proc, Error::BadData);
            return Verdict::Done;
        }
        match status {
            Ok(()) => self.events.on_write(conn, token, handle, Ok(())),
            Err(e) => self.deliver_failure(proc, e),
        }
        Verdict::Done
    }

    pub(super) fn write_reliable_rx_prep(&self, proc: &mut Proc, result: Result<PrepEcho<'_>, Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;

        let outcome = {
            let ProcState::WriteReliable { attrs, cur_attr, length } = &mut proc.state else {
                unreachable!()
            };
            match attrs.get_mut(*cur_attr as usize) {
                // A prepare response while every attribute was already
                // queued.
                None => Prep::Failed(Error::BadData),
                Some(attr) => verify_echo(attr, *length, result),
            }
        };

        match outcome {
            Prep::Advance(len) => {
                {
                    let ProcState::WriteReliable { attrs, cur_attr, .. } = &mut proc.state else {
                        unreachable!()
                    };
                    let attr = &mut attrs[*cur_attr as usize];
                    attr.offset += len;
                    if attr.offset as usize >= attr.value.len() {
                        attr.offset = 0;
                        *cur_attr += 1;
                    }
                }
                match self.next_round(proc) {
                    Ok(()) => Verdict::Continue,
                    Err(e) => {
                        self.deliver_failure(proc, e);
                        Verdict::Done
                    }
                }
            }
            Prep::Mismatch => {
                self.deliver_failure(proc, Error::BadData);
                Verdict::Done
            }
            Prep::Failed(e) => {
                self.deliver_failure(proc, e);
                Verdict::Done
            }
        }
    }

    pub(super) fn write_reliable_rx_exec(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::WriteReliable { attrs, .. } = &proc.state else {
            unreachable!()
        };

        match status {
            Ok(()) => {
                let handles: Vec<u16, { config::WRITE_MAX_ATTRS }> = attrs.iter().map(|a| a.handle).collect();
                self.events.on_write_reliable(conn, token, &handles, Ok(()));
            }
            Err(e) => self.deliver_failure(proc, e),
        }
        Verdict::Done
    }
}

/// Check a prepare-write echo against what was sent: same handle, same
/// offset, same length as the part on the wire, in bounds, and equal byte
/// for byte.
fn verify_echo(attr: &WriteAttr, length: u16, result: Result<PrepEcho<'_>, Error>) -> Prep {
    let echo = match result {
        Ok(echo) => echo,
        Err(e) => return Prep::Failed(e),
    };
    if echo.handle != attr.handle || echo.offset != attr.offset {
        return Prep::Failed(Error::BadData);
    }
    if echo.value.len() != length as usize {
        return Prep::Failed(Error::BadData);
    }
    let from = attr.offset as usize;
    if from + echo.value.len() > attr.value.len() {
        return Prep::Failed(Error::BadData);
    }
    if echo.value != &attr.value[from..from + echo.value.len()] {
        return Prep::Mismatch;
    }
    Prep::Advance(length)
}
