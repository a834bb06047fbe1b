//! The GATT client procedure engine.
//!
//! Application calls create a procedure record, hand the first ATT request
//! to the transport and return; everything after that is driven by the
//! transport's RX entry points and by [`GattClient::timer`]. Procedure
//! records are only ever mutated while extracted from the table, and
//! application callbacks are only ever invoked with no lock held, so a
//! callback is free to initiate further procedures.
//!
//! Tasks have the following permissions on procedure records:
//!
//! |             | insert | remove | inspect | modify |
//! |-------------|--------|--------|---------|--------|
//! | engine task | X      | X      | X       | X      |
//! | other tasks | X      |        |         |        |
//!
//! "Engine task" is whichever task drains the transport and calls the
//! `rx_*`/`timer`/`connection_broken` entry points; there must be exactly
//! one of those.

use core::cell::RefCell;

use bt_hci::param::{ConnHandle, DisconnectReason};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::att::{self, AttErrorCode, GroupAttrData, HandleInfo, InfoData, PrepEcho, TypeAttrData, ATT_CID};
use crate::cache::GattCache;
use crate::channel::ChannelSelector;
use crate::config;
use crate::connection::ConnectionOps;
use crate::events::ClientEvents;
use crate::proc::{Proc, ProcOp, ProcState};
use crate::security::SecurityOps;
use crate::table::{ProcId, ProcTable};
use crate::transport::{AttTransport, TxError};
use crate::types::uuid::Uuid;
use crate::Error;

mod discovery;
mod mtu;
mod notify;
mod read;
mod write;

// Which kinds consume which response class. The first resident procedure
// matching (conn, cid, op ∈ table) wins; initiators serialize per bearer,
// so at most one can match.
const RX_READ_TYPE_OPS: &[ProcOp] = &[
    ProcOp::FindIncSvcs,
    ProcOp::DiscAllChrs,
    ProcOp::DiscChrUuid,
    ProcOp::ReadUuid,
];
const RX_READ_RSP_OPS: &[ProcOp] = &[ProcOp::Read, ProcOp::ReadLong, ProcOp::FindIncSvcs];
const RX_PREP_WRITE_OPS: &[ProcOp] = &[ProcOp::WriteLong, ProcOp::WriteReliable];
const RX_EXEC_WRITE_OPS: &[ProcOp] = &[ProcOp::WriteLong, ProcOp::WriteReliable];

/// What a kind handler decided about its procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// More exchanges to come; the record goes back into the table.
    Continue,
    /// Terminal outcome delivered; the record is released.
    Done,
}

struct State {
    table: ProcTable<{ config::MAX_PROCS }>,
    chans: ChannelSelector<{ config::EATT_CHANS_MAX }>,
    /// When stalled procedures should next be retried; `None` when nothing
    /// is stalled.
    resume_at: Option<Instant>,
    /// Procedures parked while security elevation is in progress.
    #[cfg(feature = "auto-pair")]
    parked: Vec<Proc, { config::MAX_PROCS }>,
}

fn arm_resume(s: &mut State) {
    // Piggyback on an already armed clock rather than pushing it out.
    if s.resume_at.is_none() {
        s.resume_at = Some(Instant::now() + config::RESUME_RATE);
    }
}

/// Maps an `ATT_ERROR_RSP` carrying Attribute Not Found to a successful
/// end of stream.
fn not_found_is_done<V>(err: Error) -> Result<Option<V>, Error> {
    match err {
        Error::Att {
            code: AttErrorCode::AttributeNotFound,
            ..
        } => Ok(None),
        e => Err(e),
    }
}

/// The GATT client procedure engine.
///
/// Generic over the lock type guarding its state (`NoopRawMutex` when all
/// tasks share one executor, `CriticalSectionRawMutex` otherwise) and the
/// ATT transport.
pub struct GattClient<'d, M: RawMutex, T: AttTransport> {
    transport: &'d T,
    connections: &'d dyn ConnectionOps,
    events: &'d dyn ClientEvents,
    cache: Option<&'d dyn GattCache>,
    security: Option<&'d dyn SecurityOps>,
    state: Mutex<M, RefCell<State>>,
}

impl<'d, M: RawMutex, T: AttTransport> GattClient<'d, M, T> {
    /// Create an engine bound to its transport, connection manager and
    /// event delegate.
    pub fn new(transport: &'d T, connections: &'d dyn ConnectionOps, events: &'d dyn ClientEvents) -> Self {
        Self {
            transport,
            connections,
            events,
            cache: None,
            security: None,
            state: Mutex::new(RefCell::new(State {
                table: ProcTable::new(),
                chans: ChannelSelector::new(),
                resume_at: None,
                #[cfg(feature = "auto-pair")]
                parked: Vec::new(),
            })),
        }
    }

    /// Attach a persistent attribute cache consulted before discovery.
    pub fn with_cache(mut self, cache: &'d dyn GattCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the security store used for signed writes and, with the
    /// `auto-pair` feature, for transparent security elevation.
    pub fn with_security(mut self, security: &'d dyn SecurityOps) -> Self {
        self.security = Some(security);
        self
    }

    /// Whether any procedure is currently in flight.
    pub fn has_active_procs(&self) -> bool {
        self.with_state(|s| s.table.any_active())
    }

    /// Register an established Enhanced ATT bearer.
    pub fn eatt_channel_added(&self, conn: ConnHandle, cid: u16) {
        self.with_state(|s| s.chans.add(conn, cid));
    }

    /// Unregister an Enhanced ATT bearer.
    pub fn eatt_channel_removed(&self, conn: ConnHandle, cid: u16) {
        self.with_state(|s| s.chans.remove(conn, cid));
    }

    fn with_state<F: FnOnce(&mut State) -> R, R>(&self, f: F) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Create a record, make it visible to sweeps, then hand the first
    /// request to the transport.
    ///
    /// The record enters the table *before* the TX so a concurrent
    /// disconnect sweep cannot miss it. If the TX then fails for good, the
    /// record is removed again by identity; losing that race to a sweep
    /// means the sweep already delivered the terminal callback, and the
    /// initiation reports success.
    fn launch<F>(&self, conn: ConnHandle, token: usize, state: ProcState, tx: F) -> Result<(), Error>
    where
        F: FnOnce(u16) -> Result<(), TxError>,
    {
        let cid = self.pick_channel(conn, state.op());
        self.launch_on(conn, token, cid, state, tx)
    }

    /// Reserve the bearer a new procedure for `op` will run on.
    fn pick_channel(&self, conn: ConnHandle, op: ProcOp) -> u16 {
        self.with_state(|s| s.chans.pick(conn, op))
    }

    fn launch_on<F>(&self, conn: ConnHandle, token: usize, cid: u16, state: ProcState, tx: F) -> Result<(), Error>
    where
        F: FnOnce(u16) -> Result<(), TxError>,
    {
        let op = state.op();
        let deadline = Instant::now() + config::UNRESPONSIVE_TIMEOUT;
        let id = self.with_state(|s| {
            let proc = Proc {
                conn,
                cid,
                stalled: false,
                deadline,
                token,
                #[cfg(feature = "auto-pair")]
                pending_err: None,
                state,
            };
            match s.table.insert(proc) {
                Ok(id) => Ok(id),
                Err(_) => {
                    s.chans.release(conn, cid);
                    Err(Error::OutOfMemory)
                }
            }
        })?;

        match tx(cid) {
            Ok(()) => Ok(()),
            Err(TxError::OutOfMemory) if op.resumable() => {
                self.with_state(|s| {
                    if let Some(proc) = s.table.get_mut(id) {
                        proc.stalled = true;
                    }
                    arm_resume(s);
                });
                Ok(())
            }
            Err(e) => {
                let removed = self.with_state(|s| {
                    let removed = s.table.remove(id);
                    if removed.is_some() {
                        s.chans.release(conn, cid);
                    }
                    removed
                });
                match removed {
                    Some(_) => Err(e.into()),
                    None => Ok(()),
                }
            }
        }
    }

    /// Extract the oldest procedure matching (conn, cid, op ∈ `ops`).
    fn take_first(&self, conn: ConnHandle, cid: u16, ops: &[ProcOp]) -> Option<(ProcId, Proc)> {
        self.with_state(|s| {
            s.table
                .extract_first(|p| p.conn == conn && p.cid == cid && ops.contains(&p.op()))
        })
    }

    /// Put a processed record back or retire it.
    fn settle(&self, id: ProcId, mut proc: Proc, verdict: Verdict) {
        match verdict {
            Verdict::Continue => {
                // A fresh request went out (unless stalled): fresh ATT
                // transaction, fresh deadline.
                if !proc.stalled {
                    proc.deadline = Instant::now() + config::UNRESPONSIVE_TIMEOUT;
                }
                self.with_state(|s| s.table.reinsert(id, proc));
            }
            Verdict::Done => {
                self.with_state(|s| {
                    s.chans.release(proc.conn, proc.cid);
                    s.table.release(id);
                });
            }
        }
    }

    /// Issue the follow-up request a record's state calls for, converting
    /// transient buffer exhaustion into a stall.
    fn next_round(&self, proc: &mut Proc) -> Result<(), Error> {
        match self.send_request(proc) {
            Ok(()) => {
                proc.stalled = false;
                Ok(())
            }
            Err(TxError::OutOfMemory) => {
                proc.stalled = true;
                self.with_state(arm_resume);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Build and send the request the record's current state calls for.
    fn send_request(&self, proc: &mut Proc) -> Result<(), TxError> {
        let conn = proc.conn;
        let cid = proc.cid;
        match &mut proc.state {
            ProcState::Mtu => self.transport.tx_mtu(conn, self.connections.local_att_mtu(conn)),
            ProcState::DiscAllSvcs { prev_handle } => self.transport.tx_read_group_type(
                conn,
                cid,
                prev_handle.wrapping_add(1),
                0xffff,
                &Uuid::new_short(att::PRIMARY_SERVICE),
            ),
            ProcState::DiscSvcUuid { uuid, prev_handle } => self.transport.tx_find_type_value(
                conn,
                cid,
                prev_handle.wrapping_add(1),
                0xffff,
                att::PRIMARY_SERVICE,
                uuid.as_raw(),
            ),
            ProcState::FindIncSvcs {
                prev_handle,
                end_handle,
                cur_start,
                ..
            } => {
                if *cur_start == 0 {
                    // Scan for the next include declaration.
                    self.transport.tx_read_type(
                        conn,
                        cid,
                        prev_handle.wrapping_add(1),
                        *end_handle,
                        &Uuid::new_short(att::INCLUDE),
                    )
                } else {
                    // Resolve the 128-bit UUID of the found service.
                    self.transport.tx_read(conn, cid, *cur_start)
                }
            }
            ProcState::DiscAllChrs { prev_handle, end_handle } => self.transport.tx_read_type(
                conn,
                cid,
                prev_handle.wrapping_add(1),
                *end_handle,
                &Uuid::new_short(att::CHARACTERISTIC),
            ),
            ProcState::DiscChrUuid {
                prev_handle,
                end_handle,
                ..
            } => self.transport.tx_read_type(
                conn,
                cid,
                prev_handle.wrapping_add(1),
                *end_handle,
                &Uuid::new_short(att::CHARACTERISTIC),
            ),
            ProcState::DiscAllDscs {
                prev_handle,
                end_handle,
                ..
            } => self
                .transport
                .tx_find_info(conn, cid, prev_handle.wrapping_add(1), *end_handle),
            ProcState::Read { handle } => self.transport.tx_read(conn, cid, *handle),
            ProcState::ReadUuid {
                uuid,
                start_handle,
                end_handle,
            } => self
                .transport
                .tx_read_type(conn, cid, *start_handle, *end_handle, uuid),
            ProcState::ReadLong { handle, offset } => {
                if *offset == 0 {
                    self.transport.tx_read(conn, cid, *handle)
                } else {
                    self.transport.tx_read_blob(conn, cid, *handle, *offset)
                }
            }
            ProcState::ReadMult { handles, variable } => {
                self.transport.tx_read_mult(conn, cid, handles, *variable)
            }
            #[cfg(feature = "auto-pair")]
            ProcState::Write { handle, retained } => {
                self.transport.tx_write_req(conn, cid, *handle, retained)
            }
            #[cfg(not(feature = "auto-pair"))]
            ProcState::Write { .. } => Err(TxError::Failed),
            ProcState::WriteLong { attr, length } => {
                let mtu = self.connections.att_mtu(conn, cid);
                if mtu as usize <= att::PREP_WRITE_BASE_LEN {
                    return Err(TxError::NotConnected);
                }
                let max = mtu as usize - att::PREP_WRITE_BASE_LEN;
                let remaining = attr.value.len() - attr.offset as usize;
                if remaining == 0 {
                    self.transport.tx_exec_write(conn, cid, true)
                } else {
                    let part = remaining.min(max);
                    *length = part as u16;
                    let from = attr.offset as usize;
                    self.transport
                        .tx_prep_write(conn, cid, attr.handle, attr.offset, &attr.value[from..from + part])
                }
            }
            ProcState::WriteReliable { attrs, cur_attr, length } => {
                let idx = *cur_attr as usize;
                if idx >= attrs.len() {
                    return self.transport.tx_exec_write(conn, cid, true);
                }
                let mtu = self.connections.att_mtu(conn, cid);
                if mtu as usize <= att::PREP_WRITE_BASE_LEN {
                    return Err(TxError::NotConnected);
                }
                let max = mtu as usize - att::PREP_WRITE_BASE_LEN;
                let attr = &attrs[idx];
                let part = (attr.value.len() - attr.offset as usize).min(max);
                *length = part as u16;
                let from = attr.offset as usize;
                self.transport
                    .tx_prep_write(conn, cid, attr.handle, attr.offset, &attr.value[from..from + part])
            }
            ProcState::Indicate { .. } => Err(TxError::Failed),
        }
    }

    /// Deliver the one terminal failure callback a record gets, honoring
    /// the kind-specific rules: Attribute Not Found ends a discovery
    /// stream successfully, queued writes are cancelled best-effort while
    /// the link is still up, an errored indication still frees the
    /// indication slot, and a database-out-of-sync report invalidates the
    /// cache first.
    fn deliver_failure(&self, proc: &Proc, err: Error) {
        let conn = proc.conn;
        let token = proc.token;
        let link_up = !matches!(err, Error::Timeout | Error::NotConnected);
        match &proc.state {
            ProcState::Mtu => self.events.on_mtu(conn, token, Err(err)),
            ProcState::DiscAllSvcs { .. } | ProcState::DiscSvcUuid { .. } => {
                let _ = self.events.on_service(conn, token, not_found_is_done(err));
            }
            ProcState::FindIncSvcs { cur_start, .. } => {
                let result = if *cur_start == 0 {
                    not_found_is_done(err)
                } else {
                    Err(err)
                };
                let _ = self.events.on_included_service(conn, token, result);
            }
            ProcState::DiscAllChrs { .. } | ProcState::DiscChrUuid { .. } => {
                let _ = self.events.on_characteristic(conn, token, not_found_is_done(err));
            }
            ProcState::DiscAllDscs { chr_val_handle, .. } => {
                let _ = self
                    .events
                    .on_descriptor(conn, token, *chr_val_handle, not_found_is_done(err));
            }
            ProcState::Read { .. } | ProcState::ReadLong { .. } => {
                self.note_out_of_sync(conn, &err);
                let _ = self.events.on_read(conn, token, Err(err));
            }
            ProcState::ReadUuid { .. } => {
                let _ = self.events.on_read(conn, token, Err(err));
            }
            ProcState::ReadMult { variable, .. } => {
                self.note_out_of_sync(conn, &err);
                if *variable {
                    self.events.on_read_multiple_var(conn, token, Err(err));
                } else {
                    self.events.on_read_multiple(conn, token, Err(err));
                }
            }
            ProcState::Write { handle, .. } => {
                self.note_out_of_sync(conn, &err);
                self.events.on_write(conn, token, *handle, Err(err));
            }
            ProcState::WriteLong { attr, .. } => {
                self.note_out_of_sync(conn, &err);
                // Erase whatever parts the server has queued, unless the
                // failure happened before anything was queued or after the
                // execute write went out.
                if link_up && attr.offset > 0 && (attr.offset as usize) < attr.value.len() {
                    let _ = self.transport.tx_exec_write(conn, proc.cid, false);
                }
                self.events.on_write(conn, token, attr.handle, Err(err));
            }
            ProcState::WriteReliable { attrs, cur_attr, .. } => {
                self.note_out_of_sync(conn, &err);
                if link_up && (*cur_attr as usize) < attrs.len() {
                    let _ = self.transport.tx_exec_write(conn, proc.cid, false);
                }
                let handles: Vec<u16, { config::WRITE_MAX_ATTRS }> =
                    attrs.iter().map(|a| a.handle).collect();
                self.events.on_write_reliable(conn, token, &handles, Err(err));
            }
            ProcState::Indicate { chr_val_handle } => {
                self.events.on_indicate(conn, *chr_val_handle, Err(err));
            }
        }
    }

    fn note_out_of_sync(&self, conn: ConnHandle, err: &Error) {
        if let (
            Some(cache),
            Error::Att {
                code: AttErrorCode::DatabaseOutOfSync,
                ..
            },
        ) = (self.cache, err)
        {
            cache.conn_update(conn, 0, 0xffff);
        }
    }

    /// Dispatch an incoming ATT error response to the procedure it
    /// belongs to.
    pub fn rx_err(&self, conn: ConnHandle, cid: u16, handle: u16, code: AttErrorCode) {
        let taken = self.with_state(|s| s.table.extract_first(|p| p.conn == conn && p.cid == cid));
        let Some((id, proc)) = taken else {
            trace!("[gatt] error response with no matching proc");
            return;
        };

        #[cfg(feature = "auto-pair")]
        let Some(proc) = self.park_for_security(id, proc, code, handle) else {
            return;
        };

        self.deliver_failure(&proc, Error::Att { code, handle });
        self.settle(id, proc, Verdict::Done);
    }

    /// Dispatch an incoming Exchange MTU response.
    pub fn rx_mtu(&self, conn: ConnHandle, result: Result<u16, Error>) {
        let Some((id, proc)) = self.take_first(conn, ATT_CID, &[ProcOp::Mtu]) else {
            trace!("[gatt] mtu response with no matching proc");
            return;
        };
        self.events.on_mtu(conn, proc.token, result);
        self.settle(id, proc, Verdict::Done);
    }

    /// Dispatch one information data entry of a Find Information response.
    pub fn rx_find_info_idata(&self, conn: ConnHandle, cid: u16, idata: &InfoData) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscAllDscs]) else {
            trace!("[gatt] find info data with no matching proc");
            return;
        };
        let verdict = self.disc_all_dscs_rx_idata(&mut proc, idata);
        self.settle(id, proc, verdict);
    }

    /// Dispatch the end of a fully processed Find Information response.
    pub fn rx_find_info_complete(&self, conn: ConnHandle, cid: u16, status: Result<(), Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscAllDscs]) else {
            return;
        };
        let verdict = self.disc_all_dscs_rx_complete(&mut proc, status);
        self.settle(id, proc, verdict);
    }

    /// Dispatch one handles information entry of a Find By Type Value
    /// response.
    pub fn rx_find_type_value_hinfo(&self, conn: ConnHandle, cid: u16, hinfo: &HandleInfo) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscSvcUuid]) else {
            trace!("[gatt] find type value data with no matching proc");
            return;
        };
        let verdict = self.disc_svc_uuid_rx_hinfo(&mut proc, hinfo);
        self.settle(id, proc, verdict);
    }

    /// Dispatch the end of a fully processed Find By Type Value response.
    pub fn rx_find_type_value_complete(&self, conn: ConnHandle, cid: u16, status: Result<(), Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscSvcUuid]) else {
            return;
        };
        let verdict = self.disc_svc_uuid_rx_complete(&mut proc, status);
        self.settle(id, proc, verdict);
    }

    /// Dispatch one attribute data entry of a Read By Type response.
    pub fn rx_read_type_adata(&self, conn: ConnHandle, cid: u16, adata: &TypeAttrData<'_>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, RX_READ_TYPE_OPS) else {
            trace!("[gatt] read type data with no matching proc");
            return;
        };
        let verdict = match proc.op() {
            ProcOp::FindIncSvcs => self.find_inc_svcs_rx_adata(&mut proc, adata),
            ProcOp::DiscAllChrs | ProcOp::DiscChrUuid => self.disc_chr_rx_adata(&mut proc, adata),
            _ => self.read_uuid_rx_adata(&mut proc, adata),
        };
        self.settle(id, proc, verdict);
    }

    /// Dispatch the end of a fully processed Read By Type response.
    pub fn rx_read_type_complete(&self, conn: ConnHandle, cid: u16, status: Result<(), Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, RX_READ_TYPE_OPS) else {
            return;
        };
        let verdict = match proc.op() {
            ProcOp::FindIncSvcs => self.find_inc_svcs_rx_complete(&mut proc, status),
            ProcOp::DiscAllChrs | ProcOp::DiscChrUuid => self.disc_chr_rx_complete(&mut proc, status),
            _ => self.read_uuid_rx_complete(&mut proc, status),
        };
        self.settle(id, proc, verdict);
    }

    /// Dispatch one attribute data entry of a Read By Group Type response.
    pub fn rx_read_group_type_adata(&self, conn: ConnHandle, cid: u16, adata: &GroupAttrData<'_>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscAllSvcs]) else {
            trace!("[gatt] read group type data with no matching proc");
            return;
        };
        let verdict = self.disc_all_svcs_rx_adata(&mut proc, adata);
        self.settle(id, proc, verdict);
    }

    /// Dispatch the end of a fully processed Read By Group Type response.
    pub fn rx_read_group_type_complete(&self, conn: ConnHandle, cid: u16, status: Result<(), Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::DiscAllSvcs]) else {
            return;
        };
        let verdict = self.disc_all_svcs_rx_complete(&mut proc, status);
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Read response.
    pub fn rx_read_rsp(&self, conn: ConnHandle, cid: u16, result: Result<&[u8], Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, RX_READ_RSP_OPS) else {
            trace!("[gatt] read response with no matching proc");
            return;
        };
        let verdict = match proc.op() {
            ProcOp::Read => self.read_rx_rsp(&mut proc, result),
            ProcOp::ReadLong => self.read_long_rx_rsp(&mut proc, result),
            _ => self.find_inc_svcs_rx_read_rsp(&mut proc, result),
        };
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Read Blob response.
    pub fn rx_read_blob_rsp(&self, conn: ConnHandle, cid: u16, result: Result<&[u8], Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, &[ProcOp::ReadLong]) else {
            trace!("[gatt] read blob response with no matching proc");
            return;
        };
        let verdict = self.read_long_rx_rsp(&mut proc, result);
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Read Multiple response.
    pub fn rx_read_mult_rsp(&self, conn: ConnHandle, cid: u16, result: Result<&[u8], Error>, variable: bool) {
        let op = if variable { ProcOp::ReadMultVar } else { ProcOp::ReadMult };
        let Some((id, mut proc)) = self.take_first(conn, cid, &[op]) else {
            trace!("[gatt] read multiple response with no matching proc");
            return;
        };
        let verdict = self.read_mult_rx_rsp(&mut proc, result);
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Write response.
    pub fn rx_write_rsp(&self, conn: ConnHandle, cid: u16) {
        let Some((id, proc)) = self.take_first(conn, cid, &[ProcOp::Write]) else {
            trace!("[gatt] write response with no matching proc");
            return;
        };
        let verdict = self.write_rx_rsp(&proc);
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Prepare Write response.
    pub fn rx_prep_write_rsp(&self, conn: ConnHandle, cid: u16, result: Result<PrepEcho<'_>, Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, RX_PREP_WRITE_OPS) else {
            trace!("[gatt] prepare write response with no matching proc");
            return;
        };
        let verdict = match proc.op() {
            ProcOp::WriteLong => self.write_long_rx_prep(&mut proc, result),
            _ => self.write_reliable_rx_prep(&mut proc, result),
        };
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Execute Write response.
    pub fn rx_exec_write_rsp(&self, conn: ConnHandle, cid: u16, status: Result<(), Error>) {
        let Some((id, mut proc)) = self.take_first(conn, cid, RX_EXEC_WRITE_OPS) else {
            trace!("[gatt] execute write response with no matching proc");
            return;
        };
        let verdict = match proc.op() {
            ProcOp::WriteLong => self.write_long_rx_exec(&mut proc, status),
            _ => self.write_reliable_rx_exec(&mut proc, status),
        };
        self.settle(id, proc, verdict);
    }

    /// Dispatch an incoming Handle Value confirmation.
    pub fn rx_indicate_rsp(&self, conn: ConnHandle, cid: u16) {
        let Some((id, proc)) = self.take_first(conn, cid, &[ProcOp::Indicate]) else {
            trace!("[gatt] indicate confirmation with no matching proc");
            return;
        };
        let verdict = self.indicate_rx_rsp(&proc);
        self.settle(id, proc, verdict);
    }

    /// Fail every procedure of a connection that went away.
    ///
    /// Each receives exactly one `NotConnected` terminal callback; the
    /// connection's Enhanced ATT bearers are forgotten.
    pub fn connection_broken(&self, conn: ConnHandle) {
        let mut victims: Vec<(ProcId, Proc), { config::MAX_PROCS }> = Vec::new();
        self.with_state(|s| {
            s.table.extract_matching(|p| p.conn == conn, 0, &mut victims);
            s.chans.remove_conn(conn);
        });
        for (id, proc) in victims {
            self.deliver_failure(&proc, Error::NotConnected);
            self.settle(id, proc, Verdict::Done);
        }

        #[cfg(feature = "auto-pair")]
        for proc in self.take_parked(conn) {
            self.deliver_failure(&proc, Error::NotConnected);
        }
    }

    /// Run expiry and resume processing.
    ///
    /// Returns the time until this needs calling again, or `None` when no
    /// procedure is waiting on the clock. A timed out ATT transaction
    /// additionally terminates its connection, as the Core Specification
    /// requires.
    pub fn timer(&self) -> Option<Duration> {
        let now = Instant::now();

        let mut expired: Vec<(ProcId, Proc), { config::MAX_PROCS }> = Vec::new();
        self.with_state(|s| s.table.extract_matching(|p| p.deadline <= now, 0, &mut expired));
        for (id, proc) in expired {
            warn!("[gatt] procedure timed out; terminating connection");
            self.deliver_failure(&proc, Error::Timeout);
            self.connections
                .terminate(proc.conn, DisconnectReason::RemoteUserTerminatedConn);
            self.settle(id, proc, Verdict::Done);
        }

        let resume_due = self.with_state(|s| match s.resume_at {
            Some(at) if at <= now => {
                s.resume_at = None;
                true
            }
            _ => false,
        });
        if resume_due {
            self.resume_stalled();
        }

        self.with_state(|s| {
            let mut next = s.table.next_deadline();
            if let Some(at) = s.resume_at {
                next = Some(next.map_or(at, |n| n.min(at)));
            }
            next.map(|at| if at <= now { Duration::from_ticks(0) } else { at - now })
        })
    }

    /// Retry every stalled procedure, oldest first.
    fn resume_stalled(&self) {
        let mut stalled: Vec<(ProcId, Proc), { config::MAX_PROCS }> = Vec::new();
        self.with_state(|s| s.table.extract_matching(|p| p.stalled, 0, &mut stalled));
        for (id, mut proc) in stalled {
            proc.stalled = false;
            match self.send_request(&mut proc) {
                Ok(()) => self.settle(id, proc, Verdict::Continue),
                Err(TxError::OutOfMemory) => {
                    proc.stalled = true;
                    self.with_state(arm_resume);
                    self.settle(id, proc, Verdict::Continue);
                }
                Err(e) => {
                    self.deliver_failure(&proc, e.into());
                    self.settle(id, proc, Verdict::Done);
                }
            }
        }
    }

    /// Park a procedure whose error is an encryption or authentication
    /// deficiency on an unencrypted link, and kick off security elevation.
    /// Returns the record when it was not parked and should fail normally.
    #[cfg(feature = "auto-pair")]
    fn park_for_security(&self, id: ProcId, mut proc: Proc, code: AttErrorCode, handle: u16) -> Option<Proc> {
        let elevatable = matches!(
            code,
            AttErrorCode::InsufficientEncryption | AttErrorCode::InsufficientAuthentication
        );
        // Indications carry no retained payload and cannot be replayed.
        if !elevatable || proc.op() == ProcOp::Indicate || self.connections.is_encrypted(proc.conn) {
            return Some(proc);
        }
        let Some(security) = self.security else {
            return Some(proc);
        };
        if security.initiate_security(proc.conn).is_err() {
            return Some(proc);
        }

        proc.pending_err = Some((code, handle));
        let conn = proc.conn;
        let cid = proc.cid;
        self.with_state(|s| match s.parked.push(proc) {
            Ok(()) => {
                s.chans.release(conn, cid);
                s.table.release(id);
                None
            }
            Err(p) => Some(p),
        })
    }

    #[cfg(feature = "auto-pair")]
    fn take_parked(&self, conn: ConnHandle) -> Vec<Proc, { config::MAX_PROCS }> {
        self.with_state(|s| {
            let mut taken: Vec<Proc, { config::MAX_PROCS }> = Vec::new();
            let mut i = 0;
            while i < s.parked.len() {
                if s.parked[i].conn == conn {
                    let _ = taken.push(s.parked.remove(i));
                } else {
                    i += 1;
                }
            }
            taken
        })
    }

    /// Report the outcome of a security elevation started on behalf of
    /// parked procedures. On success each parked procedure is re-issued
    /// from its retained state; on failure each fails with the ATT error
    /// that parked it.
    #[cfg(feature = "auto-pair")]
    pub fn security_event(&self, conn: ConnHandle, success: bool) {
        for mut proc in self.take_parked(conn) {
            if success {
                proc.pending_err = None;
                self.relaunch(proc);
            } else {
                let (code, handle) = proc
                    .pending_err
                    .take()
                    .unwrap_or((AttErrorCode::InsufficientAuthentication, 0));
                self.deliver_failure(&proc, Error::Att { code, handle });
            }
        }
    }

    /// Re-issue a previously parked procedure from its current state.
    #[cfg(feature = "auto-pair")]
    fn relaunch(&self, mut proc: Proc) {
        let op = proc.op();
        let conn = proc.conn;
        proc.cid = self.with_state(|s| s.chans.pick(conn, op));
        proc.stalled = false;
        proc.deadline = Instant::now() + config::UNRESPONSIVE_TIMEOUT;

        match self.send_request(&mut proc) {
            Ok(()) => {}
            Err(TxError::OutOfMemory) if op.resumable() => {
                proc.stalled = true;
                self.with_state(arm_resume);
            }
            Err(e) => {
                self.with_state(|s| s.chans.release(conn, proc.cid));
                self.deliver_failure(&proc, e.into());
                return;
            }
        }

        let cid = proc.cid;
        if let Err(proc) = self.with_state(|s| s.table.insert(proc)) {
            self.with_state(|s| s.chans.release(conn, cid));
            self.deliver_failure(&proc, Error::OutOfMemory);
        }
    }
}
