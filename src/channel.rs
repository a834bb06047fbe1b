//! Bearer selection.
//!
//! Every procedure runs over exactly one L2CAP bearer: the fixed ATT
//! channel, or an Enhanced ATT channel reserved for the duration of the
//! procedure. The transport layer reports EATT channels as they come and
//! go; with none registered everything falls back to CID 4.

use bt_hci::param::ConnHandle;

use crate::att::ATT_CID;
use crate::proc::ProcOp;

#[derive(Debug, Clone, Copy)]
struct EattChan {
    conn: ConnHandle,
    cid: u16,
    busy: bool,
}

pub(crate) struct ChannelSelector<const N: usize> {
    chans: heapless::Vec<EattChan, N>,
}

impl<const N: usize> ChannelSelector<N> {
    pub const fn new() -> Self {
        Self {
            chans: heapless::Vec::new(),
        }
    }

    /// Register an established EATT channel. Silently ignored when the
    /// registry is full; the engine then simply keeps using fewer bearers.
    pub fn add(&mut self, conn: ConnHandle, cid: u16) {
        if self.chans.iter().any(|c| c.conn == conn && c.cid == cid) {
            return;
        }
        if self.chans.push(EattChan { conn, cid, busy: false }).is_err() {
            warn!("[gatt] eatt registry full, ignoring cid {}", cid);
        }
    }

    /// Drop a single EATT channel, e.g. after the peer closed it.
    pub fn remove(&mut self, conn: ConnHandle, cid: u16) {
        self.chans.retain(|c| !(c.conn == conn && c.cid == cid));
    }

    /// Drop every channel of a connection.
    pub fn remove_conn(&mut self, conn: ConnHandle) {
        self.chans.retain(|c| c.conn != conn);
    }

    /// Choose the bearer for a new procedure, reserving an EATT channel
    /// when one is free. MTU exchange is only defined on the unenhanced
    /// bearer and never gets an EATT channel.
    pub fn pick(&mut self, conn: ConnHandle, op: ProcOp) -> u16 {
        if op == ProcOp::Mtu {
            return ATT_CID;
        }
        self.reserve(conn)
    }

    /// Choose a bearer for a fire-and-forget transmission. The caller
    /// releases it right after handing the PDU to the transport.
    pub fn pick_transient(&mut self, conn: ConnHandle) -> u16 {
        self.reserve(conn)
    }

    /// Return a reservation.
    pub fn release(&mut self, conn: ConnHandle, cid: u16) {
        if cid == ATT_CID {
            return;
        }
        if let Some(chan) = self.chans.iter_mut().find(|c| c.conn == conn && c.cid == cid) {
            chan.busy = false;
        }
    }

    fn reserve(&mut self, conn: ConnHandle) -> u16 {
        if let Some(chan) = self.chans.iter_mut().find(|c| c.conn == conn && !c.busy) {
            chan.busy = true;
            return chan.cid;
        }
        ATT_CID
    }
}
