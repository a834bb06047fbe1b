//! Server-initiated value transfers driven through the client engine:
//! notifications (fire and forget) and indications (confirmed).

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{GattClient, Verdict};
use crate::config;
use crate::cursor::WriteCursor;
use crate::proc::{Proc, ProcState};
use crate::transport::AttTransport;
use crate::types::HandleValue;
use crate::Error;

impl<M: RawMutex, T: AttTransport> GattClient<'_, M, T> {
    /// Send a Handle Value notification. No response, no record; the
    /// delegate's [`on_notify_tx`](crate::ClientEvents::on_notify_tx)
    /// reports that the transmission was attempted.
    pub fn notify(&self, conn: ConnHandle, chr_val_handle: u16, value: &[u8]) -> Result<(), Error> {
        info!("[gatt] notify att_handle={}", chr_val_handle);

        let cid = self.with_state(|s| s.chans.pick_transient(conn));
        let res = self
            .transport
            .tx_notify(conn, cid, chr_val_handle, value)
            .map_err(Error::from);
        self.with_state(|s| s.chans.release(conn, cid));

        self.events.on_notify_tx(conn, chr_val_handle, res);
        res
    }

    /// Send notifications for several characteristics at once, packing as
    /// many as fit into Multiple Handle Value notification PDUs.
    ///
    /// Peers that never announced support for the multiple-handle PDU get
    /// one plain notification per tuple instead. A value too large to
    /// share a PDU is also sent on its own. A batch that ends up holding a
    /// single tuple is sent as a plain notification.
    pub fn notify_multiple(&self, conn: ConnHandle, tuples: &[HandleValue<'_>]) -> Result<(), Error> {
        info!("[gatt] notify multiple count={}", tuples.len());

        let cid = self.with_state(|s| s.chans.pick_transient(conn));
        let rc = self.notify_multiple_on(conn, cid, tuples);
        self.with_state(|s| s.chans.release(conn, cid));

        for t in tuples {
            self.events.on_notify_tx(conn, t.handle, rc);
        }
        rc
    }

    fn notify_multiple_on(&self, conn: ConnHandle, cid: u16, tuples: &[HandleValue<'_>]) -> Result<(), Error> {
        if !self.connections.supports_multi_notify(conn) {
            for t in tuples {
                self.transport.tx_notify(conn, cid, t.handle, t.value)?;
            }
            return Ok(());
        }

        let mtu = self.connections.att_mtu(conn, cid);
        if mtu <= 1 {
            return Err(Error::NotConnected);
        }
        // Batch capacity: MTU minus the opcode octet.
        let cap = (mtu as usize - 1).min(config::ATT_VALUE_MAX_LEN);

        let mut buf = [0u8; config::ATT_VALUE_MAX_LEN];
        let mut w = WriteCursor::new(&mut buf);
        let mut staged = 0usize;
        let mut last_staged = 0usize;

        for (i, t) in tuples.iter().enumerate() {
            if t.handle == 0 {
                return Err(Error::InvalidArgument);
            }
            // Each record is handle + length + value.
            let need = 4 + t.value.len();
            if w.len() + need > cap {
                if staged < 2 {
                    // Too large to share a PDU with what little is
                    // staged; send it on its own, batch untouched.
                    self.transport.tx_notify(conn, cid, t.handle, t.value)?;
                    continue;
                }
                self.transport.tx_notify_mult(conn, cid, w.bytes())?;
                w.reset();
                staged = 0;
                if need > cap {
                    self.transport.tx_notify(conn, cid, t.handle, t.value)?;
                    continue;
                }
            }
            unwrap!(w.write(t.handle));
            unwrap!(w.write(t.value.len() as u16));
            unwrap!(w.append(t.value));
            staged += 1;
            last_staged = i;
        }

        match staged {
            0 => Ok(()),
            // A lone leftover tuple goes out as a plain notification.
            1 => {
                let t = tuples[last_staged];
                self.transport
                    .tx_notify(conn, cid, t.handle, t.value)
                    .map_err(Into::into)
            }
            _ => self.transport.tx_notify_mult(conn, cid, w.bytes()).map_err(Into::into),
        }
    }

    /// Send a Handle Value indication and wait for the peer's
    /// confirmation, which arrives via
    /// [`on_indicate`](crate::ClientEvents::on_indicate).
    ///
    /// At most one indication may be in flight per connection; callers
    /// serialize.
    pub fn indicate(&self, conn: ConnHandle, chr_val_handle: u16, value: &[u8]) -> Result<(), Error> {
        info!("[gatt] indicate att_handle={}", chr_val_handle);

        let state = ProcState::Indicate { chr_val_handle };
        self.launch(conn, 0, state, |cid| {
            self.transport.tx_indicate(conn, cid, chr_val_handle, value)
        })
    }

    pub(super) fn indicate_rx_rsp(&self, proc: &Proc) -> Verdict {
        let ProcState::Indicate { chr_val_handle } = &proc.state else {
            unreachable!()
        };
        self.events.on_indicate(proc.conn, *chr_val_handle, Ok(()));
        Verdict::Done
    }
}
