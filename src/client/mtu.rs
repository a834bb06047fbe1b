//! MTU exchange.

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::GattClient;
use crate::proc::ProcState;
use crate::transport::AttTransport;
use crate::Error;

impl<M: RawMutex, T: AttTransport> GattClient<'_, M, T> {
    /// Initiate an MTU exchange, offering our receive MTU for the
    /// connection. One round trip; the peer's advertised MTU arrives in
    /// [`on_mtu`](crate::ClientEvents::on_mtu).
    ///
    /// Always runs on the unenhanced ATT bearer.
    pub fn exchange_mtu(&self, conn: ConnHandle, token: usize) -> Result<(), Error> {
        info!("[gatt] exchange mtu");
        let mtu = self.connections.local_att_mtu(conn);
        self.launch(conn, token, ProcState::Mtu, |_cid| self.transport.tx_mtu(conn, mtu))
    }
}
