//! Connection manager interface.

use bt_hci::param::{ConnHandle, DisconnectReason};

/// The slice of the connection manager the engine depends on.
pub trait ConnectionOps {
    /// Whether the connection identified by `conn` currently exists.
    fn is_connected(&self, conn: ConnHandle) -> bool;

    /// Request termination of a connection. Invoked when an ATT transaction
    /// times out, as the Core Specification requires.
    fn terminate(&self, conn: ConnHandle, reason: DisconnectReason);

    /// The negotiated ATT MTU of the given bearer, or 0 if the connection
    /// or channel is gone.
    fn att_mtu(&self, conn: ConnHandle, cid: u16) -> u16;

    /// The MTU we announce in an Exchange MTU request.
    fn local_att_mtu(&self, conn: ConnHandle) -> u16;

    /// Whether the link is currently encrypted.
    fn is_encrypted(&self, conn: ConnHandle) -> bool;

    /// Whether the peer announced support for the Multiple Handle Value
    /// Notification PDU in its client supported features.
    fn supports_multi_notify(&self, conn: ConnHandle) -> bool {
        false
    }
}
