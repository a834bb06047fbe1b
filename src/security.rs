//! Security database interface.

use bt_hci::param::ConnHandle;

use crate::Error;

/// Our signing keys for a bonded peer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct LocalKeys {
    /// Connection Signature Resolving Key, little endian.
    pub csrk: [u8; 16],
    /// Current sign counter.
    pub sign_counter: u32,
}

/// The slice of the security subsystem the engine depends on.
pub trait SecurityOps {
    /// Our signing keys for the peer of `conn`, if a CSRK is stored.
    fn local_keys(&self, conn: ConnHandle) -> Option<LocalKeys>;

    /// Start security elevation (pairing or encryption) on the link.
    fn initiate_security(&self, conn: ConnHandle) -> Result<(), Error>;
}
