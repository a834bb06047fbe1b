//! Optional persistent GATT attribute cache interface.
//!
//! When a cache is attached, discovery and read-by-uuid initiators consult
//! it first. A hit delivers the cached results through the normal event
//! delegate, synchronously, and the operation never touches the wire.

use bt_hci::param::ConnHandle;

use crate::events::ClientEvents;
use crate::types::uuid::Uuid;

/// A persistent cache of a peer's attribute database.
///
/// Each `search_*` method either satisfies the request entirely — invoking
/// the matching [`ClientEvents`] callbacks, including the end-of-stream
/// callback, and returning `true` — or leaves the delegate untouched and
/// returns `false`, in which case the engine falls through to normal
/// initiation.
pub trait GattCache {
    /// Serve a discover-all-primary-services request from cache.
    fn search_all_svcs(&self, conn: ConnHandle, events: &dyn ClientEvents, token: usize) -> bool;

    /// Serve a discover-service-by-uuid request from cache.
    fn search_svc_by_uuid(&self, conn: ConnHandle, uuid: &Uuid, events: &dyn ClientEvents, token: usize) -> bool;

    /// Serve a find-included-services request from cache.
    fn search_inc_svcs(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        events: &dyn ClientEvents,
        token: usize,
    ) -> bool;

    /// Serve a discover-all-characteristics request from cache.
    fn search_all_chrs(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        events: &dyn ClientEvents,
        token: usize,
    ) -> bool;

    /// Serve a discover-characteristics-by-uuid request from cache.
    fn search_chrs_by_uuid(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        uuid: &Uuid,
        events: &dyn ClientEvents,
        token: usize,
    ) -> bool;

    /// Serve a discover-all-descriptors request from cache.
    fn search_all_dscs(
        &self,
        conn: ConnHandle,
        chr_val_handle: u16,
        end_handle: u16,
        events: &dyn ClientEvents,
        token: usize,
    ) -> bool;

    /// Invalidate the cached range `[start, end]` for a connection. Called
    /// by the engine whenever the peer reports its database out of sync.
    fn conn_update(&self, conn: ConnHandle, start_handle: u16, end_handle: u16);
}
