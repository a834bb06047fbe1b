//! Service, characteristic and descriptor discovery procedures.
//!
//! All six kinds share the same shape: a paginated request over a handle
//! range, one streaming callback per discovered entity, termination on
//! range exhaustion or on the peer reporting Attribute Not Found, and a
//! protocol error whenever the peer hands back handles out of order.

use core::ops::ControlFlow;

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{GattClient, Verdict};
use crate::att::{self, GroupAttrData, HandleInfo, InfoData, TypeAttrData};
use crate::cursor::ReadCursor;
use crate::proc::{Proc, ProcState};
use crate::transport::AttTransport;
use crate::types::uuid::Uuid;
use crate::types::{Characteristic, Descriptor, IncludedService, Service};
use crate::Error;

impl<M: RawMutex, T: AttTransport> GattClient<'_, M, T> {
    /// Discover all primary services of the peer.
    ///
    /// Each service arrives via
    /// [`on_service`](crate::ClientEvents::on_service), in handle order,
    /// followed by the end-of-stream marker.
    pub fn disc_all_svcs(&self, conn: ConnHandle, token: usize) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_all_svcs(conn, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] discover all services");

        self.launch(conn, token, ProcState::DiscAllSvcs { prev_handle: 0 }, |cid| {
            self.transport
                .tx_read_group_type(conn, cid, 1, 0xffff, &Uuid::new_short(att::PRIMARY_SERVICE))
        })
    }

    /// Discover the primary services with the given UUID.
    pub fn disc_svc_by_uuid(&self, conn: ConnHandle, uuid: &Uuid, token: usize) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_svc_by_uuid(conn, uuid, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] discover service by uuid");

        let state = ProcState::DiscSvcUuid {
            uuid: uuid.clone(),
            prev_handle: 0,
        };
        self.launch(conn, token, state, |cid| {
            self.transport
                .tx_find_type_value(conn, cid, 1, 0xffff, att::PRIMARY_SERVICE, uuid.as_raw())
        })
    }

    /// Find the services included by the service occupying
    /// `[start_handle, end_handle]`.
    pub fn find_inc_svcs(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        token: usize,
    ) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_inc_svcs(conn, start_handle, end_handle, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] find included services start={} end={}", start_handle, end_handle);

        let state = ProcState::FindIncSvcs {
            prev_handle: start_handle.wrapping_sub(1),
            end_handle,
            cur_start: 0,
            cur_end: 0,
        };
        self.launch(conn, token, state, |cid| {
            self.transport
                .tx_read_type(conn, cid, start_handle, end_handle, &Uuid::new_short(att::INCLUDE))
        })
    }

    /// Discover all characteristics in `[start_handle, end_handle]`.
    pub fn disc_all_chrs(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        token: usize,
    ) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_all_chrs(conn, start_handle, end_handle, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] discover all characteristics start={} end={}", start_handle, end_handle);

        let state = ProcState::DiscAllChrs {
            prev_handle: start_handle.wrapping_sub(1),
            end_handle,
        };
        self.launch(conn, token, state, |cid| {
            self.transport
                .tx_read_type(conn, cid, start_handle, end_handle, &Uuid::new_short(att::CHARACTERISTIC))
        })
    }

    /// Discover the characteristics with the given UUID in
    /// `[start_handle, end_handle]`. Non-matching declarations are
    /// filtered out before the delegate sees anything.
    pub fn disc_chrs_by_uuid(
        &self,
        conn: ConnHandle,
        start_handle: u16,
        end_handle: u16,
        uuid: &Uuid,
        token: usize,
    ) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_chrs_by_uuid(conn, start_handle, end_handle, uuid, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] discover characteristics by uuid start={} end={}", start_handle, end_handle);

        let state = ProcState::DiscChrUuid {
            uuid: uuid.clone(),
            prev_handle: start_handle.wrapping_sub(1),
            end_handle,
        };
        self.launch(conn, token, state, |cid| {
            self.transport
                .tx_read_type(conn, cid, start_handle, end_handle, &Uuid::new_short(att::CHARACTERISTIC))
        })
    }

    /// Discover all descriptors of the characteristic whose value sits at
    /// `chr_val_handle`, up to `end_handle`.
    pub fn disc_all_dscs(
        &self,
        conn: ConnHandle,
        chr_val_handle: u16,
        end_handle: u16,
        token: usize,
    ) -> Result<(), Error> {
        if let Some(cache) = self.cache {
            if cache.search_all_dscs(conn, chr_val_handle, end_handle, self.events, token) {
                return Ok(());
            }
        }
        info!("[gatt] discover all descriptors chr_val_handle={} end={}", chr_val_handle, end_handle);

        let state = ProcState::DiscAllDscs {
            chr_val_handle,
            prev_handle: chr_val_handle,
            end_handle,
        };
        self.launch(conn, token, state, |cid| {
            self.transport.tx_find_info(conn, cid, chr_val_handle.wrapping_add(1), end_handle)
        })
    }

    pub(super) fn disc_all_svcs_rx_adata(&self, proc: &mut Proc, adata: &GroupAttrData<'_>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::DiscAllSvcs { prev_handle } = &mut proc.state else {
            unreachable!()
        };

        let Ok(uuid) = Uuid::from_att_value(adata.value) else {
            let _ = self.events.on_service(conn, token, Err(Error::BadData));
            return Verdict::Done;
        };
        if adata.end_group_handle <= *prev_handle {
            // Services out of order; terminate the procedure.
            let _ = self.events.on_service(conn, token, Err(Error::BadData));
            return Verdict::Done;
        }
        *prev_handle = adata.end_group_handle;

        let svc = Service {
            start_handle: adata.att_handle,
            end_handle: adata.end_group_handle,
            uuid,
        };
        match self.events.on_service(conn, token, Ok(Some(svc))) {
            ControlFlow::Continue(()) => Verdict::Continue,
            ControlFlow::Break(()) => Verdict::Done,
        }
    }

    pub(super) fn disc_all_svcs_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let prev = match &proc.state {
            ProcState::DiscAllSvcs { prev_handle } => *prev_handle,
            _ => unreachable!(),
        };

        if let Err(e) = status {
            let _ = self.events.on_service(conn, token, Err(e));
            return Verdict::Done;
        }
        if prev == 0xffff {
            let _ = self.events.on_service(conn, token, Ok(None));
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_service(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    pub(super) fn disc_svc_uuid_rx_hinfo(&self, proc: &mut Proc, hinfo: &HandleInfo) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::DiscSvcUuid { uuid, prev_handle } = &mut proc.state else {
            unreachable!()
        };

        if hinfo.group_end_handle <= *prev_handle {
            let _ = self.events.on_service(conn, token, Err(Error::BadData));
            return Verdict::Done;
        }
        *prev_handle = hinfo.group_end_handle;

        let svc = Service {
            start_handle: hinfo.attr_handle,
            end_handle: hinfo.group_end_handle,
            uuid: uuid.clone(),
        };
        match self.events.on_service(conn, token, Ok(Some(svc))) {
            ControlFlow::Continue(()) => Verdict::Continue,
            ControlFlow::Break(()) => Verdict::Done,
        }
    }

    pub(super) fn disc_svc_uuid_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let prev = match &proc.state {
            ProcState::DiscSvcUuid { prev_handle, .. } => *prev_handle,
            _ => unreachable!(),
        };

        if let Err(e) = status {
            let _ = self.events.on_service(conn, token, Err(e));
            return Verdict::Done;
        }
        if prev == 0xffff {
            let _ = self.events.on_service(conn, token, Ok(None));
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_service(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    pub(super) fn find_inc_svcs_rx_adata(&self, proc: &mut Proc, adata: &TypeAttrData<'_>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::FindIncSvcs {
            prev_handle,
            cur_start,
            cur_end,
            ..
        } = &mut proc.state
        else {
            unreachable!()
        };

        if *cur_start != 0 {
            // A 128-bit UUID resolution is outstanding; one at a time.
            // Further entries in this response are ignored.
            return Verdict::Continue;
        }
        if adata.att_handle <= *prev_handle {
            let _ = self.events.on_included_service(conn, token, Err(Error::BadData));
            return Verdict::Done;
        }
        *prev_handle = adata.att_handle;

        let mut r = ReadCursor::new(adata.value);
        match adata.value.len() {
            att::INC_SVC_LEN_NO_UUID => {
                // 128-bit service UUIDs are not carried inline; read the
                // included service declaration to resolve it.
                *cur_start = unwrap!(r.read::<u16>());
                *cur_end = unwrap!(r.read::<u16>());
                Verdict::Continue
            }
            att::INC_SVC_LEN_UUID => {
                let start_handle = unwrap!(r.read::<u16>());
                let end_handle = unwrap!(r.read::<u16>());
                let uuid = Uuid::new_short(unwrap!(r.read::<u16>()));
                let inc = IncludedService {
                    handle: adata.att_handle,
                    start_handle,
                    end_handle,
                    uuid,
                };
                match self.events.on_included_service(conn, token, Ok(Some(inc))) {
                    ControlFlow::Continue(()) => Verdict::Continue,
                    ControlFlow::Break(()) => Verdict::Done,
                }
            }
            _ => {
                let _ = self.events.on_included_service(conn, token, Err(Error::BadData));
                Verdict::Done
            }
        }
    }

    pub(super) fn find_inc_svcs_rx_read_rsp(&self, proc: &mut Proc, result: Result<&[u8], Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;

        let inc = {
            let ProcState::FindIncSvcs {
                prev_handle,
                cur_start,
                cur_end,
                ..
            } = &mut proc.state
            else {
                unreachable!()
            };

            let data = match result {
                Ok(data) => data,
                Err(e) => {
                    let _ = self.events.on_included_service(conn, token, Err(e));
                    return Verdict::Done;
                }
            };
            if *cur_start == 0 {
                // A read response with no resolution outstanding.
                let _ = self.events.on_included_service(conn, token, Err(Error::BadData));
                return Verdict::Done;
            }
            if data.len() != 16 {
                let _ = self.events.on_included_service(conn, token, Err(Error::BadData));
                return Verdict::Done;
            }
            let Ok(uuid) = Uuid::from_att_value(data) else {
                let _ = self.events.on_included_service(conn, token, Err(Error::BadData));
                return Verdict::Done;
            };

            let inc = IncludedService {
                handle: *prev_handle,
                start_handle: *cur_start,
                end_handle: *cur_end,
                uuid,
            };
            *cur_start = 0;
            *cur_end = 0;
            inc
        };

        if let ControlFlow::Break(()) = self.events.on_included_service(conn, token, Ok(Some(inc))) {
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_included_service(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    pub(super) fn find_inc_svcs_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let prev = match &proc.state {
            ProcState::FindIncSvcs { prev_handle, .. } => *prev_handle,
            _ => unreachable!(),
        };

        if let Err(e) = status {
            let _ = self.events.on_included_service(conn, token, Err(e));
            return Verdict::Done;
        }
        if prev == 0xffff {
            let _ = self.events.on_included_service(conn, token, Ok(None));
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_included_service(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    /// Shared by discover-all and discover-by-uuid; the latter filters on
    /// the target UUID before the delegate sees the entry.
    pub(super) fn disc_chr_rx_adata(&self, proc: &mut Proc, adata: &TypeAttrData<'_>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let (prev_handle, filter) = match &mut proc.state {
            ProcState::DiscAllChrs { prev_handle, .. } => (prev_handle, None),
            ProcState::DiscChrUuid { prev_handle, uuid, .. } => {
                let filter = uuid.clone();
                (prev_handle, Some(filter))
            }
            _ => unreachable!(),
        };

        let value = adata.value;
        let chr = match value.len() {
            att::CHR_DECL_LEN_UUID16 | att::CHR_DECL_LEN_UUID128 => {
                match Uuid::from_att_value(&value[3..]) {
                    Ok(uuid) => Characteristic {
                        def_handle: adata.att_handle,
                        val_handle: u16::from_le_bytes([value[1], value[2]]),
                        properties: value[0],
                        uuid,
                    },
                    Err(_) => {
                        let _ = self.events.on_characteristic(conn, token, Err(Error::BadData));
                        return Verdict::Done;
                    }
                }
            }
            _ => {
                let _ = self.events.on_characteristic(conn, token, Err(Error::BadData));
                return Verdict::Done;
            }
        };

        if adata.att_handle <= *prev_handle {
            let _ = self.events.on_characteristic(conn, token, Err(Error::BadData));
            return Verdict::Done;
        }
        *prev_handle = adata.att_handle;

        if let Some(filter) = filter {
            if filter != chr.uuid {
                return Verdict::Continue;
            }
        }
        match self.events.on_characteristic(conn, token, Ok(Some(chr))) {
            ControlFlow::Continue(()) => Verdict::Continue,
            ControlFlow::Break(()) => Verdict::Done,
        }
    }

    pub(super) fn disc_chr_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let (prev, end) = match &proc.state {
            ProcState::DiscAllChrs { prev_handle, end_handle } => (*prev_handle, *end_handle),
            ProcState::DiscChrUuid {
                prev_handle,
                end_handle,
                ..
            } => (*prev_handle, *end_handle),
            _ => unreachable!(),
        };

        if let Err(e) = status {
            let _ = self.events.on_characteristic(conn, token, Err(e));
            return Verdict::Done;
        }
        if prev == end {
            let _ = self.events.on_characteristic(conn, token, Ok(None));
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_characteristic(conn, token, Err(e));
                Verdict::Done
            }
        }
    }

    pub(super) fn disc_all_dscs_rx_idata(&self, proc: &mut Proc, idata: &InfoData) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let ProcState::DiscAllDscs {
            chr_val_handle,
            prev_handle,
            ..
        } = &mut proc.state
        else {
            unreachable!()
        };
        let chr_val = *chr_val_handle;

        if idata.attr_handle <= *prev_handle {
            let _ = self.events.on_descriptor(conn, token, chr_val, Err(Error::BadData));
            return Verdict::Done;
        }
        *prev_handle = idata.attr_handle;

        let dsc = Descriptor {
            handle: idata.attr_handle,
            uuid: idata.uuid.clone(),
        };
        match self.events.on_descriptor(conn, token, chr_val, Ok(Some(dsc))) {
            ControlFlow::Continue(()) => Verdict::Continue,
            ControlFlow::Break(()) => Verdict::Done,
        }
    }

    pub(super) fn disc_all_dscs_rx_complete(&self, proc: &mut Proc, status: Result<(), Error>) -> Verdict {
        let conn = proc.conn;
        let token = proc.token;
        let (chr_val, prev, end) = match &proc.state {
            ProcState::DiscAllDscs {
                chr_val_handle,
                prev_handle,
                end_handle,
            } => (*chr_val_handle, *prev_handle, *end_handle),
            _ => unreachable!(),
        };

        if let Err(e) = status {
            let _ = self.events.on_descriptor(conn, token, chr_val, Err(e));
            return Verdict::Done;
        }
        if prev == end {
            let _ = self.events.on_descriptor(conn, token, chr_val, Ok(None));
            return Verdict::Done;
        }
        match self.next_round(proc) {
            Ok(()) => Verdict::Continue,
            Err(e) => {
                let _ = self.events.on_descriptor(conn, token, chr_val, Err(e));
                Verdict::Done
            }
        }
    }
}
