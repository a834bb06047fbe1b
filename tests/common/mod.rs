//! Mock collaborators for driving the engine without a radio.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ops::ControlFlow;

use gattling::prelude::*;

/// A recorded transmission.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Tx {
    Mtu { mtu: u16 },
    Read { cid: u16, handle: u16 },
    ReadBlob { handle: u16, offset: u16 },
    ReadType { start: u16, end: u16, uuid: Uuid },
    ReadGroupType { start: u16, end: u16, uuid: Uuid },
    FindInfo { start: u16, end: u16 },
    FindTypeValue { start: u16, end: u16, attr_type: u16, value: Vec<u8> },
    ReadMult { handles: Vec<u16>, variable: bool },
    WriteCmd { handle: u16, value: Vec<u8> },
    WriteReq { handle: u16, value: Vec<u8> },
    SignedWriteCmd { handle: u16, counter: u32, value: Vec<u8> },
    PrepWrite { handle: u16, offset: u16, value: Vec<u8> },
    ExecWrite { commit: bool },
    Notify { handle: u16, value: Vec<u8> },
    NotifyMult { batch: Vec<u8> },
    Indicate { handle: u16, value: Vec<u8> },
}

/// Transport mock: records every transmission and pops the next scripted
/// result per call (default `Ok`). An optional one-shot hook runs before
/// a transmission is attempted, which is how tests step into the window
/// between record insertion and the first TX.
#[derive(Default)]
pub struct MockTransport {
    pub sent: RefCell<Vec<Tx>>,
    pub script: RefCell<VecDeque<Result<(), TxError>>>,
    #[allow(clippy::type_complexity)]
    pub pre_tx: RefCell<Option<Box<dyn Fn()>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, err: TxError) {
        self.script.borrow_mut().push_back(Err(err));
    }

    pub fn sent(&self) -> Vec<Tx> {
        self.sent.borrow().clone()
    }

    pub fn last_sent(&self) -> Tx {
        self.sent.borrow().last().expect("nothing sent").clone()
    }

    fn push(&self, tx: Tx) -> Result<(), TxError> {
        if let Some(hook) = self.pre_tx.borrow_mut().take() {
            hook();
        }
        self.sent.borrow_mut().push(tx);
        self.script.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

impl AttTransport for MockTransport {
    fn tx_mtu(&self, _conn: ConnHandle, mtu: u16) -> Result<(), TxError> {
        self.push(Tx::Mtu { mtu })
    }

    fn tx_read(&self, _conn: ConnHandle, cid: u16, handle: u16) -> Result<(), TxError> {
        self.push(Tx::Read { cid, handle })
    }

    fn tx_read_blob(&self, _conn: ConnHandle, _cid: u16, handle: u16, offset: u16) -> Result<(), TxError> {
        self.push(Tx::ReadBlob { handle, offset })
    }

    fn tx_read_type(&self, _conn: ConnHandle, _cid: u16, start: u16, end: u16, attr_type: &Uuid) -> Result<(), TxError> {
        self.push(Tx::ReadType {
            start,
            end,
            uuid: attr_type.clone(),
        })
    }

    fn tx_read_group_type(
        &self,
        _conn: ConnHandle,
        _cid: u16,
        start: u16,
        end: u16,
        group_type: &Uuid,
    ) -> Result<(), TxError> {
        self.push(Tx::ReadGroupType {
            start,
            end,
            uuid: group_type.clone(),
        })
    }

    fn tx_find_info(&self, _conn: ConnHandle, _cid: u16, start: u16, end: u16) -> Result<(), TxError> {
        self.push(Tx::FindInfo { start, end })
    }

    fn tx_find_type_value(
        &self,
        _conn: ConnHandle,
        _cid: u16,
        start: u16,
        end: u16,
        attr_type: u16,
        value: &[u8],
    ) -> Result<(), TxError> {
        self.push(Tx::FindTypeValue {
            start,
            end,
            attr_type,
            value: value.to_vec(),
        })
    }

    fn tx_read_mult(&self, _conn: ConnHandle, _cid: u16, handles: &[u16], variable: bool) -> Result<(), TxError> {
        self.push(Tx::ReadMult {
            handles: handles.to_vec(),
            variable,
        })
    }

    fn tx_write_cmd(&self, _conn: ConnHandle, _cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError> {
        self.push(Tx::WriteCmd {
            handle,
            value: value.to_vec(),
        })
    }

    fn tx_write_req(&self, _conn: ConnHandle, _cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError> {
        self.push(Tx::WriteReq {
            handle,
            value: value.to_vec(),
        })
    }

    fn tx_signed_write_cmd(
        &self,
        _conn: ConnHandle,
        handle: u16,
        _csrk: &[u8; 16],
        counter: u32,
        value: &[u8],
    ) -> Result<(), TxError> {
        self.push(Tx::SignedWriteCmd {
            handle,
            counter,
            value: value.to_vec(),
        })
    }

    fn tx_prep_write(&self, _conn: ConnHandle, _cid: u16, handle: u16, offset: u16, value: &[u8]) -> Result<(), TxError> {
        self.push(Tx::PrepWrite {
            handle,
            offset,
            value: value.to_vec(),
        })
    }

    fn tx_exec_write(&self, _conn: ConnHandle, _cid: u16, commit: bool) -> Result<(), TxError> {
        self.push(Tx::ExecWrite { commit })
    }

    fn tx_notify(&self, _conn: ConnHandle, _cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError> {
        self.push(Tx::Notify {
            handle,
            value: value.to_vec(),
        })
    }

    fn tx_notify_mult(&self, _conn: ConnHandle, _cid: u16, batch: &[u8]) -> Result<(), TxError> {
        self.push(Tx::NotifyMult { batch: batch.to_vec() })
    }

    fn tx_indicate(&self, _conn: ConnHandle, _cid: u16, handle: u16, value: &[u8]) -> Result<(), TxError> {
        self.push(Tx::Indicate {
            handle,
            value: value.to_vec(),
        })
    }
}

/// Connection table mock.
pub struct MockConns {
    pub connected: RefCell<Vec<u16>>,
    pub mtu: Cell<u16>,
    pub local_mtu: Cell<u16>,
    pub encrypted: Cell<bool>,
    pub multi_notify: Cell<bool>,
    pub terminated: RefCell<Vec<(u16, DisconnectReason)>>,
}

impl MockConns {
    pub fn new(handles: &[u16]) -> Self {
        Self {
            connected: RefCell::new(handles.to_vec()),
            mtu: Cell::new(23),
            local_mtu: Cell::new(23),
            encrypted: Cell::new(false),
            multi_notify: Cell::new(false),
            terminated: RefCell::new(Vec::new()),
        }
    }
}

impl ConnectionOps for MockConns {
    fn is_connected(&self, conn: ConnHandle) -> bool {
        self.connected.borrow().contains(&conn.raw())
    }

    fn terminate(&self, conn: ConnHandle, reason: DisconnectReason) {
        self.terminated.borrow_mut().push((conn.raw(), reason));
    }

    fn att_mtu(&self, conn: ConnHandle, _cid: u16) -> u16 {
        if self.is_connected(conn) {
            self.mtu.get()
        } else {
            0
        }
    }

    fn local_att_mtu(&self, _conn: ConnHandle) -> u16 {
        self.local_mtu.get()
    }

    fn is_encrypted(&self, _conn: ConnHandle) -> bool {
        self.encrypted.get()
    }

    fn supports_multi_notify(&self, _conn: ConnHandle) -> bool {
        self.multi_notify.get()
    }
}

/// A recorded delegate callback, with owned copies of borrowed data.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Ev {
    Mtu { token: usize, result: Result<u16, Error> },
    Service { token: usize, result: Result<Option<Service>, Error> },
    IncService { token: usize, result: Result<Option<IncludedService>, Error> },
    Characteristic { token: usize, result: Result<Option<Characteristic>, Error> },
    Descriptor { token: usize, chr_val_handle: u16, result: Result<Option<Descriptor>, Error> },
    Read { token: usize, result: Result<Option<(u16, u16, Vec<u8>)>, Error> },
    ReadMult { token: usize, result: Result<Vec<u8>, Error> },
    ReadMultVar { token: usize, result: Result<Vec<(u16, Vec<u8>)>, Error> },
    Write { token: usize, handle: u16, result: Result<(), Error> },
    WriteReliable { token: usize, handles: Vec<u16>, result: Result<(), Error> },
    Indicate { handle: u16, result: Result<(), Error> },
    NotifyTx { handle: u16, result: Result<(), Error> },
}

/// Event sink: records every callback; optionally breaks a stream after a
/// number of data callbacks.
#[derive(Default)]
pub struct MockEvents {
    pub log: RefCell<Vec<Ev>>,
    pub break_after: Cell<Option<usize>>,
    data_seen: Cell<usize>,
}

impl MockEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Ev> {
        std::mem::take(&mut self.log.borrow_mut())
    }

    fn flow(&self, is_data: bool) -> ControlFlow<()> {
        if !is_data {
            return ControlFlow::Continue(());
        }
        let seen = self.data_seen.get() + 1;
        self.data_seen.set(seen);
        match self.break_after.get() {
            Some(n) if seen >= n => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }
}

impl ClientEvents for MockEvents {
    fn on_mtu(&self, _conn: ConnHandle, token: usize, result: Result<u16, Error>) {
        self.log.borrow_mut().push(Ev::Mtu { token, result });
    }

    fn on_service(&self, _conn: ConnHandle, token: usize, result: Result<Option<Service>, Error>) -> ControlFlow<()> {
        let is_data = matches!(result, Ok(Some(_)));
        self.log.borrow_mut().push(Ev::Service { token, result });
        self.flow(is_data)
    }

    fn on_included_service(
        &self,
        _conn: ConnHandle,
        token: usize,
        result: Result<Option<IncludedService>, Error>,
    ) -> ControlFlow<()> {
        let is_data = matches!(result, Ok(Some(_)));
        self.log.borrow_mut().push(Ev::IncService { token, result });
        self.flow(is_data)
    }

    fn on_characteristic(
        &self,
        _conn: ConnHandle,
        token: usize,
        result: Result<Option<Characteristic>, Error>,
    ) -> ControlFlow<()> {
        let is_data = matches!(result, Ok(Some(_)));
        self.log.borrow_mut().push(Ev::Characteristic { token, result });
        self.flow(is_data)
    }

    fn on_descriptor(
        &self,
        _conn: ConnHandle,
        token: usize,
        chr_val_handle: u16,
        result: Result<Option<Descriptor>, Error>,
    ) -> ControlFlow<()> {
        let is_data = matches!(result, Ok(Some(_)));
        self.log.borrow_mut().push(Ev::Descriptor {
            token,
            chr_val_handle,
            result,
        });
        self.flow(is_data)
    }

    fn on_read(&self, _conn: ConnHandle, token: usize, result: Result<Option<AttrValue<'_>>, Error>) -> ControlFlow<()> {
        let is_data = matches!(result, Ok(Some(_)));
        let owned = result.map(|opt| opt.map(|a| (a.handle, a.offset, a.value.to_vec())));
        self.log.borrow_mut().push(Ev::Read { token, result: owned });
        self.flow(is_data)
    }

    fn on_read_multiple(&self, _conn: ConnHandle, token: usize, result: Result<&[u8], Error>) {
        let owned = result.map(|v| v.to_vec());
        self.log.borrow_mut().push(Ev::ReadMult { token, result: owned });
    }

    fn on_read_multiple_var(&self, _conn: ConnHandle, token: usize, result: Result<&[AttrValue<'_>], Error>) {
        let owned = result.map(|attrs| attrs.iter().map(|a| (a.handle, a.value.to_vec())).collect());
        self.log.borrow_mut().push(Ev::ReadMultVar { token, result: owned });
    }

    fn on_write(&self, _conn: ConnHandle, token: usize, handle: u16, result: Result<(), Error>) {
        self.log.borrow_mut().push(Ev::Write { token, handle, result });
    }

    fn on_write_reliable(&self, _conn: ConnHandle, token: usize, handles: &[u16], result: Result<(), Error>) {
        self.log.borrow_mut().push(Ev::WriteReliable {
            token,
            handles: handles.to_vec(),
            result,
        });
    }

    fn on_indicate(&self, _conn: ConnHandle, chr_val_handle: u16, result: Result<(), Error>) {
        self.log.borrow_mut().push(Ev::Indicate {
            handle: chr_val_handle,
            result,
        });
    }

    fn on_notify_tx(&self, _conn: ConnHandle, chr_val_handle: u16, result: Result<(), Error>) {
        self.log.borrow_mut().push(Ev::NotifyTx {
            handle: chr_val_handle,
            result,
        });
    }
}

/// Cache mock: serves all-service discovery when primed, records
/// invalidations.
#[derive(Default)]
pub struct MockCache {
    pub all_svcs: RefCell<Option<Vec<Service>>>,
    pub updates: RefCell<Vec<(u16, u16, u16)>>,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GattCache for MockCache {
    fn search_all_svcs(&self, conn: ConnHandle, events: &dyn ClientEvents, token: usize) -> bool {
        let Some(svcs) = self.all_svcs.borrow().clone() else {
            return false;
        };
        for svc in svcs {
            if events.on_service(conn, token, Ok(Some(svc))).is_break() {
                return true;
            }
        }
        let _ = events.on_service(conn, token, Ok(None));
        true
    }

    fn search_svc_by_uuid(&self, _conn: ConnHandle, _uuid: &Uuid, _events: &dyn ClientEvents, _token: usize) -> bool {
        false
    }

    fn search_inc_svcs(
        &self,
        _conn: ConnHandle,
        _start_handle: u16,
        _end_handle: u16,
        _events: &dyn ClientEvents,
        _token: usize,
    ) -> bool {
        false
    }

    fn search_all_chrs(
        &self,
        _conn: ConnHandle,
        _start_handle: u16,
        _end_handle: u16,
        _events: &dyn ClientEvents,
        _token: usize,
    ) -> bool {
        false
    }

    fn search_chrs_by_uuid(
        &self,
        _conn: ConnHandle,
        _start_handle: u16,
        _end_handle: u16,
        _uuid: &Uuid,
        _events: &dyn ClientEvents,
        _token: usize,
    ) -> bool {
        false
    }

    fn search_all_dscs(
        &self,
        _conn: ConnHandle,
        _chr_val_handle: u16,
        _end_handle: u16,
        _events: &dyn ClientEvents,
        _token: usize,
    ) -> bool {
        false
    }

    fn conn_update(&self, conn: ConnHandle, start_handle: u16, end_handle: u16) {
        self.updates.borrow_mut().push((conn.raw(), start_handle, end_handle));
    }
}

/// Security store mock.
pub struct MockSecurity {
    pub keys: Cell<Option<LocalKeys>>,
    pub initiate_ok: Cell<bool>,
    pub initiated: RefCell<Vec<u16>>,
}

impl MockSecurity {
    pub fn new() -> Self {
        Self {
            keys: Cell::new(None),
            initiate_ok: Cell::new(true),
            initiated: RefCell::new(Vec::new()),
        }
    }
}

impl SecurityOps for MockSecurity {
    fn local_keys(&self, _conn: ConnHandle) -> Option<LocalKeys> {
        self.keys.get()
    }

    fn initiate_security(&self, conn: ConnHandle) -> Result<(), Error> {
        if self.initiate_ok.get() {
            self.initiated.borrow_mut().push(conn.raw());
            Ok(())
        } else {
            Err(Error::NotSupported)
        }
    }
}
