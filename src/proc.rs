//! Procedure records.
//!
//! One [`Proc`] tracks one in-flight GATT client operation. The record owns
//! everything the procedure needs to make progress: its identity on the
//! wire (connection handle and bearer CID), its transaction deadline, and
//! the kind-specific state machine, including any payload it has yet to
//! transmit. Records are only ever mutated while detached from the
//! procedure table.

use bt_hci::param::ConnHandle;
use embassy_time::Instant;
use heapless::Vec;

use crate::config;
use crate::types::uuid::Uuid;

/// Owned attribute payload storage.
pub(crate) type Payload = Vec<u8, { config::ATT_VALUE_MAX_LEN }>;

/// The GATT client operation kinds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ProcOp {
    Mtu,
    DiscAllSvcs,
    DiscSvcUuid,
    FindIncSvcs,
    DiscAllChrs,
    DiscChrUuid,
    DiscAllDscs,
    Read,
    ReadUuid,
    ReadLong,
    ReadMult,
    ReadMultVar,
    Write,
    WriteLong,
    WriteReliable,
    Indicate,
}

impl ProcOp {
    /// Whether the kind has multi-round-trip state worth retrying after a
    /// transient TX failure. Single-exchange kinds fail fast instead.
    pub(crate) fn resumable(self) -> bool {
        matches!(
            self,
            ProcOp::DiscAllSvcs
                | ProcOp::DiscSvcUuid
                | ProcOp::FindIncSvcs
                | ProcOp::DiscAllChrs
                | ProcOp::DiscChrUuid
                | ProcOp::DiscAllDscs
                | ProcOp::ReadLong
                | ProcOp::WriteLong
                | ProcOp::WriteReliable
        )
    }
}

/// One attribute of a queued (long or reliable) write.
#[derive(Debug)]
pub(crate) struct WriteAttr {
    pub handle: u16,
    /// Next value offset to prepare; advances as echoes are verified.
    pub offset: u16,
    pub value: Payload,
}

/// Kind-specific procedure state. Exactly one variant for the lifetime of
/// a record.
#[derive(Debug)]
pub(crate) enum ProcState {
    Mtu,
    DiscAllSvcs {
        prev_handle: u16,
    },
    DiscSvcUuid {
        uuid: Uuid,
        prev_handle: u16,
    },
    FindIncSvcs {
        prev_handle: u16,
        end_handle: u16,
        /// Start handle of the included service whose 128-bit UUID is being
        /// resolved with a follow-up read; 0 while scanning.
        cur_start: u16,
        cur_end: u16,
    },
    DiscAllChrs {
        prev_handle: u16,
        end_handle: u16,
    },
    DiscChrUuid {
        uuid: Uuid,
        prev_handle: u16,
        end_handle: u16,
    },
    DiscAllDscs {
        chr_val_handle: u16,
        prev_handle: u16,
        end_handle: u16,
    },
    Read {
        handle: u16,
    },
    ReadUuid {
        uuid: Uuid,
        start_handle: u16,
        end_handle: u16,
    },
    ReadLong {
        handle: u16,
        offset: u16,
    },
    ReadMult {
        handles: Vec<u16, { config::READ_MAX_ATTRS }>,
        variable: bool,
    },
    Write {
        handle: u16,
        /// Duplicate of the payload, kept so the write can be replayed
        /// after security elevation.
        #[cfg(feature = "auto-pair")]
        retained: Payload,
    },
    WriteLong {
        attr: WriteAttr,
        /// Length of the part currently on the wire.
        length: u16,
    },
    WriteReliable {
        attrs: Vec<WriteAttr, { config::WRITE_MAX_ATTRS }>,
        cur_attr: u8,
        /// Length of the part currently on the wire.
        length: u16,
    },
    Indicate {
        chr_val_handle: u16,
    },
}

impl ProcState {
    pub(crate) fn op(&self) -> ProcOp {
        match self {
            ProcState::Mtu => ProcOp::Mtu,
            ProcState::DiscAllSvcs { .. } => ProcOp::DiscAllSvcs,
            ProcState::DiscSvcUuid { .. } => ProcOp::DiscSvcUuid,
            ProcState::FindIncSvcs { .. } => ProcOp::FindIncSvcs,
            ProcState::DiscAllChrs { .. } => ProcOp::DiscAllChrs,
            ProcState::DiscChrUuid { .. } => ProcOp::DiscChrUuid,
            ProcState::DiscAllDscs { .. } => ProcOp::DiscAllDscs,
            ProcState::Read { .. } => ProcOp::Read,
            ProcState::ReadUuid { .. } => ProcOp::ReadUuid,
            ProcState::ReadLong { .. } => ProcOp::ReadLong,
            ProcState::ReadMult { variable, .. } => {
                if *variable {
                    ProcOp::ReadMultVar
                } else {
                    ProcOp::ReadMult
                }
            }
            ProcState::Write { .. } => ProcOp::Write,
            ProcState::WriteLong { .. } => ProcOp::WriteLong,
            ProcState::WriteReliable { .. } => ProcOp::WriteReliable,
            ProcState::Indicate { .. } => ProcOp::Indicate,
        }
    }
}

/// An in-flight GATT client procedure.
#[derive(Debug)]
pub(crate) struct Proc {
    pub conn: ConnHandle,
    pub cid: u16,
    /// Set when the last TX attempt hit transient resource exhaustion;
    /// cleared when a retry goes out.
    pub stalled: bool,
    /// When the current ATT transaction times out.
    pub deadline: Instant,
    /// Opaque application value echoed in every callback.
    pub token: usize,
    /// The ATT error that parked this record for security elevation.
    #[cfg(feature = "auto-pair")]
    pub pending_err: Option<(crate::att::AttErrorCode, u16)>,
    pub state: ProcState,
}

impl Proc {
    pub(crate) fn op(&self) -> ProcOp {
        self.state.op()
    }
}
