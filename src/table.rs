//! The procedure table.
//!
//! Fixed-capacity storage for in-flight procedure records, doubling as the
//! record pool: acquiring a slot and becoming visible to dispatch are one
//! operation, so a sweep can never miss a procedure whose first request has
//! been handed to the transport.
//!
//! All access happens under the engine lock. Dispatch does not borrow
//! records in place: it *extracts* them, leaving the slot leased so the
//! capacity cannot be given away while the record is being worked on, and
//! either reinserts the record or releases the slot when done. Insertion
//! order is tracked with a monotonic sequence so extraction scans oldest
//! first, which is what makes `extract_first` deterministic.

use embassy_time::Instant;
use heapless::Vec;

use crate::proc::Proc;

/// Identifies an occupied slot. The sequence number makes a stale id
/// harmless: an id only ever removes the record it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcId {
    idx: usize,
    seq: u64,
}

enum Slot {
    Free,
    Busy { seq: u64, proc: Proc },
    /// Extracted for processing; the slot stays reserved so the record can
    /// always be put back.
    Leased,
}

pub(crate) struct ProcTable<const N: usize> {
    slots: [Slot; N],
    next_seq: u64,
}

impl<const N: usize> ProcTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::Free }; N],
            next_seq: 0,
        }
    }

    /// Append a record. Returns the record when the table is full.
    pub fn insert(&mut self, proc: Proc) -> Result<ProcId, Proc> {
        let Some(idx) = self.slots.iter().position(|s| matches!(s, Slot::Free)) else {
            return Err(proc);
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[idx] = Slot::Busy { seq, proc };
        Ok(ProcId { idx, seq })
    }

    /// Access a record in place. Used only for flag updates under the
    /// engine lock; state machines always run on extracted records.
    pub fn get_mut(&mut self, id: ProcId) -> Option<&mut Proc> {
        match &mut self.slots[id.idx] {
            Slot::Busy { seq, proc } if *seq == id.seq => Some(proc),
            _ => None,
        }
    }

    /// Remove the record `id` was issued for, if it is still present.
    pub fn remove(&mut self, id: ProcId) -> Option<Proc> {
        match &self.slots[id.idx] {
            Slot::Busy { seq, .. } if *seq == id.seq => {
                match core::mem::replace(&mut self.slots[id.idx], Slot::Free) {
                    Slot::Busy { proc, .. } => Some(proc),
                    _ => unreachable!(),
                }
            }
            _ => None,
        }
    }

    /// Put an extracted record back, at the tail of the insertion order.
    pub fn reinsert(&mut self, id: ProcId, proc: Proc) {
        debug_assert!(matches!(self.slots[id.idx], Slot::Leased));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[id.idx] = Slot::Busy { seq, proc };
    }

    /// Free the slot of an extracted record.
    pub fn release(&mut self, id: ProcId) {
        debug_assert!(matches!(self.slots[id.idx], Slot::Leased));
        self.slots[id.idx] = Slot::Free;
    }

    /// Extract the oldest record matching the predicate.
    pub fn extract_first<F: Fn(&Proc) -> bool>(&mut self, pred: F) -> Option<(ProcId, Proc)> {
        let mut out: Vec<(ProcId, Proc), 1> = Vec::new();
        self.extract_matching(pred, 1, &mut out);
        out.pop()
    }

    /// Extract up to `max` matching records in insertion order; `max == 0`
    /// means no limit beyond the output capacity.
    pub fn extract_matching<F: Fn(&Proc) -> bool, const K: usize>(
        &mut self,
        pred: F,
        max: usize,
        out: &mut Vec<(ProcId, Proc), K>,
    ) {
        for (idx, seq) in self.ordered() {
            if out.is_full() || (max > 0 && out.len() >= max) {
                break;
            }
            let matched = match &self.slots[idx] {
                Slot::Busy { proc, .. } => pred(proc),
                _ => false,
            };
            if matched {
                match core::mem::replace(&mut self.slots[idx], Slot::Leased) {
                    Slot::Busy { proc, .. } => {
                        // Cannot fail, fullness is checked above.
                        let _ = out.push((ProcId { idx, seq }, proc));
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    /// The earliest transaction deadline among resident records.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                Slot::Busy { proc, .. } => Some(proc.deadline),
                _ => None,
            })
            .min()
    }

    /// Whether any procedure is resident or being processed.
    pub fn any_active(&self) -> bool {
        self.slots.iter().any(|s| !matches!(s, Slot::Free))
    }

    fn ordered(&self) -> Vec<(usize, u64), N> {
        let mut order: Vec<(usize, u64), N> = Vec::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Slot::Busy { seq, .. } = slot {
                let _ = order.push((idx, *seq));
            }
        }
        order.sort_unstable_by_key(|&(_, seq)| seq);
        order
    }
}
