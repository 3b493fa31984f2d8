//! Scratchpad data path.
//!
//! Mirror of the DRAM front-end for intra-cluster transfers: a stride
//! sequencer, a banked storage array with unaligned-access support, and a
//! two-stage data-path scheduler that resolves the synchronous-RAM
//! latency difference between reads and writes.

mod array;
mod dq;
mod sequencer;

pub use array::StorageArray;
pub use dq::{SpDq, SpDqReservation};
pub use sequencer::{SpSeqIn, SpSeqOut, SpStrideSequencer};

use simd_model::{MemDataPort, StrideDescriptor};

/// One work-group slot's scratchpad: sequencer, data-path scheduler and
/// storage array.
pub struct Scratchpad {
    pub seq: SpStrideSequencer,
    pub dq: SpDq,
    pub array: StorageArray,
    slot: u8,
    /// DQ completion, registered for the sequencer's wait state.
    dq_done: bool,
}

impl Scratchpad {
    pub fn new(slot: u8) -> Self {
        Scratchpad {
            seq: SpStrideSequencer::new(),
            dq: SpDq::new(),
            array: StorageArray::new(),
            slot,
            dq_done: false,
        }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn push_descriptor(&mut self, desc: StrideDescriptor) {
        self.seq.push_descriptor(desc);
        self.seq.kick();
    }

    pub fn busy(&self) -> bool {
        self.seq.busy() || !self.dq.idle()
    }

    /// One clock cycle for the whole scratchpad path.
    pub fn tick(
        &mut self,
        serialize_tickets: bool,
        ticket_pop: u8,
        rf: &mut impl MemDataPort,
    ) -> SpSeqOut {
        let out = self.seq.tick(
            &SpSeqIn { serialize_tickets, ticket_pop, dq_done: self.dq_done },
            self.dq.free(),
        );

        if let Some(res) = &out.reservation {
            self.dq.push(res.clone());
        }

        self.dq_done = self.dq.tick(rf, &mut self.array);
        out
    }
}
