//! Scratchpad data-path scheduler.
//!
//! Synchronises the storage array with the register file I/O. For reads
//! (SP -> RF) the array is addressed directly and the register-file
//! signals are held one cycle for the data to arrive. For writes
//! (RF -> SP) the register file is read directly and the array sees the
//! data two cycles later.

use std::collections::VecDeque;

use simd_model::{MemDataPort, RegOffset, RequestTarget, SP_BUS_WIDTH};

use crate::array::StorageArray;

const BW: usize = SP_BUS_WIDTH;

/// One bus-width reservation on the scratchpad data path.
#[derive(Debug, Clone, PartialEq)]
pub struct SpDqReservation {
    /// Scratchpad byte address of the first lane.
    pub sp_addr: u32,
    /// Lane participation.
    pub wordmask: u8,
    pub write: bool,
    pub target: RequestTarget,
    pub reg_offset: [RegOffset; BW],
    /// Final reservation of the descriptor.
    pub last: bool,
}

impl Default for SpDqReservation {
    fn default() -> Self {
        SpDqReservation {
            sp_addr: 0,
            wordmask: 0,
            write: false,
            target: RequestTarget::default(),
            reg_offset: [RegOffset::default(); BW],
            last: false,
        }
    }
}

struct ReadBeat {
    target: RequestTarget,
    reg_offset: [RegOffset; BW],
    data: [u32; BW],
    mask: [bool; BW],
    last: bool,
}

struct WriteBeat {
    sp_addr: u32,
    data: Vec<u32>,
    mask: Vec<bool>,
    last: bool,
}

/// Bounded reservation queue depth.
const FIFO_DEPTH: usize = 4;

pub struct SpDq {
    fifo: VecDeque<SpDqReservation>,
    read_pipe: Option<ReadBeat>,
    write_pipe: [Option<WriteBeat>; 2],
}

impl SpDq {
    pub fn new() -> Self {
        SpDq { fifo: VecDeque::new(), read_pipe: None, write_pipe: [None, None] }
    }

    pub fn push(&mut self, res: SpDqReservation) {
        assert!(self.fifo.len() < FIFO_DEPTH, "scratchpad DQ overflow");
        self.fifo.push_back(res);
    }

    pub fn free(&self) -> usize {
        FIFO_DEPTH - self.fifo.len()
    }

    pub fn idle(&self) -> bool {
        self.fifo.is_empty() && self.read_pipe.is_none() && self.write_pipe.iter().all(Option::is_none)
    }

    /// One clock cycle. Returns true when the last beat of the current
    /// descriptor retired.
    pub fn tick(&mut self, rf: &mut impl MemDataPort, array: &mut StorageArray) -> bool {
        let mut done = false;

        // Delayed write data reaches the array.
        if let Some(w) = self.write_pipe[1].take() {
            array.write_bus(w.sp_addr, &w.data, &w.mask);
            done |= w.last;
        }
        self.write_pipe[1] = self.write_pipe[0].take();

        // Read data held one cycle lands in the register file.
        if let Some(r) = self.read_pipe.take() {
            rf.mem_data_in(r.target, 0, &r.reg_offset, &r.data, &r.mask);
            done |= r.last;
        }

        if let Some(res) = self.fifo.pop_front() {
            let mut mask = [false; BW];
            for (i, m) in mask.iter_mut().enumerate() {
                *m = res.wordmask & (1 << i) != 0;
            }

            if res.write {
                // RF -> SP: the register file produces data now and may
                // additionally drop disabled threads.
                let (data, thread_mask) =
                    rf.mem_data_out(res.target, 0, &res.reg_offset, &mask);
                self.write_pipe[0] = Some(WriteBeat {
                    sp_addr: res.sp_addr,
                    data,
                    mask: thread_mask,
                    last: res.last,
                });
            } else {
                // SP -> RF: address the array now, deliver next cycle.
                self.read_pipe = Some(ReadBeat {
                    target: res.target,
                    reg_offset: res.reg_offset,
                    data: array.read_bus(res.sp_addr),
                    mask,
                    last: res.last,
                });
            }
        }

        done
    }
}

impl Default for SpDq {
    fn default() -> Self {
        Self::new()
    }
}
