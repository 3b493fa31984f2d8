//! Scratchpad stride sequencer.
//!
//! Same descriptor semantics as the DRAM front-end, without banked
//! activation or refresh: one bus-width reservation per cycle straight to
//! the data-path scheduler.

use std::collections::VecDeque;

use simd_model::{Reg, RegOffset, ReqDest, RequestTarget, StrideDescriptor, SP_BUS_WIDTH};

use crate::dq::SpDqReservation;

const BW: usize = SP_BUS_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Idle,
    Fetch,
    Init,
    Running,
    WaitDone,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpSeqIn {
    /// `no_parallel_dram_sp` scheduling option.
    pub serialize_tickets: bool,
    pub ticket_pop: u8,
    /// Registered done pulse from the data-path scheduler.
    pub dq_done: bool,
}

#[derive(Debug, Default)]
pub struct SpSeqOut {
    pub reservation: Option<SpDqReservation>,
    /// Destination register of the newly started transfer.
    pub dst_update: Option<(RequestTarget, Option<Reg>)>,
    pub dst_clear: bool,
    /// Completion event for the slot.
    pub wg_done: bool,
}

pub struct SpStrideSequencer {
    increment_lut: [u32; BW],
    line_increment_lut: [u32; BW],
    phase: [u32; BW],
    line: [i64; BW],
    desc: StrideDescriptor,
    global_addr: u32,
    local_idx: u32,
    end_addr: u32,
    skip: i64,
    skip_bw: i64,
    skip_rest: u32,
    line_increment: u32,
    state: State,
    desc_fifo: VecDeque<StrideDescriptor>,
    triggers: u32,
}

impl SpStrideSequencer {
    pub fn new() -> Self {
        let mut increment_lut = [0u32; BW];
        let mut line_increment_lut = [0u32; BW];
        for i in 1..BW {
            increment_lut[i] = (BW % i) as u32;
            line_increment_lut[i] = ((BW - 1) / i) as u32;
        }

        SpStrideSequencer {
            increment_lut,
            line_increment_lut,
            phase: [0; BW],
            line: [0; BW],
            desc: StrideDescriptor::default(),
            global_addr: 0,
            local_idx: 0,
            end_addr: 0,
            skip: 0,
            skip_bw: 0,
            skip_rest: 0,
            line_increment: 0,
            state: State::Idle,
            desc_fifo: VecDeque::new(),
            triggers: 0,
        }
    }

    pub fn push_descriptor(&mut self, desc: StrideDescriptor) {
        self.desc_fifo.push_back(desc);
    }

    pub fn kick(&mut self) {
        self.triggers += 1;
    }

    pub fn busy(&self) -> bool {
        self.state != State::Idle || !self.desc_fifo.is_empty()
    }

    fn single_overflow_modulo(&self, cur: u32, increment: u32) -> (u32, bool) {
        let out = cur + increment;
        if out >= self.desc.period {
            (out - self.desc.period, true)
        } else {
            (out, false)
        }
    }

    fn word_mask_select(&self, lane: usize) -> bool {
        let addr = self.global_addr + ((lane as u32) << 2);
        self.phase[lane] < self.desc.words && self.end_addr > addr && self.desc.addr <= addr
    }

    fn address_increment(&self, phase: u32) -> u32 {
        if phase < self.desc.words.saturating_sub(1) || self.desc.period < BW as u32 {
            return BW as u32;
        }

        if phase < self.skip_rest {
            (self.skip_bw + BW as i64) as u32
        } else {
            (self.skip + BW as i64) as u32
        }
    }

    fn phase_increment(&self, addr_increment: u32) -> u32 {
        if self.desc.period < BW as u32 {
            self.increment_lut[self.desc.period as usize]
        } else {
            self.single_overflow_modulo(0, addr_increment).0
        }
    }

    fn init_request_regs(&mut self) {
        if self.desc.target_kind() == ReqDest::Sp {
            panic!("scratchpad-to-scratchpad transfers are unsupported");
        }
        if let Err(e) = self.desc.validate(BW) {
            panic!("invalid stride descriptor: {e}");
        }

        let period = self.desc.period;
        let words = self.desc.words;

        let mut skip = period as i64 - (words as i64 + (BW as i64 - 1));
        self.skip_rest = ((skip & (BW as i64 - 1)) + words as i64 - 1).max(0) as u32;
        skip &= !(BW as i64 - 1);
        self.skip = skip;
        self.skip_bw = skip + BW as i64;

        self.end_addr = self
            .desc
            .addr
            .wrapping_add((words + period * (self.desc.period_count.saturating_sub(1))) << 2);
        self.global_addr = self.desc.addr;
        self.local_idx = self.desc.dst_offset;

        let mut l = self.desc.dst_off_y as i64;
        // The destination x-offset folds into the per-lane index below.
        self.desc.dst_offset = self.desc.dst_off_x;

        self.line_increment = if period < BW as u32 {
            self.line_increment_lut[period as usize]
        } else {
            0
        };

        let mut it = 0u32;
        for i in 0..BW {
            self.phase[i] = it;
            self.line[i] = l;

            it += 1;
            if it % period != it {
                l += 1;
                it %= period;
            }
        }
    }

    fn reg_idx(&self, dest: ReqDest, i: usize) -> RegOffset {
        if dest == ReqDest::Cam {
            RegOffset::idx(self.local_idx.wrapping_add(i as u32))
        } else {
            let shift = self.desc.idx_transform.shift();
            let mask = (1u32 << shift) - 1;
            let p = self.phase[i] + self.desc.dst_offset;

            let lane = ((self.line[i] * self.desc.dst_period as i64) as u32) | (p >> shift);
            let row = p & mask;
            RegOffset::new(lane, row)
        }
    }

    /// One clock cycle. `dq_free` throttles reservation emission.
    pub fn tick(&mut self, input: &SpSeqIn, dq_free: usize) -> SpSeqOut {
        let mut out = SpSeqOut::default();

        match self.state {
            State::Idle => {
                if self.triggers == 0 {
                    return out;
                }
                self.triggers -= 1;
                self.state = State::Fetch;
                self.step_fetch(&mut out);
            }
            State::Fetch => self.step_fetch(&mut out),
            State::Init => self.step_init(input, &mut out),
            State::Running => {
                if dq_free > 0 {
                    self.step_running(&mut out);
                }
            }
            State::WaitDone => {
                if input.dq_done {
                    self.state = State::Fetch;
                    out.wg_done = true;
                    out.dst_clear = true;
                    tracing::debug!(target: "mem_fe", desc = ?self.desc, "sp request complete");
                }
            }
        }

        out
    }

    fn step_fetch(&mut self, _out: &mut SpSeqOut) {
        match self.desc_fifo.pop_front() {
            None => self.state = State::Idle,
            Some(desc) => {
                self.desc = desc;
                self.state = State::Init;
            }
        }
    }

    fn step_init(&mut self, input: &SpSeqIn, out: &mut SpSeqOut) {
        if input.serialize_tickets && input.ticket_pop != self.desc.ticket {
            return;
        }

        self.state = State::Running;
        out.dst_update = Some((self.desc.dst, self.desc.dst_reg));
        self.init_request_regs();
    }

    fn step_running(&mut self, out: &mut SpSeqOut) {
        let dest = self.desc.target_kind();
        let mut res = SpDqReservation {
            sp_addr: self.global_addr,
            write: self.desc.write,
            target: self.desc.dst,
            ..Default::default()
        };

        for i in 0..BW {
            if self.word_mask_select(i) {
                res.wordmask |= 1 << i;
                res.reg_offset[i] = self.reg_idx(dest, i);
            }
        }

        let addr_inc = self.address_increment(self.phase[BW - 1]);
        let ph_inc = self.phase_increment(addr_inc);

        for i in 0..BW {
            self.line[i] += self.line_increment as i64;
            let (p, of) = self.single_overflow_modulo(self.phase[i], ph_inc);
            self.phase[i] = p;
            if of || ph_inc == 0 {
                self.line[i] += 1;
            }
        }

        self.global_addr = self.global_addr.wrapping_add(addr_inc << 2);
        self.local_idx = self.local_idx.wrapping_add(addr_inc);

        if self.global_addr >= self.end_addr {
            res.last = true;
            self.state = State::WaitDone;
        }
        out.reservation = Some(res);
    }
}

impl Default for SpStrideSequencer {
    fn default() -> Self {
        Self::new()
    }
}
