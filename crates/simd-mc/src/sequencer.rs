//! DRAM stride sequencer (front-end step 1).
//!
//! Converts a stride or index-iterate descriptor into a stream of
//! burst-level requests, one per DRAM cycle, skipping over address runs
//! whose word mask is guaranteed zero.

use std::collections::VecDeque;

use simd_model::{
    IdxEntry, Reg, RegOffset, ReqDest, RequestTarget, StrideDescriptor, StrideKind,
    BURSTREQ_FIFO_DEPTH, MC_BUS_WIDTH,
};

use crate::model::{BurstRequest, PrechargePolicy};

const BW: usize = MC_BUS_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Idle,
    Fetch,
    Init,
    RunningStride,
    RunningIdxIt,
    WaitAllpre,
}

/// Per-cycle sequencer inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqIn {
    /// A refresh is pending or in progress; hold off new descriptors.
    pub ref_pending: bool,
    /// All banks precharged: the in-flight descriptor has fully landed.
    pub allpre: bool,
    /// `no_parallel_dram_sp` scheduling option.
    pub serialize_tickets: bool,
    /// Ticket currently allowed to proceed.
    pub ticket_pop: u8,
    /// Free slots in the downstream burst-request FIFO.
    pub req_free: usize,
    pub cycle: u64,
}

/// Per-cycle sequencer outputs.
#[derive(Debug, Default)]
pub struct SeqOut {
    pub req: Option<BurstRequest>,
    /// Ready for the next descriptor; everything drained.
    pub done: bool,
    /// The destination and target register of the newly started transfer,
    /// to be latched by the register file.
    pub dst_update: Option<(RequestTarget, Option<Reg>)>,
    /// Clear the latched destination; transfer complete.
    pub dst_clear: bool,
}

pub struct StrideSequencer {
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
    sp_line_addr_increment: u32,
    cycle_start: u64,

    state: State,
    desc_fifo: VecDeque<StrideDescriptor>,
    triggers: u32,
    idx_fifo: VecDeque<IdxEntry>,
    cur_idx: IdxEntry,
}

impl StrideSequencer {
    pub fn new() -> Self {
        let mut increment_lut = [0u32; BW];
        let mut line_increment_lut = [0u32; BW];
        for i in 1..BW {
            increment_lut[i] = (BW % i) as u32;
            line_increment_lut[i] = ((BW - 1) / i) as u32;
        }

        StrideSequencer {
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
            sp_line_addr_increment: 0,
            cycle_start: 0,
            state: State::Idle,
            desc_fifo: VecDeque::new(),
            triggers: 0,
            idx_fifo: VecDeque::new(),
            cur_idx: IdxEntry::terminator(),
        }
    }

    /// Enqueue a descriptor.
    pub fn push_descriptor(&mut self, desc: StrideDescriptor) {
        self.desc_fifo.push_back(desc);
    }

    /// Kick processing of the queued descriptors.
    pub fn kick(&mut self) {
        self.triggers += 1;
    }

    /// Feed the index stream for an index-iterate descriptor.
    pub fn push_indices(&mut self, idx: impl IntoIterator<Item = IdxEntry>) {
        self.idx_fifo.extend(idx);
    }

    pub fn busy(&self) -> bool {
        self.state != State::Idle || !self.desc_fifo.is_empty()
    }

    /// Modulo `desc.period` for increments guaranteed to overflow at most
    /// once.
    fn single_overflow_modulo(&self, cur: u32, increment: u32) -> (u32, bool) {
        let out = cur + increment;
        if out >= self.desc.period {
            (out - self.desc.period, true)
        } else {
            (out, false)
        }
    }

    fn word_mask_select(&self, lane: usize) -> bool {
        let addr = self.global_addr | ((lane as u32) << 2);
        self.phase[lane] < self.desc.words && self.end_addr > addr && self.desc.addr <= addr
    }

    /// Words to advance the global address by; jumps over all-zero mask
    /// regions when the period is much larger than the word count.
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

    /// Initialise the per-lane phase/line vectors and the skip values for
    /// the descriptor latched in `desc`.
    fn init_request_regs(&mut self) {
        if let Err(e) = self.desc.validate(BW) {
            panic!("invalid stride descriptor: {e}");
        }

        let d = &self.desc;

        let mut skip = d.period as i64 - (d.words as i64 + (BW as i64 - 1));
        self.skip_rest = ((skip & (BW as i64 - 1)) + d.words as i64 - 1).max(0) as u32;
        skip &= !(BW as i64 - 1);
        self.skip = skip;
        self.skip_bw = skip + BW as i64;

        self.end_addr = d
            .addr
            .wrapping_add((d.words + d.period * (d.period_count.saturating_sub(1))) << 2);
        self.global_addr = d.addr & !((BW as u32) * 4 - 1);
        let addr_diff = self.global_addr as i64 - d.addr as i64;
        self.local_idx = (d.dst_offset as i64 + (addr_diff >> 2)) as u32;

        // Round-up division; for period >= BUS_WIDTH this is 0 or -1.
        let l = ((-addr_diff >> 2) + (d.period as i64 - 1)) / d.period as i64;
        let mut l = d.dst_off_y as i64 - l;

        self.line_increment = if d.period < BW as u32 {
            self.line_increment_lut[d.period as usize]
        } else {
            0
        };

        self.sp_line_addr_increment =
            if d.dst.dest == ReqDest::Sp && d.dst_period >= d.words {
                (d.dst_period - d.words) << 2
            } else {
                0
            };

        let word = (d.addr >> 2) & (BW as u32 - 1);
        let mut it = (d.period - word % d.period) % d.period;
        for i in 0..BW {
            self.phase[i] = it;
            self.line[i] = l;

            it += 1;
            if it % d.period != it {
                l += 1;
                it %= d.period;
            }
        }
    }

    /// Destination steering for one sequencer lane.
    fn reg_idx(&self, dest: ReqDest, i: usize) -> RegOffset {
        if dest == ReqDest::Cam {
            RegOffset::idx(self.local_idx.wrapping_add(i as u32))
        } else {
            let shift = self.desc.idx_transform.shift();
            let mask = (1u32 << shift) - 1;
            let p = self.phase[i] + self.desc.dst_off_x;

            // dst_period is guaranteed power-of-two for register targets.
            let lane = ((self.line[i] * self.desc.dst_period as i64) as u32) | (p >> shift);
            let row = p & mask;
            RegOffset::new(lane, row)
        }
    }

    /// One DRAM-clock cycle.
    pub fn tick(&mut self, input: &SeqIn) -> SeqOut {
        let mut out = SeqOut::default();

        match self.state {
            State::Idle => {
                if self.triggers == 0 || input.ref_pending {
                    return out;
                }
                self.state = State::Fetch;
                self.step_fetch(input, &mut out);
            }
            State::Fetch => self.step_fetch(input, &mut out),
            State::Init => self.step_init(input, &mut out),
            State::RunningStride => {
                if input.req_free > 0 {
                    self.step_stride(&mut out);
                }
            }
            State::RunningIdxIt => {
                if input.req_free > 0 {
                    self.step_idxit(&mut out);
                }
            }
            State::WaitAllpre => {
                if input.allpre {
                    self.state = State::Fetch;
                    out.dst_clear = true;
                    tracing::debug!(target: "mem_fe",
                        desc = ?self.desc, cycles = input.cycle - self.cycle_start,
                        "stride request complete");
                }
            }
        }

        out
    }

    fn step_fetch(&mut self, input: &SeqIn, out: &mut SeqOut) {
        if self.triggers > 0 {
            self.triggers -= 1;
        }

        match self.desc_fifo.pop_front() {
            None => {
                if input.req_free == BURSTREQ_FIFO_DEPTH {
                    self.state = State::Idle;
                    out.done = true;
                }
            }
            Some(desc) => {
                self.desc = desc;
                self.state = State::Init;
            }
        }
    }

    fn step_init(&mut self, input: &SeqIn, out: &mut SeqOut) {
        // Under no_parallel_dram_sp the DRAM and scratchpad front-ends act
        // as one resource guarded by a ticket lock.
        if input.serialize_tickets && input.ticket_pop != self.desc.ticket {
            return;
        }

        self.cycle_start = input.cycle;

        if self.desc.kind == StrideKind::Stride {
            self.state = State::RunningStride;
            if self.desc.target_kind() != ReqDest::Sp {
                out.dst_update = Some((self.desc.dst, self.desc.dst_reg));
            } else {
                out.dst_update = Some((self.desc.dst, None));
            }
            self.init_request_regs();
        } else {
            self.state = State::RunningIdxIt;
            assert!(
                self.desc.target_kind() != ReqDest::Sp,
                "unsupported index-iterator request target"
            );
            out.dst_update = Some((self.desc.dst, self.desc.dst_reg));

            let idx = self.idx_fifo.pop_front().expect("index stream not provided");
            self.cur_idx = idx;
        }
    }

    fn step_stride(&mut self, out: &mut SeqOut) {
        let mut req = BurstRequest {
            pre_pol: PrechargePolicy::Linear,
            ..Default::default()
        };

        let dest = self.desc.target_kind();
        let mut words = 0u32;
        for i in 0..BW {
            if self.word_mask_select(i) {
                req.wordmask |= 1 << i;
                words += 1;
                req.reg_offset[i] = self.reg_idx(dest, i);
            }
        }

        let addr_inc = self.address_increment(self.phase[BW - 1]);
        let ph_inc = self.phase_increment(addr_inc);

        let mut overflew = false;
        for i in 0..BW {
            self.line[i] += self.line_increment as i64;
            let (p, of) = self.single_overflow_modulo(self.phase[i], ph_inc);
            self.phase[i] = p;
            overflew = of;
            if of || ph_inc == 0 {
                self.line[i] += 1;
            }
        }

        req.addr = self.global_addr;
        req.write = self.desc.write;
        req.target = self.desc.dst;
        if req.target.dest == ReqDest::Sp {
            req.sp_offset = self.desc.dst_offset;
            self.desc.dst_offset += words << 2;
            if (overflew || ph_inc == 0) && self.line[BW - 1] > 0 {
                self.desc.dst_offset += self.sp_line_addr_increment;
            }
        }

        self.global_addr = self.global_addr.wrapping_add(addr_inc << 2);
        self.local_idx = self.local_idx.wrapping_add(addr_inc);

        if self.global_addr >= self.end_addr {
            req.addr_next = 0xffff_ffff;
            req.last = true;
            self.state = State::WaitAllpre;
        } else {
            req.addr_next = self.global_addr;
        }
        out.req = Some(req);
    }

    fn step_idxit(&mut self, out: &mut SeqOut) {
        let addr = self.desc.addr.wrapping_add(self.cur_idx.dram_off << 2);

        let mut req = BurstRequest {
            pre_pol: PrechargePolicy::Alap,
            ..Default::default()
        };

        let word = ((addr & ((BW as u32) * 4 - 1)) >> 2) as usize;
        req.wordmask = 1 << word;
        req.reg_offset[word] = RegOffset::new(self.cur_idx.cam_idx, 0);

        req.addr = addr & !((BW as u32) * 4 - 1);
        req.write = self.desc.write;
        req.target = self.desc.dst;

        // Without a next index we re-process the same data next cycle.
        let Some(next) = self.idx_fifo.pop_front() else {
            return;
        };

        if next.last {
            req.addr_next = 0xffff_ffff;
            req.last = true;
            self.state = State::WaitAllpre;
        } else {
            let next_addr = self.desc.addr.wrapping_add(next.dram_off << 2);
            req.addr_next = next_addr & !((BW as u32) * 4 - 1);
        }
        self.cur_idx = next;
        out.req = Some(req);
    }
}

impl Default for StrideSequencer {
    fn default() -> Self {
        Self::new()
    }
}
