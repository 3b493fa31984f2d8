//! Top-level machine: one SIMD cluster, the DRAM front-end and two
//! scratchpads, wired through bounded FIFOs across two clock domains.
//!
//! The compute clock runs at 1 ns; the DRAM command clock period derives
//! from the DDR4 speed bin. The cooperative tick loop advances whichever
//! clock edge comes first and preserves the intra-cycle ordering the
//! components rely on.

mod opts;
mod scheduler;

pub use opts::{SchedOpts, DEBUG_CATEGORIES};
pub use scheduler::WorkScheduler;

use std::collections::VecDeque;

use thiserror::Error;

use simd_compute::{ComputeStats, DecodeImpl, SimdCluster, WorkgroupState};
use simd_isa::{read_buffer_file, Program};
use simd_mc::{
    address_translate, BurstRequest, CmdArb, CmdArbStats, CmdGen, Dq, DramTiming, SeqIn,
    StrideSequencer,
};
use simd_model::{
    MemDataPort, MemIf, RegOffset, ReqDest, RequestTarget, StrideKind, WorkgroupWidth,
    BURSTREQ_FIFO_DEPTH,
};
use simd_sp::Scratchpad;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no kernel dimensions provided")]
    MissingDims,
    #[error("invalid execute pipeline depth {0}; must be at least 3")]
    BadPipelineDepth(usize),
    #[error("buffer {0} is not declared by the program")]
    UnknownBuffer(u32),
    #[error(transparent)]
    Isa(#[from] simd_isa::IsaError),
}

/// Machine construction parameters.
pub struct MachineConfig {
    pub dims: [u32; 2],
    /// Forced work-group width; derived from the X dimension when absent.
    pub width: Option<WorkgroupWidth>,
    pub decode: DecodeImpl,
    pub exec_stages: usize,
    pub sched_opts: SchedOpts,
    pub refresh_seed: u64,
    pub vrf_bank_words: Option<u32>,
    pub timing: &'static DramTiming,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            dims: [0, 0],
            width: None,
            decode: DecodeImpl::OneStage,
            exec_stages: 3,
            sched_opts: SchedOpts::STOP_SIM_FINI,
            refresh_seed: 0,
            vrf_bank_words: None,
            timing: &simd_mc::DDR4_3200AA_8GB_X16,
        }
    }
}

pub struct Machine {
    cluster: SimdCluster,
    seq: StrideSequencer,
    cmdgen: CmdGen,
    arb: CmdArb,
    dq: Dq,
    burst_fifo: VecDeque<BurstRequest>,
    sp: [Scratchpad; 2],
    scheduler: WorkScheduler,
    program: Program,
    opts: SchedOpts,

    /// Registered arbiter outputs consumed by the sequencer next cycle.
    ref_pending: bool,
    allpre: bool,
    ticket_pop: u8,
    dram_cycle: u64,
    compute_cycles: u64,
    dram_done: bool,
}

impl Machine {
    pub fn new(program: Program, config: MachineConfig) -> Result<Self, MachineError> {
        if config.dims[0] == 0 {
            return Err(MachineError::MissingDims);
        }
        if config.exec_stages < 3 {
            return Err(MachineError::BadPipelineDepth(config.exec_stages));
        }

        let width = config
            .width
            .unwrap_or_else(|| WorkScheduler::derive_width(config.dims));

        let mut cluster = SimdCluster::new(config.decode, config.exec_stages);
        cluster.load_program(program.insns(), config.dims);
        if let Some(words) = config.vrf_bank_words {
            cluster.set_vrf_bank_words(words);
        }

        for b in program.buffers() {
            cluster.bind_buffer(b.index, b.phys());
        }
        for b in program.sp_buffers() {
            cluster.bind_sp_buffer(b.index, b.phys());
        }

        let mut arb = CmdArb::new(config.timing);
        arb.set_refresh_counter(config.refresh_seed);

        let mut machine = Machine {
            cluster,
            seq: StrideSequencer::new(),
            cmdgen: CmdGen::new(),
            arb,
            dq: Dq::new(),
            burst_fifo: VecDeque::new(),
            sp: [Scratchpad::new(0), Scratchpad::new(1)],
            scheduler: WorkScheduler::new(config.dims, width),
            program,
            opts: config.sched_opts,
            ref_pending: false,
            allpre: false,
            ticket_pop: 0,
            dram_cycle: 0,
            compute_cycles: 0,
            dram_done: false,
        };

        machine.upload_declared_buffers()?;
        Ok(machine)
    }

    /// Upload the data files declared in the program (or overridden on
    /// the command line) into the DRAM storage back-end.
    fn upload_declared_buffers(&mut self) -> Result<(), MachineError> {
        let uploads: Vec<(u32, std::path::PathBuf)> = self
            .program
            .buffers()
            .iter()
            .filter_map(|b| b.data_file.as_ref().map(|(p, _)| (b.index, p.clone())))
            .collect();

        for (index, path) in uploads {
            let words = read_buffer_file(&path)?;
            self.upload_buffer_words(index, &words)?;
        }
        Ok(())
    }

    fn storage_loc(addr: u32) -> (u32, u32, u32, u32) {
        let (bank, row, col) = address_translate(addr);
        let w = (addr >> 2) & 0xf;
        (bank, row, col | (w >> 1), w & 1)
    }

    /// Write words into a declared DRAM buffer.
    pub fn upload_buffer_words(&mut self, index: u32, words: &[u32]) -> Result<(), MachineError> {
        let buf = self.program.buffer(index).ok_or(MachineError::UnknownBuffer(index))?;
        let base = buf.addr;
        let count = (buf.words() as usize).min(words.len());

        for (i, &w) in words.iter().take(count).enumerate() {
            let (bank, row, col, dq) = Self::storage_loc(base + (i as u32) * 4);
            self.dq.storage_mut().set_word(bank, row, col, dq, w);
        }
        Ok(())
    }

    /// Read a declared DRAM buffer back out of the storage back-end.
    pub fn download_buffer_words(&self, index: u32) -> Result<Vec<u32>, MachineError> {
        let buf = self.program.buffer(index).ok_or(MachineError::UnknownBuffer(index))?;
        let base = buf.addr;

        Ok((0..buf.words())
            .map(|i| {
                let (bank, row, col, dq) = Self::storage_loc(base + i * 4);
                self.dq.storage().word(bank, row, col, dq)
            })
            .collect())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    fn dispatch_workgroups(&mut self) {
        for slot in 0..2u8 {
            if self.cluster.wg_state(slot) == WorkgroupState::Finished {
                self.cluster.release_slot(slot);
            }
            if self.cluster.wg_state(slot) == WorkgroupState::Idle {
                if let Some(wg) = self.scheduler.next() {
                    self.cluster.assign_workgroup(slot, wg);
                }
            }
        }
    }

    fn bump_ticket(&mut self) {
        self.ticket_pop = (self.ticket_pop + 1) & 0xf;
    }

    fn compute_tick(&mut self) {
        self.compute_cycles += 1;
        self.dispatch_workgroups();

        let out = self.cluster.tick();
        for (target, desc) in out.kicks {
            match target {
                MemIf::Dram => {
                    if desc.kind == StrideKind::IdxIt {
                        let slot = desc.dst.slot;
                        self.seq.push_indices(self.cluster.rf.collect_indices(slot));
                    }
                    self.seq.push_descriptor(desc);
                    self.seq.kick();
                }
                MemIf::SpWg0 => self.sp[0].push_descriptor(desc),
                MemIf::SpWg1 => self.sp[1].push_descriptor(desc),
            }
        }
    }

    fn dram_tick(&mut self) {
        let cycle = self.dram_cycle;
        self.dram_cycle += 1;
        let serialize = self.opts.contains(SchedOpts::NO_PARALLEL_DRAM_SP);

        // Stride sequencer, fed with last cycle's arbiter status.
        let seq_out = self.seq.tick(&SeqIn {
            ref_pending: self.ref_pending,
            allpre: self.allpre,
            serialize_tickets: serialize,
            ticket_pop: self.ticket_pop,
            req_free: BURSTREQ_FIFO_DEPTH - self.burst_fifo.len(),
            cycle,
        });
        if let Some(req) = seq_out.req {
            self.burst_fifo.push_back(req);
        }
        if let Some((_, reg)) = seq_out.dst_update {
            self.cluster.rf.set_dram_target(reg);
        }
        if seq_out.dst_clear {
            self.cluster.rf.set_dram_target(None);
        }
        if seq_out.done {
            self.dram_done = true;
        }

        // Command generation; a single burst can fan out into every bank
        // FIFO, so require room everywhere.
        let room = (0..simd_model::DRAM_BANKS as u32)
            .all(|b| self.arb.fifo_free(b) >= simd_model::DRAM_BANKS);
        if room {
            if let Some(req) = self.burst_fifo.pop_front() {
                for (bank, cmd) in self.cmdgen.step(&req) {
                    self.arb.push_cmd(bank, cmd);
                }
            }
        }

        // Arbiter: the new FIFO head is visible within the same cycle.
        let arb_out = self.arb.tick(cycle, self.cmdgen.busy());
        self.ref_pending = arb_out.ref_pending || arb_out.ref_active;
        self.allpre = arb_out.allpre;
        if let Some(res) = arb_out.dq {
            self.dq.push(res);
        }
        if let Some(dst) = arb_out.done_dst {
            self.cluster.mem_done(dst);
            self.bump_ticket();
        }

        // Data path.
        {
            let (cluster, sp) = (&mut self.cluster, &mut self.sp);
            let [sp0, sp1] = sp;
            let mut port = DramPort {
                rf: &mut cluster.rf,
                sp: [&mut sp0.array, &mut sp1.array],
            };
            self.dq.tick(cycle, &mut port);
        }

        // Scratchpads run on the DRAM clock as well.
        for slot in 0..2usize {
            let (cluster, sp) = (&mut self.cluster, &mut self.sp[slot]);
            let out = {
                let mut port = SpPort { rf: &mut cluster.rf, slot: slot as u8 };
                sp.tick(serialize, self.ticket_pop, &mut port)
            };
            if let Some((_, reg)) = out.dst_update {
                cluster.rf.set_sp_target(slot as u8, reg);
            }
            if out.dst_clear {
                cluster.rf.set_sp_target(slot as u8, None);
            }
            if out.wg_done {
                cluster.mem_done(RequestTarget::new(slot as u8, ReqDest::None));
                self.ticket_pop = (self.ticket_pop + 1) & 0xf;
            }
        }
    }

    fn finished(&self) -> bool {
        if self.opts.contains(SchedOpts::STOP_DRAM_FINI) && self.dram_done {
            return true;
        }

        self.opts.contains(SchedOpts::STOP_SIM_FINI)
            && self.scheduler.exhausted()
            && (0..2).all(|s| {
                matches!(
                    self.cluster.wg_state(s),
                    WorkgroupState::Idle | WorkgroupState::Finished
                )
            })
            && !self.seq.busy()
            && self.burst_fifo.is_empty()
            && self.dq.idle()
            && !self.sp.iter().any(Scratchpad::busy)
    }

    /// Run to completion or until `ns_limit` simulated nanoseconds.
    pub fn run(&mut self, ns_limit: Option<u64>) -> ComputeStats {
        let dram_period = self.arb.timing().clk_period_ns();
        let mut t_compute = 0.0f64;
        let mut t_dram = 0.0f64;

        loop {
            let t = t_compute.min(t_dram);
            if let Some(limit) = ns_limit {
                if t >= limit as f64 {
                    break;
                }
            }

            if t_dram <= t_compute {
                self.dram_tick();
                t_dram += dram_period;
            }
            if t_compute <= t {
                self.compute_tick();
                t_compute += 1.0;
            }

            if self.finished() {
                break;
            }
        }

        self.stats()
    }

    pub fn stats(&self) -> ComputeStats {
        let mut s = self.cluster.stats();
        s.exec_time = self.compute_cycles;
        s
    }

    pub fn dram_stats(&self) -> CmdArbStats {
        let cycles =
            (self.compute_cycles as f64 / self.arb.timing().clk_period_ns()) as u64;
        self.arb.stats(cycles)
    }

    /// Raw access for tests.
    pub fn cluster(&self) -> &SimdCluster {
        &self.cluster
    }

    pub fn dispatched_workgroups(&self) -> u64 {
        self.scheduler.dispatched()
    }

    pub fn scratchpad(&self, slot: u8) -> &Scratchpad {
        &self.sp[slot as usize]
    }
}

/// One buffer-comparison mismatch.
#[derive(Debug, Clone, Copy)]
pub struct Mismatch {
    pub index: usize,
    pub got: f32,
    pub want: f32,
    pub delta: f32,
}

/// Compare buffer words as floats under an absolute or relative
/// tolerance, as the `-c`/`-e` options do.
pub fn compare_words(got: &[u32], want: &[u32], delta: f32, relative: bool) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for (i, (&g, &w)) in got.iter().zip(want).enumerate() {
        let (g, w) = (f32::from_bits(g), f32::from_bits(w));
        let d = (g - w).abs();
        let bound = if relative { delta * w.abs() } else { delta };
        if d > bound || d.is_nan() {
            mismatches.push(Mismatch { index: i, got: g, want: w, delta: d });
        }
    }

    if got.len() != want.len() {
        let i = got.len().min(want.len());
        mismatches.push(Mismatch { index: i, got: 0.0, want: 0.0, delta: f32::INFINITY });
    }

    mismatches
}

/// Data port of the DRAM DQ: routes beats to the register file, the CAMs
/// or a scratchpad array, by target.
struct DramPort<'a> {
    rf: &'a mut simd_compute::RegFile,
    sp: [&'a mut simd_sp::StorageArray; 2],
}

impl MemDataPort for DramPort<'_> {
    fn mem_data_in(
        &mut self,
        target: RequestTarget,
        sp_addr: u32,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    ) {
        match target.dest {
            ReqDest::Sp => {
                self.sp[target.slot as usize].write_bus(sp_addr, data, mask);
            }
            ReqDest::Reg => self.rf.mem_write_lanes(true, target.slot, offsets, data, mask),
            ReqDest::Cam => {
                for i in 0..offsets.len() {
                    if mask[i] {
                        self.rf.cam_write(target.slot, offsets[i].lane, data[i]);
                    }
                }
            }
            ReqDest::None => {}
        }
    }

    fn mem_data_out(
        &mut self,
        target: RequestTarget,
        sp_addr: u32,
        offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>) {
        match target.dest {
            ReqDest::Sp => {
                let row = self.sp[target.slot as usize].read_bus(sp_addr);
                (row[..mask.len().min(row.len())].to_vec(), mask.to_vec())
            }
            ReqDest::Reg => self.rf.mem_read_lanes(true, target.slot, offsets, mask),
            ReqDest::Cam => {
                let mut data = vec![0u32; offsets.len()];
                let mut en = vec![false; offsets.len()];
                for i in 0..offsets.len() {
                    if !mask[i] {
                        continue;
                    }
                    if let Some(v) = self.rf.cam_read(target.slot, offsets[i].lane) {
                        data[i] = v;
                        en[i] = true;
                    }
                }
                (data, en)
            }
            ReqDest::None => (vec![0; offsets.len()], vec![false; offsets.len()]),
        }
    }
}

/// Data port of a scratchpad DQ towards the register file.
struct SpPort<'a> {
    rf: &'a mut simd_compute::RegFile,
    slot: u8,
}

impl MemDataPort for SpPort<'_> {
    fn mem_data_in(
        &mut self,
        target: RequestTarget,
        _sp_addr: u32,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    ) {
        match target.dest {
            ReqDest::Cam => {
                for i in 0..offsets.len() {
                    if mask[i] {
                        self.rf.cam_write(self.slot, offsets[i].lane, data[i]);
                    }
                }
            }
            _ => self.rf.mem_write_lanes(false, self.slot, offsets, data, mask),
        }
    }

    fn mem_data_out(
        &mut self,
        target: RequestTarget,
        _sp_addr: u32,
        offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>) {
        match target.dest {
            ReqDest::Cam => {
                let mut data = vec![0u32; offsets.len()];
                let mut en = vec![false; offsets.len()];
                for i in 0..offsets.len() {
                    if !mask[i] {
                        continue;
                    }
                    if let Some(v) = self.rf.cam_read(self.slot, offsets[i].lane) {
                        data[i] = v;
                        en[i] = true;
                    }
                }
                (data, en)
            }
            _ => self.rf.mem_read_lanes(false, self.slot, offsets, mask),
        }
    }
}
