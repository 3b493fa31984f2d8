//! SIMD cluster: pipeline wiring and per-slot work-group state.
//!
//! The cluster hosts two work-group slots that share the compute pipeline,
//! scoreboard and register file but have independent control stacks, PCs
//! and memory front-end queues. One slot drives the pipeline at a time;
//! the other takes over when the active slot parks on a memory transfer.

use simd_isa::Instruction;
use simd_model::{
    ssp, Buffer, MemIf, RequestTarget, StrideDescriptor, WorkgroupWidth, BIND_BUFS, FPUS,
    THREADS,
};

use crate::cstack::CtrlStack;
use crate::idecode::{Decode1S, Decode3S, DecodeIn, DecodeOut, IDecode};
use crate::iexecute::{ExecIn, ExecOut, IExecute, PrintKind};
use crate::regfile::{RegFile, WriteReq};
use crate::scoreboard::{Scoreboard, ScoreboardTick};
use crate::stats::ComputeStats;
use crate::wg::{Workgroup, WorkgroupState};

/// Decode implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeImpl {
    /// Single-stage, 3R1W register file.
    #[default]
    OneStage,
    /// Three-stage, one operand port per stage.
    ThreeStage,
}

/// Memory work emitted by one cluster cycle.
#[derive(Debug, Default)]
pub struct ClusterMemOut {
    /// Stride descriptors kicked to the front-ends.
    pub kicks: Vec<(MemIf, StrideDescriptor)>,
}

pub struct SimdCluster {
    pub rf: RegFile,
    sb: Scoreboard,
    cstack: CtrlStack,
    decode: Box<dyn IDecode>,
    iexec: IExecute,

    imem: Vec<Instruction>,
    pc: [u32; 2],
    wg_state: [WorkgroupState; 2],
    wg: [Option<Workgroup>; 2],
    last_warp: [u32; 2],
    wg_finished: [bool; 2],
    active_wg: u8,
    wg_width: WorkgroupWidth,
    dims: [u32; 2],
    /// Per-slot work-group offset: X in 32-thread units, Y in rows.
    wg_off: [[u32; 2]; 2],

    xlat: [Buffer; BIND_BUFS],
    sp_xlat: [Buffer; BIND_BUFS],

    /// Latched pipeline state between ticks.
    decode_out: DecodeOut,
    exec_out: ExecOut,
    xlat_phys: Buffer,
    sp_xlat_phys: Buffer,
    flush_slot: Option<u8>,

    cycles: u64,
    trace_commits: bool,
}

impl SimdCluster {
    pub fn new(decode: DecodeImpl, exec_stages: usize) -> Self {
        let decode: Box<dyn IDecode> = match decode {
            DecodeImpl::OneStage => Box::new(Decode1S::new(exec_stages)),
            DecodeImpl::ThreeStage => Box::new(Decode3S::new(exec_stages)),
        };

        let mut iexec = IExecute::new();
        iexec.set_pipeline_stages(exec_stages);

        let mut sb = Scoreboard::new();
        sb.set_slots((decode.pipeline_stages() + exec_stages + 1).min(32));

        SimdCluster {
            rf: RegFile::new(),
            sb,
            cstack: CtrlStack::new(),
            decode,
            iexec,
            imem: Vec::new(),
            pc: [0; 2],
            wg_state: [WorkgroupState::Idle; 2],
            wg: [None, None],
            last_warp: [0; 2],
            wg_finished: [false; 2],
            active_wg: 0,
            wg_width: WorkgroupWidth::default(),
            dims: [0, 0],
            wg_off: [[0; 2]; 2],
            xlat: [Buffer::default(); BIND_BUFS],
            sp_xlat: [Buffer::default(); BIND_BUFS],
            decode_out: DecodeOut::default(),
            exec_out: ExecOut::default(),
            xlat_phys: Buffer::default(),
            sp_xlat_phys: Buffer::default(),
            flush_slot: None,
            cycles: 0,
            trace_commits: false,
        }
    }

    pub fn set_vrf_bank_words(&mut self, words: u32) {
        self.rf.set_vrf_bank_words(words);
    }

    /// Load the program into instruction memory.
    pub fn load_program(&mut self, insns: &[Instruction], dims: [u32; 2]) {
        assert!(insns.len() <= simd_model::IMEM_INSNS, "program exceeds instruction memory");
        self.imem = insns.to_vec();
        self.dims = dims;
    }

    /// Bind DRAM buffer translations.
    pub fn bind_buffer(&mut self, idx: u32, phys: Buffer) {
        self.xlat[idx as usize] = phys;
    }

    /// Bind scratchpad buffer translations.
    pub fn bind_sp_buffer(&mut self, idx: u32, phys: Buffer) {
        self.sp_xlat[idx as usize] = phys;
    }

    /// Assign a work-group to an idle slot.
    pub fn assign_workgroup(&mut self, slot: u8, wg: Workgroup) {
        let s = slot as usize;
        assert_eq!(self.wg_state[s], WorkgroupState::Idle, "assigning to a busy slot");

        self.wg_width = wg.width;
        self.wg[s] = Some(wg);
        self.wg_state[s] = WorkgroupState::Ready;
        self.wg_finished[s] = false;
        self.pc[s] = 0;
        self.wg_off[s] = [wg.off_x << wg.width.shift(), wg.off_y];

        // Threads of this work-group that fall inside the kernel, rounded
        // up to whole warps.
        let width = wg.width.threads();
        let rows = (THREADS as u32 / width)
            .min(self.dims[1].max(1).saturating_sub(wg.off_y));
        let threads = (width.min(self.dims[0].saturating_sub(wg.off_x * width)))
            .saturating_mul(rows.max(1));
        self.last_warp[s] = threads.div_ceil(FPUS as u32).saturating_sub(1).min(
            (THREADS / FPUS) as u32 - 1,
        );

        self.rf.init_workgroup(slot, wg, self.dims);

        tracing::debug!(target: "pipe_wg_dist", slot, ?wg, "workgroup assigned");
    }

    pub fn wg_state(&self, slot: u8) -> WorkgroupState {
        self.wg_state[slot as usize]
    }

    /// Work-group currently occupying a slot, if any.
    pub fn workgroup(&self, slot: u8) -> Option<Workgroup> {
        self.wg[slot as usize]
    }

    /// Reset a finished slot so a new work-group can be assigned.
    pub fn release_slot(&mut self, slot: u8) {
        let s = slot as usize;
        assert_eq!(self.wg_state[s], WorkgroupState::Finished);
        self.wg_state[s] = WorkgroupState::Idle;
        self.wg[s] = None;
    }

    /// True iff both slots are idle.
    pub fn idle(&self) -> bool {
        self.wg_state.iter().all(|s| *s == WorkgroupState::Idle)
    }

    /// Completion event from a memory front-end. The slot in the target
    /// selects which parked work-group resumes.
    pub fn mem_done(&mut self, target: RequestTarget) {
        for slot in 0..2 {
            if target.slot != slot as u8 {
                continue;
            }
            match self.wg_state[slot] {
                WorkgroupState::BlockedDram | WorkgroupState::BlockedSp => {
                    self.wg_state[slot] = WorkgroupState::Running;
                }
                WorkgroupState::BlockedDramPostExit => {
                    self.wg_state[slot] = WorkgroupState::Finished;
                    self.wg_finished[slot] = true;
                }
                _ => {}
            }
        }
    }

    fn pick_active(&mut self) {
        let cur = self.active_wg as usize;
        let runnable = |st: WorkgroupState| {
            matches!(st, WorkgroupState::Ready | WorkgroupState::Running)
        };

        if !runnable(self.wg_state[cur]) && runnable(self.wg_state[cur ^ 1]) {
            self.active_wg ^= 1;
        }
    }

    /// One compute-clock cycle.
    pub fn tick(&mut self) -> ClusterMemOut {
        self.cycles += 1;
        let mut out = ClusterMemOut::default();

        self.pick_active();
        let wg = self.active_wg;
        let s = wg as usize;

        if self.wg_state[s] == WorkgroupState::Ready {
            self.wg_state[s] = WorkgroupState::Running;
        }

        // Population snapshot for the three-stage decoder's self-match
        // masking; must lag this cycle's enqueue.
        let entries_pop = [self.sb.entries_pop(0), self.sb.entries_pop(1)];

        // Scoreboard update: dequeues from the previous commit land before
        // the enqueue of the instruction issued last cycle.
        self.sb.tick(ScoreboardTick {
            dequeue: self.exec_out.dequeue_sb,
            dequeue_reg: self.exec_out.dequeue_sb_reg,
            enqueue: self.decode_out.sb_enqueue,
            dequeue_cstack: self.exec_out.dequeue_sb_cstack,
            enqueue_cstack: self.decode_out.sb_enqueue_cstack,
            disable_slot: self.flush_slot.take(),
        });

        // Execute the instruction issued last cycle.
        let thread_active = [self.rf.thread_active(0), self.rf.thread_active(1)];
        let sd_params = [self.sd_params(0), self.sd_params(1)];

        let cstack_top = self.cstack.top().clone();
        let exec_out = {
            let exec_in = ExecIn {
                insn: self.decode_out.insn.clone(),
                pc: self.decode_out.pc,
                wg: self.decode_out.wg,
                col_w: self.decode_out.col_w,
                subcol_w: self.decode_out.subcol_w,
                operands: &*self.decode_out.operands,
                thread_active,
                sd_params,
                xlat_phys: self.xlat_phys,
                sp_xlat_phys: self.sp_xlat_phys,
                wg_off: self.wg_off,
                dims: self.dims,
                wg_width: self.wg_width,
                cstack_top: &cstack_top,
            };
            self.iexec.tick(&exec_in)
        };

        // Commit side effects.
        let commit_slot = exec_out.cstack_slot;
        if let Some(write) = &exec_out.write {
            self.rf.write(&WriteReq {
                reg: write.reg,
                data: write.data.clone(),
                ignore_mask: write.ignore_mask,
            });
        }

        if let Some(pc) = exec_out.pc_w {
            self.pc[commit_slot as usize] = pc;
            self.flush_slot = Some(commit_slot);
        }

        self.cstack.tick(commit_slot, exec_out.cstack_action.clone());

        for slot in 0..2 {
            if let Some(st) = exec_out.wg_state_next[slot] {
                self.wg_state[slot] = st;
            }
            if exec_out.wg_exit_commit[slot] && !self.rf.exit_mask(slot as u8).any() {
                self.wg_state[slot] = WorkgroupState::Finished;
                self.wg_finished[slot] = true;
            }
        }

        if let Some((target, desc)) = &exec_out.store {
            out.kicks.push((*target, desc.clone()));
        }

        self.do_print(&exec_out);
        if self.trace_commits {
            println!(
                "@{} commit slot{} pc_w={:?}",
                self.cycles, commit_slot, exec_out.pc_w
            );
        }

        // Decode the next instruction for the active slot. A parked or
        // finished slot presents bubbles; its PC holds until the
        // front-end completion unparks it.
        let fetch_ok = matches!(
            self.wg_state[s],
            WorkgroupState::Running | WorkgroupState::Ready
        );
        let fetch = if fetch_ok {
            self.imem
                .get(self.pc[s] as usize)
                .cloned()
                .unwrap_or_default()
        } else {
            Instruction::default()
        };

        let decode_in = DecodeIn {
            insn: fetch,
            pc: self.pc[s],
            wg,
            last_warp: self.last_warp,
            thread_active: [self.rf.thread_active(0), self.rf.thread_active(1)],
            wg_finished: self.wg_finished,
            pipe_flush: exec_out.pc_w.is_some(),
            entries_pop,
        };
        let decode_out = self.decode.tick(&decode_in, &self.sb, &self.rf);

        if decode_out.consumed && fetch_ok {
            self.pc[s] = self.pc[s].saturating_add(1).min(self.imem.len() as u32);
        }

        // Latch buffer translations requested by decode for the execute
        // stage next cycle.
        if let Some(idx) = decode_out.xlat_idx {
            self.xlat_phys = self.xlat[idx as usize];
        }
        if let Some(idx) = decode_out.sp_xlat_idx {
            self.sp_xlat_phys = self.sp_xlat[idx as usize];
        }

        self.decode_out = decode_out;
        self.exec_out = exec_out;

        if tracing::enabled!(target: "pipe_wg_status", tracing::Level::DEBUG) {
            tracing::debug!(target: "pipe_wg_status",
                cycle = self.cycles, state0 = ?self.wg_state[0], state1 = ?self.wg_state[1]);
        }

        out
    }

    fn sd_params(&self, slot: u8) -> (u32, u32, u32) {
        (
            self.rf.ssp_value(slot, ssp::SD_WORDS),
            self.rf.ssp_value(slot, ssp::SD_PERIOD),
            self.rf.ssp_value(slot, ssp::SD_PERIOD_CNT),
        )
    }

    fn do_print(&mut self, exec_out: &ExecOut) {
        match exec_out.print {
            PrintKind::None => {}
            PrintKind::Sgpr | PrintKind::Vgpr => {
                let v = exec_out.print_data[0];
                let name = if exec_out.print == PrintKind::Sgpr { "SGPR" } else { "VGPR" };
                println!(
                    "@{} Print {name}({}): {}/{}",
                    self.cycles,
                    exec_out.cstack_slot,
                    v,
                    f32::from_bits(v)
                );
            }
            PrintKind::Pr | PrintKind::Cmask => {
                let name = if exec_out.print == PrintKind::Pr { "PR" } else { "CMASK" };
                let bits: String =
                    exec_out.print_data.iter().map(|v| if *v != 0 { '1' } else { '0' }).collect();
                println!("@{} Print {name}({}): {bits}", self.cycles, exec_out.cstack_slot);
            }
            PrintKind::Trace => {
                self.trace_commits = exec_out.print_data[0] != 0;
            }
        }
    }

    /// Aggregate run statistics.
    pub fn stats(&self) -> ComputeStats {
        let mut s = ComputeStats::default();
        let (raw, conflicts, busy) = self.decode.stall_counters();
        s.raw_stalls = raw;
        s.rf_bank_conflict_stalls = conflicts;
        s.resource_busy_stalls = busy;
        s.sb_max_entries = self.sb.max_entries() as u64;
        s.exec_time = self.cycles;
        self.iexec.fill_stats(&mut s);
        s
    }

    /// The ticket counter published for cross-front-end serialisation is
    /// owned by the machine; the cluster only exposes whether any slot is
    /// still draining.
    pub fn any_blocked(&self) -> bool {
        self.wg_state.iter().any(|s| s.is_blocked())
    }
}
