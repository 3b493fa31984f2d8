//! Instruction decode.
//!
//! Two interchangeable implementations: [`Decode1S`] pairs with a perfect
//! 3R1W register file and fetches all operands of an instruction in one
//! cycle; [`Decode3S`] is a three-stage pipeline that fetches one operand
//! per cycle and uses captured scoreboard-population masks so an in-flight
//! instruction does not stall on its own destination.
//!
//! Both enumerate the warps of a vector instruction over consecutive
//! cycles, serialise reciprocal-unit sub-columns, inject implicit operands
//! and handle CPOP injection on pipeline flushes.

use simd_isa::{Category, Instruction, MaskKind, Op, Operand, PrintMask, SubOp};
use simd_model::{vsp, Reg, RegKind, FPUS, RCPUS};

use crate::regfile::RegFile;
use crate::scoreboard::Scoreboard;

/// Operand read request to the register file, mirrored to the scoreboard.
#[derive(Debug, Clone, Default)]
pub struct RegReadReq {
    pub reg: [Reg; 3],
    pub enable: [bool; 3],
    pub imm: [u32; 3],
}

/// Per-cycle decode inputs, sampled from the previous cycle's registered
/// outputs of the surrounding cluster.
#[derive(Debug)]
pub struct DecodeIn {
    /// Instruction presented by fetch.
    pub insn: Instruction,
    pub pc: u32,
    /// Active work-group slot.
    pub wg: u8,
    /// Last active warp per slot (warp count - 1).
    pub last_warp: [u32; 2],
    /// Any thread enabled, per slot.
    pub thread_active: [bool; 2],
    /// Work-group finished flag, per slot.
    pub wg_finished: [bool; 2],
    /// Branch writeback or no-active-thread flush.
    pub pipe_flush: bool,
    /// Scoreboard population per slot as of the previous cycle. Lags the
    /// scoreboard by one cycle so an instruction's captured mask excludes
    /// its own entry.
    pub entries_pop: [u32; 2],
}

/// Registered decode outputs.
#[derive(Debug, Clone)]
pub struct DecodeOut {
    /// Instruction issued to execute (a dead NOP when stalled).
    pub insn: Instruction,
    pub pc: u32,
    pub wg: u8,
    /// Warp column for write-back.
    pub col_w: u32,
    /// Sub-column for reciprocal-unit write-back.
    pub subcol_w: u32,
    /// Stall fetch this cycle.
    pub stall_f: bool,
    /// The fetched instruction was consumed; fetch may advance the PC.
    pub consumed: bool,
    /// Scoreboard entry to enqueue for the issued instruction.
    pub sb_enqueue: Option<Reg>,
    /// Control-stack write marker to enqueue, per slot.
    pub sb_enqueue_cstack: Option<u8>,
    /// Operand lanes for the issued instruction.
    pub operands: Box<[[u32; FPUS]; 3]>,
    /// DRAM buffer translation request.
    pub xlat_idx: Option<u32>,
    /// Scratchpad buffer translation request.
    pub sp_xlat_idx: Option<u32>,
}

impl Default for DecodeOut {
    fn default() -> Self {
        DecodeOut {
            insn: Instruction::default(),
            pc: 0,
            wg: 0,
            col_w: 0,
            subcol_w: 0,
            stall_f: false,
            consumed: false,
            sb_enqueue: None,
            sb_enqueue_cstack: None,
            operands: Box::new([[0; FPUS]; 3]),
            xlat_idx: None,
            sp_xlat_idx: None,
        }
    }
}

/// Interface shared by the decode implementations.
pub trait IDecode {
    /// Rising-edge update. The scoreboard is queried combinationally for
    /// hazards on the requests posted this cycle.
    fn tick(&mut self, input: &DecodeIn, sb: &Scoreboard, rf: &RegFile) -> DecodeOut;

    fn pipeline_stages(&self) -> usize;

    /// (raw, bank conflict, resource busy) stall counters.
    fn stall_counters(&self) -> (u64, u64, u64);
}

/// State shared between the two decode implementations.
struct DecodeCommon {
    active_warp: u32,
    last_warp: u32,
    raw_stalls: u64,
    bank_conflict_stalls: u64,
    resource_busy_stalls: u64,
    /// Cycles the non-pipelined divider blocks all issue so its result
    /// reaches writeback in order.
    sidiv_pipe_stall: u32,
    /// Cycles before another div/mod may issue.
    sidiv_issue_dist: u32,
    iexec_stages: u32,
    cpop_can_inject: bool,
    stall_f: bool,
}

impl DecodeCommon {
    fn new() -> Self {
        DecodeCommon {
            active_warp: 0,
            last_warp: 0,
            raw_stalls: 0,
            bank_conflict_stalls: 0,
            resource_busy_stalls: 0,
            sidiv_pipe_stall: 0,
            sidiv_issue_dist: 0,
            iexec_stages: 3,
            cpop_can_inject: false,
            stall_f: false,
        }
    }

    fn col(&self, insn: &Instruction) -> u32 {
        if insn.category() == Category::ArithRcpu {
            self.active_warp / (FPUS / RCPUS) as u32
        } else {
            self.active_warp
        }
    }

    fn subcol(&self, insn: &Instruction) -> u32 {
        if insn.category() == Category::ArithRcpu {
            self.active_warp % (FPUS / RCPUS) as u32
        } else {
            0
        }
    }

    /// Inject implicit source operands.
    fn add_implicit_srcs(insn: &mut Instruction) {
        match insn.op() {
            Op::LdgLin
            | Op::StgLin
            | Op::LdSpLin
            | Op::StSpLin
            | Op::SLdSp
            | Op::Ldg2SpTile
            | Op::Stg2SpTile => {
                while insn.num_srcs() < 3 {
                    insn.add_src(Operand::imm(0));
                }
            }
            Op::SLdg => {
                if insn.num_srcs() < 2 {
                    insn.add_src(Operand::imm(1));
                }
            }
            Op::Exit => {
                if insn.num_srcs() == 0 {
                    insn.add_src(Operand::reg(RegKind::Vsp, vsp::ONE));
                }
            }
            Op::Call => {
                if insn.num_srcs() == 1 {
                    insn.add_src(Operand::reg(RegKind::Vsp, vsp::ONE));
                }
            }
            Op::Cpush => {
                if insn.num_srcs() < 2 {
                    let row = match insn.subop().cpush() {
                        MaskKind::Run => vsp::CTRL_RUN,
                        MaskKind::Break => vsp::CTRL_BREAK,
                        MaskKind::Ret => vsp::CTRL_RET,
                    };
                    insn.add_src(Operand::reg(RegKind::Vsp, row));
                }
            }
            Op::DbgPrintCmask => {
                if insn.num_srcs() == 0 {
                    let row = match insn.subop() {
                        SubOp::PrintCmask(PrintMask::Run) => vsp::CTRL_RUN,
                        SubOp::PrintCmask(PrintMask::Break) => vsp::CTRL_BREAK,
                        SubOp::PrintCmask(PrintMask::Ret) => vsp::CTRL_RET,
                        _ => vsp::CTRL_EXIT,
                    };
                    insn.add_src(Operand::reg(RegKind::Vsp, row));
                }
            }
            _ => {}
        }
    }

    /// Attach implicit destinations and manage the commit bit.
    fn process_implicit_dst(&self, insn: &mut Instruction) {
        if insn.category() == Category::ArithRcpu {
            insn.set_commit(self.subcol(insn) == (FPUS / RCPUS) as u32 - 1);
        }

        match insn.op() {
            Op::Cpush => insn.set_commit(self.active_warp == self.last_warp),
            Op::Bra | Op::Cmask => insn.set_dst(Operand::reg(RegKind::Vsp, vsp::CTRL_RUN)),
            Op::Brk => insn.set_dst(Operand::reg(RegKind::Vsp, vsp::CTRL_BREAK)),
            Op::Exit => insn.set_dst(Operand::reg(RegKind::Vsp, vsp::CTRL_EXIT)),
            Op::Call | Op::Ret => insn.set_dst(Operand::reg(RegKind::Vsp, vsp::CTRL_RET)),
            Op::LdgBIdx | Op::StgBIdx | Op::LdgCIdx | Op::StgCIdx | Op::LdSpBIdx
            | Op::StSpBIdx => insn.set_dst(Operand::reg(RegKind::Vsp, vsp::MEM_DATA)),
            _ => {}
        }

        if insn.writes_cmask() {
            insn.set_commit(self.active_warp == self.last_warp);
        }
    }

    /// Buffer-translation indexes for a load/store.
    fn ldst_xlat(insn: &Instruction) -> (Option<u32>, Option<u32>) {
        if insn.is_dead() || (!insn.is_ldst() && insn.op() != Op::BufQuery) {
            return (None, None);
        }

        match insn.op() {
            Op::LdSpLin | Op::StSpLin | Op::LdSpBIdx | Op::StSpBIdx | Op::SLdSp => {
                (None, Some(insn.src(0).value()))
            }
            Op::Ldg2SpTile | Op::Stg2SpTile => {
                (Some(insn.src(0).value()), Some(insn.dst().value()))
            }
            _ => (Some(insn.src(0).value()), None),
        }
    }

    /// Prepare a single operand read request.
    fn forward_read_req(
        req: &mut RegReadReq,
        i: usize,
        insn: &Instruction,
        col: u32,
        subcol: u32,
        wg: u8,
    ) {
        // Reciprocal sub-columns share the single read issued at the
        // first sub-column.
        if insn.category() == Category::ArithRcpu && subcol != 0 {
            return;
        }

        let mut col = col;
        if insn.op() == Op::DbgPrintVgpr && i == 0 {
            col = insn.src(1).value() >> FPUS.trailing_zeros();
        }

        req.enable[i] = true;
        req.reg[i] = insn.src(i).to_reg(wg, col as usize);
        if req.reg[i].kind == RegKind::Imm {
            req.imm[i] = insn.src(i).value();
        }
    }

    /// Select the operation to decode this cycle.
    ///
    /// During normal operation the op comes from fetch, enumerating warps
    /// where needed. When no thread is active, an injected CPOP unwinds
    /// the control stack; the CPOP itself is uninterruptible. One CPOP is
    /// injected per flush.
    fn select_op(&mut self, cur: &mut Instruction, pc: &mut u32, input: &DecodeIn) -> SelectAction {
        let wg = input.wg as usize;

        if input.wg_finished[wg] {
            *cur = Instruction::new(Op::Nop);
            self.active_warp = 0;
            self.last_warp = 0;
            SelectAction::None
        } else if input.pipe_flush {
            tracing::trace!(target: "pipe_trace", "*** flush idec ***");

            // An injected CPOP past warp 0 keeps enumerating; control flow
            // would not have reached anything else anyway.
            if !cur.is_injected() || self.active_warp == 0 {
                self.active_warp = 0;
                self.last_warp = 0;
                self.stall_f = false;
                *cur = Instruction::default();
                self.cpop_can_inject = true;
                SelectAction::Flushed
            } else {
                SelectAction::None
            }
        } else if !input.thread_active[wg] && !self.stall_f {
            if self.cpop_can_inject {
                let mut cpop = Instruction::new(Op::Cpop);
                cpop.inject();
                *cur = cpop;
                self.last_warp = input.last_warp[wg];
                self.active_warp = 0;
                self.cpop_can_inject = false;
            } else if self.active_warp == 0 {
                // Already injected one CPOP; wait for the flush before the
                // next.
                *cur = Instruction::new(Op::Nop);
                self.last_warp = 0;
            }
            SelectAction::None
        } else if self.active_warp == 0 && !self.stall_f {
            *cur = input.insn.clone();
            *pc = input.pc;

            self.last_warp = if cur.is_vector() { input.last_warp[wg] } else { 0 };
            if cur.category() == Category::ArithRcpu {
                self.last_warp = (self.last_warp + 1) * (FPUS / RCPUS) as u32 - 1;
            }
            Self::add_implicit_srcs(cur);
            SelectAction::Fetched
        } else {
            SelectAction::None
        }
    }

    fn set_sidiv_stall_counters(&mut self) {
        // The 8-cycle occupancy models a radix-16 SRT divider.
        self.sidiv_issue_dist = 8;
        self.sidiv_pipe_stall = 8u32.saturating_sub(self.iexec_stages);
    }

    fn decrement_sidiv_stall_counters(&mut self) {
        self.sidiv_issue_dist = self.sidiv_issue_dist.saturating_sub(1);
        self.sidiv_pipe_stall = self.sidiv_pipe_stall.saturating_sub(1);
    }

    /// True iff the instruction may advance to execute this cycle.
    fn can_issue(&self, insn: &Instruction, wg: u8, sb: &Scoreboard) -> bool {
        if insn.op() == Op::Cpop && !insn.is_dead() && sb.cpop_stall(wg) {
            false
        } else if matches!(insn.op(), Op::SIDiv | Op::SIMod) {
            self.sidiv_issue_dist == 0
        } else {
            self.sidiv_pipe_stall == 0
        }
    }

    /// Scoreboard enqueues for an issuing instruction.
    fn sb_write_req(
        &self,
        insn: &mut Instruction,
        wg: u8,
    ) -> (Option<Reg>, Option<u8>) {
        if insn.is_dead() || insn.is_ldst() {
            return (None, None);
        }

        // The control stack cannot be encoded as a destination (BRA and
        // CALL already target a VSP register), hence the separate marker.
        let cstack = if insn.does_cpush() && insn.commit() && !insn.on_cstack_sb() {
            insn.set_on_cstack_sb(true);
            Some(wg)
        } else {
            None
        };

        let reg = if insn.has_dst()
            && (insn.category() != Category::ArithRcpu || insn.commit())
            && !insn.on_sb()
        {
            insn.set_on_sb(true);
            Some(insn.dst().to_reg(wg, self.col(insn) as usize))
        } else {
            None
        };

        (reg, cstack)
    }

    fn count_stall(&mut self, raw: bool, conflict: bool, resource: bool) {
        if raw {
            self.raw_stalls += 1;
        } else if conflict {
            self.bank_conflict_stalls += 1;
        } else if resource {
            self.resource_busy_stalls += 1;
        }
    }
}

#[derive(PartialEq)]
enum SelectAction {
    None,
    Flushed,
    /// A new instruction was pulled from fetch; the PC may advance.
    Fetched,
}

fn read_operands(rf: &RegFile, req: &RegReadReq, out: &mut [[u32; FPUS]; 3]) {
    for i in 0..3 {
        if req.enable[i] {
            out[i] = rf.read_lanes(req.reg[i], req.imm[i], req.reg[i].col as usize);
        }
    }
}

/// Single-stage decode: fetches all three operands in one cycle against a
/// 3R1W register file. Never stalls on operand ports; represents the
/// perfect-register-file case.
pub struct Decode1S {
    c: DecodeCommon,
    cur: Instruction,
    cur_pc: u32,
    /// Which operand reads must (re)issue this cycle.
    op_retry: [bool; 3],
    /// Operand latches for the instruction issued to execute.
    operands: Box<[[u32; FPUS]; 3]>,
}

impl Decode1S {
    pub fn new(iexec_stages: usize) -> Self {
        let mut c = DecodeCommon::new();
        c.iexec_stages = iexec_stages as u32;
        Decode1S {
            c,
            cur: Instruction::default(),
            cur_pc: 0,
            op_retry: [true; 3],
            operands: Box::new([[0; FPUS]; 3]),
        }
    }
}

impl IDecode for Decode1S {
    fn tick(&mut self, input: &DecodeIn, sb: &Scoreboard, rf: &RegFile) -> DecodeOut {
        let mut out = DecodeOut { wg: input.wg, ..Default::default() };

        out.consumed =
            self.c.select_op(&mut self.cur, &mut self.cur_pc, input) == SelectAction::Fetched;

        let col = self.c.col(&self.cur);
        let subcol = self.c.subcol(&self.cur);

        let mut req = RegReadReq::default();
        for i in 0..self.cur.num_srcs() {
            if self.cur.is_dead() || !self.op_retry[i] {
                continue;
            }
            DecodeCommon::forward_read_req(&mut req, i, &self.cur, col, subcol, input.wg);
        }

        tracing::trace!(target: "pipe_trace",
            pc = self.cur_pc, col, subcol, insn = %self.cur, "idecode");

        self.c.process_implicit_dst(&mut self.cur);
        (out.xlat_idx, out.sp_xlat_idx) = DecodeCommon::ldst_xlat(&self.cur);

        out.pc = self.cur_pc;
        out.col_w = col;
        out.subcol_w = subcol;

        let raw = sb.check(&req, self.cur.block_ssp_writes(), [!0u32; 3]);
        let conflicts = rf.read_conflicts(&req.reg, &req.enable);
        read_operands(rf, &req, &mut self.operands);

        let retry = [
            raw[0] || conflicts[0],
            raw[1] || conflicts[1],
            raw[2] || conflicts[2],
        ];
        self.op_retry = retry;

        let resource_free = self.c.can_issue(&self.cur, input.wg, sb);
        self.c.decrement_sidiv_stall_counters();

        if retry.iter().any(|&r| r) || !resource_free {
            out.insn = Instruction::default();
            self.c.stall_f = true;
            out.stall_f = true;

            self.c.count_stall(
                raw.iter().any(|&r| r),
                conflicts.iter().any(|&c| c),
                !resource_free,
            );
            if retry.iter().any(|&r| r) {
                tracing::debug!(target: "pipe_stalls",
                    insn = %self.cur, raw = ?raw, conflicts = ?conflicts, "decode stall");
            }
        } else {
            let (enq, enq_cstack) = self.c.sb_write_req(&mut self.cur, input.wg);
            out.sb_enqueue = enq;
            out.sb_enqueue_cstack = enq_cstack;
            out.insn = self.cur.clone();
            out.operands = self.operands.clone();

            if matches!(self.cur.op(), Op::SIDiv | Op::SIMod) {
                self.c.set_sidiv_stall_counters();
            }
            self.op_retry = [true; 3];

            if self.c.active_warp == self.c.last_warp {
                self.c.stall_f = false;
                self.c.active_warp = 0;
            } else {
                self.c.stall_f = true;
                self.c.active_warp += 1;
                self.cur.set_on_sb(false);
            }
            out.stall_f = self.c.stall_f;
        }

        out
    }

    fn pipeline_stages(&self) -> usize {
        1
    }

    fn stall_counters(&self) -> (u64, u64, u64) {
        (self.c.raw_stalls, self.c.bank_conflict_stalls, self.c.resource_busy_stalls)
    }
}

/// One stage of the three-stage decoder.
#[derive(Clone)]
struct Pipe3S {
    insn: Instruction,
    wg: u8,
    pc: u32,
    col_w: u32,
    subcol_w: u32,
    /// Captured scoreboard population to test reads against. Lags the
    /// scoreboard by a cycle, which makes ANDing with the next cycle's
    /// mask exclude exactly the entry this instruction enqueued.
    req_sb_pop: u32,
    /// Operand lanes fetched so far.
    operands: [Option<Box<[u32; FPUS]>>; 3],
}

impl Default for Pipe3S {
    fn default() -> Self {
        Pipe3S {
            insn: Instruction::default(),
            wg: 0,
            pc: 0,
            col_w: 0,
            subcol_w: 0,
            req_sb_pop: 0,
            operands: [None, None, None],
        }
    }
}

impl Pipe3S {
    fn is_empty(&self) -> bool {
        self.insn.is_dead()
    }

    fn reset(&mut self) {
        *self = Pipe3S::default();
    }
}

/// Three-stage decode: each stage owns one register-file read port, so an
/// instruction fetches one source operand per cycle while younger
/// instructions occupy the earlier stages.
/// Issue-side metadata latched when an instruction reaches the final
/// stage; held stable while it waits out stalls there.
#[derive(Clone, Default)]
struct IssueMeta {
    wg: u8,
    pc: u32,
    col_w: u32,
    subcol_w: u32,
    xlat_idx: Option<u32>,
    sp_xlat_idx: Option<u32>,
}

pub struct Decode3S {
    c: DecodeCommon,
    cur: Instruction,
    cur_pc: u32,
    pipe: [Pipe3S; 3],
    op_retry: [bool; 3],
    meta: IssueMeta,
    /// Operand lanes presented to execute; reciprocal sub-columns past
    /// the first reuse the lanes read at sub-column zero.
    issued_operands: Box<[[u32; FPUS]; 3]>,
}

impl Decode3S {
    pub fn new(iexec_stages: usize) -> Self {
        let mut c = DecodeCommon::new();
        c.iexec_stages = iexec_stages as u32;
        Decode3S {
            c,
            cur: Instruction::default(),
            cur_pc: 0,
            pipe: [Pipe3S::default(), Pipe3S::default(), Pipe3S::default()],
            op_retry: [true; 3],
            meta: IssueMeta::default(),
            issued_operands: Box::new([[0; FPUS]; 3]),
        }
    }

    fn pipe_invalidate(&mut self) {
        for p in &mut self.pipe {
            if !p.insn.is_injected() {
                p.insn.kill();
            }
        }
        self.op_retry = [true; 3];
    }

    fn pipe_invalidate_slot(&mut self, wg: u8) {
        for p in &mut self.pipe {
            if p.wg == wg {
                p.insn.kill();
            }
        }
    }
}

impl IDecode for Decode3S {
    fn tick(&mut self, input: &DecodeIn, sb: &Scoreboard, rf: &RegFile) -> DecodeOut {
        let mut out = DecodeOut { wg: input.wg, ..Default::default() };

        // Once a work-group finishes its pipeline contents are rubbish.
        for slot in 0..2u8 {
            if input.wg_finished[slot as usize] {
                self.pipe_invalidate_slot(slot);
            }
        }

        let action = self.c.select_op(&mut self.cur, &mut self.cur_pc, input);
        if action == SelectAction::Flushed {
            self.pipe_invalidate();
        }
        out.consumed = action == SelectAction::Fetched;

        // Refresh the captured population masks against last cycle's
        // population.
        for p in &mut self.pipe {
            p.req_sb_pop &= input.entries_pop[p.wg as usize];
        }

        // Pipeline progression, oldest first.
        if self.pipe[2].is_empty() && !self.op_retry[1] {
            self.pipe[2] = std::mem::take(&mut self.pipe[1]);

            let (x, spx) = DecodeCommon::ldst_xlat(&self.pipe[2].insn);
            self.meta = IssueMeta {
                wg: self.pipe[2].wg,
                pc: self.pipe[2].pc,
                col_w: self.pipe[2].col_w,
                subcol_w: self.pipe[2].subcol_w,
                xlat_idx: x,
                sp_xlat_idx: spx,
            };

            self.op_retry[2] = true;
        }
        out.wg = self.meta.wg;
        out.pc = self.meta.pc;
        out.col_w = self.meta.col_w;
        out.subcol_w = self.meta.subcol_w;
        out.xlat_idx = self.meta.xlat_idx;
        out.sp_xlat_idx = self.meta.sp_xlat_idx;

        if self.pipe[1].is_empty() && !self.op_retry[0] {
            self.pipe[1] = std::mem::take(&mut self.pipe[0]);
            self.op_retry[1] = true;
        }

        if self.cur.is_dead() {
            // Nothing new to take in.
        } else if self.pipe[0].is_empty() {
            let mut p = Pipe3S {
                insn: std::mem::replace(&mut self.cur, Instruction::default()),
                wg: input.wg,
                pc: self.cur_pc,
                col_w: 0,
                subcol_w: 0,
                req_sb_pop: !0u32,
                operands: [None, None, None],
            };
            p.col_w = self.c.col(&p.insn);
            p.subcol_w = self.c.subcol(&p.insn);
            self.op_retry[0] = true;

            self.c.process_implicit_dst(&mut p.insn);

            if !p.insn.on_sb() {
                let (enq, enq_cstack) = self.c.sb_write_req(&mut p.insn, input.wg);
                out.sb_enqueue = enq;
                out.sb_enqueue_cstack = enq_cstack;
            }

            // Keep a copy in `cur` so warp enumeration can continue from
            // it next cycle.
            self.cur = p.insn.clone();
            self.cur.set_on_sb(false);

            if self.c.active_warp == self.c.last_warp {
                self.c.stall_f = false;
                self.c.active_warp = 0;
                self.cur = Instruction::default();
            } else {
                self.c.stall_f = true;
                self.c.active_warp += 1;
            }

            self.pipe[0] = p;
        } else {
            // A stall kept us from pulling in a new instruction. Only now
            // does it show up in the counters: conflicts that merely fill
            // existing bubbles cost nothing.
            let raw_pending = self.op_retry.iter().any(|&r| r);
            let resource_pending =
                self.c.sidiv_pipe_stall > 0 || self.c.sidiv_issue_dist > 0;
            self.c.count_stall(raw_pending, false, !raw_pending && resource_pending);
            self.c.stall_f = true;
        }
        out.stall_f = self.c.stall_f;

        // Operand fetch: stage i reads source i of its instruction.
        let mut req = RegReadReq::default();
        for i in 0..3 {
            let p = &self.pipe[i];
            if !self.op_retry[i] || p.insn.is_dead() || p.insn.num_srcs() <= i {
                continue;
            }
            DecodeCommon::forward_read_req(&mut req, i, &p.insn, p.col_w, p.subcol_w, p.wg);
        }

        let pop = [
            self.pipe[0].req_sb_pop,
            self.pipe[1].req_sb_pop,
            self.pipe[2].req_sb_pop,
        ];
        let raw = sb.check(&req, self.pipe[0].insn.block_ssp_writes(), pop);
        let conflicts = rf.read_conflicts(&req.reg, &req.enable);

        for i in 0..3 {
            if req.enable[i] && !raw[i] && !conflicts[i] {
                self.pipe[i].operands[i] =
                    Some(Box::new(rf.read_lanes(req.reg[i], req.imm[i], req.reg[i].col as usize)));
            }
            self.op_retry[i] = raw[i] || conflicts[i];
        }

        if self.op_retry.iter().any(|&r| r) {
            tracing::debug!(target: "pipe_stalls",
                raw = ?raw, conflicts = ?conflicts, "decode pipeline stall");
        }

        // Issue from the final stage if permitted.
        let resource_free = self.c.can_issue(&self.pipe[2].insn, self.pipe[2].wg, sb);
        self.c.decrement_sidiv_stall_counters();

        // Dead instructions issue as well: a killed instruction still has
        // to reach writeback to clear its scoreboard entry.
        if !self.op_retry[2] && resource_free {
            if !self.pipe[2].insn.is_dead()
                && matches!(self.pipe[2].insn.op(), Op::SIDiv | Op::SIMod)
            {
                self.c.set_sidiv_stall_counters();
            }

            out.insn = self.pipe[2].insn.clone();
            for i in 0..3 {
                if let Some(lanes) = self.pipe[2].operands[i].take() {
                    self.issued_operands[i] = *lanes;
                }
            }
            out.operands = self.issued_operands.clone();
            self.pipe[2].reset();
        } else {
            out.insn = Instruction::default();
        }

        out
    }

    fn pipeline_stages(&self) -> usize {
        3
    }

    fn stall_counters(&self) -> (u64, u64, u64) {
        (self.c.raw_stalls, self.c.bank_conflict_stalls, self.c.resource_busy_stalls)
    }
}
