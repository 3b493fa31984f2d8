//! Execute pipeline.
//!
//! A ringbuffer of `exec_stages >= 3` pipeline registers. Each cycle
//! consumes at most one instruction from decode, executes it
//! combinationally into stage 0 and commits the oldest stage to the
//! outputs: register write-back, PC updates, scoreboard dequeues, control
//! stack actions and memory front-end kicks.

use simd_isa::{Category, CvtDir, FpuMod, Instruction, LinWidth, MaskKind, Op, SubOp, TestCond};
use simd_model::{
    vsp, Buffer, IdxTransform, MemIf, Reg, RegKind, ReqDest, RequestTarget, Ringbuffer,
    StrideDescriptor, StrideKind, WorkgroupWidth, FPUS, THREADS,
};

use crate::cstack::{CstackAction, CstackEntry};
use crate::stats::ComputeStats;
use crate::wg::WorkgroupState;

/// Debug print requested by a committed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintKind {
    #[default]
    None,
    Sgpr,
    Vgpr,
    Pr,
    Cmask,
    Trace,
}

/// Per-cycle execute inputs.
pub struct ExecIn<'a> {
    pub insn: Instruction,
    pub pc: u32,
    pub wg: u8,
    pub col_w: u32,
    pub subcol_w: u32,
    pub operands: &'a [[u32; FPUS]; 3],
    pub thread_active: [bool; 2],
    /// Stride-descriptor parameters from the special scalar registers,
    /// per slot: (words, period, period_count).
    pub sd_params: [(u32, u32, u32); 2],
    /// Physical buffer for the translation requested by decode.
    pub xlat_phys: Buffer,
    pub sp_xlat_phys: Buffer,
    /// Work-group offsets per slot: X in 32-thread units, Y in rows.
    pub wg_off: [[u32; 2]; 2],
    pub dims: [u32; 2],
    pub wg_width: WorkgroupWidth,
    pub cstack_top: &'a CstackEntry,
}

/// Registered outputs of the commit stage.
#[derive(Debug, Clone, Default)]
pub struct ExecOut {
    /// PC write for branches (and the pipeline-simplifying PC+1 of
    /// memory kicks).
    pub pc_w: Option<u32>,
    /// Register write-back.
    pub write: Option<ExecWrite>,
    pub dequeue_sb: bool,
    /// Register retired, for the debug-build scoreboard check.
    pub dequeue_sb_reg: Option<Reg>,
    pub dequeue_sb_cstack: Option<u8>,
    pub cstack_action: CstackAction,
    pub cstack_slot: u8,
    /// Memory front-end kick.
    pub store: Option<(MemIf, StrideDescriptor)>,
    pub wg_state_next: [Option<WorkgroupState>; 2],
    pub wg_exit_commit: [bool; 2],
    pub print: PrintKind,
    pub print_data: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ExecWrite {
    pub reg: Reg,
    pub data: Vec<u32>,
    /// Ignore the CMASK-derived write mask (CPOP).
    pub ignore_mask: bool,
}

/// One execute pipeline register.
#[derive(Debug, Clone)]
struct ExecPipe {
    pc_do_w: bool,
    pc_w: u32,
    out_w: bool,
    req_w: Reg,
    wg_w: u8,
    data_w: Vec<u32>,
    dequeue_sb: bool,
    dequeue_sb_cstack: bool,
    ignore_mask_w: bool,
    cstack_action: CstackAction,
    store_target: Option<MemIf>,
    desc: StrideDescriptor,
    wg_state_next: [Option<WorkgroupState>; 2],
    wg_exit_commit: [bool; 2],
    op: Instruction,
    print: PrintKind,
}

impl Default for ExecPipe {
    fn default() -> Self {
        ExecPipe {
            pc_do_w: false,
            pc_w: 0,
            out_w: false,
            req_w: Reg::default(),
            wg_w: 0,
            data_w: vec![0; FPUS],
            dequeue_sb: false,
            dequeue_sb_cstack: false,
            ignore_mask_w: false,
            cstack_action: CstackAction::Idle,
            store_target: None,
            desc: StrideDescriptor::default(),
            wg_state_next: [None, None],
            wg_exit_commit: [false, false],
            op: Instruction::default(),
            print: PrintKind::None,
        }
    }
}

impl ExecPipe {
    fn for_slot(wg: u8) -> Self {
        ExecPipe { wg_w: wg, ..Default::default() }
    }

    fn invalidate(&mut self) {
        self.pc_do_w = false;
        self.out_w = false;
        self.store_target = None;
        self.print = PrintKind::None;
        self.wg_state_next = [None, None];
        self.wg_exit_commit = [false, false];
        self.cstack_action = CstackAction::Idle;
        self.op.kill();
    }
}

pub struct IExecute {
    /// Mask register accumulating sub-warp predicates for a CPUSH commit.
    cstack_entry: CstackEntry,
    pipe: Ringbuffer<ExecPipe>,
    /// Side buffer for SIDIV/SIMOD: the divider occupies 8 cycles, so the
    /// result is withheld until the rest of the pipeline has drained past
    /// it.
    sidebuf: ExecPipe,
    sidebuf_hold: u32,
    /// Previous commit performed a PC write; the next consume is a
    /// post-branch bubble.
    last_pc_do_w: bool,
    commit_vec: [u64; simd_isa::Category::COUNT],
    commit_sc: [u64; simd_isa::Category::COUNT],
    commit_nop: u64,
    /// Monotonic ticket for stride descriptors, serialising front-ends.
    ticket_push: u8,
}

impl IExecute {
    pub fn new() -> Self {
        IExecute {
            cstack_entry: CstackEntry::default(),
            pipe: Ringbuffer::new(3),
            sidebuf: ExecPipe::default(),
            sidebuf_hold: 0,
            last_pc_do_w: false,
            commit_vec: [0; simd_isa::Category::COUNT],
            commit_sc: [0; simd_isa::Category::COUNT],
            commit_nop: 0,
            ticket_push: 0,
        }
    }

    /// Set the pipeline depth.
    ///
    /// # Panics
    /// Panics below three stages: a fully pipelined RCP/RSQRT needs at
    /// least three (cf. US patent 7,117,238), and a fair comparison
    /// assumes no less.
    pub fn set_pipeline_stages(&mut self, stages: usize) {
        assert!(stages >= 3, "number of pipeline stages must be at least 3");
        self.pipe.resize(stages);
    }

    pub fn pipeline_stages(&self) -> usize {
        self.pipe.entries()
    }

    pub fn fill_stats(&self, s: &mut ComputeStats) {
        s.commit_nop = self.commit_nop;
        s.commit_vec = self.commit_vec;
        s.commit_sc = self.commit_sc;
    }

    /// Rising-edge update: consume the decoded instruction, execute it and
    /// commit the oldest pipeline stage.
    pub fn tick(&mut self, input: &ExecIn) -> ExecOut {
        if self.sidebuf_hold == 0 {
            self.sidebuf = ExecPipe::for_slot(input.wg);

            let mut op = input.insn.clone();

            // Post-branch bubble: a PC write in the previous commit, or a
            // slot with no active threads, kills the incoming instruction
            // and invalidates the pipeline (injected CPOPs excepted; they
            // must keep unwinding the stack).
            if self.last_pc_do_w || !input.thread_active[input.wg as usize] {
                op.kill();
                self.pipe_invalidate();
            }

            self.sidebuf.op = op.clone();
            self.set_write(&op, input);
            self.execute(&op, input);
        }

        self.sidebuf_hold = self.sidebuf_hold.saturating_sub(1);

        let committed = if self.sidebuf_hold == 0 {
            let elem = std::mem::take(&mut self.sidebuf);
            self.pipe.swap_head(elem)
        } else {
            self.pipe.swap_head(ExecPipe::for_slot(input.wg))
        };

        self.commit(committed)
    }

    fn pipe_invalidate(&mut self) {
        for i in (0..self.pipe.entries()).rev() {
            let stage = self.pipe.stage(i);
            if stage.op.is_injected() {
                continue;
            }
            stage.invalidate();
        }
    }

    /// Write-back bookkeeping for the newly consumed instruction.
    fn set_write(&mut self, op: &Instruction, input: &ExecIn) {
        let ps = &mut self.sidebuf;

        ps.dequeue_sb = op.on_sb();
        ps.dequeue_sb_cstack = op.on_cstack_sb();

        ps.req_w = op.dst().to_reg(input.wg, input.col_w as usize);

        if op.is_dead() || !op.has_dst() || op.is_ldst() {
            return;
        }

        assert!(op.dst().reg_kind() != RegKind::Imm);

        if op.category() == Category::ArithRcpu {
            ps.out_w = op.commit();
        } else {
            ps.out_w = true;
        }
    }

    /// Execute `op` combinationally into the stage-0 register.
    fn execute(&mut self, op: &Instruction, input: &ExecIn) {
        if op.is_dead() {
            return;
        }

        let o = input.operands;
        let ps = &mut self.sidebuf;

        match op.op() {
            Op::Test => {
                let cond = op.subop().test();
                for i in 0..FPUS {
                    let v = f32::from_bits(o[0][i]);
                    ps.data_w[i] = ftest(cond, v) as u32;
                }
            }
            Op::ITest => {
                let cond = op.subop().test();
                for i in 0..FPUS {
                    ps.data_w[i] = itest(cond, o[0][i] as i32) as u32;
                }
            }
            Op::PBool => {
                let SubOp::Bool(bop) = op.subop() else { unreachable!() };
                for i in 0..FPUS {
                    let (a, b) = (o[0][i] & 1, o[1][i] & 1);
                    ps.data_w[i] = match bop {
                        simd_isa::BoolOp::And => a & b,
                        simd_isa::BoolOp::Or => a | b,
                        simd_isa::BoolOp::Nand => !(a & b) & 1,
                        simd_isa::BoolOp::Nor => !(a | b) & 1,
                    };
                }
            }
            Op::J => {
                ps.pc_w = o[0][0];
                ps.pc_do_w = true;
            }
            Op::SiCj => {
                if itest(op.subop().test(), o[1][0] as i32) {
                    ps.pc_w = o[0][0];
                    ps.pc_do_w = true;
                }
            }
            Op::Bra => {
                self.do_cpush(MaskKind::Run, o[0][0], op.commit(), input);
                self.do_cmask(1, true, input);
            }
            Op::Call => {
                self.do_cpush(MaskKind::Ret, input.pc + 1, op.commit(), input);
                self.do_call_mask(1, input);
                if op.commit() {
                    let ps = &mut self.sidebuf;
                    ps.pc_w = input.operands[0][0];
                    ps.pc_do_w = true;
                }
            }
            Op::Cpop => self.do_cpop(op.commit(), input),
            Op::Cpush => {
                self.do_cpush(op.subop().cpush(), o[0][0], op.commit(), input);
            }
            Op::Exit => {
                if op.commit() {
                    self.sidebuf.wg_exit_commit[input.wg as usize] = true;
                }
                self.do_cmask(0, true, input);
            }
            Op::Brk | Op::Cmask | Op::Ret => self.do_cmask(0, true, input),
            Op::Mad => {
                let neg = op.subop() == SubOp::Fpu(FpuMod::Neg);
                for i in 0..FPUS {
                    let m1 = f32::from_bits(o[0][i]);
                    let mut m2 = f32::from_bits(o[1][i]);
                    let a = f32::from_bits(o[2][i]);
                    if neg {
                        m2 = -m2;
                    }
                    ps.data_w[i] = (m1 * m2 + a).to_bits();
                }
            }
            Op::Add => {
                let neg = op.subop() == SubOp::Fpu(FpuMod::Neg);
                for i in 0..FPUS {
                    let a = f32::from_bits(o[0][i]);
                    let mut b = f32::from_bits(o[1][i]);
                    if neg {
                        b = -b;
                    }
                    ps.data_w[i] = (a + b).to_bits();
                }
            }
            Op::Mul => {
                let neg = op.subop() == SubOp::Fpu(FpuMod::Neg);
                for i in 0..FPUS {
                    let a = f32::from_bits(o[0][i]);
                    let mut b = f32::from_bits(o[1][i]);
                    if neg {
                        b = -b;
                    }
                    ps.data_w[i] = (a * b).to_bits();
                }
            }
            Op::Min => {
                for i in 0..FPUS {
                    let (a, b) = (f32::from_bits(o[0][i]), f32::from_bits(o[1][i]));
                    ps.data_w[i] = a.min(b).to_bits();
                }
            }
            Op::Max => {
                for i in 0..FPUS {
                    let (a, b) = (f32::from_bits(o[0][i]), f32::from_bits(o[1][i]));
                    ps.data_w[i] = a.max(b).to_bits();
                }
            }
            Op::Abs => {
                for i in 0..FPUS {
                    ps.data_w[i] = o[0][i] & !0x8000_0000;
                }
            }
            Op::Mov | Op::MovVsp => ps.data_w[..FPUS].copy_from_slice(&o[0][..]),
            Op::Cvt => {
                let SubOp::Cvt(dir) = op.subop() else { unreachable!() };
                for i in 0..FPUS {
                    ps.data_w[i] = cvt(dir, o[0][i]);
                }
            }
            Op::SCvt => {
                let SubOp::Cvt(dir) = op.subop() else { unreachable!() };
                ps.data_w[0] = cvt(dir, o[0][0]);
            }
            Op::BufQuery => {
                let b = input.xlat_phys;
                assert!(b.valid, "querying an unmapped buffer");
                let SubOp::BufQuery(prop) = op.subop() else { unreachable!() };
                ps.data_w[0] = match prop {
                    simd_isa::BufQueryProp::DimX => b.dim_x(),
                    simd_isa::BufQueryProp::DimY => b.dim_y(),
                };
            }
            Op::IAdd => int2(ps, o, |a, b| a.wrapping_add(b)),
            Op::ISub => int2(ps, o, |a, b| a.wrapping_sub(b)),
            Op::IMul => int2(ps, o, |a, b| a.wrapping_mul(b)),
            Op::IMad => {
                for i in 0..FPUS {
                    let (a, b, c) = (o[0][i] as i32, o[1][i] as i32, o[2][i] as i32);
                    ps.data_w[i] = a.wrapping_mul(b).wrapping_add(c) as u32;
                }
            }
            Op::IMin => int2(ps, o, i32::min),
            Op::IMax => int2(ps, o, i32::max),
            Op::Shl => {
                let b = o[1][0];
                for i in 0..FPUS {
                    ps.data_w[i] = o[0][i] << (b & 31);
                }
            }
            Op::Shr => {
                let b = o[1][0];
                for i in 0..FPUS {
                    ps.data_w[i] = ((o[0][i] as i32) >> (b & 31)) as u32;
                }
            }
            Op::And => int2(ps, o, |a, b| a & b),
            Op::Or => int2(ps, o, |a, b| a | b),
            Op::Xor => int2(ps, o, |a, b| a ^ b),
            Op::Not => {
                for i in 0..FPUS {
                    ps.data_w[i] = !o[0][i];
                }
            }
            Op::SMov | Op::SMovSsp => ps.data_w[0] = o[0][0],
            Op::SIAdd => ps.data_w[0] = (o[0][0] as i32).wrapping_add(o[1][0] as i32) as u32,
            Op::SISub => ps.data_w[0] = (o[0][0] as i32).wrapping_sub(o[1][0] as i32) as u32,
            Op::SIMul => ps.data_w[0] = (o[0][0] as i32).wrapping_mul(o[1][0] as i32) as u32,
            Op::SIMad => {
                let (m1, m2, a) = (o[0][0] as i32, o[1][0] as i32, o[2][0] as i32);
                ps.data_w[0] = m1.wrapping_mul(m2).wrapping_add(a) as u32;
            }
            Op::SIMin => ps.data_w[0] = (o[0][0] as i32).min(o[1][0] as i32) as u32,
            Op::SIMax => ps.data_w[0] = (o[0][0] as i32).max(o[1][0] as i32) as u32,
            Op::SINeg => ps.data_w[0] = (o[0][0] as i32).wrapping_neg() as u32,
            Op::SIBfind => {
                let mut a = o[0][0];
                if a & 0x8000_0000 != 0 {
                    a = !a;
                }
                a = (a << 1) | 1;
                ps.data_w[0] = 30u32.wrapping_sub(a.leading_zeros());
            }
            Op::SShl => ps.data_w[0] = o[0][0] << (o[1][0] & 31),
            Op::SShr => ps.data_w[0] = ((o[0][0] as i32) >> (o[1][0] & 31)) as u32,
            Op::SIDiv => {
                ps.data_w[0] = (o[0][0] as i32).wrapping_div(o[1][0] as i32) as u32;
                self.sidebuf_hold = 8u32.saturating_sub(self.pipe.entries() as u32);
            }
            Op::SIMod => {
                ps.data_w[0] = (o[0][0] as i32).wrapping_rem(o[1][0] as i32) as u32;
                self.sidebuf_hold = 8u32.saturating_sub(self.pipe.entries() as u32);
            }
            Op::SAnd => ps.data_w[0] = o[0][0] & o[1][0],
            Op::SOr => ps.data_w[0] = o[0][0] | o[1][0],
            Op::SNot => ps.data_w[0] = !o[0][0],
            // The reciprocal unit computes all lanes at commit; the
            // serialised sub-column occupancy is modelled by decode.
            Op::Rcp => rcpu(ps, o, |a| 1.0 / a),
            Op::Rsqrt => rcpu(ps, o, |a| 1.0 / a.sqrt()),
            Op::Sin => rcpu(ps, o, f32::sin),
            Op::Cos => rcpu(ps, o, f32::cos),
            Op::LdgLin | Op::StgLin => self.do_ldst_lin(op, input),
            Op::LdSpLin | Op::StSpLin => self.do_ldst_sp_lin(op, input),
            Op::SLdg => self.do_sld(op, input),
            Op::SLdSp => self.do_sldsp(op, input),
            Op::LdgBIdx | Op::StgBIdx => self.do_ldst_bidx(op, input),
            Op::LdgCIdx | Op::StgCIdx => self.do_ldst_cidx(op, input),
            Op::LdgIdxIt | Op::StgIdxIt => self.do_ldst_idxit(op, input),
            Op::Ldg2SpTile | Op::Stg2SpTile => self.do_ldst_sptile(op, input),
            Op::LdSpBIdx | Op::StSpBIdx => self.do_ldst_sp_bidx(op, input),
            Op::DbgPrintSgpr => {
                ps.data_w[0] = o[0][0];
                ps.print = PrintKind::Sgpr;
            }
            Op::DbgPrintVgpr => {
                assert!((o[1][0] as usize) < THREADS);
                ps.data_w[0] = o[0][o[1][0] as usize & (FPUS - 1)];
                ps.print = PrintKind::Vgpr;
            }
            Op::DbgPrintPr => {
                ps.data_w[..FPUS].copy_from_slice(&o[0][..]);
                ps.print = PrintKind::Pr;
            }
            Op::DbgPrintCmask => {
                ps.data_w[..FPUS].copy_from_slice(&o[0][..]);
                ps.print = PrintKind::Cmask;
            }
            Op::DbgPrintTrace => {
                ps.data_w[0] = (o[0][0] != 0) as u32;
                ps.print = PrintKind::Trace;
            }
            Op::Nop => {}
        }
    }

    /// Accumulate one sub-warp of the predicate into the shadow entry and
    /// push it on commit.
    fn do_cpush(&mut self, kind: MaskKind, pc: u32, commit: bool, input: &ExecIn) {
        let offset = input.col_w as usize * FPUS;
        for l in 0..FPUS {
            self.cstack_entry.pred_mask.set(offset + l, input.operands[1][l] != 0);
        }

        self.cstack_entry.pc = pc;
        self.cstack_entry.mask_type = match kind {
            MaskKind::Run => vsp::CTRL_RUN,
            MaskKind::Break => vsp::CTRL_BREAK,
            MaskKind::Ret => vsp::CTRL_RET,
        };

        if commit {
            self.sidebuf.cstack_action = CstackAction::Push(self.cstack_entry.clone());
        }
    }

    /// Read the top entry combinationally, write `FPUS` bits of it into
    /// the destination CMASK (bypassing the write mask), and pop plus
    /// restore the stored PC on commit.
    fn do_cpop(&mut self, commit: bool, input: &ExecIn) {
        let ps = &mut self.sidebuf;
        let col = input.col_w as usize;
        let top = input.cstack_top;

        for l in 0..FPUS {
            ps.data_w[l] = top.pred_mask.get(col * FPUS + l) as u32;
        }

        ps.req_w = Reg::new(input.wg, RegKind::Vsp, top.mask_type, col);
        ps.ignore_mask_w = true;
        ps.out_w = true;

        if commit {
            ps.cstack_action = CstackAction::Pop;
            ps.pc_w = top.pc;
            ps.pc_do_w = true;
        }
    }

    /// Inverted predicate into the destination CMASK: 0 disables the
    /// thread.
    fn do_cmask(&mut self, src: usize, invert: bool, input: &ExecIn) {
        let ps = &mut self.sidebuf;
        for l in 0..FPUS {
            let p = input.operands[src][l] != 0;
            ps.data_w[l] = (p != invert) as u32;
        }
    }

    /// Call mask: non-inverted predicate into the RET CMASK.
    fn do_call_mask(&mut self, src: usize, input: &ExecIn) {
        self.do_cmask(src, false, input);
    }

    fn do_ldst_lin(&mut self, op: &Instruction, input: &ExecIn) {
        let wg = input.wg;
        let wg_width = 32u32 << input.wg_width.shift();
        let dst = op.dst().to_reg(wg, 0);
        let b = input.xlat_phys;

        let (wl, xform) = match op.subop().lin() {
            LinWidth::Vec2 => (2u32, IdxTransform::Vec2),
            LinWidth::Vec4 => (4, IdxTransform::Vec4),
            LinWidth::Unit => (1, IdxTransform::Unit),
        };

        let mut offset_x = ((input.wg_off[wg as usize][0] << 5) as i32)
            .wrapping_add(input.operands[1][0] as i32);
        let mut offset_y =
            (input.wg_off[wg as usize][1] as i32).wrapping_add(input.operands[2][0] as i32);

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.idx_transform = xform;
        sd.write = op.op() == Op::StgLin;
        sd.period = b.dim_x();
        sd.period_count = (THREADS as u32 / wg_width)
            .min(input.dims[1].wrapping_sub(input.wg_off[wg as usize][1]));
        sd.words = (wl * wg_width).min(b.dim_x().wrapping_sub((offset_x * wl as i32) as u32));
        sd.dst_period = wg_width;
        sd.dst_offset = 0;

        if offset_y < 0 {
            sd.dst_off_y = (-offset_y) as u32;
            sd.period_count = sd.period_count.wrapping_add(offset_y as u32);
            offset_y = 0;
        }
        if offset_x < 0 {
            sd.dst_off_x = (-offset_x) as u32;
            sd.words = sd.words.wrapping_add(offset_x as u32);
            offset_x = 0;
        }
        sd.addr = b
            .address()
            .wrapping_add(((offset_y as u32 * b.dim_x() + offset_x as u32 * wl) as u32) << 2);

        if dst.kind == RegKind::Vsp {
            sd.dst_offset = offset_y as u32 * b.dim_x() + offset_x as u32 * wl;
        }

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    fn do_ldst_sp_lin(&mut self, op: &Instruction, input: &ExecIn) {
        let wg = input.wg;
        let wg_width = 32u32 << input.wg_width.shift();
        let dst = op.dst().to_reg(wg, 0);
        let b = input.sp_xlat_phys;

        let mut offset_x = input.operands[1][0] as i32;
        let mut offset_y = input.operands[2][0] as i32;

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = op.op() == Op::StSpLin;
        sd.period = b.dim_x();
        sd.period_count =
            (THREADS as u32 / wg_width).min(b.dim_y().wrapping_sub(offset_y as u32));
        sd.words = wg_width.min(b.dim_x().wrapping_sub(offset_x as u32));
        sd.dst_period = wg_width;
        sd.dst_offset = 0;

        if offset_y < 0 {
            sd.dst_off_y = (-offset_y) as u32;
            sd.period_count = sd.period_count.wrapping_add(offset_y as u32);
            offset_y = 0;
        }
        if offset_x < 0 {
            sd.dst_off_x = (-offset_x) as u32;
            sd.words = sd.words.wrapping_add(offset_x as u32);
            offset_x = 0;
        }
        sd.addr = b
            .address()
            .wrapping_add(((offset_y as u32 * b.dim_x() + offset_x as u32) as u32) << 2);

        if dst.kind == RegKind::Vsp {
            sd.dst_offset = offset_y as u32 * b.dim_x() + offset_x as u32;
        }

        self.ldst_kick(op, MemIf::sp(wg), sd, input);
    }

    /// Stream a whole buffer past the CAMs' shared bus.
    fn do_ldst_bidx(&mut self, op: &Instruction, input: &ExecIn) {
        let dst = op.dst().to_reg(input.wg, 0);
        let b = input.xlat_phys;

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = op.op() == Op::StgBIdx;
        sd.period = b.dim_x();
        sd.period_count = b.dim_y();
        sd.words = b.dim_x();
        sd.dst_period = 32 << input.wg_width.shift();
        sd.dst_offset = 0;
        sd.addr = b.address();

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    /// Custom stride from the SSP stride-descriptor registers, plucked
    /// off the bus by the CAMs.
    fn do_ldst_cidx(&mut self, op: &Instruction, input: &ExecIn) {
        let wg = input.wg;
        let (sd_words, sd_period, sd_period_cnt) = input.sd_params[wg as usize];
        let dst = op.dst().to_reg(wg, 0);
        let b = input.xlat_phys;

        let mut offset_x = input.operands[1][0] as i32;
        let mut offset_y = input.operands[2][0] as i32;

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = op.op() == Op::StgCIdx;
        sd.period = sd_period;
        sd.period_count = sd_period_cnt;
        sd.words = sd_words;
        sd.dst_period = 0;

        if offset_y < 0 {
            sd.period_count = sd.period_count.wrapping_add(offset_y as u32);
            offset_y = 0;
        }
        if offset_x < 0 {
            sd.words = sd.words.wrapping_add(offset_x as u32);
            offset_x = 0;
        }
        sd.addr = b
            .address()
            .wrapping_add(((offset_y as u32 * b.dim_x() + offset_x as u32) as u32) << 2);
        sd.dst_offset = offset_y as u32 * b.dim_x() + offset_x as u32;

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    /// Iterate over indexes one by one.
    fn do_ldst_idxit(&mut self, op: &Instruction, input: &ExecIn) {
        let dst = op.dst().to_reg(input.wg, 0);
        let b = input.xlat_phys;

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.kind = StrideKind::IdxIt;
        sd.write = op.op() == Op::StgIdxIt;
        sd.dst_offset = 0;
        sd.addr = b.address();

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    /// Move a tile between DRAM and a scratchpad buffer.
    fn do_ldst_sptile(&mut self, op: &Instruction, input: &ExecIn) {
        let wg = input.wg;
        let b = input.xlat_phys;
        let spb = input.sp_xlat_phys;

        let mut offset_x = input.operands[1][0] as i32;
        let mut offset_y = input.operands[2][0] as i32;

        let mut sd = StrideDescriptor {
            dst: RequestTarget::new(wg, ReqDest::Sp),
            ..Default::default()
        };
        sd.write = op.op() == Op::Stg2SpTile;
        sd.period = b.dim_x();
        sd.period_count = spb.dim_y().min(b.dim_y().wrapping_sub(offset_y as u32));
        sd.words = spb.dim_x().min(b.dim_x().wrapping_sub(offset_x as u32));
        sd.dst_period = spb.dim_x();
        sd.dst_offset = spb.address();

        if offset_y < 0 {
            sd.dst_offset += sd.dst_period * (-offset_y) as u32 * 4;
            sd.period_count = sd.period_count.wrapping_add(offset_y as u32);
            offset_y = 0;
        }
        if offset_x < 0 {
            sd.dst_offset -= (-offset_x) as u32 * 4;
            sd.words = sd.words.wrapping_add(offset_x as u32);
            offset_x = 0;
        }
        sd.addr = b
            .address()
            .wrapping_add(((offset_y as u32 * b.dim_x() + offset_x as u32) as u32) << 2);

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    fn do_ldst_sp_bidx(&mut self, op: &Instruction, input: &ExecIn) {
        let dst = op.dst().to_reg(input.wg, 0);
        let b = input.sp_xlat_phys;

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = op.op() == Op::StSpBIdx;
        sd.period = b.dim_x();
        sd.period_count = b.dim_y();
        sd.words = b.dim_x();
        sd.dst_period = b.dim_x();
        sd.dst_offset = 0;
        sd.addr = b.address();

        self.ldst_kick(op, MemIf::sp(input.wg), sd, input);
    }

    /// Small DRAM load into consecutive scalar registers.
    fn do_sld(&mut self, op: &Instruction, input: &ExecIn) {
        let dst = op.dst().to_reg(input.wg, 0);
        let b = input.xlat_phys;
        let words = input.operands[1][0];

        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = false;
        sd.addr = b.address();
        sd.period = words;
        sd.period_count = 1;
        sd.words = words;

        self.ldst_kick(op, MemIf::Dram, sd, input);
    }

    /// Small scratchpad load into consecutive scalar registers.
    fn do_sldsp(&mut self, op: &Instruction, input: &ExecIn) {
        let wg = input.wg;
        let (sd_words, _, _) = input.sd_params[wg as usize];
        let b = input.sp_xlat_phys;

        let offset_x = input.operands[1][0] << 2;
        let offset_y = (input.operands[2][0] * b.dim_x()) << 2;

        let dst = op.dst().to_reg(wg, 0);
        let mut sd = StrideDescriptor::for_reg(dst);
        sd.write = false;
        sd.addr = b.address() + offset_x + offset_y;
        sd.period = sd_words;
        sd.period_count = 1;
        sd.words = sd_words;

        self.ldst_kick(op, MemIf::sp(wg), sd, input);
    }

    /// Shared load/store kick-off: stamp the ticket, pick the interface,
    /// park the slot.
    fn ldst_kick(&mut self, op: &Instruction, target: MemIf, mut sd: StrideDescriptor, input: &ExecIn) {
        let wg = input.wg as usize;
        let ps = &mut self.sidebuf;

        sd.ticket = self.ticket_push;

        ps.desc = sd;
        ps.store_target = Some(target);

        ps.wg_state_next[wg] = Some(match target {
            MemIf::Dram if op.post_exit() => WorkgroupState::BlockedDramPostExit,
            MemIf::Dram => WorkgroupState::BlockedDram,
            _ => WorkgroupState::BlockedSp,
        });

        // No jump is taken, but writing back a PC solves a lot of
        // pipelining problems.
        ps.pc_w = input.pc + 1;
        ps.pc_do_w = true;
    }

    fn commit_pcount(&mut self, ps: &ExecPipe) {
        if ps.op.is_dead() || ps.op.op() == Op::Nop {
            self.commit_nop += 1;
        } else if ps.op.is_vector() {
            self.commit_vec[ps.op.category() as usize] += 1;
        } else {
            self.commit_sc[ps.op.category() as usize] += 1;
        }
    }

    /// Drive the outputs from the retiring pipeline stage.
    fn commit(&mut self, ps: ExecPipe) -> ExecOut {
        self.last_pc_do_w = ps.pc_do_w;
        self.commit_pcount(&ps);

        let mut out = ExecOut {
            pc_w: ps.pc_do_w.then_some(ps.pc_w),
            dequeue_sb: ps.dequeue_sb,
            dequeue_sb_reg: ps.dequeue_sb.then_some(ps.req_w),
            dequeue_sb_cstack: ps.dequeue_sb_cstack.then_some(ps.wg_w),
            cstack_action: ps.cstack_action.clone(),
            cstack_slot: ps.wg_w,
            wg_state_next: ps.wg_state_next,
            wg_exit_commit: ps.wg_exit_commit,
            print: ps.print,
            ..Default::default()
        };

        if ps.out_w {
            let data = if ps.req_w.is_vector() {
                ps.data_w.clone()
            } else {
                vec![ps.data_w[0]]
            };
            out.write = Some(ExecWrite {
                reg: ps.req_w,
                data,
                ignore_mask: ps.ignore_mask_w,
            });
        }

        if let Some(target) = ps.store_target {
            out.store = Some((target, ps.desc.clone()));
            self.ticket_push = self.ticket_push.wrapping_add(1) & 0xf;
        }

        match ps.print {
            PrintKind::Sgpr | PrintKind::Vgpr => out.print_data = vec![ps.data_w[0]],
            PrintKind::Pr | PrintKind::Cmask => out.print_data = ps.data_w.clone(),
            PrintKind::Trace => out.print_data = vec![ps.data_w[0]],
            PrintKind::None => {}
        }

        tracing::trace!(target: "pipe_trace",
            wg = out.cstack_slot, insn = %ps.op, "iexecute commit");

        out
    }
}

impl Default for IExecute {
    fn default() -> Self {
        Self::new()
    }
}

fn ftest(cond: TestCond, v: f32) -> bool {
    match cond {
        TestCond::Ez => v == 0.0,
        TestCond::Nz => v != 0.0,
        TestCond::L => v < 0.0,
        TestCond::Le => v <= 0.0,
        TestCond::G => v > 0.0,
        TestCond::Ge => v >= 0.0,
    }
}

fn itest(cond: TestCond, v: i32) -> bool {
    match cond {
        TestCond::Ez => v == 0,
        TestCond::Nz => v != 0,
        TestCond::L => v < 0,
        TestCond::Le => v <= 0,
        TestCond::G => v > 0,
        TestCond::Ge => v >= 0,
    }
}

fn cvt(dir: CvtDir, v: u32) -> u32 {
    match dir {
        CvtDir::I2F => (v as i32 as f32).to_bits(),
        CvtDir::F2I => f32::from_bits(v) as i32 as u32,
    }
}

fn int2(ps: &mut ExecPipe, o: &[[u32; FPUS]; 3], f: impl Fn(i32, i32) -> i32) {
    for i in 0..FPUS {
        ps.data_w[i] = f(o[0][i] as i32, o[1][i] as i32) as u32;
    }
}

fn rcpu(ps: &mut ExecPipe, o: &[[u32; FPUS]; 3], f: impl Fn(f32) -> f32) {
    // Simulation shortcut: all lanes at once when the committing
    // sub-column writes back.
    if !ps.out_w {
        return;
    }
    for i in 0..FPUS {
        ps.data_w[i] = f(f32::from_bits(o[0][i])).to_bits();
    }
}
