//! Opcode table.
//!
//! One [`OpSpec`] per opcode describes the permitted operand kinds, the
//! sub-operation spellings and the scheduling properties (vector width,
//! control-stack pushes, implicit stride-descriptor reads). Parsing and
//! validation are driven entirely by this table.

use bitflags::bitflags;

bitflags! {
    /// Permitted operand kinds for one operand slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OperandMask: u8 {
        /// The operand may be (or must be, for destinations) omitted.
        const OMIT = 1 << 0;
        const SGPR = 1 << 1;
        const VGPR = 1 << 2;
        const PR   = 1 << 3;
        const VSP  = 1 << 4;
        const SSP  = 1 << 5;
        const IMM  = 1 << 6;
    }
}

impl OperandMask {
    /// Mask bit corresponding to a register kind.
    pub fn of_kind(kind: simd_model::RegKind) -> Self {
        use simd_model::RegKind;
        match kind {
            RegKind::None => OperandMask::OMIT,
            RegKind::Sgpr => OperandMask::SGPR,
            RegKind::Vgpr => OperandMask::VGPR,
            RegKind::Pr => OperandMask::PR,
            RegKind::Vsp => OperandMask::VSP,
            RegKind::Ssp => OperandMask::SSP,
            RegKind::Imm => OperandMask::IMM,
        }
    }
}

/// Instruction category. Determines the functional unit and the
/// performance-counter bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Floating point arithmetic.
    ArithFp = 0,
    /// Reciprocal/trigonometry (expensive FP arithmetic).
    ArithRcpu,
    /// Integer/boolean arithmetic.
    ArithInt,
    /// Data copy, conversion and intra-lane shuffle.
    DataCopy,
    /// Load/store.
    LdSt,
    /// Control flow.
    CtrlFlow,
    /// Predicate manipulation.
    Predicate,
    Debug,
}

impl Category {
    pub const COUNT: usize = 8;

    pub fn name(self) -> &'static str {
        match self {
            Category::ArithFp => "Floating point arithmetic",
            Category::ArithRcpu => "Reciprocal/Trigonometry (expensive FP arith)",
            Category::ArithInt => "Integer/Boolean arithmetic",
            Category::DataCopy => "Data copy, conversion and intra-lane shuffle",
            Category::LdSt => "Load/Store",
            Category::CtrlFlow => "Control flow",
            Category::Predicate => "Predicate manipulation",
            Category::Debug => "Debug",
        }
    }
}

/// Test conditions for `test`, `itest` and `sicj`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCond {
    Ez = 0,
    Nz,
    G,
    Ge,
    L,
    Le,
}

/// Boolean ops on predicate registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And = 0,
    Or,
    Nand,
    Nor,
}

/// Kind of control-stack entry pushed / CMASK printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Control mask (`if`).
    Run = 0,
    /// Break mask (`brk`).
    Break,
    /// Call/return mask (`jc`).
    Ret,
}

/// CMASKs addressable by `printcmask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMask {
    Run = 0,
    Break,
    Ret,
    Exit,
}

/// Conversion direction for `cvt`/`scvt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvtDir {
    I2F = 0,
    F2I,
}

/// Element width of linear load/stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinWidth {
    Unit = 0,
    Vec2,
    Vec4,
}

/// FPU operand modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuMod {
    None = 0,
    /// Negate the second operand.
    Neg,
}

/// Buffer property queried by `bufquery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufQueryProp {
    DimX = 0,
    DimY,
}

/// Decoded sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubOp {
    #[default]
    None,
    Test(TestCond),
    Bool(BoolOp),
    Cpush(MaskKind),
    PrintCmask(PrintMask),
    Cvt(CvtDir),
    Lin(LinWidth),
    Fpu(FpuMod),
    BufQuery(BufQueryProp),
}

impl SubOp {
    pub fn test(self) -> TestCond {
        match self {
            SubOp::Test(t) => t,
            _ => panic!("instruction carries no test sub-op"),
        }
    }

    pub fn cpush(self) -> MaskKind {
        match self {
            SubOp::Cpush(k) => k,
            _ => panic!("instruction carries no cpush sub-op"),
        }
    }

    pub fn lin(self) -> LinWidth {
        match self {
            SubOp::Lin(w) => w,
            SubOp::None => LinWidth::Unit,
            _ => panic!("instruction carries no linear-width sub-op"),
        }
    }
}

/// Opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Op {
    #[default]
    Nop,
    Test,
    ITest,
    PBool,
    J,
    SiCj,
    Bra,
    Call,
    Cpush,
    Cmask,
    Cpop,
    Ret,
    Brk,
    Exit,
    Mad,
    Mul,
    Add,
    Min,
    Max,
    Abs,
    Mov,
    MovVsp,
    SMovSsp,
    Cvt,
    SCvt,
    BufQuery,
    IAdd,
    ISub,
    IMul,
    IMad,
    IMin,
    IMax,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Not,
    SMov,
    SIAdd,
    SISub,
    SIMul,
    SIMad,
    SIMin,
    SIMax,
    SINeg,
    SIBfind,
    SShl,
    SShr,
    SIDiv,
    SIMod,
    SAnd,
    SOr,
    SNot,
    Rcp,
    Rsqrt,
    Sin,
    Cos,
    LdgLin,
    StgLin,
    LdgBIdx,
    StgBIdx,
    LdgCIdx,
    StgCIdx,
    LdgIdxIt,
    StgIdxIt,
    Ldg2SpTile,
    Stg2SpTile,
    SLdg,
    SLdSp,
    LdSpLin,
    StSpLin,
    LdSpBIdx,
    StSpBIdx,
    DbgPrintSgpr,
    DbgPrintVgpr,
    DbgPrintPr,
    DbgPrintCmask,
    DbgPrintTrace,
}

impl Op {
    pub const ALL: &'static [Op] = &[
        Op::Nop,
        Op::Test,
        Op::ITest,
        Op::PBool,
        Op::J,
        Op::SiCj,
        Op::Bra,
        Op::Call,
        Op::Cpush,
        Op::Cmask,
        Op::Cpop,
        Op::Ret,
        Op::Brk,
        Op::Exit,
        Op::Mad,
        Op::Mul,
        Op::Add,
        Op::Min,
        Op::Max,
        Op::Abs,
        Op::Mov,
        Op::MovVsp,
        Op::SMovSsp,
        Op::Cvt,
        Op::SCvt,
        Op::BufQuery,
        Op::IAdd,
        Op::ISub,
        Op::IMul,
        Op::IMad,
        Op::IMin,
        Op::IMax,
        Op::Shl,
        Op::Shr,
        Op::And,
        Op::Or,
        Op::Xor,
        Op::Not,
        Op::SMov,
        Op::SIAdd,
        Op::SISub,
        Op::SIMul,
        Op::SIMad,
        Op::SIMin,
        Op::SIMax,
        Op::SINeg,
        Op::SIBfind,
        Op::SShl,
        Op::SShr,
        Op::SIDiv,
        Op::SIMod,
        Op::SAnd,
        Op::SOr,
        Op::SNot,
        Op::Rcp,
        Op::Rsqrt,
        Op::Sin,
        Op::Cos,
        Op::LdgLin,
        Op::StgLin,
        Op::LdgBIdx,
        Op::StgBIdx,
        Op::LdgCIdx,
        Op::StgCIdx,
        Op::LdgIdxIt,
        Op::StgIdxIt,
        Op::Ldg2SpTile,
        Op::Stg2SpTile,
        Op::SLdg,
        Op::SLdSp,
        Op::LdSpLin,
        Op::StSpLin,
        Op::LdSpBIdx,
        Op::StSpBIdx,
        Op::DbgPrintSgpr,
        Op::DbgPrintVgpr,
        Op::DbgPrintPr,
        Op::DbgPrintCmask,
        Op::DbgPrintTrace,
    ];

    pub fn category(self) -> Category {
        op_spec(self).cat
    }

    /// Decode a sub-op table index into the typed representation.
    pub fn subop_from_idx(self, idx: usize) -> SubOp {
        match self {
            Op::Test | Op::ITest | Op::SiCj => SubOp::Test(match idx {
                0 => TestCond::Ez,
                1 => TestCond::Nz,
                2 => TestCond::G,
                3 => TestCond::Ge,
                4 => TestCond::L,
                _ => TestCond::Le,
            }),
            Op::PBool => SubOp::Bool(match idx {
                0 => BoolOp::And,
                1 => BoolOp::Or,
                2 => BoolOp::Nand,
                _ => BoolOp::Nor,
            }),
            Op::Cpush => SubOp::Cpush(match idx {
                0 => MaskKind::Run,
                1 => MaskKind::Break,
                _ => MaskKind::Ret,
            }),
            Op::DbgPrintCmask => SubOp::PrintCmask(match idx {
                0 => PrintMask::Run,
                1 => PrintMask::Break,
                2 => PrintMask::Ret,
                _ => PrintMask::Exit,
            }),
            Op::Cvt | Op::SCvt => {
                SubOp::Cvt(if idx == 0 { CvtDir::I2F } else { CvtDir::F2I })
            }
            Op::LdgLin | Op::StgLin => SubOp::Lin(match idx {
                0 => LinWidth::Unit,
                1 => LinWidth::Vec2,
                _ => LinWidth::Vec4,
            }),
            Op::Mad | Op::Mul | Op::Add => {
                SubOp::Fpu(if idx == 0 { FpuMod::None } else { FpuMod::Neg })
            }
            Op::BufQuery => {
                SubOp::BufQuery(if idx == 0 { BufQueryProp::DimX } else { BufQueryProp::DimY })
            }
            _ => SubOp::None,
        }
    }
}

/// Static description of an opcode.
pub struct OpSpec {
    pub cat: Category,
    pub name: &'static str,
    /// Sub-operation spellings; empty slice means the op takes none. An
    /// empty string in slot 0 marks the default sub-op.
    pub subops: &'static [&'static str],
    /// Number of source operand slots.
    pub srcs: usize,
    pub src_mask: [OperandMask; 3],
    pub dst_mask: OperandMask,
    /// Vector instruction: enumerates warps at decode.
    pub vector: bool,
    /// Must block while stride-descriptor SSP writes are outstanding.
    pub block_ssp_writes: bool,
    /// Performs a control-stack push.
    pub cpush: bool,
}

impl OpSpec {
    /// Sub-op index selected when the assembly omits the suffix, if any.
    pub fn default_subop(&self) -> Option<usize> {
        match self.subops.first() {
            Some(&"") => Some(0),
            _ => None,
        }
    }
}

const TEST_SUBOPS: &[&str] = &["ez", "nz", "g", "ge", "l", "le"];
const PBOOL_SUBOPS: &[&str] = &["and", "or", "nand", "nor"];
const CPUSH_SUBOPS: &[&str] = &["if", "brk", "jc"];
const PRINTCMASK_SUBOPS: &[&str] = &["if", "brk", "jc", "exit"];
const CVT_SUBOPS: &[&str] = &["i2f", "f2i"];
const LIN_SUBOPS: &[&str] = &["", "vec2", "vec4"];
const FPU_SUBOPS: &[&str] = &["", "neg"];
const BUFQUERY_SUBOPS: &[&str] = &["dim_x", "dim_y"];

const OMIT: OperandMask = OperandMask::OMIT;
const SGPR: OperandMask = OperandMask::SGPR;
const VGPR: OperandMask = OperandMask::VGPR;
const PR: OperandMask = OperandMask::PR;
const VSP: OperandMask = OperandMask::VSP;
const SSP: OperandMask = OperandMask::SSP;
const IMM: OperandMask = OperandMask::IMM;
const NONE: OperandMask = OperandMask::empty();

macro_rules! spec {
    ($cat:expr, $name:literal, $subops:expr, $srcs:expr,
     [$s0:expr, $s1:expr, $s2:expr], $dst:expr, $vec:expr, $bssp:expr, $cp:expr) => {
        OpSpec {
            cat: $cat,
            name: $name,
            subops: $subops,
            srcs: $srcs,
            src_mask: [$s0, $s1, $s2],
            dst_mask: $dst,
            vector: $vec,
            block_ssp_writes: $bssp,
            cpush: $cp,
        }
    };
}

/// Specification table, indexed by opcode discriminant (declaration order,
/// identical to [`Op::ALL`]).
static OP_SPECS: [OpSpec; 79] = {
    use Category::*;
    [
        spec!(ArithFp, "nop", &[], 0, [NONE, NONE, NONE], OMIT, false, false, false),
        spec!(Predicate, "test", TEST_SUBOPS, 1, [VGPR, NONE, NONE], PR, true, false, false),
        spec!(Predicate, "itest", TEST_SUBOPS, 1, [VGPR, NONE, NONE], PR, true, false, false),
        spec!(Predicate, "pbool", PBOOL_SUBOPS, 2, [PR, PR, NONE], PR, true, false, false),
        spec!(CtrlFlow, "j", &[], 1, [IMM, NONE, NONE], OMIT, false, false, false),
        spec!(CtrlFlow, "sicj", TEST_SUBOPS, 2, [IMM, SGPR, NONE], OMIT, false, false, false),
        spec!(CtrlFlow, "bra", &[], 2,
            [IMM, PR, NONE], OMIT.union(VSP), true, false, true),
        spec!(CtrlFlow, "call", &[], 2,
            [IMM, PR.union(VSP).union(OMIT), NONE], OMIT.union(VSP), true, false, true),
        spec!(CtrlFlow, "cpush", CPUSH_SUBOPS, 2,
            [IMM, PR.union(OMIT), NONE], OMIT, true, false, true),
        spec!(CtrlFlow, "cmask", &[], 1,
            [PR, NONE, NONE], OMIT.union(VSP), true, false, false),
        spec!(CtrlFlow, "cpop", &[], 0, [NONE, NONE, NONE], OMIT, true, false, false),
        spec!(CtrlFlow, "ret", &[], 1, [PR, NONE, NONE], OMIT.union(VSP), true, false, false),
        spec!(CtrlFlow, "brk", &[], 1, [PR, NONE, NONE], OMIT.union(VSP), true, false, false),
        spec!(CtrlFlow, "exit", &[], 1,
            [PR.union(VSP).union(OMIT), NONE, NONE], OMIT.union(VSP), true, false, false),
        spec!(ArithFp, "mad", FPU_SUBOPS, 3,
            [VGPR, VGPR.union(SGPR).union(IMM), VGPR], VGPR, true, false, false),
        spec!(ArithFp, "mul", FPU_SUBOPS, 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithFp, "add", FPU_SUBOPS, 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithFp, "min", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithFp, "max", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithFp, "abs", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(DataCopy, "mov", &[], 1, [IMM.union(VSP), NONE, NONE], VGPR, true, false, false),
        spec!(DataCopy, "movvsp", &[], 1,
            [IMM.union(VGPR), NONE, NONE], VSP, true, false, false),
        spec!(DataCopy, "smovssp", &[], 1,
            [IMM.union(SGPR), NONE, NONE], SSP, false, false, false),
        spec!(DataCopy, "cvt", CVT_SUBOPS, 1,
            [VSP.union(SSP).union(VGPR), NONE, NONE], VGPR, true, false, false),
        spec!(DataCopy, "scvt", CVT_SUBOPS, 1,
            [SGPR.union(SSP), NONE, NONE], SGPR, false, false, false),
        spec!(DataCopy, "bufquery", BUFQUERY_SUBOPS, 1,
            [IMM, NONE, NONE], SGPR, false, false, false),
        spec!(ArithInt, "iadd", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "isub", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "imul", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "imad", &[], 3,
            [VGPR, VGPR.union(SGPR).union(IMM), VGPR], VGPR, true, false, false),
        spec!(ArithInt, "imin", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "imax", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "shl", &[], 2, [VGPR, SGPR.union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "shr", &[], 2, [VGPR, SGPR.union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "and", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "or", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "xor", &[], 2,
            [VGPR, VGPR.union(SGPR).union(IMM), NONE], VGPR, true, false, false),
        spec!(ArithInt, "not", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(DataCopy, "smov", &[], 1,
            [SSP.union(IMM).union(SGPR), NONE, NONE], SGPR, false, false, false),
        spec!(ArithInt, "siadd", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sisub", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "simul", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "simad", &[], 3,
            [SGPR, SGPR.union(IMM), SGPR], SGPR, false, false, false),
        spec!(ArithInt, "simin", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "simax", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sineg", &[], 1, [SGPR, NONE, NONE], SGPR, false, false, false),
        spec!(ArithInt, "sibfind", &[], 1, [SGPR, NONE, NONE], SGPR, false, false, false),
        spec!(ArithInt, "sshl", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sshr", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sidiv", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "simod", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sand", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "sor", &[], 2, [SGPR, SGPR.union(IMM), NONE], SGPR, false, false, false),
        spec!(ArithInt, "snot", &[], 1, [SGPR, NONE, NONE], SGPR, false, false, false),
        spec!(ArithRcpu, "rcp", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(ArithRcpu, "rsqrt", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(ArithRcpu, "sin", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(ArithRcpu, "cos", &[], 1, [VGPR, NONE, NONE], VGPR, true, false, false),
        spec!(LdSt, "ldglin", LIN_SUBOPS, 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            VGPR.union(VSP), false, false, false),
        spec!(LdSt, "stglin", LIN_SUBOPS, 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            VGPR.union(VSP), false, false, false),
        spec!(LdSt, "ldgbidx", &[], 1, [IMM, NONE, NONE], VSP.union(OMIT), false, false, false),
        spec!(LdSt, "stgbidx", &[], 1, [IMM, NONE, NONE], VSP.union(OMIT), false, false, false),
        spec!(LdSt, "ldgcidx", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            VSP.union(OMIT), false, true, false),
        spec!(LdSt, "stgcidx", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            VSP.union(OMIT), false, true, false),
        spec!(LdSt, "ldgidxit", &[], 1, [IMM, NONE, NONE], VGPR, false, false, false),
        spec!(LdSt, "stgidxit", &[], 1, [IMM, NONE, NONE], VGPR, false, false, false),
        spec!(LdSt, "ldg2sptile", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            IMM, false, false, false),
        spec!(LdSt, "stg2sptile", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            IMM, false, false, false),
        spec!(LdSt, "sldg", &[], 2, [IMM, IMM.union(OMIT), NONE], SGPR, false, false, false),
        spec!(LdSt, "sldsp", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            SGPR, false, true, false),
        spec!(LdSt, "ldsplin", &[], 3,
            [IMM, IMM.union(SGPR).union(OMIT), IMM.union(SGPR).union(OMIT)],
            VGPR.union(VSP), false, false, false),
        spec!(LdSt, "stsplin", &[], 3,
            [IMM, IMM.union(OMIT), IMM.union(SGPR).union(OMIT)],
            VGPR.union(VSP), false, false, false),
        spec!(LdSt, "ldspbidx", &[], 1, [IMM, NONE, NONE], VSP.union(OMIT), false, false, false),
        spec!(LdSt, "stspbidx", &[], 1, [IMM, NONE, NONE], VSP.union(OMIT), false, false, false),
        spec!(Debug, "printsgpr", &[], 1, [SGPR, NONE, NONE], OMIT, false, false, false),
        spec!(Debug, "printvgpr", &[], 2, [VGPR, IMM, NONE], OMIT, false, false, false),
        spec!(Debug, "printpr", &[], 1, [PR, NONE, NONE], OMIT, true, false, false),
        spec!(Debug, "printcmask", PRINTCMASK_SUBOPS, 0,
            [NONE, NONE, NONE], OMIT, true, false, false),
        spec!(Debug, "printtrace", &[], 1, [IMM, NONE, NONE], OMIT, false, false, false),
    ]
};

/// Look up the static specification of an opcode.
pub fn op_spec(op: Op) -> &'static OpSpec {
    &OP_SPECS[op as usize]
}

/// Look an opcode up by its assembly spelling.
pub fn op_by_name(name: &str) -> Option<Op> {
    Op::ALL.iter().copied().find(|&op| op_spec(op).name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_discriminants() {
        for (i, &op) in Op::ALL.iter().enumerate() {
            assert_eq!(op as usize, i);
        }
        assert_eq!(op_spec(Op::Nop).name, "nop");
        assert_eq!(op_spec(Op::DbgPrintTrace).name, "printtrace");
        assert_eq!(op_spec(Op::SMov).name, "smov");
    }

    #[test]
    fn names_are_unique() {
        for (i, &a) in Op::ALL.iter().enumerate() {
            for &b in &Op::ALL[i + 1..] {
                assert_ne!(op_spec(a).name, op_spec(b).name);
            }
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(op_by_name("mad"), Some(Op::Mad));
        assert_eq!(op_by_name("ldglin"), Some(Op::LdgLin));
        assert_eq!(op_by_name("bogus"), None);
    }

    #[test]
    fn cidx_blocks_on_ssp_writes() {
        assert!(op_spec(Op::LdgCIdx).block_ssp_writes);
        assert!(op_spec(Op::SLdSp).block_ssp_writes);
        assert!(!op_spec(Op::LdgLin).block_ssp_writes);
    }

    #[test]
    fn default_subops() {
        assert_eq!(op_spec(Op::Mad).default_subop(), Some(0));
        assert_eq!(op_spec(Op::Test).default_subop(), None);
        assert_eq!(op_spec(Op::LdgLin).default_subop(), Some(0));
    }
}
