//! Sim-D instruction set model.
//!
//! The opcode table drives parsing, operand validation and the
//! documentation of which operand kinds each instruction accepts. The
//! pipeline carries [`Instruction`] values decorated with scheduling flags.

mod bufio;
mod consts;
mod insn;
mod op;
mod operand;
mod program;

pub use bufio::{read_buffer_file, write_buffer_file, BufferFileKind};
pub use consts::reserved_const;
pub use insn::{Instruction, InsnFlags};
pub use op::{
    op_by_name, op_spec, BoolOp, BufQueryProp, Category, CvtDir, FpuMod, LinWidth, MaskKind, Op,
    OpSpec, OperandMask, PrintMask, SubOp, TestCond,
};
pub use operand::Operand;
pub use program::{IsaError, Program, ProgramBuffer};
