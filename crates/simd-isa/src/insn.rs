//! Instructions and their pipeline flags.

use bitflags::bitflags;

use crate::op::{op_spec, Category, Op, OperandMask, SubOp};
use crate::operand::Operand;
use crate::program::IsaError;
use simd_model::RegKind;

bitflags! {
    /// Scheduling state attached to an in-flight instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InsnFlags: u8 {
        /// Pipeline bubble: never executes or writes back.
        const DEAD = 1 << 0;
        /// A scoreboard entry was enqueued for this instruction.
        const ON_SB = 1 << 1;
        /// A control-stack write marker is outstanding.
        const ON_CSTACK_SB = 1 << 2;
        /// Final sub-warp of a vector instruction.
        const COMMIT = 1 << 3;
        /// Synthesised by the pipeline (e.g. an injected CPOP).
        const INJECTED = 1 << 4;
        /// Store with a folded program exit.
        const POST_EXIT = 1 << 5;
    }
}

/// A decoded instruction plus pipeline bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    op: Op,
    subop: SubOp,
    dst: Operand,
    srcs: [Operand; 3],
    nsrcs: usize,
    flags: InsnFlags,
    /// Source line, for diagnostics.
    pub line: Option<u32>,
}

impl Default for Instruction {
    /// A dead NOP, the canonical pipeline bubble.
    fn default() -> Self {
        let mut i = Instruction::new(Op::Nop);
        i.kill();
        i
    }
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Instruction {
            op,
            subop: SubOp::None,
            dst: Operand::None,
            srcs: [Operand::None, Operand::None, Operand::None],
            nsrcs: 0,
            flags: InsnFlags::empty(),
            line: None,
        }
    }

    pub fn with_subop(op: Op, subop: SubOp) -> Self {
        let mut i = Instruction::new(op);
        i.subop = subop;
        i
    }

    /// Build a fully-populated instruction, validating operand kinds.
    pub fn build(
        op: Op,
        subop: SubOp,
        dst: Operand,
        srcs: Vec<Operand>,
    ) -> Result<Self, IsaError> {
        let mut i = Instruction::new(op);
        i.subop = subop;
        i.dst = dst;
        i.nsrcs = srcs.len();
        for (slot, s) in srcs.into_iter().enumerate() {
            i.srcs[slot] = s;
        }
        i.validate()?;
        Ok(i)
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn subop(&self) -> SubOp {
        self.subop
    }

    pub fn num_srcs(&self) -> usize {
        self.nsrcs
    }

    pub fn src(&self, i: usize) -> &Operand {
        assert!(i < self.nsrcs, "source index out of bounds");
        &self.srcs[i]
    }

    /// Append a source operand; used for implicit-operand injection.
    pub fn add_src(&mut self, op: Operand) {
        assert!(self.nsrcs < 3);
        self.srcs[self.nsrcs] = op;
        self.nsrcs += 1;
    }

    pub fn has_dst(&self) -> bool {
        !self.dst.is_none()
    }

    pub fn dst(&self) -> &Operand {
        &self.dst
    }

    pub fn set_dst(&mut self, dst: Operand) {
        self.dst = dst;
    }

    /// Resolve branch-target operands through `resolve`.
    pub fn resolve_targets(
        &mut self,
        mut resolve: impl FnMut(&str) -> Option<u32>,
    ) -> Result<(), IsaError> {
        for s in self.srcs.iter_mut().take(self.nsrcs) {
            if let Operand::BranchTarget { label, pc } = s {
                *pc = Some(resolve(label).ok_or_else(|| IsaError::UnknownLabel {
                    line: self.line.unwrap_or(0),
                    label: label.clone(),
                })?);
            }
        }
        Ok(())
    }

    /* Flag accessors. */

    pub fn kill(&mut self) {
        if !self.flags.contains(InsnFlags::INJECTED) {
            self.flags.insert(InsnFlags::DEAD);
        }
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(InsnFlags::DEAD)
    }

    pub fn commit(&self) -> bool {
        self.flags.contains(InsnFlags::COMMIT)
    }

    pub fn set_commit(&mut self, c: bool) {
        self.flags.set(InsnFlags::COMMIT, c);
    }

    pub fn on_sb(&self) -> bool {
        self.flags.contains(InsnFlags::ON_SB)
    }

    pub fn set_on_sb(&mut self, v: bool) {
        self.flags.set(InsnFlags::ON_SB, v);
    }

    pub fn on_cstack_sb(&self) -> bool {
        self.flags.contains(InsnFlags::ON_CSTACK_SB)
    }

    pub fn set_on_cstack_sb(&mut self, v: bool) {
        self.flags.set(InsnFlags::ON_CSTACK_SB, v);
    }

    pub fn inject(&mut self) {
        self.flags.insert(InsnFlags::INJECTED);
    }

    pub fn is_injected(&self) -> bool {
        self.flags.contains(InsnFlags::INJECTED)
    }

    pub fn post_exit(&self) -> bool {
        self.flags.contains(InsnFlags::POST_EXIT)
    }

    /// Fold a trailing unconditional exit into this store.
    pub fn set_post_exit(&mut self) -> bool {
        if !self.is_global_store() {
            tracing::warn!(
                "last instruction before unconditional exit is not a global store; \
                 not folding exit"
            );
            return false;
        }
        self.flags.insert(InsnFlags::POST_EXIT);
        true
    }

    /* Derived properties. */

    pub fn category(&self) -> Category {
        op_spec(self.op).cat
    }

    pub fn is_vector(&self) -> bool {
        op_spec(self.op).vector
    }

    pub fn is_ldst(&self) -> bool {
        op_spec(self.op).cat == Category::LdSt
    }

    /// Global (DRAM) store of any flavour.
    pub fn is_global_store(&self) -> bool {
        matches!(
            self.op,
            Op::StgLin | Op::StgBIdx | Op::StgCIdx | Op::StgIdxIt | Op::Stg2SpTile
        )
    }

    /// Targets a scratchpad front-end.
    pub fn is_sp_ldst(&self) -> bool {
        matches!(
            self.op,
            Op::LdSpLin | Op::StSpLin | Op::LdSpBIdx | Op::StSpBIdx | Op::SLdSp
        )
    }

    pub fn block_ssp_writes(&self) -> bool {
        op_spec(self.op).block_ssp_writes
    }

    pub fn does_cpush(&self) -> bool {
        op_spec(self.op).cpush
    }

    /// True iff committing this instruction writes one of the CMASKs.
    pub fn writes_cmask(&self) -> bool {
        if self.op == Op::Cpop {
            return true;
        }
        self.has_dst() && self.dst.modifies_cmask()
    }

    /// Validate operand kinds and counts against the opcode table.
    pub fn validate(&self) -> Result<(), IsaError> {
        let spec = op_spec(self.op);
        let line = self.line.unwrap_or(0);

        if self.nsrcs > spec.srcs {
            return Err(IsaError::TooManySources { line, op: spec.name });
        }

        for i in 0..spec.srcs {
            if i >= self.nsrcs {
                if !spec.src_mask[i].contains(OperandMask::OMIT) {
                    return Err(IsaError::MissingSource { line, op: spec.name, idx: i });
                }
                continue;
            }

            if !spec.src_mask[i].contains(OperandMask::of_kind(self.srcs[i].reg_kind())) {
                return Err(IsaError::InvalidSource { line, op: spec.name, idx: i });
            }
        }

        let dst_ok = match self.dst.reg_kind() {
            RegKind::None => spec.dst_mask.contains(OperandMask::OMIT),
            k => spec.dst_mask.contains(OperandMask::of_kind(k)),
        };
        if !dst_ok {
            return Err(IsaError::InvalidDestination { line, op: spec.name });
        }

        Ok(())
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", op_spec(self.op).name)?;
        if self.post_exit() {
            write!(f, ".post_exit")?;
        }
        if self.has_dst() {
            write!(f, " {}", self.dst)?;
        }
        for i in 0..self.nsrcs {
            write!(f, "{} {}", if i > 0 || self.has_dst() { "," } else { "" }, self.srcs[i])?;
        }
        if self.is_dead() {
            write!(f, " (dead)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_instructions_survive_kill() {
        let mut cpop = Instruction::new(Op::Cpop);
        cpop.inject();
        cpop.kill();
        assert!(!cpop.is_dead());

        let mut nop = Instruction::new(Op::Nop);
        nop.kill();
        assert!(nop.is_dead());
    }

    #[test]
    fn validate_rejects_wrong_source_kind() {
        let i = Instruction::build(
            Op::Mad,
            SubOp::Fpu(crate::op::FpuMod::None),
            Operand::reg(RegKind::Vgpr, 0),
            vec![
                Operand::reg(RegKind::Sgpr, 0),
                Operand::reg(RegKind::Vgpr, 1),
                Operand::reg(RegKind::Vgpr, 2),
            ],
        );
        assert!(matches!(i, Err(IsaError::InvalidSource { idx: 0, .. })));
    }

    #[test]
    fn validate_requires_mandatory_sources() {
        let i = Instruction::build(
            Op::Mad,
            SubOp::Fpu(crate::op::FpuMod::None),
            Operand::reg(RegKind::Vgpr, 0),
            vec![Operand::reg(RegKind::Vgpr, 0)],
        );
        assert!(matches!(i, Err(IsaError::MissingSource { .. })));
    }

    #[test]
    fn exit_fold_requires_global_store() {
        let mut st = Instruction::build(
            Op::StgLin,
            SubOp::Lin(crate::op::LinWidth::Unit),
            Operand::reg(RegKind::Vgpr, 0),
            vec![Operand::imm(0)],
        )
        .unwrap();
        assert!(st.set_post_exit());

        let mut add = Instruction::build(
            Op::IAdd,
            SubOp::None,
            Operand::reg(RegKind::Vgpr, 0),
            vec![Operand::reg(RegKind::Vgpr, 0), Operand::reg(RegKind::Vgpr, 1)],
        )
        .unwrap();
        assert!(!add.set_post_exit());
    }
}
