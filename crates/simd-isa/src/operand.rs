//! Instruction operands.

use simd_model::{Reg, RegKind, SSP_SPECS, VSP_SPECS};

/// One operand of an instruction: a register reference, an immediate or a
/// branch target awaiting resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// Omitted operand.
    #[default]
    None,
    /// Register reference. Slot and column are bound at decode time.
    Reg { kind: RegKind, row: u8 },
    /// 32-bit immediate (integer or float bits).
    Imm(u32),
    /// Branch target; `pc` is filled in by label resolution.
    BranchTarget { label: String, pc: Option<u32> },
}

impl Operand {
    pub fn reg(kind: RegKind, row: usize) -> Self {
        Operand::Reg { kind, row: row as u8 }
    }

    pub fn imm(value: u32) -> Self {
        Operand::Imm(value)
    }

    pub fn label(name: &str) -> Self {
        Operand::BranchTarget { label: name.to_string(), pc: None }
    }

    /// Register kind for operand-mask validation. Immediates and branch
    /// targets validate as `Imm`.
    pub fn reg_kind(&self) -> RegKind {
        match self {
            Operand::None => RegKind::None,
            Operand::Reg { kind, .. } => *kind,
            Operand::Imm(_) | Operand::BranchTarget { .. } => RegKind::Imm,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn is_vector(&self) -> bool {
        self.reg_kind().is_vector()
    }

    /// True iff writing through this operand modifies one of the CMASKs.
    pub fn modifies_cmask(&self) -> bool {
        matches!(self, Operand::Reg { kind: RegKind::Vsp, row } if (*row as usize) <= simd_model::vsp::CTRL_EXIT)
    }

    /// Immediate value, or the resolved PC of a branch target.
    ///
    /// # Panics
    /// Panics on unresolved branch targets and register operands.
    pub fn value(&self) -> u32 {
        match self {
            Operand::Imm(v) => *v,
            Operand::BranchTarget { label, pc } => {
                pc.unwrap_or_else(|| panic!("unresolved branch target \"{label}\""))
            }
            _ => panic!("operand carries no value"),
        }
    }

    /// Materialise the full register identity for a decode column.
    pub fn to_reg(&self, slot: u8, col: usize) -> Reg {
        match self {
            Operand::Reg { kind, row } => Reg::new(slot, *kind, *row as usize, col),
            _ => Reg::new(slot, RegKind::Imm, 0, 0),
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::None => write!(f, "-"),
            Operand::Reg { kind, row } => match kind {
                RegKind::Sgpr => write!(f, "s{row}"),
                RegKind::Vgpr => write!(f, "v{row}"),
                RegKind::Pr => write!(f, "p{row}"),
                RegKind::Vsp => write!(f, "vc.{}", VSP_SPECS[*row as usize].alias),
                RegKind::Ssp => write!(f, "sc.{}", SSP_SPECS[*row as usize].alias),
                _ => write!(f, "?"),
            },
            Operand::Imm(v) => write!(f, "{v:#x}"),
            Operand::BranchTarget { label, pc } => match pc {
                Some(pc) => write!(f, "{label}({pc})"),
                None => write!(f, "{label}(?)"),
            },
        }
    }
}
