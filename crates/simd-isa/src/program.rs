//! Kernel program (`.sas`) parsing.
//!
//! One instruction per non-empty line. `//` starts a comment. `name:`
//! declares a branch target. `buffer`/`spbuffer` directives declare DRAM
//! and scratchpad buffers with their dimensions and an optional data input
//! file.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::bufio::BufferFileKind;
use crate::consts::reserved_const;
use crate::insn::Instruction;
use crate::op::{op_by_name, op_spec, Op, OperandMask, SubOp};
use crate::operand::Operand;
use simd_model::{Buffer, RegKind, MC_BUS_WIDTH, SP_BUS_WIDTH};

#[derive(Debug, Error)]
pub enum IsaError {
    #[error("line {line}: unknown operation \"{name}\"")]
    UnknownOp { line: u32, name: String },
    #[error("line {line}: operation \"{op}\" requires a subop, none given")]
    MissingSubop { line: u32, op: &'static str },
    #[error("line {line}: subop \"{subop}\" invalid for operation \"{op}\"")]
    UnknownSubop { line: u32, op: &'static str, subop: String },
    #[error("line {line}: too many source operands for \"{op}\"")]
    TooManySources { line: u32, op: &'static str },
    #[error("line {line}: missing source operand {idx} for \"{op}\"")]
    MissingSource { line: u32, op: &'static str, idx: usize },
    #[error("line {line}: invalid type for source operand {idx} of \"{op}\"")]
    InvalidSource { line: u32, op: &'static str, idx: usize },
    #[error("line {line}: invalid destination operand for \"{op}\"")]
    InvalidDestination { line: u32, op: &'static str },
    #[error("line {line}: malformed operand \"{text}\"")]
    BadOperand { line: u32, text: String },
    #[error("line {line}: unknown branch target \"{label}\"")]
    UnknownLabel { line: u32, label: String },
    #[error("line {line}: duplicate label \"{label}\"")]
    DuplicateLabel { line: u32, label: String },
    #[error("line {line}: {msg}")]
    BadDirective { line: u32, msg: String },
    #[error("{path}: {msg}")]
    Io { path: String, msg: String },
}

/// A buffer declared by the program.
#[derive(Debug, Clone)]
pub struct ProgramBuffer {
    pub index: u32,
    pub dims: [u32; 2],
    /// Physical byte address assigned at parse time.
    pub addr: u32,
    pub data_file: Option<(PathBuf, BufferFileKind)>,
}

impl ProgramBuffer {
    /// Physical view handed to the execute stage.
    pub fn phys(&self) -> Buffer {
        Buffer::new(self.addr, self.dims[0], self.dims[1])
    }

    /// Total size in 32-bit words.
    pub fn words(&self) -> u32 {
        self.dims[0] * self.dims[1].max(1)
    }
}

/// A parsed kernel: code, branch targets and buffer declarations.
#[derive(Debug, Default)]
pub struct Program {
    insns: Vec<Instruction>,
    labels: HashMap<String, u32>,
    buffers: Vec<ProgramBuffer>,
    sp_buffers: Vec<ProgramBuffer>,
}

impl Program {
    /// Parse program text. Branch targets are left unresolved until
    /// [`Program::resolve_branch_targets`].
    pub fn parse(text: &str) -> Result<Self, IsaError> {
        let mut prg = Program::default();
        let mut dram_top: u32 = 0;
        let mut sp_top: u32 = 0;

        for (lineno, raw) in text.lines().enumerate() {
            let line = (lineno + 1) as u32;
            let code = match raw.find("//") {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let code = code.trim();
            if code.is_empty() {
                continue;
            }

            if let Some(rest) = code.strip_prefix("buffer") {
                if rest.starts_with(char::is_whitespace) {
                    let buf = parse_buffer_directive(rest, line, &mut dram_top, 4 * MC_BUS_WIDTH as u32)?;
                    prg.buffers.push(buf);
                    continue;
                }
            }
            if let Some(rest) = code.strip_prefix("spbuffer") {
                if rest.starts_with(char::is_whitespace) {
                    let buf = parse_buffer_directive(rest, line, &mut sp_top, 4 * SP_BUS_WIDTH as u32)?;
                    prg.sp_buffers.push(buf);
                    continue;
                }
            }

            if let Some(label) = code.strip_suffix(':') {
                let label = label.trim();
                if label.is_empty() || !label.chars().all(valid_id_char) {
                    return Err(IsaError::BadDirective {
                        line,
                        msg: format!("malformed label \"{label}\""),
                    });
                }
                let pc = prg.insns.len() as u32;
                if prg.labels.insert(label.to_string(), pc).is_some() {
                    return Err(IsaError::DuplicateLabel { line, label: label.to_string() });
                }
                continue;
            }

            prg.insns.push(parse_insn(code, line)?);
        }

        Ok(prg)
    }

    /// Resolve label operands to instruction addresses.
    pub fn resolve_branch_targets(&mut self) -> Result<(), IsaError> {
        let labels = self.labels.clone();
        for insn in &mut self.insns {
            insn.resolve_targets(|name| labels.get(name).copied())?;
        }
        Ok(())
    }

    /// Fold a final unconditional `exit` into the preceding global store.
    /// Access/execute kernels are compiled this way so that the exit does
    /// not cost a slot wake-up.
    pub fn fold_exit(&mut self) {
        let n = self.insns.len();
        if n < 2 {
            return;
        }

        let exit_ok = {
            let last = &self.insns[n - 1];
            last.op() == Op::Exit && last.num_srcs() == 0
        };

        if exit_ok && self.insns[n - 2].set_post_exit() {
            self.insns.pop();
        }
    }

    pub fn insns(&self) -> &[Instruction] {
        &self.insns
    }

    pub fn labels(&self) -> &HashMap<String, u32> {
        &self.labels
    }

    pub fn buffers(&self) -> &[ProgramBuffer] {
        &self.buffers
    }

    pub fn sp_buffers(&self) -> &[ProgramBuffer] {
        &self.sp_buffers
    }

    pub fn buffer_mut(&mut self, index: u32) -> Option<&mut ProgramBuffer> {
        self.buffers.iter_mut().find(|b| b.index == index)
    }

    pub fn buffer(&self, index: u32) -> Option<&ProgramBuffer> {
        self.buffers.iter().find(|b| b.index == index)
    }
}

fn valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `buffer <idx> <dim_x> [<dim_y>] [<data file>]`, shared with `spbuffer`.
fn parse_buffer_directive(
    rest: &str,
    line: u32,
    top: &mut u32,
    align: u32,
) -> Result<ProgramBuffer, IsaError> {
    let mut toks = rest.split_whitespace();
    let bad = |msg: &str| IsaError::BadDirective { line, msg: msg.to_string() };

    let index: u32 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| bad("buffer directive requires an index"))?;
    let dim_x: u32 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| bad("buffer directive requires an X dimension"))?;

    let mut dim_y = 1u32;
    let mut data_file = None;
    if let Some(tok) = toks.next() {
        if let Ok(y) = tok.parse() {
            dim_y = y;
        } else {
            data_file = Some(tok);
        }
    }
    if data_file.is_none() {
        data_file = toks.next();
    }
    if toks.next().is_some() {
        return Err(bad("trailing tokens after buffer directive"));
    }

    let addr = (*top).next_multiple_of(align);
    *top = addr + dim_x * dim_y.max(1) * 4;

    Ok(ProgramBuffer {
        index,
        dims: [dim_x, dim_y],
        addr,
        data_file: data_file.map(|p| {
            let path = PathBuf::from(p);
            let kind = BufferFileKind::from_path(&path);
            (path, kind)
        }),
    })
}

fn parse_insn(code: &str, line: u32) -> Result<Instruction, IsaError> {
    let (head, rest) = match code.find(char::is_whitespace) {
        Some(pos) => (&code[..pos], &code[pos..]),
        None => (code, ""),
    };

    let (op_name, subop_name) = match head.split_once('.') {
        Some((op, sub)) => (op, Some(sub)),
        None => (head, None),
    };

    let op = op_by_name(op_name).ok_or_else(|| IsaError::UnknownOp {
        line,
        name: op_name.to_string(),
    })?;
    let spec = op_spec(op);

    let subop = match (subop_name, spec.subops.is_empty()) {
        (None, true) => SubOp::None,
        (None, false) => match spec.default_subop() {
            Some(idx) => op.subop_from_idx(idx),
            None => return Err(IsaError::MissingSubop { line, op: spec.name }),
        },
        (Some(name), false) => {
            let idx = spec
                .subops
                .iter()
                .position(|&s| s == name)
                .ok_or_else(|| IsaError::UnknownSubop {
                    line,
                    op: spec.name,
                    subop: name.to_string(),
                })?;
            op.subop_from_idx(idx)
        }
        (Some(name), true) => {
            return Err(IsaError::UnknownSubop { line, op: spec.name, subop: name.to_string() })
        }
    };

    let mut operands = Vec::new();
    for tok in rest.split(',') {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        operands.push(parse_operand(tok, line)?);
    }
    let mut operands = operands.into_iter();

    let dst = if spec.dst_mask.contains(OperandMask::OMIT) {
        Operand::None
    } else {
        operands.next().ok_or(IsaError::InvalidDestination { line, op: spec.name })?
    };

    // Fit the remaining operands to source slots, skipping omittable slots
    // whose kind does not match.
    let mut srcs: Vec<Operand> = Vec::new();
    let mut slot = 0;
    for oper in operands {
        loop {
            if slot >= spec.srcs {
                return Err(IsaError::TooManySources { line, op: spec.name });
            }
            let mask = spec.src_mask[slot];
            if mask.contains(OperandMask::of_kind(oper.reg_kind())) {
                srcs.push(oper);
                slot += 1;
                break;
            }
            if !mask.contains(OperandMask::OMIT) {
                return Err(IsaError::InvalidSource { line, op: spec.name, idx: slot });
            }
            srcs.push(Operand::None);
            slot += 1;
        }
    }
    // Trailing placeholders carry no information.
    while srcs.last().is_some_and(|o| o.is_none()) {
        srcs.pop();
    }

    let mut insn = Instruction::build(op, subop, dst, srcs)?;
    insn.line = Some(line);
    Ok(insn)
}

fn parse_operand(tok: &str, line: u32) -> Result<Operand, IsaError> {
    let bad = || IsaError::BadOperand { line, text: tok.to_string() };

    // Register shorthands.
    if let Some(rest) = tok.strip_prefix("vc.") {
        let row = simd_model::VSP_SPECS
            .iter()
            .position(|s| s.alias == rest)
            .ok_or_else(bad)?;
        return Ok(Operand::reg(RegKind::Vsp, row));
    }
    if let Some(rest) = tok.strip_prefix("sc.") {
        let row = simd_model::SSP_SPECS
            .iter()
            .position(|s| s.alias == rest)
            .ok_or_else(bad)?;
        return Ok(Operand::reg(RegKind::Ssp, row));
    }
    for (prefix, kind) in [("s", RegKind::Sgpr), ("v", RegKind::Vgpr), ("p", RegKind::Pr)] {
        if let Some(num) = tok.strip_prefix(prefix) {
            if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                let row: usize = num.parse().map_err(|_| bad())?;
                return Ok(Operand::reg(kind, row));
            }
        }
    }

    // Immediates.
    if let Some(v) = parse_imm(tok) {
        return Ok(Operand::imm(v));
    }

    // Reserved constants.
    if let Some(v) = reserved_const(tok) {
        return Ok(Operand::imm(v));
    }

    // Anything identifier-shaped is a branch target.
    if tok.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && tok.chars().all(valid_id_char)
    {
        return Ok(Operand::label(tok));
    }

    Err(bad())
}

/// Parse a numeric immediate: decimal (optionally negative), hex `0x…`,
/// or float (`1.0`, `1.0f`, `.5`).
fn parse_imm(tok: &str) -> Option<u32> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("-0x")) {
        let v = u32::from_str_radix(hex, 16).ok()?;
        return Some(if tok.starts_with('-') { v.wrapping_neg() } else { v });
    }

    let is_float = tok.contains('.') || (tok.ends_with('f') && tok.len() > 1);
    if is_float {
        let trimmed = tok.strip_suffix('f').unwrap_or(tok);
        return trimmed.parse::<f32>().ok().map(f32::to_bits);
    }

    tok.parse::<i64>().ok().map(|v| v as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_insn_program() {
        let prg = Program::parse("mov v0, 0x3\nexit\n").unwrap();
        assert_eq!(prg.insns().len(), 2);
        assert_eq!(prg.insns()[0].op(), Op::Mov);
        assert_eq!(prg.insns()[0].src(0), &Operand::imm(3));
        assert_eq!(prg.insns()[1].op(), Op::Exit);
    }

    #[test]
    fn comments_and_blank_lines() {
        let prg = Program::parse("// kernel\n\n  // indented\nexit\n").unwrap();
        assert_eq!(prg.insns().len(), 1);
    }

    #[test]
    fn labels_resolve() {
        let mut prg = Program::parse("loop:\nsisub s0, s0, 1\nsicj.nz loop, s0\nexit\n").unwrap();
        prg.resolve_branch_targets().unwrap();
        assert_eq!(prg.labels()["loop"], 0);
        assert_eq!(prg.insns()[1].src(0).value(), 0);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let mut prg = Program::parse("j nowhere\n").unwrap();
        assert!(matches!(
            prg.resolve_branch_targets(),
            Err(IsaError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn buffer_directives_allocate_aligned() {
        let prg = Program::parse(
            "buffer 0 19 16\nbuffer 1 512 1 input.csv\nspbuffer 0 64 16\nexit\n",
        )
        .unwrap();
        assert_eq!(prg.buffers().len(), 2);
        assert_eq!(prg.buffers()[0].addr, 0);
        // 19*16 words = 1216 bytes, aligned up to the 64-byte burst.
        assert_eq!(prg.buffers()[1].addr, 1216u32.next_multiple_of(64));
        assert_eq!(
            prg.buffers()[1].data_file.as_ref().unwrap().1,
            BufferFileKind::DecimalCsv
        );
        assert_eq!(prg.sp_buffers()[0].dims, [64, 16]);
    }

    #[test]
    fn subop_parsing() {
        let prg = Program::parse("cpush.brk 5\ntest.ez p0, v1\nmad.neg v0, v1, v2, v3\n").unwrap();
        assert_eq!(prg.insns()[0].subop(), SubOp::Cpush(crate::op::MaskKind::Break));
        assert_eq!(prg.insns()[1].subop(), SubOp::Test(crate::op::TestCond::Ez));
        assert_eq!(prg.insns()[2].subop(), SubOp::Fpu(crate::op::FpuMod::Neg));
    }

    #[test]
    fn missing_subop_rejected() {
        assert!(matches!(
            Program::parse("test p0, v1\n"),
            Err(IsaError::MissingSubop { .. })
        ));
    }

    #[test]
    fn reserved_const_operand() {
        let prg = Program::parse("mov v0, M_PI_F\nexit\n").unwrap();
        assert_eq!(prg.insns()[0].src(0).value(), std::f32::consts::PI.to_bits());
    }

    #[test]
    fn float_immediates() {
        let prg = Program::parse("mov v0, 1.5f\nmov v1, -2.0\nexit\n").unwrap();
        assert_eq!(prg.insns()[0].src(0).value(), 1.5f32.to_bits());
        assert_eq!(prg.insns()[1].src(0).value(), (-2.0f32).to_bits());
    }

    #[test]
    fn optional_middle_operand_skips_slot() {
        // sldsp takes x/y offsets as slots 1 and 2; an sgpr fits slot 1.
        let prg = Program::parse("sldsp s4, 0, s1, s2\n").unwrap();
        let insn = &prg.insns()[0];
        assert_eq!(insn.num_srcs(), 3);
        assert_eq!(insn.src(1).reg_kind(), RegKind::Sgpr);
    }

    #[test]
    fn exit_fold() {
        let mut prg = Program::parse("stglin v0, 0\nexit\n").unwrap();
        prg.fold_exit();
        assert_eq!(prg.insns().len(), 1);
        assert!(prg.insns()[0].post_exit());

        // A conditional exit is not folded.
        let mut prg = Program::parse("stglin v0, 0\nexit p0\n").unwrap();
        prg.fold_exit();
        assert_eq!(prg.insns().len(), 2);
    }
}
