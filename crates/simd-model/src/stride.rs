//! Stride descriptors: 2-D strided transfer templates between a DRAM or
//! scratchpad buffer and a register-file region or scratchpad tile.

use thiserror::Error;

use crate::{Reg, RegKind, ReqDest, RequestTarget};

/// Kind of transfer described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrideKind {
    /// 2-D stride: `period_count` periods of `period` words, `words` of
    /// which are transferred.
    #[default]
    Stride,
    /// Iterate over indexes popped from the register file one by one.
    IdxIt,
}

/// Index transformation for 2-vector and 4-vector load/stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdxTransform {
    #[default]
    Unit,
    Vec2,
    Vec4,
}

impl IdxTransform {
    /// log2 of the vector width.
    pub fn shift(self) -> u32 {
        match self {
            IdxTransform::Unit => 0,
            IdxTransform::Vec2 => 1,
            IdxTransform::Vec4 => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("period must be larger than 0")]
    ZeroPeriod,
    #[error("destination period must be power-of-two when targeting the register file")]
    NonPotDstPeriod,
    #[error(
        "non-contiguous writes to scratchpad require a period of at least words + {0}"
    )]
    ShortSpPeriod(usize),
    #[error("scratchpad-to-scratchpad transfers are unsupported")]
    SpToSp,
}

/// A stride memory request descriptor after buffer-to-physical translation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrideDescriptor {
    /// Ticket number. Makes the DRAM and scratchpad FIFOs act like one big
    /// FIFO under the `no_parallel_dram_sp` scheduling option.
    pub ticket: u8,
    pub kind: StrideKind,
    /// Start address, bytes.
    pub addr: u32,
    /// 32-bit words transferred per period.
    pub words: u32,
    /// Period length in words.
    pub period: u32,
    /// Number of periods.
    pub period_count: u32,
    /// Destination of the transfer.
    pub dst: RequestTarget,
    /// Base register when the destination is the register file.
    pub dst_reg: Option<Reg>,
    /// Offset to the start of data in the scratchpad, or lane offset in a
    /// vector register.
    pub dst_offset: u32,
    /// Periodicity of the destination scratchpad buffer or register file.
    pub dst_period: u32,
    /// Destination x-offset when writing a scratchpad tile.
    pub dst_off_x: u32,
    /// Destination y-offset when writing a scratchpad tile.
    pub dst_off_y: u32,
    /// True iff this transfer writes to the buffer.
    pub write: bool,
    pub idx_transform: IdxTransform,
}

impl StrideDescriptor {
    /// Descriptor for a register-file transfer. The column of `reg` is
    /// ignored; lane steering happens per burst word.
    pub fn for_reg(reg: Reg) -> Self {
        let dest = if reg.kind == RegKind::Vsp && reg.row as usize == crate::vsp::MEM_DATA {
            ReqDest::Cam
        } else {
            ReqDest::Reg
        };

        StrideDescriptor {
            dst: RequestTarget::new(reg.slot, dest),
            dst_reg: Some(reg),
            period: 1,
            period_count: 1,
            ..Default::default()
        }
    }

    pub fn target_kind(&self) -> ReqDest {
        self.dst.dest
    }

    /// Check the preconditions the sequencers rely on. These are user
    /// errors (bad descriptor parameters in the kernel), surfaced as typed
    /// errors at the front-end boundary.
    pub fn validate(&self, bus_width: usize) -> Result<(), DescriptorError> {
        if self.period == 0 {
            return Err(DescriptorError::ZeroPeriod);
        }

        match self.dst.dest {
            ReqDest::Reg | ReqDest::Cam => {
                if self.dst_period != 0 && !self.dst_period.is_power_of_two() {
                    return Err(DescriptorError::NonPotDstPeriod);
                }
            }
            ReqDest::Sp => {
                if self.words != self.dst_period
                    && self.period < self.words + bus_width as u32
                {
                    return Err(DescriptorError::ShortSpPeriod(bus_width));
                }
            }
            ReqDest::None => {}
        }

        Ok(())
    }

    /// Parse a six-tuple `addr,words,period,period_count,dst_offset,write`
    /// from one CSV line. Used by stand-alone front-end testing.
    pub fn from_csv_line(line: &str) -> Option<Self> {
        let mut fields = line.split(',').map(|f| f.trim());
        let mut next_u32 = || -> Option<u32> {
            let f = fields.next()?;
            if let Some(hex) = f.strip_prefix("0x") {
                u32::from_str_radix(hex, 16).ok()
            } else {
                f.parse().ok()
            }
        };

        let addr = next_u32()?;
        let words = next_u32()?;
        let period = next_u32()?;
        let period_count = next_u32()?;
        let dst_offset = next_u32()?;
        let write = next_u32()? != 0;

        Some(StrideDescriptor {
            addr,
            words,
            period,
            period_count,
            dst_offset,
            write,
            dst: RequestTarget::new(0, ReqDest::Sp),
            dst_period: words,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_period() {
        let mut sd = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vgpr, 0));
        sd.period = 0;
        assert_eq!(sd.validate(16), Err(DescriptorError::ZeroPeriod));
    }

    #[test]
    fn register_target_needs_pot_dst_period() {
        let mut sd = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vgpr, 0));
        sd.dst_period = 96;
        assert_eq!(sd.validate(16), Err(DescriptorError::NonPotDstPeriod));
        sd.dst_period = 128;
        assert_eq!(sd.validate(16), Ok(()));
    }

    #[test]
    fn mem_data_target_is_cam() {
        let sd = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vsp, crate::vsp::MEM_DATA));
        assert_eq!(sd.target_kind(), ReqDest::Cam);
    }

    #[test]
    fn csv_six_tuple() {
        let sd = StrideDescriptor::from_csv_line("0x140004,19,61,16,0,0").unwrap();
        assert_eq!(sd.addr, 0x140004);
        assert_eq!(sd.words, 19);
        assert_eq!(sd.period, 61);
        assert_eq!(sd.period_count, 16);
        assert!(!sd.write);
    }
}
