//! DDR4 command generator.
//!
//! Translates burst requests to per-bank ACT/CAS/PRE streams with
//! open-row tracking. DDR4 bank pairs from different bank groups are
//! interleaved to optimise the common unit-stride case.

use simd_model::{DRAM_BANKS, DRAM_COLS, DRAM_ROWS, MC_BUS_WIDTH};

use crate::model::{BurstRequest, DdrCmd, PrechargePolicy};

/// Address translation: plain bit gathering, no logic.
///
/// For BUS_WIDTH=16, BANKS=8, COLS=1024, ROWS=65536:
/// bank = addr[6] | addr[15:13], col = addr[13:4] with the low burst bits
/// masked, row = addr[31:16].
pub fn address_translate(addr: u32) -> (u32, u32, u32) {
    let bus_bits = MC_BUS_WIDTH.trailing_zeros();
    let col_bits = DRAM_COLS.trailing_zeros();
    let bank_bits = DRAM_BANKS.trailing_zeros();
    let offset = bus_bits + col_bits - 1;

    let bank = ((addr >> (bus_bits + 2)) & 0x1) | ((addr >> offset) & (DRAM_BANKS as u32 - 2));
    let col = (addr >> bus_bits) & (DRAM_COLS as u32 - 8);
    let row = (addr >> (offset + bank_bits)) & (DRAM_ROWS as u32 - 1);

    (bank, row, col)
}

pub struct CmdGen {
    /// Open row per bank, as the generator believes the arbiter will
    /// leave it.
    bank_active_row: [Option<u32>; DRAM_BANKS],
    busy: bool,
}

impl CmdGen {
    pub fn new() -> Self {
        CmdGen { bank_active_row: [None; DRAM_BANKS], busy: false }
    }

    /// True while the current stride or index set is being enumerated.
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Apply the precharge policy; may emit a second stand-alone
    /// precharge for the other bank of the pair.
    fn precharge(
        &mut self,
        req: &BurstRequest,
        bank: u32,
        row: u32,
        cmd: &mut DdrCmd,
        extra: &mut Vec<(u32, DdrCmd)>,
    ) {
        match req.pre_pol {
            PrechargePolicy::Alap => {
                if self.bank_active_row[bank as usize] != Some(row) {
                    if self.bank_active_row[bank as usize].is_some() {
                        cmd.pre_pre = true;
                        cmd.pre_post = false;
                    }
                    self.bank_active_row[bank as usize] = Some(row);
                }

                if req.addr_next == 0xffff_ffff {
                    cmd.pre_post = true;
                    self.bank_active_row[bank as usize] = None;

                    // The final request closes every other open bank too.
                    for i in 1..DRAM_BANKS as u32 {
                        let next_bank = (bank + i) % DRAM_BANKS as u32;
                        if self.bank_active_row[next_bank as usize].is_some() {
                            extra.push((next_bank, DdrCmd::precharge(req.target)));
                            self.bank_active_row[next_bank as usize] = None;
                        }
                    }
                }
            }
            PrechargePolicy::Linear => {
                self.bank_active_row[bank as usize] = Some(row);

                let (next_bank, next_row, _) = address_translate(req.addr_next);
                let pair_mask = DRAM_BANKS as u32 - 2;
                if (next_bank & pair_mask) != (bank & pair_mask) || next_row != row {
                    cmd.pre_post = true;
                    self.bank_active_row[bank as usize] = None;

                    let pair = (bank ^ 0x1) as usize;
                    if self.bank_active_row[pair].is_some() {
                        extra.push((pair as u32, DdrCmd::precharge(req.target)));
                        self.bank_active_row[pair] = None;
                    }
                }
            }
        }
    }

    /// Translate one burst request into per-bank commands:
    /// `(bank, command)` pairs to enqueue into the bank FIFOs.
    pub fn step(&mut self, req: &BurstRequest) -> Vec<(u32, DdrCmd)> {
        self.busy = !req.last;

        let (bank, row, col) = address_translate(req.addr);

        let mut cmd = DdrCmd {
            act: self.bank_active_row[bank as usize] != Some(row),
            col,
            row,
            write: req.write,
            read: !req.write,
            wordmask: req.wordmask,
            sp_offset: req.sp_offset,
            target: req.target,
            reg_offset: req.reg_offset,
            ..Default::default()
        };

        let mut extra = Vec::new();
        self.precharge(req, bank, row, &mut cmd, &mut extra);

        let mut cmds = vec![(bank, cmd)];
        cmds.extend(extra);
        cmds
    }
}

impl Default for CmdGen {
    fn default() -> Self {
        Self::new()
    }
}
