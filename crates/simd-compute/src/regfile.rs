//! Register file shared by the two work-group slots.
//!
//! Backing store for VGPR/SGPR/PR and the special-purpose rows, plus the
//! data ports used by the memory front-ends: lane-steered vector
//! writes/reads, CAM-indexed transfers against `vc.mem_idx`, and the index
//! stream for index-iterate transfers.

use simd_model::{
    ssp, vsp, IdxEntry, Reg, RegKind, RegOffset, ThreadMask, FPUS, PR_ROWS, REG_ROWS,
    SSP_SPECS, THREADS, VSP_SPECS,
};

use crate::wg::Workgroup;

/// Register write request, as driven by the execute stage's commit.
#[derive(Debug, Clone)]
pub struct WriteReq {
    pub reg: Reg,
    /// One value per lane for vector kinds; lane 0 for scalar kinds.
    pub data: Vec<u32>,
    /// Bypass the CMASK-derived write mask (CPOP restoring a mask).
    pub ignore_mask: bool,
}

pub struct RegFile {
    vgpr: [Vec<u32>; 2],
    sgpr: [[u32; REG_ROWS]; 2],
    pr: [Vec<u32>; 2],
    vsp: [Vec<u32>; 2],
    ssp: [[u32; ssp::COUNT]; 2],
    /// Base register of the in-flight DRAM transfer, if it targets the
    /// register file.
    dram_target: Option<Reg>,
    /// Base registers of in-flight scratchpad transfers, per slot.
    sp_target: [Option<Reg>; 2],
    /// Words per VRF SRAM bank; `None` models the perfect 3R1W file.
    vrf_bank_words: Option<u32>,
}

impl RegFile {
    pub fn new() -> Self {
        RegFile {
            vgpr: [vec![0; REG_ROWS * THREADS], vec![0; REG_ROWS * THREADS]],
            sgpr: [[0; REG_ROWS]; 2],
            pr: [vec![0; PR_ROWS * THREADS], vec![0; PR_ROWS * THREADS]],
            vsp: [vec![0; vsp::COUNT * THREADS], vec![0; vsp::COUNT * THREADS]],
            ssp: [[0; ssp::COUNT]; 2],
            dram_target: None,
            sp_target: [None, None],
            vrf_bank_words: None,
        }
    }

    /// Configure the VRF SRAM bank width for conflict modelling.
    pub fn set_vrf_bank_words(&mut self, words: u32) {
        self.vrf_bank_words = Some(words);
    }

    /// Initialise a slot for a freshly assigned work-group: thread IDs,
    /// constants, kernel dimensions and all-ones control masks for the
    /// threads that fall inside the kernel index space.
    pub fn init_workgroup(&mut self, slot: u8, wg: Workgroup, dims: [u32; 2]) {
        let s = slot as usize;
        let width = wg.width.threads();
        let base_x = wg.off_x * width;

        for t in 0..THREADS {
            let lid_x = t as u32 % width;
            let lid_y = t as u32 / width;
            let tid_x = base_x + lid_x;
            let tid_y = wg.off_y + lid_y;
            let inside = tid_x < dims[0] && tid_y < dims[1].max(1);

            self.vsp[s][vsp::TID_X * THREADS + t] = tid_x;
            self.vsp[s][vsp::TID_Y * THREADS + t] = tid_y;
            self.vsp[s][vsp::LID_X * THREADS + t] = lid_x;
            self.vsp[s][vsp::LID_Y * THREADS + t] = lid_y;
            self.vsp[s][vsp::ZERO * THREADS + t] = 0;
            self.vsp[s][vsp::ONE * THREADS + t] = 1;

            let en = inside as u32;
            self.vsp[s][vsp::CTRL_RUN * THREADS + t] = en;
            self.vsp[s][vsp::CTRL_BREAK * THREADS + t] = en;
            self.vsp[s][vsp::CTRL_RET * THREADS + t] = en;
            self.vsp[s][vsp::CTRL_EXIT * THREADS + t] = en;

            self.vsp[s][vsp::MEM_IDX * THREADS + t] = 0;
            self.vsp[s][vsp::MEM_DATA * THREADS + t] = 0;
        }

        self.ssp[s][ssp::DIM_X] = dims[0];
        self.ssp[s][ssp::DIM_Y] = dims[1];
        self.ssp[s][ssp::WG_OFF_X] = wg.off_x;
        self.ssp[s][ssp::WG_OFF_Y] = wg.off_y;
        self.ssp[s][ssp::WG_WIDTH] = wg.width.shift();
    }

    /// Read one warp's worth of lanes for a vector register, or broadcast
    /// a scalar/immediate into all lanes.
    pub fn read_lanes(&self, reg: Reg, imm: u32, col: usize) -> [u32; FPUS] {
        let s = reg.slot as usize;
        let row = reg.row as usize;
        let mut out = [0u32; FPUS];

        match reg.kind {
            RegKind::Imm => out.fill(imm),
            RegKind::Sgpr => out.fill(self.sgpr[s][row]),
            RegKind::Ssp => out.fill(self.ssp[s][row]),
            RegKind::Vgpr => {
                out.copy_from_slice(&self.vgpr[s][row * THREADS + col * FPUS..][..FPUS])
            }
            RegKind::Pr => out.copy_from_slice(&self.pr[s][row * THREADS + col * FPUS..][..FPUS]),
            RegKind::Vsp => out.copy_from_slice(&self.vsp[s][row * THREADS + col * FPUS..][..FPUS]),
            RegKind::None => {}
        }

        out
    }

    /// Scalar value of a special scalar register.
    pub fn ssp_value(&self, slot: u8, row: usize) -> u32 {
        self.ssp[slot as usize][row]
    }

    /// Per-thread enable: a thread runs iff all four control masks have
    /// its bit set.
    pub fn thread_enabled(&self, slot: u8, t: usize) -> bool {
        let s = slot as usize;
        (0..=vsp::CTRL_EXIT).all(|m| self.vsp[s][m * THREADS + t] != 0)
    }

    /// True iff any thread of the slot is enabled.
    pub fn thread_active(&self, slot: u8) -> bool {
        (0..THREADS).any(|t| self.thread_enabled(slot, t))
    }

    /// The exit mask as a bit vector; all-zero means every thread took the
    /// exit.
    pub fn exit_mask(&self, slot: u8) -> ThreadMask {
        let s = slot as usize;
        let mut m = ThreadMask::zeroes(THREADS);
        for t in 0..THREADS {
            m.set(t, self.vsp[s][vsp::CTRL_EXIT * THREADS + t] != 0);
        }
        m
    }

    /// Commit a write from the execute stage.
    ///
    /// # Panics
    /// Panics on writes to read-only special rows; that is a contract
    /// violation in the program.
    pub fn write(&mut self, req: &WriteReq) {
        let s = req.reg.slot as usize;
        let row = req.reg.row as usize;

        match req.reg.kind {
            RegKind::None | RegKind::Imm => {}
            RegKind::Sgpr => self.sgpr[s][row] = req.data[0],
            RegKind::Ssp => {
                assert!(
                    SSP_SPECS[row].writable,
                    "write to read-only special register sc.{}",
                    SSP_SPECS[row].alias
                );
                self.ssp[s][row] = req.data[0];
            }
            RegKind::Vgpr | RegKind::Pr | RegKind::Vsp => {
                if req.reg.kind == RegKind::Vsp {
                    assert!(
                        VSP_SPECS[row].writable,
                        "write to read-only special register vc.{}",
                        VSP_SPECS[row].alias
                    );
                }

                let col = req.reg.col as usize;
                for l in 0..FPUS.min(req.data.len()) {
                    let t = col * FPUS + l;
                    if !req.ignore_mask && !self.thread_enabled(req.reg.slot, t) {
                        continue;
                    }
                    let v = match req.reg.kind {
                        // Predicates and masks store a single bit per lane.
                        RegKind::Pr => (req.data[l] != 0) as u32,
                        RegKind::Vsp if row <= vsp::CTRL_EXIT => (req.data[l] != 0) as u32,
                        _ => req.data[l],
                    };
                    match req.reg.kind {
                        RegKind::Vgpr => self.vgpr[s][row * THREADS + t] = v,
                        RegKind::Pr => self.pr[s][row * THREADS + t] = v,
                        RegKind::Vsp => self.vsp[s][row * THREADS + t] = v,
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    /* Memory front-end ports. */

    /// Latch the register targeted by the active DRAM transfer.
    pub fn set_dram_target(&mut self, reg: Option<Reg>) {
        self.dram_target = reg;
    }

    /// Latch the register targeted by a scratchpad transfer.
    pub fn set_sp_target(&mut self, slot: u8, reg: Option<Reg>) {
        self.sp_target[slot as usize] = reg;
    }

    fn target_reg(&self, from_dram: bool, slot: u8) -> Reg {
        let reg = if from_dram { self.dram_target } else { self.sp_target[slot as usize] };
        reg.expect("memory transfer data with no register target latched")
    }

    /// Write back one data-bus beat of a load into the register file.
    /// `offsets[i]` steers word `i` to a (lane, row) pair relative to the
    /// latched base register.
    pub fn mem_write_lanes(
        &mut self,
        from_dram: bool,
        slot: u8,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    ) {
        let base = self.target_reg(from_dram, slot);
        let s = base.slot as usize;

        for i in 0..offsets.len() {
            if !mask[i] {
                continue;
            }
            let lane = offsets[i].lane as usize;
            let row = base.row as usize + offsets[i].row as usize;
            match base.kind {
                RegKind::Vgpr => self.vgpr[s][row * THREADS + lane] = data[i],
                RegKind::Sgpr => self.sgpr[s][row + lane] = data[i],
                RegKind::Vsp => self.vsp[s][row * THREADS + lane] = data[i],
                RegKind::Pr => self.pr[s][row * THREADS + lane] = (data[i] != 0) as u32,
                k => panic!("unsupported memory target register kind {k:?}"),
            }
        }
    }

    /// Read one data-bus beat for a store. Returns the data words and the
    /// per-thread enable mask that drops disabled threads' stores.
    pub fn mem_read_lanes(
        &self,
        from_dram: bool,
        slot: u8,
        offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>) {
        let base = self.target_reg(from_dram, slot);
        let s = base.slot as usize;
        let mut data = vec![0u32; offsets.len()];
        let mut en = vec![false; offsets.len()];

        for i in 0..offsets.len() {
            if !mask[i] {
                continue;
            }
            let lane = offsets[i].lane as usize;
            let row = base.row as usize + offsets[i].row as usize;
            match base.kind {
                RegKind::Vgpr => {
                    data[i] = self.vgpr[s][row * THREADS + lane];
                    en[i] = self.thread_enabled(base.slot, lane);
                }
                RegKind::Sgpr => {
                    data[i] = self.sgpr[s][row + lane];
                    en[i] = true;
                }
                RegKind::Vsp => {
                    data[i] = self.vsp[s][row * THREADS + lane];
                    en[i] = self.thread_enabled(base.slot, lane);
                }
                k => panic!("unsupported memory source register kind {k:?}"),
            }
        }

        (data, en)
    }

    /// CAM write: word at buffer offset `idx` lands in `vc.mem_data[t]`
    /// for every enabled thread whose `vc.mem_idx[t]` equals `idx`.
    pub fn cam_write(&mut self, slot: u8, idx: u32, value: u32) {
        let s = slot as usize;
        for t in 0..THREADS {
            if self.vsp[s][vsp::MEM_IDX * THREADS + t] == idx && self.thread_enabled(slot, t) {
                self.vsp[s][vsp::MEM_DATA * THREADS + t] = value;
            }
        }
    }

    /// CAM read: `vc.mem_data[t]` of the first enabled thread matching
    /// `idx`, if any.
    pub fn cam_read(&self, slot: u8, idx: u32) -> Option<u32> {
        let s = slot as usize;
        (0..THREADS)
            .find(|&t| {
                self.vsp[s][vsp::MEM_IDX * THREADS + t] == idx && self.thread_enabled(slot, t)
            })
            .map(|t| self.vsp[s][vsp::MEM_DATA * THREADS + t])
    }

    /// Index stream for an index-iterate transfer: one entry per enabled
    /// thread, terminated by a dummy-last entry.
    pub fn collect_indices(&self, slot: u8) -> Vec<IdxEntry> {
        let s = slot as usize;
        let mut idx: Vec<IdxEntry> = (0..THREADS)
            .filter(|&t| self.thread_enabled(slot, t))
            .map(|t| IdxEntry::new(t as u32, self.vsp[s][vsp::MEM_IDX * THREADS + t]))
            .collect();
        idx.push(IdxEntry::terminator());
        idx
    }

    /// Register-file bank conflicts for up to three simultaneous vector
    /// reads. Only modelled when a VRF bank width is configured; the
    /// default file is 3R1W and conflict-free.
    pub fn read_conflicts(&self, regs: &[Reg; 3], enable: &[bool; 3]) -> [bool; 3] {
        let mut conflicts = [false; 3];
        let Some(words) = self.vrf_bank_words else {
            return conflicts;
        };

        // Two vector reads conflict when they address different rows in
        // the same SRAM bank.
        let bank = |r: &Reg| (r.row as u32) / words.max(1);
        for i in 0..3 {
            for j in (i + 1)..3 {
                if !enable[i] || !enable[j] {
                    continue;
                }
                if !regs[i].is_vector() || !regs[j].is_vector() {
                    continue;
                }
                if regs[i].row != regs[j].row && bank(&regs[i]) == bank(&regs[j]) {
                    conflicts[j] = true;
                }
            }
        }
        conflicts
    }

    /// Debug aid: raw access to one vector lane.
    pub fn debug_vgpr(&self, slot: u8, row: usize, lane: usize) -> u32 {
        self.vgpr[slot as usize][row * THREADS + lane]
    }

    pub fn debug_sgpr(&self, slot: u8, row: usize) -> u32 {
        self.sgpr[slot as usize][row]
    }

    pub fn debug_vsp(&self, slot: u8, row: usize, lane: usize) -> u32 {
        self.vsp[slot as usize][row * THREADS + lane]
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_model::WorkgroupWidth;

    fn wg128() -> Workgroup {
        Workgroup { off_x: 0, off_y: 0, width: WorkgroupWidth::W128 }
    }

    #[test]
    fn init_sets_thread_ids_and_masks() {
        let mut rf = RegFile::new();
        rf.init_workgroup(0, wg128(), [128, 1]);

        assert_eq!(rf.debug_vsp(0, vsp::TID_X, 5), 5);
        assert_eq!(rf.debug_vsp(0, vsp::ONE, 7), 1);
        assert!(rf.thread_enabled(0, 100));
        // Threads beyond the 128x1 kernel are masked off.
        assert!(!rf.thread_enabled(0, 128));
        assert!(rf.thread_active(0));
    }

    #[test]
    fn cmask_write_stores_bits() {
        let mut rf = RegFile::new();
        rf.init_workgroup(0, wg128(), [128, 1]);

        // Exit with an all-ones predicate inverts into an all-zero mask.
        let req = WriteReq {
            reg: Reg::new(0, RegKind::Vsp, vsp::CTRL_EXIT, 0),
            data: vec![0; FPUS],
            ignore_mask: false,
        };
        rf.write(&req);
        assert!(!rf.exit_mask(0).any());
    }

    #[test]
    #[should_panic(expected = "read-only")]
    fn read_only_rows_reject_writes() {
        let mut rf = RegFile::new();
        rf.write(&WriteReq {
            reg: Reg::new(0, RegKind::Vsp, vsp::ZERO, 0),
            data: vec![1; FPUS],
            ignore_mask: false,
        });
    }

    #[test]
    fn cam_matches_mem_idx() {
        let mut rf = RegFile::new();
        rf.init_workgroup(0, wg128(), [128, 1]);

        // Thread 3 wants buffer offset 0x120.
        rf.write(&WriteReq {
            reg: Reg::new(0, RegKind::Vsp, vsp::MEM_IDX, 0),
            data: {
                let mut d = vec![0u32; FPUS];
                d[3] = 0x120;
                d
            },
            ignore_mask: false,
        });

        rf.cam_write(0, 0x120, 0xabcd);
        assert_eq!(rf.debug_vsp(0, vsp::MEM_DATA, 3), 0xabcd);
        assert_eq!(rf.cam_read(0, 0x120), Some(0xabcd));
    }

    #[test]
    fn index_stream_ends_with_terminator() {
        let mut rf = RegFile::new();
        rf.init_workgroup(0, wg128(), [2, 1]);
        let idx = rf.collect_indices(0);
        assert_eq!(idx.len(), 3);
        assert!(idx[2].last);
        assert_eq!(idx[0].cam_idx, 0);
    }
}
