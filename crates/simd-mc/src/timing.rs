//! JEDEC DDR4 timing model.
//!
//! Replaces the external DRAM simulator with the equivalent per-bank and
//! per-rank next-allowed-cycle state: a command is admissible at cycle `t`
//! iff every timing constraint derived from previously issued commands has
//! elapsed. Timings are in DRAM command-clock cycles.

use thiserror::Error;

/// One speed/organisation bin's timing parameters.
#[derive(Debug, Clone)]
pub struct DramTiming {
    pub speed: &'static str,
    pub org: &'static str,
    /// Row-to-column delay.
    pub t_rcd: u64,
    /// Column access strobe (CL).
    pub t_cas: u64,
    /// Row precharge.
    pub t_rp: u64,
    /// Column write delay (CWL).
    pub t_cwd: u64,
    /// Write recovery.
    pub t_wr: u64,
    /// Row active time.
    pub t_ras: u64,
    /// Read-to-precharge.
    pub t_rtp: u64,
    /// Row-to-row, different bank group.
    pub t_rrd_s: u64,
    /// Row-to-row, same bank group.
    pub t_rrd_l: u64,
    /// Four-activate window.
    pub t_faw: u64,
    /// Column-to-column, different bank group.
    pub t_ccd_s: u64,
    /// Column-to-column, same bank group.
    pub t_ccd_l: u64,
    /// Refresh cycle time.
    pub t_rfc: u64,
    /// Refresh interval.
    pub t_refi: u64,
    /// Burst length.
    pub bl: u64,
    /// Data bus width in bytes.
    pub buswidth_bytes: u32,
    /// Bank groups.
    pub bank_groups: u32,
    /// Command clock in MHz.
    pub clk_mhz: u32,
}

impl DramTiming {
    /// Command clock period in nanoseconds.
    pub fn clk_period_ns(&self) -> f64 {
        1000.0 / self.clk_mhz as f64
    }
}

pub const DDR4_3200AA_8GB_X16: DramTiming = DramTiming {
    speed: "DDR4_3200AA",
    org: "DDR4_8Gb_x16",
    t_rcd: 22,
    t_cas: 22,
    t_rp: 22,
    t_cwd: 16,
    t_wr: 24,
    t_ras: 52,
    t_rtp: 12,
    t_rrd_s: 9,
    t_rrd_l: 11,
    t_faw: 48,
    t_ccd_s: 4,
    t_ccd_l: 8,
    t_rfc: 560,
    t_refi: 12480,
    bl: 8,
    buswidth_bytes: 8,
    bank_groups: 2,
    clk_mhz: 1600,
};

pub const DDR4_3200AA_8GB_X8: DramTiming = DramTiming {
    speed: "DDR4_3200AA",
    org: "DDR4_8Gb_x8",
    t_rcd: 22,
    t_cas: 22,
    t_rp: 22,
    t_cwd: 16,
    t_wr: 24,
    t_ras: 52,
    t_rtp: 12,
    t_rrd_s: 4,
    t_rrd_l: 8,
    t_faw: 34,
    t_ccd_s: 4,
    t_ccd_l: 8,
    t_rfc: 560,
    t_refi: 12480,
    bl: 8,
    buswidth_bytes: 8,
    bank_groups: 4,
    clk_mhz: 1600,
};

pub const DDR4_1866M_8GB_X16: DramTiming = DramTiming {
    speed: "DDR4_1866M",
    org: "DDR4_8Gb_x16",
    t_rcd: 13,
    t_cas: 13,
    t_rp: 13,
    t_cwd: 10,
    t_wr: 14,
    t_ras: 32,
    t_rtp: 7,
    t_rrd_s: 5,
    t_rrd_l: 6,
    t_faw: 28,
    t_ccd_s: 4,
    t_ccd_l: 5,
    t_rfc: 327,
    t_refi: 7280,
    bl: 8,
    buswidth_bytes: 8,
    bank_groups: 2,
    clk_mhz: 933,
};

#[derive(Debug, Error)]
#[error("DRAM organisation {org}@{speed} unsupported")]
pub struct UnknownOrganisation {
    pub speed: String,
    pub org: String,
}

/// Look up the timing set for a speed/organisation pair.
pub fn timing_for(speed: &str, org: &str) -> Result<&'static DramTiming, UnknownOrganisation> {
    static TIMINGS: [&DramTiming; 3] =
        [&DDR4_1866M_8GB_X16, &DDR4_3200AA_8GB_X16, &DDR4_3200AA_8GB_X8];

    TIMINGS
        .iter()
        .find(|t| t.speed == speed && t.org == org)
        .copied()
        .ok_or_else(|| UnknownOrganisation { speed: speed.to_string(), org: org.to_string() })
}

/// DRAM commands the arbiter can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdrCommand {
    Act,
    Pre,
    Rd,
    Rda,
    Wr,
    Wra,
    Ref,
}

#[derive(Debug, Clone, Copy)]
struct BankState {
    open_row: Option<u32>,
    next_act: u64,
    next_rd: u64,
    next_wr: u64,
    next_pre: u64,
    /// Cycle at which an issued or scheduled precharge completes
    /// (`t_pre + tRP`). `None` while a row is open with no precharge
    /// scheduled.
    precharged_at: Option<u64>,
}

impl Default for BankState {
    fn default() -> Self {
        BankState {
            open_row: None,
            next_act: 0,
            next_rd: 0,
            next_wr: 0,
            next_pre: 0,
            precharged_at: Some(0),
        }
    }
}

/// Per-channel timing state.
pub struct TimingState {
    t: &'static DramTiming,
    banks: Vec<BankState>,
    /// Last activate per bank group, for tRRDl.
    last_act_bg: Vec<Option<u64>>,
    /// Last activate anywhere, for tRRDs.
    last_act_any: Option<u64>,
    /// Sliding window of the last four activates, for tFAW.
    act_window: [u64; 4],
    act_window_len: usize,
    /// Last CAS per bank group, for tCCDl.
    last_cas_bg: Vec<Option<u64>>,
    /// Last CAS anywhere, for tCCDs.
    last_cas_any: Option<u64>,
    /// All commands blocked until this cycle (refresh).
    ref_busy_until: u64,
}

impl TimingState {
    pub fn new(t: &'static DramTiming, banks: usize) -> Self {
        TimingState {
            t,
            banks: vec![BankState::default(); banks],
            last_act_bg: vec![None; t.bank_groups as usize],
            last_act_any: None,
            act_window: [0; 4],
            act_window_len: 0,
            last_cas_bg: vec![None; t.bank_groups as usize],
            last_cas_any: None,
            ref_busy_until: 0,
        }
    }

    pub fn timing(&self) -> &'static DramTiming {
        self.t
    }

    /// Bank group of a bank index. The low bank bit selects the group so
    /// a bank pair interleaves two groups, hiding long intra-group
    /// latencies on unit strides.
    fn bank_group(&self, bank: usize) -> usize {
        bank & (self.t.bank_groups as usize - 1)
    }

    /// Earliest cycle `cmd` may be issued to `bank`.
    pub fn earliest(&self, cmd: DdrCommand, bank: usize) -> u64 {
        let b = &self.banks[bank];
        let bg = self.bank_group(bank);
        let mut at = self.ref_busy_until;

        match cmd {
            DdrCommand::Act => {
                at = at.max(b.next_act);
                if let Some(last) = self.last_act_bg[bg] {
                    at = at.max(last + self.t.t_rrd_l);
                }
                if let Some(last) = self.last_act_any {
                    at = at.max(last + self.t.t_rrd_s);
                }
                if self.act_window_len == 4 {
                    at = at.max(self.act_window[0] + self.t.t_faw);
                }
            }
            DdrCommand::Pre => at = at.max(b.next_pre),
            DdrCommand::Rd | DdrCommand::Rda => {
                at = at.max(b.next_rd);
                if let Some(last) = self.last_cas_bg[bg] {
                    at = at.max(last + self.t.t_ccd_l);
                }
                if let Some(last) = self.last_cas_any {
                    at = at.max(last + self.t.t_ccd_s);
                }
            }
            DdrCommand::Wr | DdrCommand::Wra => {
                at = at.max(b.next_wr);
                if let Some(last) = self.last_cas_bg[bg] {
                    at = at.max(last + self.t.t_ccd_l);
                }
                if let Some(last) = self.last_cas_any {
                    at = at.max(last + self.t.t_ccd_s);
                }
            }
            DdrCommand::Ref => {
                at = at.max(self.all_precharged_at());
            }
        }

        at
    }

    /// True iff `cmd` on `bank` is admissible at `cycle` given all prior
    /// commands' timestamps.
    pub fn check(&self, cmd: DdrCommand, bank: usize, cycle: u64) -> bool {
        if matches!(cmd, DdrCommand::Rd | DdrCommand::Rda | DdrCommand::Wr | DdrCommand::Wra)
            && self.banks[bank].open_row.is_none()
        {
            return false;
        }
        cycle >= self.earliest(cmd, bank)
    }

    /// Earliest cycle at which every bank is precharged; unbounded while
    /// a row is open without a scheduled auto-precharge.
    pub fn all_precharged_at(&self) -> u64 {
        self.banks
            .iter()
            .map(|b| b.precharged_at.unwrap_or(u64::MAX))
            .max()
            .unwrap_or(0)
    }

    /// Record the issue of `cmd` at `cycle`.
    ///
    /// # Panics
    /// Panics when the command violates a timing constraint; the arbiter
    /// must only issue admissible commands.
    pub fn issue(&mut self, cmd: DdrCommand, bank: usize, row: u32, cycle: u64) {
        assert!(
            self.check(cmd, bank, cycle),
            "{cmd:?} to bank {bank} violates DDR4 timing at cycle {cycle}"
        );

        let t = self.t;
        let bg = self.bank_group(bank);
        let b = &mut self.banks[bank];

        match cmd {
            DdrCommand::Act => {
                b.open_row = Some(row);
                b.precharged_at = None;
                b.next_rd = cycle + t.t_rcd;
                b.next_wr = cycle + t.t_rcd;
                b.next_pre = cycle + t.t_ras;

                self.last_act_bg[bg] = Some(cycle);
                self.last_act_any = Some(cycle);
                if self.act_window_len == 4 {
                    self.act_window.rotate_left(1);
                    self.act_window[3] = cycle;
                } else {
                    self.act_window[self.act_window_len] = cycle;
                    self.act_window_len += 1;
                }
            }
            DdrCommand::Pre => {
                b.open_row = None;
                b.precharged_at = Some(cycle + t.t_rp);
                b.next_act = b.next_act.max(cycle + t.t_rp);
            }
            DdrCommand::Rd | DdrCommand::Rda => {
                b.next_pre = b.next_pre.max(cycle + t.t_rtp);
                if cmd == DdrCommand::Rda {
                    b.open_row = None;
                    b.precharged_at = Some(cycle + t.t_rtp + t.t_rp);
                    b.next_act = b.next_act.max(cycle + t.t_rtp + t.t_rp);
                }
                self.last_cas_bg[bg] = Some(cycle);
                self.last_cas_any = Some(cycle);
            }
            DdrCommand::Wr | DdrCommand::Wra => {
                let recover = cycle + t.t_cwd + t.bl / 2 + t.t_wr;
                b.next_pre = b.next_pre.max(recover);
                if cmd == DdrCommand::Wra {
                    b.open_row = None;
                    b.precharged_at = Some(recover + t.t_rp);
                    b.next_act = b.next_act.max(recover + t.t_rp);
                }
                self.last_cas_bg[bg] = Some(cycle);
                self.last_cas_any = Some(cycle);
            }
            DdrCommand::Ref => {
                self.ref_busy_until = cycle + t.t_rfc;
                for bank in &mut self.banks {
                    *bank = BankState {
                        next_act: cycle + t.t_rfc,
                        precharged_at: Some(cycle + t.t_rfc),
                        ..BankState::default()
                    };
                }
            }
        }
    }

    pub fn open_row(&self, bank: usize) -> Option<u32> {
        self.banks[bank].open_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TimingState {
        TimingState::new(&DDR4_3200AA_8GB_X16, 8)
    }

    #[test]
    fn act_to_cas_respects_trcd() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 10, 0);
        assert!(!s.check(DdrCommand::Rd, 0, 21));
        assert!(s.check(DdrCommand::Rd, 0, 22));
    }

    #[test]
    fn act_to_act_respects_trrd() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 10, 0);
        // Bank 1 is in the other bank group: tRRDs applies.
        assert_eq!(s.earliest(DdrCommand::Act, 1), 9);
        // Bank 2 shares bank group 0: tRRDl applies.
        assert_eq!(s.earliest(DdrCommand::Act, 2), 11);
    }

    #[test]
    fn four_activate_window() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 1, 0);
        s.issue(DdrCommand::Act, 1, 1, 9);
        s.issue(DdrCommand::Act, 2, 1, 20);
        s.issue(DdrCommand::Act, 3, 1, 29);
        // The fifth activate must wait out tFAW from the first.
        assert!(s.earliest(DdrCommand::Act, 4) >= 48);
    }

    #[test]
    fn cas_without_open_row_is_inadmissible() {
        let s = state();
        assert!(!s.check(DdrCommand::Rd, 0, 1000));
    }

    #[test]
    fn rda_schedules_precharge() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 10, 0);
        s.issue(DdrCommand::Rda, 0, 10, 22);
        // Precharge completes at t + tRTP + tRP.
        assert_eq!(s.banks[0].precharged_at, Some(22 + 12 + 22));
        assert_eq!(s.open_row(0), None);
    }

    #[test]
    fn write_recovery_delays_precharge() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 10, 0);
        s.issue(DdrCommand::Wr, 0, 10, 22);
        // tCWL + BL/2 + tWR past the CAS.
        assert_eq!(s.earliest(DdrCommand::Pre, 0), 22 + 16 + 4 + 24);
    }

    #[test]
    fn refresh_blocks_everything_for_trfc() {
        let mut s = state();
        s.issue(DdrCommand::Ref, 0, 0, 100);
        assert!(!s.check(DdrCommand::Act, 3, 100 + 559));
        assert!(s.check(DdrCommand::Act, 3, 100 + 560));
    }

    #[test]
    fn refresh_requires_all_banks_precharged() {
        let mut s = state();
        s.issue(DdrCommand::Act, 0, 10, 0);
        assert_eq!(s.earliest(DdrCommand::Ref, 0), u64::MAX);
        s.issue(DdrCommand::Pre, 0, 0, 52);
        assert_eq!(s.earliest(DdrCommand::Ref, 0), 52 + 22);
    }
}
