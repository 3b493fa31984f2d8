//! DDR4 command arbiter / scheduler.
//!
//! Issues at most one command per DRAM cycle subject to the JEDEC timing
//! model, with the priority order CAS > pre-activate precharge > activate
//! > explicit precharge > refresh. Ties break round-robin from the
//! previously used bank; activates additionally prefer the bank whose
//! FIFO has the longest CAS run ahead of its next precharge, which
//! provides cover for hiding later activates.

use std::collections::VecDeque;

use simd_model::{RequestTarget, DRAM_BANKS, MC_BUS_WIDTH};

use crate::model::{CmdArbStats, DdrCmd, DqReservation};
use crate::timing::{DdrCommand, DramTiming, TimingState};

/// Depth of each per-bank command FIFO.
pub const CMD_FIFO_DEPTH: usize = 16;

/// Refreshes that may be deferred, per JEDEC.
const MAX_DEFERRED_REF: u32 = 8;

/// First-order energy estimate per command, standing in for a full
/// current-profile power model. Values approximate a DDR4-3200 x16 die.
const E_ACT_PRE_PJ: f64 = 2200.0;
const E_RD_PJ: f64 = 1800.0;
const E_WR_PJ: f64 = 1950.0;
const E_REF_PJ: f64 = 35000.0;
const P_BACKGROUND_MW: f64 = 120.0;

/// Per-cycle arbiter outputs.
#[derive(Debug, Default)]
pub struct ArbOut {
    pub dq: Option<DqReservation>,
    /// One-cycle pulse: all banks precharged, the in-flight transfer is
    /// fully retired.
    pub allpre: bool,
    /// Completion event, paired with `allpre`.
    pub done_dst: Option<RequestTarget>,
    /// At least one refresh is pending.
    pub ref_pending: bool,
    /// A refresh is currently in progress.
    pub ref_active: bool,
}

pub struct CmdArb {
    timing: TimingState,
    fifos: Vec<VecDeque<DdrCmd>>,
    /// Head-of-FIFO command registers, per bank.
    cmd: Vec<Option<DdrCmd>>,
    /// Round-robin reference bank.
    bank: u32,
    refi_count: u64,
    ref_enq: u32,
    /// Cycle at which the most recent transfer's final precharges have
    /// elapsed; publishes `allpre`/`done_dst`.
    allpre_cycle: Option<u64>,
    ref_fini_cycle: u64,
    dst: RequestTarget,
    stats: CmdArbStats,
    energy_pj: f64,
    cycles: u64,
}

impl CmdArb {
    pub fn new(timing: &'static DramTiming) -> Self {
        CmdArb {
            timing: TimingState::new(timing, DRAM_BANKS),
            fifos: (0..DRAM_BANKS).map(|_| VecDeque::new()).collect(),
            cmd: vec![None; DRAM_BANKS],
            bank: 0,
            refi_count: 0,
            ref_enq: 0,
            allpre_cycle: None,
            ref_fini_cycle: 0,
            dst: RequestTarget::default(),
            stats: CmdArbStats::default(),
            energy_pj: 0.0,
            cycles: 0,
        }
    }

    /// Seed the refresh counter, varying refresh alignment.
    pub fn set_refresh_counter(&mut self, refc: u64) {
        self.refi_count = refc;
    }

    pub fn fifo_free(&self, bank: u32) -> usize {
        CMD_FIFO_DEPTH - self.fifos[bank as usize].len()
    }

    pub fn push_cmd(&mut self, bank: u32, cmd: DdrCmd) {
        assert!(self.fifo_free(bank) > 0, "bank command FIFO overflow");
        self.fifos[bank as usize].push_back(cmd);
    }

    pub fn timing(&self) -> &'static DramTiming {
        self.timing.timing()
    }

    /// Aggregate statistics. `cycles` scales utilisation/power; the
    /// least-issue delay is used when zero.
    pub fn stats(&self, cycles: u64) -> CmdArbStats {
        let mut s = self.stats.clone();
        let cycles = if cycles != 0 { cycles } else { s.lid };

        if cycles != 0 {
            s.dq_util = (s.bytes as f64 * 100.0) / (cycles as f64 * MC_BUS_WIDTH as f64);
        }
        let t_ns = self.cycles as f64 * self.timing().clk_period_ns();
        s.energy_pj = self.energy_pj + P_BACKGROUND_MW * t_ns;
        if t_ns > 0.0 {
            s.power_mw = s.energy_pj / t_ns;
        }
        s
    }

    fn fetch_fifo_heads(&mut self) {
        for b in 0..DRAM_BANKS {
            if self.cmd[b].is_none() {
                self.cmd[b] = self.fifos[b].pop_front();
            }
        }
    }

    fn fifo_heads_empty(&self) -> bool {
        self.cmd.iter().all(Option::is_none) && self.fifos.iter().all(VecDeque::is_empty)
    }

    /// Distance from the head of each bank's FIFO to its next precharge;
    /// the FIFO length when none is queued.
    fn precharge_distance(&self) -> [i32; DRAM_BANKS] {
        let mut dist = [0i32; DRAM_BANKS];

        for b in 0..DRAM_BANKS {
            dist[b] = self.fifos[b].len() as i32 - 1;
            if let Some(cmd) = &self.cmd[b] {
                dist[b] += 1;
                if cmd.pre_post {
                    dist[b] = 1;
                }
            }

            for (j, item) in self.fifos[b].iter().enumerate() {
                if item.pre_post {
                    dist[b] = j as i32 + 2;
                    break;
                } else if item.pre_pre {
                    dist[b] = j as i32 + 1;
                    break;
                }
            }
        }

        dist
    }

    /// Round-robin distance of `bank` from the previously used bank.
    fn rr_dist(&self, bank: usize) -> usize {
        (bank + DRAM_BANKS - self.bank as usize) % DRAM_BANKS
    }

    /// Pick the best candidate bank for each command class.
    fn best_candidates(&self, cycle: u64) -> Candidates {
        let mut c = Candidates::default();
        let pre_dist = self.precharge_distance();
        let mut act_fifo_entries = -1i32;
        let mut rw_count = 0;

        for (b, slot) in self.cmd.iter().enumerate() {
            let Some(cmd) = slot else { continue };

            if cmd.read || cmd.write {
                rw_count += 1;
            }

            if cmd.pre_pre {
                if (c.ppre.is_none()
                    || self.rr_dist(b) < self.rr_dist(c.ppre.unwrap()))
                    && self.timing.check(DdrCommand::Pre, b, cycle)
                {
                    c.ppre = Some(b);
                }
            } else if cmd.act {
                if (c.act.is_none()
                    || pre_dist[b] > act_fifo_entries
                    || self.rr_dist(b) < self.rr_dist(c.act.unwrap()))
                    && self.timing.check(DdrCommand::Act, b, cycle)
                {
                    c.act = Some(b);
                    act_fifo_entries = pre_dist[b];
                }
            } else if cmd.read || cmd.write {
                if let Some(cur) = c.rw {
                    if self.rr_dist(b) >= self.rr_dist(cur) {
                        continue;
                    }
                }

                let ddr_cmd = cas_command(cmd);
                if self.timing.check(ddr_cmd, b, cycle) {
                    c.rw = Some(b);
                }
            } else if cmd.pre_post
                && (c.pre.is_none() || self.rr_dist(b) < self.rr_dist(c.pre.unwrap()))
                && self.timing.check(DdrCommand::Pre, b, cycle)
            {
                c.pre = Some(b);
            }
        }

        c.last_rw = rw_count == 1;
        c
    }

    /// Track the least-issue delay and schedule the completion pulse.
    fn update_lid(&mut self, dst: RequestTarget, cmdgen_busy: bool) {
        if cmdgen_busy {
            return;
        }

        let pre_done = self.timing.all_precharged_at();
        if pre_done != u64::MAX {
            self.stats.lid = self.stats.lid.max(pre_done);
        }

        // Only arm the completion pulse once every command FIFO has
        // drained; re-arming at timeout would duplicate the event.
        if !self.fifo_heads_empty() || pre_done == u64::MAX {
            return;
        }

        // Minus two lets the stride sequencer start refilling the
        // pipeline early.
        let at = pre_done.saturating_sub(2);
        self.allpre_cycle = Some(self.allpre_cycle.map_or(at, |cur| cur.max(at)));
        self.dst = dst;
    }

    /// One DRAM command-clock cycle.
    pub fn tick(&mut self, cycle: u64, cmdgen_busy: bool) -> ArbOut {
        self.cycles += 1;
        let mut out = ArbOut::default();
        let t = self.timing.timing();

        self.fetch_fifo_heads();
        let cand = self.best_candidates(cycle);

        if let Some(b) = cand.rw {
            let cmd = self.cmd[b].take().unwrap();
            let ddr_cmd = cas_command(&cmd);

            self.print_cmd("RW ", b as i32, &cmd, cycle);

            // Mask off bit 0 to prioritise on bank pairs.
            self.bank = b as u32 & !0x1;
            self.timing.issue(ddr_cmd, b, cmd.row, cycle);
            self.energy_pj += if cmd.read { E_RD_PJ } else { E_WR_PJ };
            if cmd.pre_post {
                self.energy_pj += E_ACT_PRE_PJ * 0.5;
                self.update_lid(cmd.target, cmdgen_busy);
            }

            let mut res = DqReservation {
                bank: b as u32,
                col: cmd.col,
                row: cmd.row,
                wordmask: cmd.wordmask,
                write: cmd.write,
                sp_offset: cmd.sp_offset,
                target: cmd.target,
                reg_offset: cmd.reg_offset,
                cycle,
            };

            if res.write {
                // Minus two accounts for the scratchpad pipeline delay.
                res.cycle = cycle + t.t_cwd - 2;
                if cand.last_rw && !cmdgen_busy {
                    self.stats.lda = res.cycle + 5;
                }
            } else {
                res.cycle = cycle + t.t_cas;
                if cand.last_rw && !cmdgen_busy {
                    self.stats.lda = res.cycle + 3;
                }
            }

            self.stats.cas_c += 1;
            self.stats.bytes += 4 * res.wordmask.count_ones() as u64;
            out.dq = Some(res);
        } else if let Some(b) = cand.ppre {
            // Pre-activate precharges come late and paired with an
            // activate; prioritise them over plain activates.
            let mut cmd = self.cmd[b].take().unwrap();
            cmd.pre_pre = false;
            self.print_cmd("PRE", b as i32, &cmd, cycle);

            self.timing.issue(DdrCommand::Pre, b, cmd.row, cycle);
            self.energy_pj += E_ACT_PRE_PJ * 0.5;
            self.stats.pre_c += 1;
            self.update_lid(cmd.target, cmdgen_busy);
            // Keep the entry for the ACT/CAS that follows.
            self.cmd[b] = Some(cmd);
        } else if let Some(b) = cand.act {
            let mut cmd = self.cmd[b].take().unwrap();
            cmd.act = false;
            self.print_cmd("ACT", b as i32, &cmd, cycle);

            self.timing.issue(DdrCommand::Act, b, cmd.row, cycle);
            self.energy_pj += E_ACT_PRE_PJ * 0.5;
            self.stats.act_c += 1;
            // Keep the entry for the CAS/precharge that follows.
            self.cmd[b] = Some(cmd);
        } else if let Some(b) = cand.pre {
            let cmd = self.cmd[b].take().unwrap();
            self.print_cmd("PRE", b as i32, &cmd, cycle);

            self.timing.issue(DdrCommand::Pre, b, cmd.row, cycle);
            self.energy_pj += E_ACT_PRE_PJ * 0.5;
            self.stats.pre_c += 1;
            self.update_lid(cmd.target, cmdgen_busy);
        } else if self.ref_enq > 0 && self.fifo_heads_empty() && !cmdgen_busy {
            if self.timing.check(DdrCommand::Ref, 0, cycle) {
                self.timing.issue(DdrCommand::Ref, 0, 0, cycle);
                self.energy_pj += E_REF_PJ;
                self.print_cmd("REF", -1, &DdrCmd::default(), cycle);
                self.stats.ref_c += 1;
                self.ref_fini_cycle = cycle + self.timing.timing().t_rfc;
                self.ref_enq -= 1;
            }
        }

        // Refresh obligation bookkeeping.
        self.refi_count += 1;
        if self.refi_count >= t.t_refi {
            self.refi_count %= t.t_refi;
            self.ref_enq += 1;
            assert!(self.ref_enq <= MAX_DEFERRED_REF, "deferred refreshes exceed JEDEC limit");
        }

        out.ref_pending = self.ref_enq > 0;
        out.ref_active = cycle < self.ref_fini_cycle;

        if self.allpre_cycle == Some(cycle) {
            out.allpre = true;
            out.done_dst = Some(self.dst);
            self.allpre_cycle = None;
        }

        out
    }

    fn print_cmd(&self, kind: &str, bank: i32, cmd: &DdrCmd, cycle: u64) {
        tracing::debug!(target: "mc_cmd",
            cycle, kind, bank, row = cmd.row, col = cmd.col,
            target = ?cmd.target, "ddr command");
    }
}

#[derive(Default)]
struct Candidates {
    /// Pre-activate precharge.
    ppre: Option<usize>,
    act: Option<usize>,
    /// Read/write (CAS).
    rw: Option<usize>,
    /// Explicit precharge.
    pre: Option<usize>,
    /// Exactly one CAS left on the FIFO heads.
    last_rw: bool,
}

fn cas_command(cmd: &DdrCmd) -> DdrCommand {
    match (cmd.read, cmd.pre_post) {
        (true, true) => DdrCommand::Rda,
        (true, false) => DdrCommand::Rd,
        (false, true) => DdrCommand::Wra,
        (false, false) => DdrCommand::Wr,
    }
}
