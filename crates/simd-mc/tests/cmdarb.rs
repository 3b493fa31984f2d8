//! Command arbiter: JEDEC-admissible issue, priorities and completion.

use simd_mc::{CmdArb, DdrCmd, DDR4_3200AA_8GB_X16};
use simd_model::{ReqDest, RequestTarget};

fn cas(row: u32, col: u32, act: bool, pre_post: bool) -> DdrCmd {
    DdrCmd {
        row,
        col,
        act,
        read: true,
        pre_post,
        wordmask: 0xffff,
        target: RequestTarget::new(0, ReqDest::Sp),
        ..Default::default()
    }
}

/// Bank-pair read run: ACT pair spaced by tRRDs, first CAS at tRCD,
/// completion at `last_cas + tRTP + tRP - 2`.
#[test]
fn paired_bank_read_timing() {
    let t = &DDR4_3200AA_8GB_X16;
    let mut arb = CmdArb::new(t);

    arb.push_cmd(0, cas(10, 0, true, false));
    arb.push_cmd(0, cas(10, 8, false, true));
    arb.push_cmd(1, cas(10, 0, true, false));
    arb.push_cmd(1, cas(10, 8, false, true));

    let mut cas_cycles = Vec::new();
    let mut done = None;
    let mut allpre_cycle = None;

    for cycle in 0..200 {
        let out = arb.tick(cycle, false);
        if let Some(res) = out.dq {
            // Data phase of a read starts CL after the CAS.
            assert_eq!(res.cycle, cycle + t.t_cas);
            cas_cycles.push(cycle);
        }
        if out.allpre {
            allpre_cycle = Some(cycle);
            done = out.done_dst;
        }
    }

    assert_eq!(cas_cycles.len(), 4);
    // The first CAS waits out tRCD behind the bank-0 activate at cycle 0.
    assert_eq!(cas_cycles[0], t.t_rcd);
    // CAS commands alternate across the pair, spaced by tCCD.
    assert!(cas_cycles[1] >= cas_cycles[0] + t.t_ccd_s);

    // Completion: tRTP + tRP after the final (auto-precharging) CAS,
    // minus the two cycles that let the sequencer restart early.
    let last = *cas_cycles.last().unwrap();
    assert_eq!(allpre_cycle, Some(last + t.t_rtp + t.t_rp - 2));
    assert_eq!(done, Some(RequestTarget::new(0, ReqDest::Sp)));

    let stats = arb.stats(0);
    assert_eq!(stats.cas_c, 4);
    assert_eq!(stats.act_c, 2);
    assert_eq!(stats.lid, last + t.t_rtp + t.t_rp);
}

/// The second activate of a pair respects tRRDs; reads always beat
/// pending activates on the command bus.
#[test]
fn cas_takes_priority_over_act() {
    let t = &DDR4_3200AA_8GB_X16;
    let mut arb = CmdArb::new(t);

    // A long CAS run on bank 0 and a pending ACT on bank 1.
    arb.push_cmd(0, cas(10, 0, true, false));
    arb.push_cmd(0, cas(10, 8, false, false));
    arb.push_cmd(0, cas(10, 16, false, true));
    arb.push_cmd(1, cas(10, 0, true, false));
    arb.push_cmd(1, cas(10, 8, false, true));

    let mut first_dq = None;
    for cycle in 0..300 {
        let out = arb.tick(cycle, false);
        if first_dq.is_none() {
            first_dq = out.dq.map(|r| (cycle, r.bank));
        }
    }

    // Bank 1's activate slots into the gap before bank 0's first CAS at
    // tRCD, so the first data transfer is not delayed past it.
    let (cycle, bank) = first_dq.unwrap();
    assert_eq!(bank, 0);
    assert_eq!(cycle, t.t_rcd);
}

/// Writes reserve the bus CWL minus the scratchpad pipeline delay after
/// the CAS.
#[test]
fn write_reservation_cycle() {
    let t = &DDR4_3200AA_8GB_X16;
    let mut arb = CmdArb::new(t);

    let mut cmd = cas(4, 0, true, true);
    cmd.read = false;
    cmd.write = true;
    arb.push_cmd(0, cmd);

    for cycle in 0..100 {
        let out = arb.tick(cycle, false);
        if let Some(res) = out.dq {
            assert!(res.write);
            assert_eq!(res.cycle, cycle + t.t_cwd - 2);
            return;
        }
    }
    panic!("write CAS never issued");
}

/// Refresh obligations accumulate every tREFI and are only serviced when
/// the FIFOs drain; at most eight may be deferred.
#[test]
fn refresh_defers_until_idle() {
    let t = &DDR4_3200AA_8GB_X16;
    let mut arb = CmdArb::new(t);
    arb.set_refresh_counter(t.t_refi - 10);

    let mut saw_pending = false;
    let mut refreshed_at = None;

    for cycle in 0..t.t_refi {
        let out = arb.tick(cycle, false);
        if out.ref_pending {
            saw_pending = true;
        }
        if out.ref_active && refreshed_at.is_none() {
            refreshed_at = Some(cycle);
        }
    }

    assert!(saw_pending);
    let at = refreshed_at.expect("refresh never issued");
    // Seeded 10 cycles before the interval elapses.
    assert!(at >= 10);
    assert_eq!(arb.stats(0).ref_c, 1);
}

/// Seeding the refresh counter moves the first obligation forward.
#[test]
fn refresh_counter_seeding() {
    let t = &DDR4_3200AA_8GB_X16;

    let mut seeded = CmdArb::new(t);
    seeded.set_refresh_counter(t.t_refi - 1);
    let out = seeded.tick(0, false);
    assert!(out.ref_pending);

    let mut unseeded = CmdArb::new(t);
    let out = unseeded.tick(0, false);
    assert!(!out.ref_pending);
}
