//! Command generator: address mapping and precharge policies.

use simd_mc::{address_translate, BurstRequest, CmdGen, PrechargePolicy};
use simd_model::{ReqDest, RequestTarget};

fn burst(addr: u32, next: u32, pol: PrechargePolicy) -> BurstRequest {
    BurstRequest {
        addr,
        addr_next: next,
        wordmask: 0xffff,
        pre_pol: pol,
        target: RequestTarget::new(0, ReqDest::Sp),
        last: next == 0xffff_ffff,
        ..Default::default()
    }
}

#[test]
fn address_bit_gathering() {
    // bank = addr[6] | addr[15:14], col = addr[13:4] burst-aligned,
    // row = addr[31:16].
    assert_eq!(address_translate(0x0000_0000), (0, 0, 0));
    assert_eq!(address_translate(0x0000_0040), (1, 0, 0));
    assert_eq!(address_translate(0x0000_4000), (2, 0, 0));
    assert_eq!(address_translate(0x0000_8000), (4, 0, 0));
    assert_eq!(address_translate(0x0001_0000), (0, 1, 0));
    assert_eq!(address_translate(0x0000_0080), (0, 0, 8));
}

#[test]
fn linear_policy_holds_row_open_within_pair() {
    let mut gen = CmdGen::new();

    // Two bursts in the same row and bank pair: no precharge yet.
    let cmds = gen.step(&burst(0x0, 0x40, PrechargePolicy::Linear));
    assert_eq!(cmds.len(), 1);
    let (bank, cmd) = &cmds[0];
    assert_eq!(*bank, 0);
    assert!(cmd.act && cmd.read && !cmd.pre_post && !cmd.pre_pre);
    assert!(gen.busy());

    let cmds = gen.step(&burst(0x40, 0x80, PrechargePolicy::Linear));
    assert_eq!(cmds[0].0, 1);
    assert!(cmds[0].1.act && !cmds[0].1.pre_post);

    // Returning to bank 0 in the same row: the row is already open.
    let cmds = gen.step(&burst(0x80, 0xc0, PrechargePolicy::Linear));
    assert_eq!(cmds[0].0, 0);
    assert!(!cmds[0].1.act);
}

#[test]
fn linear_policy_precharges_on_pair_change() {
    let mut gen = CmdGen::new();

    gen.step(&burst(0x0, 0x40, PrechargePolicy::Linear));
    gen.step(&burst(0x40, 0x4000, PrechargePolicy::Linear));

    // The next burst leaves the pair: auto-precharge on the CAS, plus a
    // stand-alone precharge for the open paired bank.
    let cmds = gen.step(&burst(0x4000, 0xffff_ffff, PrechargePolicy::Linear));
    assert_eq!(cmds[0].0, 2);
    assert!(cmds[0].1.pre_post);
}

#[test]
fn final_linear_burst_closes_paired_bank() {
    let mut gen = CmdGen::new();

    gen.step(&burst(0x0, 0x40, PrechargePolicy::Linear));
    let cmds = gen.step(&burst(0x40, 0xffff_ffff, PrechargePolicy::Linear));

    // Auto-precharge on the final CAS and a stand-alone precharge for
    // bank 0, which still has its row open.
    assert_eq!(cmds.len(), 2);
    assert!(cmds[0].1.pre_post && cmds[0].1.read);
    assert_eq!(cmds[1].0, 0);
    assert!(cmds[1].1.pre_post && !cmds[1].1.read && !cmds[1].1.write);
    assert!(!gen.busy());
}

#[test]
fn alap_policy_precharges_only_on_row_change() {
    let mut gen = CmdGen::new();

    // Same bank, same row: one activate, no precharges.
    let c1 = gen.step(&burst(0x0, 0x80, PrechargePolicy::Alap));
    assert!(c1[0].1.act && !c1[0].1.pre_pre && !c1[0].1.pre_post);
    let c2 = gen.step(&burst(0x80, 0x1_0000, PrechargePolicy::Alap));
    assert!(!c2[0].1.act && !c2[0].1.pre_pre);

    // Row change on the same bank: precharge before the activate.
    let c3 = gen.step(&burst(0x1_0000, 0xffff_ffff, PrechargePolicy::Alap));
    assert_eq!(c3[0].0, 0);
    assert!(c3[0].1.pre_pre && c3[0].1.act);
    // Final request also carries the auto-precharge.
    assert!(c3[0].1.pre_post);
}

#[test]
fn alap_final_burst_closes_all_open_banks() {
    let mut gen = CmdGen::new();

    gen.step(&burst(0x0, 0x40, PrechargePolicy::Alap));
    gen.step(&burst(0x40, 0x4000, PrechargePolicy::Alap));
    let cmds = gen.step(&burst(0x4000, 0xffff_ffff, PrechargePolicy::Alap));

    // Banks 0 and 1 are still open and get stand-alone precharges.
    let pre_banks: Vec<u32> = cmds[1..].iter().map(|(b, _)| *b).collect();
    assert_eq!(pre_banks.len(), 2);
    assert!(pre_banks.contains(&0) && pre_banks.contains(&1));
}
