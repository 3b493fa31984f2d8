//! End-to-end machine scenarios: access/execute round trips through the
//! DRAM and scratchpad front-ends.

use simd_compute::DecodeImpl;
use simd_isa::Program;
use simd_machine::{compare_words, Machine, MachineConfig, SchedOpts};

fn machine_for(prog: &str, dims: [u32; 2], decode: DecodeImpl) -> Machine {
    let mut prg = Program::parse(prog).unwrap();
    prg.resolve_branch_targets().unwrap();

    Machine::new(
        prg,
        MachineConfig { dims, decode, ..Default::default() },
    )
    .unwrap()
}

/// Invariant: a buffer written by stglin and read back by ldglin with no
/// intervening stores returns the written values at every lane.
#[test]
fn stglin_ldglin_round_trip() {
    let prog = "\
buffer 0 128 1
mov v0, vc.tid_x
stglin v0, 0
ldglin v1, 0
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::OneStage);
    let stats = m.run(Some(1_000_000));

    // Both transfers completed and the program exited.
    assert!(stats.exec_time > 0);
    let words = m.download_buffer_words(0).unwrap();
    let expect: Vec<u32> = (0..128).collect();
    assert_eq!(words, expect);

    for lane in 0..128 {
        assert_eq!(m.cluster().rf.debug_vgpr(0, 1, lane), lane as u32, "lane {lane}");
    }
}

#[test]
fn round_trip_three_stage_decode() {
    let prog = "\
buffer 0 128 1
mov v0, vc.tid_x
stglin v0, 0
ldglin v1, 0
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::ThreeStage);
    m.run(Some(1_000_000));

    assert_eq!(m.download_buffer_words(0).unwrap(), (0..128).collect::<Vec<u32>>());
}

/// Uploaded buffer contents reach the registers through a linear load.
#[test]
fn upload_then_load() {
    let prog = "\
buffer 0 128 1
ldglin v3, 0
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::OneStage);
    let data: Vec<u32> = (0..128).map(|i| 0xc0de_0000 + i).collect();
    m.upload_buffer_words(0, &data).unwrap();

    m.run(Some(1_000_000));

    for lane in 0..128usize {
        assert_eq!(m.cluster().rf.debug_vgpr(0, 3, lane), 0xc0de_0000 + lane as u32);
    }
}

/// Scalar load: sldg pulls consecutive words into consecutive scalar
/// registers.
#[test]
fn scalar_load_from_dram() {
    let prog = "\
buffer 0 16 1
sldg s0, 0, 4
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::OneStage);
    m.upload_buffer_words(0, &[11, 22, 33, 44, 55]).unwrap();
    m.run(Some(1_000_000));

    for (row, want) in [11u32, 22, 33, 44].iter().enumerate() {
        assert_eq!(m.cluster().rf.debug_sgpr(0, row), *want);
    }
}

/// DRAM tile to scratchpad, then scratchpad to registers.
#[test]
fn tile_load_and_scratchpad_read() {
    let prog = "\
buffer 0 128 1
spbuffer 0 128 1
ldg2sptile 0, 0
ldsplin v2, 0
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::OneStage);
    let data: Vec<u32> = (0..128).map(|i| 7000 + i).collect();
    m.upload_buffer_words(0, &data).unwrap();

    m.run(Some(1_000_000));

    // The tile landed in the slot-0 scratchpad.
    assert_eq!(m.scratchpad(0).array.debug_read(0), 7000);
    assert_eq!(m.scratchpad(0).array.debug_read(4), 7001);

    // And the linear scratchpad load moved it on into v2.
    for lane in 0..128usize {
        assert_eq!(m.cluster().rf.debug_vgpr(0, 2, lane), 7000 + lane as u32);
    }
}

/// Store to scratchpad and read back: the per-slot scratchpad round
/// trip.
#[test]
fn scratchpad_store_round_trip() {
    let prog = "\
spbuffer 0 128 1
mov v0, vc.lid_x
stsplin v0, 0
ldsplin v1, 0
exit
";
    let mut m = machine_for(prog, [128, 1], DecodeImpl::OneStage);
    m.run(Some(1_000_000));

    for lane in 0..128usize {
        assert_eq!(m.cluster().rf.debug_vgpr(0, 1, lane), lane as u32);
    }
}

/// Two work-groups share the cluster: a 256-wide kernel at width 128
/// dispatches two groups that both run to completion.
#[test]
fn two_workgroups_complete() {
    let prog = "\
buffer 0 256 1
mov v0, vc.tid_x
stglin v0, 0
exit
";
    let mut prg = Program::parse(prog).unwrap();
    prg.resolve_branch_targets().unwrap();
    let mut m = Machine::new(
        prg,
        MachineConfig {
            dims: [256, 1],
            width: Some(simd_model::WorkgroupWidth::W128),
            ..Default::default()
        },
    )
    .unwrap();

    m.run(Some(2_000_000));

    assert_eq!(m.dispatched_workgroups(), 2);
    let words = m.download_buffer_words(0).unwrap();
    assert_eq!(words, (0..256).collect::<Vec<u32>>());
}

/// Ticket serialisation keeps results correct when DRAM and scratchpad
/// requests are forced into programme order.
#[test]
fn no_parallel_dram_sp_round_trip() {
    let prog = "\
buffer 0 128 1
spbuffer 0 128 1
mov v0, vc.tid_x
stsplin v0, 0
ldsplin v1, 0
stglin v1, 0
exit
";
    let mut prg = Program::parse(prog).unwrap();
    prg.resolve_branch_targets().unwrap();
    let mut m = Machine::new(
        prg,
        MachineConfig {
            dims: [128, 1],
            sched_opts: SchedOpts::STOP_SIM_FINI | SchedOpts::NO_PARALLEL_DRAM_SP,
            ..Default::default()
        },
    )
    .unwrap();

    m.run(Some(2_000_000));
    assert_eq!(m.download_buffer_words(0).unwrap(), (0..128).collect::<Vec<u32>>());
}

/// Exit folding: the final store carries the exit, and the slot finishes
/// straight from the blocked state.
#[test]
fn post_exit_store_finishes_workgroup() {
    let prog = "\
buffer 0 128 1
mov v0, vc.tid_x
stglin v0, 0
exit
";
    let mut prg = Program::parse(prog).unwrap();
    prg.resolve_branch_targets().unwrap();
    prg.fold_exit();
    assert_eq!(prg.insns().len(), 2);

    let mut m = Machine::new(
        prg,
        MachineConfig { dims: [128, 1], ..Default::default() },
    )
    .unwrap();
    m.run(Some(1_000_000));

    assert_eq!(m.download_buffer_words(0).unwrap(), (0..128).collect::<Vec<u32>>());
}

#[test]
fn compare_tolerances() {
    let a: Vec<u32> = [1.0f32, 2.0, 3.0].iter().map(|f| f.to_bits()).collect();
    let b: Vec<u32> = [1.0005f32, 2.0, 3.1].iter().map(|f| f.to_bits()).collect();

    let m = compare_words(&a, &b, 0.001, false);
    assert_eq!(m.len(), 1);
    assert_eq!(m[0].index, 2);

    // 5% relative tolerance passes everything.
    assert!(compare_words(&a, &b, 0.05, true).is_empty());
}
