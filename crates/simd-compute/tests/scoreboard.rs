use simd_compute::{RegReadReq, Scoreboard};
use simd_model::{ssp, Reg, RegKind};

fn sb_with(entries: &[Reg]) -> Scoreboard {
    let mut sb = Scoreboard::new();
    sb.set_slots(16);
    for &reg in entries {
        sb.tick(simd_compute::ScoreboardTick { enqueue: Some(reg), ..Default::default() });
    }
    sb
}

fn read1(reg: Reg) -> RegReadReq {
    RegReadReq {
        reg: [reg, Reg::default(), Reg::default()],
        enable: [true, false, false],
        imm: [0; 3],
    }
}

#[test]
fn vector_reads_match_on_kind_row_col() {
    let v1c2 = Reg::new(0, RegKind::Vgpr, 1, 2);
    let sb = sb_with(&[v1c2]);

    assert_eq!(sb.check(&read1(v1c2), false, [!0; 3]), [true, false, false]);
    // Same row, different column: no hazard.
    let v1c3 = Reg::new(0, RegKind::Vgpr, 1, 3);
    assert_eq!(sb.check(&read1(v1c3), false, [!0; 3]), [false, false, false]);
    // Different slot: no hazard.
    let other = Reg::new(1, RegKind::Vgpr, 1, 2);
    assert_eq!(sb.check(&read1(other), false, [!0; 3]), [false, false, false]);
}

#[test]
fn scalar_reads_ignore_col() {
    let s5 = Reg::new(0, RegKind::Sgpr, 5, 0);
    let sb = sb_with(&[s5]);

    let req = read1(Reg::new(0, RegKind::Sgpr, 5, 3));
    assert_eq!(sb.check(&req, false, [!0; 3]), [true, false, false]);
}

#[test]
fn ssp_match_is_conservative_on_first_source() {
    let pending = Reg::new(0, RegKind::Ssp, ssp::SD_WORDS, 0);
    let sb = sb_with(&[pending]);

    // Unrelated first source still stalls when the SSP-match bit is set.
    let req = read1(Reg::new(0, RegKind::Vgpr, 0, 0));
    assert_eq!(sb.check(&req, true, [!0; 3]), [true, false, false]);
    assert_eq!(sb.check(&req, false, [!0; 3]), [false, false, false]);

    // Only the first enabled source is covered.
    let mut req2 = RegReadReq::default();
    req2.reg[1] = Reg::new(0, RegKind::Vgpr, 0, 0);
    req2.enable[1] = true;
    assert_eq!(sb.check(&req2, true, [!0; 3]), [false, true, false]);
}

#[test]
fn pop_mask_excludes_own_entry() {
    let v0 = Reg::new(0, RegKind::Vgpr, 0, 0);
    let sb = sb_with(&[v0]);

    // Masking off ring slot 0 hides the entry, as the three-stage decoder
    // does for an instruction's own destination.
    let req = read1(v0);
    assert_eq!(sb.check(&req, false, [!1u32, !0, !0]), [false, false, false]);
}

#[test]
fn dequeue_frees_oldest_entry() {
    let a = Reg::new(0, RegKind::Vgpr, 0, 0);
    let b = Reg::new(0, RegKind::Vgpr, 1, 0);
    let mut sb = sb_with(&[a, b]);

    assert_eq!(sb.len(), 2);
    sb.tick(simd_compute::ScoreboardTick {
        dequeue: true,
        dequeue_reg: Some(a),
        ..Default::default()
    });
    assert_eq!(sb.len(), 1);
    assert_eq!(sb.check(&read1(a), false, [!0; 3]), [false, false, false]);
    assert_eq!(sb.check(&read1(b), false, [!0; 3]), [true, false, false]);
}

#[test]
fn cstack_write_markers_gate_cpop() {
    let mut sb = Scoreboard::new();
    assert!(!sb.cpop_stall(0));

    sb.tick(simd_compute::ScoreboardTick { enqueue_cstack: Some(0), ..Default::default() });
    assert!(sb.cpop_stall(0));
    assert!(!sb.cpop_stall(1));

    sb.tick(simd_compute::ScoreboardTick { dequeue_cstack: Some(0), ..Default::default() });
    assert!(!sb.cpop_stall(0));
}

#[test]
#[should_panic(expected = "empty scoreboard")]
fn underflow_is_a_contract_violation() {
    let mut sb = Scoreboard::new();
    sb.tick(simd_compute::ScoreboardTick { dequeue: true, ..Default::default() });
}
