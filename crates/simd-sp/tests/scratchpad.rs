//! Scratchpad front-end tests: stride sequencing, DQ pipelining and the
//! register-file round trip.

use simd_model::{
    MemDataPort, Reg, RegKind, RegOffset, ReqDest, RequestTarget, StrideDescriptor,
};
use simd_sp::{Scratchpad, SpDqReservation, SpSeqIn, SpStrideSequencer};

/// Fake register file: a flat lane/row store.
#[derive(Default)]
struct FakeRf {
    /// (lane, row) -> value.
    written: std::collections::HashMap<(u32, u32), u32>,
    store_base: u32,
}

impl MemDataPort for FakeRf {
    fn mem_data_in(
        &mut self,
        _target: RequestTarget,
        _sp_addr: u32,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    ) {
        for i in 0..offsets.len() {
            if mask[i] {
                self.written.insert((offsets[i].lane, offsets[i].row), data[i]);
            }
        }
    }

    fn mem_data_out(
        &mut self,
        _target: RequestTarget,
        _sp_addr: u32,
        offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>) {
        let data = offsets.iter().map(|o| self.store_base + o.lane).collect();
        (data, mask.to_vec())
    }
}

fn reg_desc(addr: u32, words: u32, period: u32, period_count: u32) -> StrideDescriptor {
    let mut desc = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vgpr, 2));
    desc.addr = addr;
    desc.words = words;
    desc.period = period;
    desc.period_count = period_count;
    desc.dst_period = 32;
    desc
}

fn run(sp: &mut Scratchpad, rf: &mut FakeRf, max_cycles: u64) -> u64 {
    for cycle in 0..max_cycles {
        let out = sp.tick(false, 0, rf);
        if out.wg_done {
            return cycle;
        }
    }
    panic!("scratchpad transfer did not finish");
}

#[test]
fn contiguous_read_reaches_register_file() {
    let mut sp = Scratchpad::new(0);
    let mut rf = FakeRf::default();

    for i in 0..32u32 {
        sp.array.debug_write(i * 4, 0x50 + i);
    }

    sp.push_descriptor(reg_desc(0, 32, 32, 1));
    run(&mut sp, &mut rf, 100);

    assert_eq!(rf.written.len(), 32);
    for lane in 0..32u32 {
        assert_eq!(rf.written[&(lane, 0)], 0x50 + lane);
    }
}

#[test]
fn strided_read_skips_gap_words() {
    let mut sp = Scratchpad::new(1);
    let mut rf = FakeRf::default();

    // 3 periods of 8 words, 2 transferred per period.
    for i in 0..24u32 {
        sp.array.debug_write(i * 4, i);
    }
    sp.push_descriptor(reg_desc(0, 2, 8, 3));
    run(&mut sp, &mut rf, 200);

    assert_eq!(rf.written.len(), 6);
    // Period p contributes words 8p, 8p+1 to lanes 32p, 32p+1.
    for p in 0..3u32 {
        assert_eq!(rf.written[&(32 * p, 0)], 8 * p);
        assert_eq!(rf.written[&(32 * p + 1, 0)], 8 * p + 1);
    }
}

#[test]
fn write_descriptor_fills_array() {
    let mut sp = Scratchpad::new(0);
    let mut rf = FakeRf { store_base: 0x100, ..Default::default() };

    let mut desc = reg_desc(0x20, 16, 16, 1);
    desc.write = true;
    sp.push_descriptor(desc);
    run(&mut sp, &mut rf, 100);

    // A few extra cycles for the two-stage write pipeline to drain.
    for _ in 0..4 {
        sp.tick(false, 0, &mut rf);
    }

    for lane in 0..16u32 {
        assert_eq!(sp.array.debug_read(0x20 + lane * 4), 0x100 + lane);
    }
}

#[test]
fn unaligned_read_round_trip() {
    let mut sp = Scratchpad::new(0);
    let mut rf = FakeRf::default();

    for i in 0..8u32 {
        sp.array.debug_write(0x10 + i * 4, 0xa0 + i);
    }

    // Start one word into a bus line.
    sp.push_descriptor(reg_desc(0x14, 4, 4, 1));
    run(&mut sp, &mut rf, 100);

    assert_eq!(rf.written[&(0, 0)], 0xa1);
    assert_eq!(rf.written[&(3, 0)], 0xa4);
}

#[test]
fn ticket_lock_defers_start() {
    let mut seq = SpStrideSequencer::new();
    let mut desc = reg_desc(0, 4, 4, 1);
    desc.ticket = 3;
    seq.push_descriptor(desc);
    seq.kick();

    // With serialisation on and a non-matching ticket the sequencer sits
    // in its init state.
    let mut emitted = false;
    for _ in 0..10 {
        let out = seq.tick(
            &SpSeqIn { serialize_tickets: true, ticket_pop: 0, ..Default::default() },
            4,
        );
        emitted |= out.reservation.is_some();
    }
    assert!(!emitted);

    // Raising the matching ticket releases it.
    let mut reservations: Vec<SpDqReservation> = Vec::new();
    for _ in 0..10 {
        let out = seq.tick(
            &SpSeqIn { serialize_tickets: true, ticket_pop: 3, ..Default::default() },
            4,
        );
        reservations.extend(out.reservation);
    }
    assert!(!reservations.is_empty());
}

#[test]
#[should_panic(expected = "scratchpad-to-scratchpad")]
fn sp_to_sp_rejected() {
    let mut sp = Scratchpad::new(0);
    let mut rf = FakeRf::default();

    let desc = StrideDescriptor {
        addr: 0,
        words: 4,
        period: 4,
        period_count: 1,
        dst: RequestTarget::new(0, ReqDest::Sp),
        dst_period: 4,
        ..Default::default()
    };
    sp.push_descriptor(desc);
    run(&mut sp, &mut rf, 10);
}
