//! Stride sequencer tests against golden burst patterns.

use simd_mc::{BurstRequest, SeqIn, StrideSequencer};
use simd_model::{
    vsp, IdxEntry, Reg, RegKind, ReqDest, RequestTarget, StrideDescriptor, StrideKind,
    BURSTREQ_FIFO_DEPTH,
};

fn drain(seq: &mut StrideSequencer, max_cycles: u64) -> Vec<BurstRequest> {
    let mut reqs = Vec::new();
    let mut cycle = 0;

    // Hold off processing while a refresh is pending, as the front-end
    // contract requires.
    for _ in 0..6 {
        let out = seq.tick(&SeqIn {
            ref_pending: true,
            req_free: BURSTREQ_FIFO_DEPTH,
            cycle,
            ..Default::default()
        });
        assert!(out.req.is_none(), "requests emitted while refresh pending");
        cycle += 1;
    }

    loop {
        let out = seq.tick(&SeqIn {
            req_free: BURSTREQ_FIFO_DEPTH,
            cycle,
            ..Default::default()
        });
        cycle += 1;

        if let Some(req) = out.req {
            let last = req.last;
            reqs.push(req);
            if last {
                break;
            }
        }

        assert!(cycle < max_cycles, "sequencer did not finish");
    }

    // Signal all-banks-precharged so the sequencer returns to fetch, then
    // confirm it reports ready.
    let out = seq.tick(&SeqIn {
        allpre: true,
        req_free: BURSTREQ_FIFO_DEPTH,
        cycle,
        ..Default::default()
    });
    assert!(out.dst_clear);
    let out = seq.tick(&SeqIn {
        req_free: BURSTREQ_FIFO_DEPTH,
        cycle: cycle + 1,
        ..Default::default()
    });
    assert!(out.done);

    reqs
}

/// Scratchpad-targeted 2-D stride: `(addr=0x140004, words=19, period=61,
/// period_count=16)` at `dst_period=19`.
#[test]
fn stride_to_scratchpad_golden() {
    let golden: &[(u32, u16, u32)] = &[
        (0x140000, 0xfffe, 0x0),
        (0x140040, 0x000f, 0x3c),
        (0x1400c0, 0xc000, 0x4c),
        (0x140100, 0xffff, 0x54),
        (0x140140, 0x0001, 0x94),
        (0x1401c0, 0xf800, 0x98),
        (0x140200, 0x3fff, 0xac),
        (0x1402c0, 0xff00, 0xe4),
        (0x140300, 0x07ff, 0x104),
        (0x1403c0, 0xffe0, 0x130),
        (0x140400, 0x00ff, 0x15c),
        (0x1404c0, 0xfffc, 0x17c),
        (0x140500, 0x001f, 0x1b4),
        (0x140580, 0x8000, 0x1c8),
        (0x1405c0, 0xffff, 0x1cc),
        (0x140600, 0x0003, 0x20c),
        (0x140680, 0xf000, 0x214),
        (0x1406c0, 0x7fff, 0x224),
        (0x140780, 0xfe00, 0x260),
        (0x1407c0, 0x0fff, 0x27c),
        (0x140880, 0xffc0, 0x2ac),
        (0x1408c0, 0x01ff, 0x2d4),
        (0x140980, 0xfff8, 0x2f8),
        (0x1409c0, 0x003f, 0x32c),
        (0x140a80, 0xffff, 0x344),
        (0x140ac0, 0x0007, 0x384),
        (0x140b40, 0xe000, 0x390),
        (0x140b80, 0xffff, 0x39c),
        (0x140c40, 0xfc00, 0x3dc),
        (0x140c80, 0x1fff, 0x3f4),
        (0x140d40, 0xff80, 0x428),
        (0x140d80, 0x03ff, 0x44c),
        (0x140e40, 0xfff0, 0x474),
        (0x140e80, 0x007f, 0x4a4),
    ];

    let desc = StrideDescriptor {
        addr: 0x140004,
        words: 19,
        period: 61,
        period_count: 16,
        dst: RequestTarget::new(0, ReqDest::Sp),
        dst_period: 19,
        ..Default::default()
    };

    let mut seq = StrideSequencer::new();
    seq.push_descriptor(desc);
    seq.kick();
    let reqs = drain(&mut seq, 1000);

    assert_eq!(reqs.len(), golden.len());
    for (req, &(addr, mask, sp)) in reqs.iter().zip(golden) {
        assert_eq!(req.addr, addr, "burst address");
        assert_eq!(req.wordmask, mask, "word mask at {addr:#x}");
        assert_eq!(req.sp_offset, sp, "sp offset at {addr:#x}");
        assert!(!req.write);
    }

    // Emission in address order, terminator chained correctly.
    for w in reqs.windows(2) {
        assert!(w[0].addr < w[1].addr);
        assert_eq!(w[0].addr_next, w[1].addr);
    }
    assert_eq!(reqs.last().unwrap().addr_next, 0xffff_ffff);
    assert!(reqs.last().unwrap().last);
}

/// Vec2 load to the vector register file: consecutive words land in
/// consecutive rows of the destination.
#[test]
fn stride_vec2_to_registers() {
    let mut desc = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vgpr, 5));
    desc.dst_period = 64;
    desc.period = 320;
    desc.period_count = 16;
    desc.words = 14;
    desc.idx_transform = simd_model::IdxTransform::Vec2;

    let mut seq = StrideSequencer::new();
    seq.push_descriptor(desc);
    seq.kick();
    let reqs = drain(&mut seq, 1000);

    assert_eq!(reqs.len(), 16);

    // First burst: lanes 0..13, alternating rows 0/1, lane advancing
    // every second word.
    assert_eq!(reqs[0].addr, 0x0);
    assert_eq!(reqs[0].wordmask, 0x3fff);
    for w in 0..14 {
        assert_eq!(reqs[0].reg_offset[w].lane, (w / 2) as u32);
        assert_eq!(reqs[0].reg_offset[w].row, (w % 2) as u32);
    }

    // Second period starts one destination period (64 lanes) later.
    assert_eq!(reqs[1].addr, 0x500);
    assert_eq!(reqs[1].reg_offset[0].lane, 64);
    assert_eq!(reqs[1].reg_offset[1].row, 1);
}

/// CAM-targeted stride: each transferred word carries a flat buffer
/// index for the `mem_idx` match.
#[test]
fn stride_to_cam_indexes() {
    let mut desc = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vsp, vsp::MEM_DATA));
    desc.addr = 0x4;
    desc.dst_period = 128;
    desc.period = 256;
    desc.period_count = 4;
    desc.words = 62;
    desc.dst_offset = 512;

    assert_eq!(desc.target_kind(), ReqDest::Cam);

    let mut seq = StrideSequencer::new();
    seq.push_descriptor(desc);
    seq.kick();
    let reqs = drain(&mut seq, 1000);

    // First burst skips the unaligned lane 0 and counts indexes from the
    // descriptor's destination offset.
    assert_eq!(reqs[0].addr, 0x0);
    assert_eq!(reqs[0].wordmask, 0xfffe);
    assert_eq!(reqs[0].reg_offset[1].lane, 512);
    assert_eq!(reqs[0].reg_offset[15].lane, 526);

    // Second period restarts the index run one destination period later.
    let second_period = reqs.iter().find(|r| r.addr == 0x400).unwrap();
    assert_eq!(second_period.wordmask, 0xfffe);
    assert_eq!(second_period.reg_offset[1].lane, 768);
}

/// Index-iterate: one wordmask bit per request, addresses from the index
/// stream.
#[test]
fn index_iterate_single_words() {
    let idxs = [0u32, 0x6, 0x12, 0x120, 0x660, 0x0, 0x1];

    let mut desc = StrideDescriptor::for_reg(Reg::base(0, RegKind::Vgpr, 0));
    desc.kind = StrideKind::IdxIt;
    desc.addr = 0x1000;
    desc.write = false;
    desc.dst_offset = 0;

    let mut seq = StrideSequencer::new();
    seq.push_descriptor(desc);
    seq.push_indices(
        idxs.iter()
            .enumerate()
            .map(|(i, &off)| IdxEntry::new(i as u32, off))
            .chain([IdxEntry::terminator()]),
    );
    seq.kick();
    let reqs = drain(&mut seq, 1000);

    assert_eq!(reqs.len(), idxs.len());
    for (req, (i, &off)) in reqs.iter().zip(idxs.iter().enumerate()) {
        let addr = 0x1000 + (off << 2);
        let baddr = addr & !63;
        assert_eq!(req.addr, baddr);
        assert_eq!(req.wordmask, 1 << ((addr ^ baddr) >> 2), "mask for index {off:#x}");
        assert_eq!(req.wordmask.count_ones(), 1);
        // The single selected word steers to the index's CAM column.
        let word = req.wordmask.trailing_zeros() as usize;
        assert_eq!(req.reg_offset[word].lane, i as u32);
    }
    assert!(reqs.last().unwrap().last);
}

#[test]
#[should_panic(expected = "invalid stride descriptor")]
fn zero_period_descriptor_is_fatal() {
    let desc = StrideDescriptor {
        addr: 0,
        words: 4,
        period: 0,
        period_count: 1,
        dst: RequestTarget::new(0, ReqDest::Sp),
        dst_period: 4,
        ..Default::default()
    };

    let mut seq = StrideSequencer::new();
    seq.push_descriptor(desc);
    seq.kick();
    for cycle in 0..10 {
        seq.tick(&SeqIn { req_free: BURSTREQ_FIFO_DEPTH, cycle, ..Default::default() });
    }
}
