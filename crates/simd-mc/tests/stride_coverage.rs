//! Property test: for any STRIDE descriptor, the emitted bursts cover
//! exactly the addresses selected by the period/words pattern, in
//! monotonically non-decreasing order, with no duplicates.

use proptest::prelude::*;

use simd_mc::{SeqIn, StrideSequencer};
use simd_model::{ReqDest, RequestTarget, StrideDescriptor, BURSTREQ_FIFO_DEPTH};

fn covered_addresses(desc: &StrideDescriptor) -> Vec<u32> {
    let end = desc.addr + ((desc.words + desc.period * (desc.period_count - 1)) << 2);
    (0..)
        .map(|w| desc.addr + (w << 2))
        .take_while(|&a| a < end)
        .filter(|&a| ((a - desc.addr) >> 2) % desc.period < desc.words)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stride_bursts_cover_pattern_exactly(
        addr_words in 0u32..64,
        words in 1u32..40,
        extra_period in 0u32..80,
        period_count in 1u32..8,
    ) {
        let period = words + extra_period;
        let desc = StrideDescriptor {
            addr: 0x4000 + (addr_words << 2),
            words,
            period,
            period_count,
            dst: RequestTarget::new(0, ReqDest::Sp),
            // Contiguous destination sidesteps the scratchpad period
            // restriction; coverage is about the source side.
            dst_period: words,
            ..Default::default()
        };

        let expected = covered_addresses(&desc);

        let mut seq = StrideSequencer::new();
        seq.push_descriptor(desc);
        seq.kick();

        let mut got = Vec::new();
        let mut last_addr = None;
        for cycle in 0..100_000u64 {
            let out = seq.tick(&SeqIn {
                req_free: BURSTREQ_FIFO_DEPTH,
                cycle,
                ..Default::default()
            });
            if let Some(req) = out.req {
                // Burst addresses are monotonically non-decreasing.
                if let Some(prev) = last_addr {
                    prop_assert!(req.addr > prev, "bursts out of order");
                }
                last_addr = Some(req.addr);

                for lane in 0..16u32 {
                    if req.wordmask & (1 << lane) != 0 {
                        got.push(req.addr + (lane << 2));
                    }
                }

                if req.last {
                    break;
                }
            }
        }

        prop_assert_eq!(got, expected);
    }
}
