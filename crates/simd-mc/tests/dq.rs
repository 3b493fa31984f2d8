//! DQ scheduler: beat replay, storage writes and the two-cycle write
//! pipeline.

use simd_mc::{Dq, DqReservation};
use simd_model::MemDataPort;
use simd_model::{RegOffset, ReqDest, RequestTarget, MC_BUS_WIDTH};

/// Records traffic and serves canned store data.
#[derive(Default)]
struct RecordingClient {
    reads: Vec<(u32, Vec<u32>, Vec<u32>)>,
    store_data: u32,
}

impl MemDataPort for RecordingClient {
    fn mem_data_in(
        &mut self,
        _target: RequestTarget,
        sp_addr: u32,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    ) {
        let lanes = offsets
            .iter()
            .zip(mask)
            .filter(|(_, m)| **m)
            .map(|(o, _)| o.lane)
            .collect();
        let words = data
            .iter()
            .zip(mask)
            .filter(|(_, m)| **m)
            .map(|(d, _)| *d)
            .collect();
        self.reads.push((sp_addr, lanes, words));
    }

    fn mem_data_out(
        &mut self,
        _target: RequestTarget,
        _sp_addr: u32,
        _offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>) {
        let data = mask.iter().map(|_| self.store_data).collect();
        (data, mask.to_vec())
    }
}

fn reservation(write: bool, cycle: u64, wordmask: u16) -> DqReservation {
    let mut reg_offset = [RegOffset::default(); MC_BUS_WIDTH];
    for (i, ro) in reg_offset.iter_mut().enumerate() {
        *ro = RegOffset::new(i as u32, 0);
    }
    DqReservation {
        cycle,
        wordmask,
        row: 7,
        col: 0,
        bank: 2,
        target: RequestTarget::new(0, ReqDest::Reg),
        reg_offset,
        write,
        sp_offset: 0,
    }
}

#[test]
fn read_replays_four_beats_at_reserved_cycle() {
    let mut dq = Dq::new();
    let mut client = RecordingClient::default();

    // Preload one burst's worth of distinct words.
    for w in 0..MC_BUS_WIDTH as u32 {
        dq.storage_mut().set_word(2, 7, w >> 1, w & 1, 0x100 + w);
    }

    dq.push(reservation(false, 5, 0xffff));

    for cycle in 0..20 {
        dq.tick(cycle, &mut client);
    }

    // Four beats of four words each, none before the reserved cycle.
    assert_eq!(client.reads.len(), 4);
    for (beat, (_, lanes, words)) in client.reads.iter().enumerate() {
        assert_eq!(lanes.len(), 4);
        for (i, (lane, word)) in lanes.iter().zip(words).enumerate() {
            let w = (beat * 4 + i) as u32;
            assert_eq!(*lane, w);
            assert_eq!(*word, 0x100 + w);
        }
    }
}

#[test]
fn sparse_wordmask_skips_beats() {
    let mut dq = Dq::new();
    let mut client = RecordingClient::default();

    // Only words 0 and 13 participate: beats 1 and 2 are empty.
    dq.push(reservation(false, 0, (1 << 0) | (1 << 13)));
    for cycle in 0..10 {
        dq.tick(cycle, &mut client);
    }

    assert_eq!(client.reads.len(), 2);
    assert_eq!(client.reads[0].1, vec![0]);
    assert_eq!(client.reads[1].1, vec![13]);
}

#[test]
fn write_lands_in_storage_after_two_cycles() {
    let mut dq = Dq::new();
    let mut client = RecordingClient { store_data: 0xabcd, ..Default::default() };

    dq.push(reservation(true, 0, 0x0001));
    dq.tick(0, &mut client);

    // The data is in flight for two cycles before reaching the array.
    assert_eq!(dq.storage().word(2, 7, 0, 0), 0);
    dq.tick(1, &mut client);
    assert_eq!(dq.storage().word(2, 7, 0, 0), 0);
    dq.tick(2, &mut client);
    assert_eq!(dq.storage().word(2, 7, 0, 0), 0xabcd);
}

#[test]
fn thread_mask_drops_disabled_stores() {
    struct HalfMask;
    impl MemDataPort for HalfMask {
        fn mem_data_in(&mut self, _: RequestTarget, _: u32, _: &[RegOffset], _: &[u32], _: &[bool]) {
            unreachable!();
        }
        fn mem_data_out(
            &mut self,
            _: RequestTarget,
            _: u32,
            _: &[RegOffset],
            mask: &[bool],
        ) -> (Vec<u32>, Vec<bool>) {
            // Word 1 belongs to a disabled thread.
            let mut m = mask.to_vec();
            m[1] = false;
            (vec![7; mask.len()], m)
        }
    }

    let mut dq = Dq::new();
    dq.push(reservation(true, 0, 0x0003));
    for cycle in 0..6 {
        dq.tick(cycle, &mut HalfMask);
    }

    assert_eq!(dq.storage().word(2, 7, 0, 0), 7);
    assert_eq!(dq.storage().word(2, 7, 0, 1), 0);
}
