use simd_compute::{CstackAction, CstackEntry, CtrlStack};
use simd_model::{vsp, ThreadMask, CSTACK_ENTRIES, THREADS};

fn entry(mask: u64, pc: u32, mask_type: usize) -> CstackEntry {
    CstackEntry::new(ThreadMask::from_u64(THREADS, mask), pc, mask_type)
}

#[test]
fn push_pop_in_reverse_order() {
    let mut cs = CtrlStack::new();

    let entries = [
        entry(0xff, 16, vsp::CTRL_RUN),
        entry(0x0010_2030, 32, vsp::CTRL_RUN),
        entry(0xdead_beef, 3, vsp::CTRL_RET),
    ];

    for (i, e) in entries.iter().enumerate() {
        cs.tick(0, CstackAction::Push(e.clone()));
        assert_eq!(cs.sp(), i as u32 + 1);
        assert!(!cs.overflow());
    }

    assert_eq!(cs.top(), &entries[2]);

    for (i, e) in entries.iter().enumerate().rev() {
        assert_eq!(cs.top(), e);
        cs.tick(0, CstackAction::Pop);
        assert_eq!(cs.sp(), i as u32);
        assert!(!cs.overflow());
    }

    // A fourth pop underflows; state is unchanged.
    cs.tick(0, CstackAction::Pop);
    assert!(cs.overflow());
    assert_eq!(cs.sp(), 0);

    // The flag clears on the next idle cycle.
    cs.tick(0, CstackAction::Idle);
    assert!(!cs.overflow());
}

#[test]
fn empty_top_is_zero_initialised() {
    let mut cs = CtrlStack::new();
    cs.tick(0, CstackAction::Idle);
    assert_eq!(cs.top(), &CstackEntry::default());
    assert!(!cs.top().pred_mask.any());
}

#[test]
fn push_to_full_overflows() {
    let mut cs = CtrlStack::new();

    for i in 0..CSTACK_ENTRIES {
        cs.tick(1, CstackAction::Push(entry(1 << i, i as u32, vsp::CTRL_RUN)));
        assert!(!cs.overflow());
    }
    assert!(cs.full());

    cs.tick(1, CstackAction::Push(entry(0, 99, vsp::CTRL_RUN)));
    assert!(cs.overflow());
    assert_eq!(cs.sp(), CSTACK_ENTRIES as u32);
    // The rejected entry is not on the stack.
    assert_eq!(cs.top().pc, CSTACK_ENTRIES as u32 - 1);
}

#[test]
fn slots_are_independent() {
    let mut cs = CtrlStack::new();

    cs.tick(0, CstackAction::Push(entry(0x1, 1, vsp::CTRL_RUN)));
    cs.tick(1, CstackAction::Push(entry(0x2, 2, vsp::CTRL_BREAK)));

    cs.tick(0, CstackAction::Idle);
    assert_eq!(cs.top().pc, 1);
    cs.tick(1, CstackAction::Idle);
    assert_eq!(cs.top().pc, 2);

    cs.reset();
    assert_eq!(cs.sp(), 0);
    assert!(!cs.overflow());
}
