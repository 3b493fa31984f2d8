//! Divergent control-flow stack, one per work-group slot.

use simd_model::{vsp, ThreadMask, CSTACK_ENTRIES, THREADS};

/// One divergence entry: the predicate mask to restore, the PC to resume
/// at, and which CMASK the mask belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CstackEntry {
    pub pred_mask: ThreadMask,
    pub pc: u32,
    /// CMASK row this entry restores (`vsp::CTRL_RUN`, `CTRL_BREAK` or
    /// `CTRL_RET`).
    pub mask_type: usize,
}

impl Default for CstackEntry {
    fn default() -> Self {
        CstackEntry {
            pred_mask: ThreadMask::zeroes(THREADS),
            pc: 0,
            mask_type: vsp::CTRL_RUN,
        }
    }
}

impl CstackEntry {
    pub fn new(pred_mask: ThreadMask, pc: u32, mask_type: usize) -> Self {
        CstackEntry { pred_mask, pc, mask_type }
    }
}

/// Per-cycle control stack command.
#[derive(Debug, Clone, Default)]
pub enum CstackAction {
    #[default]
    Idle,
    Push(CstackEntry),
    Pop,
}

/// Bounded per-slot stack of divergence entries.
///
/// Outputs (`top`, `sp`, `full`, `overflow`) are registered: they reflect
/// the state after the most recent [`CtrlStack::tick`]. Push-to-full and
/// pop-from-empty raise `overflow` for one cycle and leave the state
/// unchanged.
pub struct CtrlStack {
    stack: [Vec<CstackEntry>; 2],
    top: CstackEntry,
    sp_out: u32,
    full: bool,
    overflow: bool,
}

impl Default for CtrlStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CtrlStack {
    pub fn new() -> Self {
        CtrlStack {
            stack: [Vec::new(), Vec::new()],
            top: CstackEntry::default(),
            sp_out: 0,
            full: false,
            overflow: false,
        }
    }

    /// Synchronous reset: stack pointers, top and overflow all clear.
    pub fn reset(&mut self) {
        self.stack[0].clear();
        self.stack[1].clear();
        self.top = CstackEntry::default();
        self.sp_out = 0;
        self.full = false;
        self.overflow = false;
    }

    /// Rising-edge update for one slot.
    pub fn tick(&mut self, slot: u8, action: CstackAction) {
        let s = &mut self.stack[slot as usize];

        match action {
            CstackAction::Push(entry) => {
                if s.len() == CSTACK_ENTRIES {
                    self.overflow = true;
                } else {
                    self.overflow = false;
                    s.push(entry);
                }
            }
            CstackAction::Pop => {
                if s.is_empty() {
                    self.overflow = true;
                } else {
                    self.overflow = false;
                    s.pop();
                }
            }
            CstackAction::Idle => self.overflow = false,
        }

        self.sp_out = s.len() as u32;
        self.full = s.len() == CSTACK_ENTRIES;
        self.top = s.last().cloned().unwrap_or_default();

        tracing::trace!(target: "pipe_trace", slot, sp = self.sp_out, "cstack");
    }

    /// Top entry; a zero-initialised entry when the stack is empty.
    pub fn top(&self) -> &CstackEntry {
        &self.top
    }

    pub fn sp(&self) -> u32 {
        self.sp_out
    }

    pub fn full(&self) -> bool {
        self.full
    }

    /// One-cycle flag: the previous operation would have under/overflowed.
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Preload an entry, bypassing the clocked interface. Test aid.
    pub fn debug_push(&mut self, slot: u8, entry: CstackEntry) {
        self.stack[slot as usize].push(entry);
    }
}
