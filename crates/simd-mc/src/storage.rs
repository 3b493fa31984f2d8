//! Sparse DRAM storage back-end.
//!
//! The timing model needs no data, but the simulation does. Kernel
//! footprints can reach gigabytes while touching a small fraction, so
//! rows are allocated on demand in a hash map keyed by `(bank, row)`.
//! Each row is a dense array of 32-bit words.

use std::collections::HashMap;

use simd_model::{DRAM_COLS, MC_BUS_WIDTH};

/// Words stored per row: each column holds `MC_BUS_WIDTH / 8` words of
/// the 64-bit data bus.
const ROW_WORDS: usize = DRAM_COLS * (MC_BUS_WIDTH / 8);

#[derive(Default)]
pub struct Storage {
    rows: HashMap<(u32, u32), Box<[u32; ROW_WORDS]>>,
}

impl Storage {
    pub fn new() -> Self {
        Storage::default()
    }

    fn offset(col: u32, dq_word: u32) -> usize {
        (col as usize * (MC_BUS_WIDTH / 8)) | dq_word as usize
    }

    /// Read the word at `(bank, row, col)`, sub-word `dq_word` of the
    /// data bus. Unwritten locations read zero.
    pub fn word(&self, bank: u32, row: u32, col: u32, dq_word: u32) -> u32 {
        self.rows
            .get(&(bank, row))
            .map(|r| r[Self::offset(col, dq_word)])
            .unwrap_or(0)
    }

    /// Store a word, allocating the row on first touch.
    pub fn set_word(&mut self, bank: u32, row: u32, col: u32, dq_word: u32, value: u32) {
        let row = self
            .rows
            .entry((bank, row))
            .or_insert_with(|| Box::new([0; ROW_WORDS]));
        row[Self::offset(col, dq_word)] = value;
    }

    /// Number of allocated rows, for footprint checks.
    pub fn allocated_rows(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_allocate_on_demand() {
        let mut st = Storage::new();
        assert_eq!(st.word(3, 1000, 8, 1), 0);
        assert_eq!(st.allocated_rows(), 0);

        st.set_word(3, 1000, 8, 1, 0xdead);
        assert_eq!(st.word(3, 1000, 8, 1), 0xdead);
        assert_eq!(st.allocated_rows(), 1);

        // Distinct banks get distinct rows.
        st.set_word(4, 1000, 8, 1, 0xbeef);
        assert_eq!(st.word(3, 1000, 8, 1), 0xdead);
        assert_eq!(st.allocated_rows(), 2);
    }
}
