//! Cluster configuration constants.
//!
//! The reference hardware parameterises these at elaboration time; the
//! simulator fixes them here and asserts the power-of-two restrictions the
//! address math relies on.

/// Work-items per work-group slot.
pub const THREADS: usize = 1024;

/// Vector lanes (FPUs) in the execute stage. One warp is `FPUS` threads.
pub const FPUS: usize = 128;

/// Reciprocal/transcendental units. Sub-warps of `RCPUS` threads serialise
/// onto them.
pub const RCPUS: usize = 32;

/// Warps per work-group.
pub const COLS: usize = THREADS / FPUS;

/// Instruction memory capacity, in instructions.
pub const IMEM_INSNS: usize = 2048;

/// Control stack depth, entries per work-group slot.
pub const CSTACK_ENTRIES: usize = 16;

/// Number of 32-bit words transferred per DRAM burst.
pub const MC_BUS_WIDTH: usize = 16;

/// Words on the scratchpad data bus per cycle.
pub const SP_BUS_WIDTH: usize = 4;

/// DRAM organisation.
pub const DRAM_BANKS: usize = 8;
pub const DRAM_ROWS: usize = 65536;
pub const DRAM_COLS: usize = 1024;

/// Depth of the burst-request FIFO between stride sequencer and command
/// generator.
pub const BURSTREQ_FIFO_DEPTH: usize = 16;

/// Maximum number of buffers that can be bound to a kernel.
pub const BIND_BUFS: usize = 32;

/// Scratchpad capacity per work-group slot, in bytes.
pub const SP_BYTES: usize = 131072;

/// Rows per general-purpose register kind.
pub const REG_ROWS: usize = 64;

/// Predicate register rows.
pub const PR_ROWS: usize = 8;

/// Scoreboard capacity per cluster.
pub const SCOREBOARD_MAX: usize = 32;

const _: () = assert!(THREADS.is_power_of_two());
const _: () = assert!(FPUS.is_power_of_two());
const _: () = assert!(RCPUS.is_power_of_two());
const _: () = assert!(IMEM_INSNS.is_power_of_two());
const _: () = assert!(MC_BUS_WIDTH == 16);
const _: () = assert!(SP_BUS_WIDTH.is_power_of_two() && SP_BUS_WIDTH >= MC_BUS_WIDTH / 4);
const _: () = assert!(DRAM_BANKS.is_power_of_two());
const _: () = assert!(DRAM_ROWS.is_power_of_two());
const _: () = assert!(DRAM_COLS.is_power_of_two());
const _: () = assert!(SP_BYTES.is_power_of_two());
