//! Wire-level records exchanged between the DRAM front-end stages.

use simd_model::{RegOffset, RequestTarget, MC_BUS_WIDTH};

/// Precharge policy hint from the stride sequencer to the command
/// generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrechargePolicy {
    /// Optimised for monotonically increasing addresses.
    #[default]
    Linear,
    /// As late as possible; best for random (indexed) addresses.
    Alap,
}

/// One DRAM-bus-width chunk of a stride.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstRequest {
    /// Start address of the burst, bus-aligned.
    pub addr: u32,
    /// Address of the next burst; `0xffffffff` on the final burst.
    pub addr_next: u32,
    /// Word `i` of the bus participates iff bit `i` is set.
    pub wordmask: u16,
    pub write: bool,
    pub pre_pol: PrechargePolicy,
    pub target: RequestTarget,
    /// Scratchpad byte offset of the first transferred word.
    pub sp_offset: u32,
    /// Destination lane/row per bus word for register targets.
    pub reg_offset: [RegOffset; MC_BUS_WIDTH],
    /// Final burst of the descriptor.
    pub last: bool,
}

impl Default for BurstRequest {
    fn default() -> Self {
        BurstRequest {
            addr: 0,
            addr_next: 0,
            wordmask: 0,
            write: false,
            pre_pol: PrechargePolicy::Linear,
            target: RequestTarget::default(),
            sp_offset: 0,
            reg_offset: [RegOffset::default(); MC_BUS_WIDTH],
            last: false,
        }
    }
}

/// Per-bank command record produced by the command generator.
#[derive(Debug, Clone, PartialEq)]
pub struct DdrCmd {
    pub row: u32,
    pub col: u32,
    /// Precharge the bank before the activate.
    pub pre_pre: bool,
    /// Activate the row before the CAS.
    pub act: bool,
    pub read: bool,
    pub write: bool,
    /// Auto-precharge after the CAS (or a stand-alone precharge when no
    /// CAS bits are set).
    pub pre_post: bool,
    pub wordmask: u16,
    pub sp_offset: u32,
    pub target: RequestTarget,
    pub reg_offset: [RegOffset; MC_BUS_WIDTH],
}

impl Default for DdrCmd {
    fn default() -> Self {
        DdrCmd {
            row: 0,
            col: 0,
            pre_pre: false,
            act: false,
            read: false,
            write: false,
            pre_post: false,
            wordmask: 0,
            sp_offset: 0,
            target: RequestTarget::default(),
            reg_offset: [RegOffset::default(); MC_BUS_WIDTH],
        }
    }
}

impl DdrCmd {
    /// Stand-alone precharge for the paired bank.
    pub fn precharge(target: RequestTarget) -> Self {
        DdrCmd { pre_post: true, target, ..Default::default() }
    }
}

/// A reservation on the data bus: the exact cycle the data phase of an
/// issued CAS begins, plus everything the data-path scheduler needs to
/// steer the words.
#[derive(Debug, Clone, PartialEq)]
pub struct DqReservation {
    pub cycle: u64,
    pub wordmask: u16,
    pub row: u32,
    pub col: u32,
    pub bank: u32,
    pub target: RequestTarget,
    pub reg_offset: [RegOffset; MC_BUS_WIDTH],
    pub write: bool,
    pub sp_offset: u32,
}

impl Default for DqReservation {
    fn default() -> Self {
        DqReservation {
            cycle: 0,
            wordmask: 0,
            row: 0,
            col: 0,
            bank: 0,
            target: RequestTarget::default(),
            reg_offset: [RegOffset::default(); MC_BUS_WIDTH],
            write: false,
            sp_offset: 0,
        }
    }
}

/// Command-arbiter statistics, including a current-profile energy
/// estimate over the command counts.
#[derive(Debug, Clone, Default)]
pub struct CmdArbStats {
    /// Base address; used by stand-alone latency sweeps.
    pub base_addr: u64,
    /// Least-issue delay: earliest cycle with all banks precharged.
    pub lid: u64,
    /// Last data arrival.
    pub lda: u64,
    pub act_c: u64,
    pub pre_c: u64,
    pub cas_c: u64,
    pub ref_c: u64,
    pub bytes: u64,
    /// Data-bus utilisation in percent.
    pub dq_util: f64,
    /// Total energy in picojoules.
    pub energy_pj: f64,
    /// Average power in milliwatts.
    pub power_mw: f64,
}

impl std::fmt::Display for CmdArbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stats (Base addr: {:#x}) ===", self.base_addr)?;
        writeln!(f, "Bytes transferred    : {:>10} ({:.2}%)", self.bytes, self.dq_util)?;
        writeln!(f, "Latest data arrival  : {:>10}", self.lda)?;
        writeln!(f, "Least-issue delay    : {:>10}", self.lid)?;
        writeln!(f, "# Read/write ops     : {:>10}", self.cas_c)?;
        writeln!(f, "# Activate ops       : {:>10}", self.act_c)?;
        writeln!(f, "# Explicit PRE ops   : {:>10}", self.pre_c)?;
        writeln!(f, "# Refresh ops        : {:>10}", self.ref_c)?;
        writeln!(f, "Total energy (pJ)    : {:>10.1}", self.energy_pj)?;
        writeln!(f, "Average power (mW)   : {:>10.2}", self.power_mw)
    }
}
