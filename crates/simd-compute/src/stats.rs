//! Compute pipeline statistics.

use simd_isa::Category;

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default)]
pub struct ComputeStats {
    /// Fetch stalls caused by RAW hazards.
    pub raw_stalls: u64,
    /// Fetch stalls caused by register-file bank conflicts.
    pub rf_bank_conflict_stalls: u64,
    /// Fetch stalls caused by a busy resource (integer divider).
    pub resource_busy_stalls: u64,
    /// Committed vector sub-instructions per category.
    pub commit_vec: [u64; Category::COUNT],
    /// Committed scalar instructions per category.
    pub commit_sc: [u64; Category::COUNT],
    /// NOPs and pipeline bubbles committed.
    pub commit_nop: u64,
    /// Highest simultaneous scoreboard occupancy.
    pub sb_max_entries: u64,
    /// Simulated execution time in compute cycles.
    pub exec_time: u64,
}

impl std::fmt::Display for ComputeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Compute stats ===")?;
        writeln!(f, "Execution time (cycles): {:>10}", self.exec_time)?;
        writeln!(f, "RAW stalls             : {:>10}", self.raw_stalls)?;
        writeln!(f, "RF bank conflict stalls: {:>10}", self.rf_bank_conflict_stalls)?;
        writeln!(f, "Resource busy stalls   : {:>10}", self.resource_busy_stalls)?;
        writeln!(f, "Committed NOPs/bubbles : {:>10}", self.commit_nop)?;
        writeln!(f, "Max scoreboard entries : {:>10}", self.sb_max_entries)?;
        for (i, name) in [
            Category::ArithFp,
            Category::ArithRcpu,
            Category::ArithInt,
            Category::DataCopy,
            Category::LdSt,
            Category::CtrlFlow,
            Category::Predicate,
            Category::Debug,
        ]
        .iter()
        .map(|c| (*c as usize, c.name()))
        {
            writeln!(
                f,
                "{name:<45}: {:>8} vec {:>8} sc",
                self.commit_vec[i], self.commit_sc[i]
            )?;
        }
        Ok(())
    }
}
