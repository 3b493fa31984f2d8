//! Scheduler options.

use bitflags::bitflags;

bitflags! {
    /// Real-time scheduling options, toggled from the command line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SchedOpts: u8 {
        /// Treat the DRAM and scratchpad front-ends as one resource
        /// guarded by a ticket lock.
        const NO_PARALLEL_DRAM_SP = 1 << 0;
        /// Stop the simulation once every work-group has finished.
        const STOP_SIM_FINI = 1 << 1;
        /// Stop the simulation once the DRAM front-end drains.
        const STOP_DRAM_FINI = 1 << 2;
    }
}

impl SchedOpts {
    /// Command-line spellings, with descriptions for the help text.
    pub const NAMES: &'static [(&'static str, SchedOpts, &'static str)] = &[
        (
            "no_parallel_dram_sp",
            SchedOpts::NO_PARALLEL_DRAM_SP,
            "Serialise DRAM and scratchpad requests in ticket order.",
        ),
        (
            "stop_sim_fini",
            SchedOpts::STOP_SIM_FINI,
            "Stop the simulation when all work-groups finish (default).",
        ),
        (
            "stop_dram_fini",
            SchedOpts::STOP_DRAM_FINI,
            "Stop the simulation when the DRAM front-end drains.",
        ),
    ];

    pub fn by_name(name: &str) -> Option<SchedOpts> {
        Self::NAMES.iter().find(|(n, _, _)| *n == name).map(|(_, f, _)| *f)
    }
}

/// Debug output categories and the tracing targets they map to.
pub const DEBUG_CATEGORIES: &[(&str, &str)] = &[
    ("mc_cmd", "Print every emitted DRAM command."),
    ("mc_stats", "Print DRAM statistics at the end of execution."),
    ("mem_fe", "Print emitted DRAM requests and latency."),
    ("pipe_trace", "Print an exhaustive trace of every pipeline state."),
    ("pipe_stalls", "Print each instruction that stalls in decode."),
    ("pipe_wg_status", "Print the work-group status every cycle."),
    ("pipe_wg_dist", "Print work-group distribution events."),
    ("prg", "Print the parsed program."),
];
