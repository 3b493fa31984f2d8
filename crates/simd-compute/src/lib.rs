//! Compute control pipeline of one SIMD cluster.
//!
//! Fetch, decode (single-stage or three-stage), a scoreboard for RAW and
//! structural hazards, a configurable-depth execute pipeline, a divergent
//! control-flow stack, the register file and the per-slot work-group state
//! machine.

mod cluster;
mod cstack;
mod idecode;
mod iexecute;
mod regfile;
mod scoreboard;
mod stats;
mod wg;

pub use cluster::{ClusterMemOut, DecodeImpl, SimdCluster};
pub use cstack::{CstackAction, CstackEntry, CtrlStack};
pub use idecode::{Decode1S, Decode3S, DecodeIn, DecodeOut, IDecode, RegReadReq};
pub use iexecute::{ExecIn, ExecOut, IExecute, PrintKind};
pub use regfile::RegFile;
pub use scoreboard::{Scoreboard, ScoreboardTick};
pub use stats::ComputeStats;
pub use wg::{Workgroup, WorkgroupState};
