//! DRAM memory front-end.
//!
//! Stride sequencer, per-bank command generator, DDR4 command arbiter
//! with a JEDEC timing model, DQ data-path scheduler and the sparse
//! storage back-end.

mod cmdarb;
mod cmdgen;
mod dq;
mod model;
mod sequencer;
mod storage;
mod timing;

pub use cmdarb::{ArbOut, CmdArb, CMD_FIFO_DEPTH};
pub use cmdgen::{address_translate, CmdGen};
pub use dq::Dq;
pub use model::{BurstRequest, CmdArbStats, DdrCmd, DqReservation, PrechargePolicy};
pub use sequencer::{SeqIn, SeqOut, StrideSequencer};
pub use storage::Storage;
pub use timing::{
    timing_for, DdrCommand, DramTiming, TimingState, UnknownOrganisation, DDR4_1866M_8GB_X16,
    DDR4_3200AA_8GB_X16, DDR4_3200AA_8GB_X8,
};
