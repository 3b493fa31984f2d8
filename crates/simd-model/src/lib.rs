//! Shared value types for the Sim-D cluster model.
//!
//! Everything that crosses a subsystem boundary lives here: register
//! identity, request targets, stride descriptors, thread masks and the
//! generic ringbuffer used to model pipelines of configurable depth.

mod buffer;
mod config;
mod mask;
mod port;
mod reg;
mod ringbuffer;
mod stride;
mod target;
mod width;

pub use buffer::Buffer;
pub use port::MemDataPort;
pub use config::*;
pub use mask::ThreadMask;
pub use reg::{ssp, vsp, Reg, RegKind, SpecialReg, SSP_SPECS, VSP_SPECS};
pub use ringbuffer::Ringbuffer;
pub use stride::{DescriptorError, IdxTransform, StrideDescriptor, StrideKind};
pub use target::{IdxEntry, MemIf, RegOffset, ReqDest, RequestTarget};
pub use width::WorkgroupWidth;
