//! Data-path port between a memory front-end and the register file or a
//! scratchpad.

use crate::{RegOffset, RequestTarget};

/// Sink/source for the words a DQ scheduler moves. Implemented by the
/// machine over the register file and the scratchpads; the target in the
/// reservation selects which one answers.
pub trait MemDataPort {
    /// One beat of load data arriving from the memory.
    fn mem_data_in(
        &mut self,
        target: RequestTarget,
        sp_addr: u32,
        offsets: &[RegOffset],
        data: &[u32],
        mask: &[bool],
    );

    /// Produce one beat of store data for the memory. Returns the data
    /// words and a mask that additionally drops disabled threads.
    fn mem_data_out(
        &mut self,
        target: RequestTarget,
        sp_addr: u32,
        offsets: &[RegOffset],
        mask: &[bool],
    ) -> (Vec<u32>, Vec<bool>);
}
