//! Work scheduler: partitions the kernel's (X, Y) index space into
//! work-groups and feeds them to the cluster slots.

use std::collections::VecDeque;

use simd_compute::Workgroup;
use simd_model::{WorkgroupWidth, THREADS};

pub struct WorkScheduler {
    queue: VecDeque<Workgroup>,
    pub width: WorkgroupWidth,
    dispatched: u64,
}

impl WorkScheduler {
    /// Partition `dims` into work-groups of `width` threads (X) by
    /// `THREADS / width` rows (Y).
    pub fn new(dims: [u32; 2], width: WorkgroupWidth) -> Self {
        let w = width.threads();
        let rows = (THREADS as u32 / w).max(1);

        let n_x = dims[0].div_ceil(w).max(1);
        let n_y = dims[1].max(1).div_ceil(rows);

        let mut queue = VecDeque::new();
        for y in 0..n_y {
            for x in 0..n_x {
                queue.push_back(Workgroup { off_x: x, off_y: y * rows, width });
            }
        }

        WorkScheduler { queue, width, dispatched: 0 }
    }

    /// Derive the width from the kernel's X dimension when none is
    /// forced on the command line.
    pub fn derive_width(dims: [u32; 2]) -> WorkgroupWidth {
        WorkgroupWidth::for_threads(dims[0].min(THREADS as u32))
    }

    pub fn next(&mut self) -> Option<Workgroup> {
        let wg = self.queue.pop_front();
        if wg.is_some() {
            self.dispatched += 1;
        }
        wg
    }

    pub fn exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_small_workgroup() {
        let mut ws = WorkScheduler::new([128, 1], WorkgroupWidth::W128);
        let wg = ws.next().unwrap();
        assert_eq!((wg.off_x, wg.off_y), (0, 0));
        assert!(ws.next().is_none());
        assert!(ws.exhausted());
    }

    #[test]
    fn wide_kernel_splits_in_x_and_y() {
        // 512 wide at width 256 -> 2 groups per row band; 1024/256 = 4
        // rows per group, 8 rows total -> 2 bands.
        let mut ws = WorkScheduler::new([512, 8], WorkgroupWidth::W256);
        let mut wgs = Vec::new();
        while let Some(wg) = ws.next() {
            wgs.push((wg.off_x, wg.off_y));
        }
        assert_eq!(wgs, vec![(0, 0), (1, 0), (0, 4), (1, 4)]);
    }

    #[test]
    fn width_derivation() {
        assert_eq!(WorkScheduler::derive_width([128, 1]), WorkgroupWidth::W128);
        assert_eq!(WorkScheduler::derive_width([2000, 1]), WorkgroupWidth::W1024);
        assert_eq!(WorkScheduler::derive_width([16, 1]), WorkgroupWidth::W32);
    }
}
