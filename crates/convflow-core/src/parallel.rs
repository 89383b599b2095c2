//! Static work partitioning for data-parallel elementwise kernels.
//!
//! `count` elements are split across a fixed number of workers into contiguous, non-overlapping
//! slices whose sizes differ by at most one: the first `count % workers` workers take one extra
//! element.

use std::ops::Range;

/// Worker count used by the elementwise kernels when none is configured
pub const DEFAULT_WORKERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    count: usize,
    workers: usize,
}

impl WorkPartition {
    /// Partition `count` elements across `workers` (at least one) workers
    pub fn new(count: usize, workers: usize) -> Self {
        Self {
            count,
            workers: workers.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Element range owned by `worker`; empty for workers past the end
    pub fn slice(&self, worker: usize) -> Range<usize> {
        if worker >= self.workers {
            return self.count..self.count;
        }
        let base = self.count / self.workers;
        let rem = self.count % self.workers;
        let (len, start) = if worker < rem {
            (base + 1, worker * (base + 1))
        } else {
            (base, rem * (base + 1) + (worker - rem) * base)
        };
        start..start + len
    }

    /// All worker ranges in worker order
    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.workers).map(move |w| self.slice(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_remainder_goes_to_leading_workers() {
        let p = WorkPartition::new(10, 4);
        let slices: Vec<_> = p.iter().collect();
        assert_eq!(slices, vec![0..3, 3..6, 6..8, 8..10]);
    }

    #[test]
    fn test_more_workers_than_elements() {
        let p = WorkPartition::new(3, 8);
        assert_eq!(p.slice(2), 2..3);
        assert!(p.slice(3).is_empty());
        assert!(p.slice(7).is_empty());
        assert_eq!(p.slice(3).start, 3);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let p = WorkPartition::new(5, 0);
        assert_eq!(p.workers(), 1);
        assert_eq!(p.slice(0), 0..5);
    }

    proptest! {
        #[test]
        fn prop_slices_tile_the_range(count in 0usize..10_000, workers in 1usize..200) {
            let p = WorkPartition::new(count, workers);
            let mut next = 0;
            for (w, range) in p.iter().enumerate() {
                prop_assert_eq!(range.start, next);
                let expected = count / workers + usize::from(w < count % workers);
                prop_assert_eq!(range.len(), expected);
                next = range.end;
            }
            prop_assert_eq!(next, count);
        }
    }
}
