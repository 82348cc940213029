//! Partition planner: balanced striping of rows or columns across ranks.
//!
//! Each rank owns one contiguous slab. The first `length % size` ranks
//! receive `⌈length/size⌉` items, the rest `⌊length/size⌋`, so the largest
//! and smallest counts differ by at most one.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Per-rank counts and exclusive-prefix-sum displacements for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    counts: Vec<usize>,
    displacements: Vec<usize>,
}

impl PartitionPlan {
    /// Plan `length` items over `size` ranks.
    ///
    /// # Panics
    /// Panics if `size` is zero; a world without ranks is a programming
    /// error, not a recoverable condition.
    pub fn new(length: usize, size: usize) -> PartitionPlan {
        assert!(size > 0, "partition plan requires at least one rank");

        let base = length / size;
        let remainder = length % size;
        let mut counts = vec![base; size];
        let mut displacements = vec![0; size];

        for rank in 0..size {
            if rank < remainder {
                counts[rank] += 1;
                displacements[rank] = rank * (base + 1);
            } else {
                displacements[rank] = rank * base + remainder;
            }
        }

        PartitionPlan {
            counts,
            displacements,
        }
    }

    /// Number of ranks in the plan.
    pub fn size(&self) -> usize {
        self.counts.len()
    }

    /// Items owned by `rank`.
    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// First item owned by `rank`.
    pub fn offset(&self, rank: usize) -> usize {
        self.displacements[rank]
    }

    /// The contiguous index range owned by `rank`.
    pub fn slab(&self, rank: usize) -> Range<usize> {
        let start = self.displacements[rank];
        start..start + self.counts[rank]
    }

    /// Total number of items across all ranks.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let plan = PartitionPlan::new(12, 4);
        assert_eq!((0..4).map(|r| plan.count(r)).collect::<Vec<_>>(), [3, 3, 3, 3]);
        assert_eq!(
            (0..4).map(|r| plan.offset(r)).collect::<Vec<_>>(),
            [0, 3, 6, 9]
        );
    }

    #[test]
    fn test_remainder_goes_to_leading_ranks() {
        let plan = PartitionPlan::new(10, 3);
        assert_eq!((0..3).map(|r| plan.count(r)).collect::<Vec<_>>(), [4, 3, 3]);
        assert_eq!((0..3).map(|r| plan.offset(r)).collect::<Vec<_>>(), [0, 4, 7]);
    }

    #[test]
    fn test_counts_sum_to_length() {
        for length in 0..40 {
            for size in 1..9 {
                let plan = PartitionPlan::new(length, size);
                assert_eq!(plan.total(), length, "length={} size={}", length, size);
            }
        }
    }

    #[test]
    fn test_displacements_are_exclusive_prefix_sums() {
        for length in 0..40 {
            for size in 1..9 {
                let plan = PartitionPlan::new(length, size);
                let mut acc = 0;
                for rank in 0..size {
                    assert_eq!(plan.offset(rank), acc);
                    acc += plan.count(rank);
                }
            }
        }
    }

    #[test]
    fn test_balance_within_one() {
        for length in 0..64 {
            for size in 1..11 {
                let plan = PartitionPlan::new(length, size);
                let max = (0..size).map(|r| plan.count(r)).max().unwrap();
                let min = (0..size).map(|r| plan.count(r)).min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_more_ranks_than_items() {
        let plan = PartitionPlan::new(2, 5);
        assert_eq!(
            (0..5).map(|r| plan.count(r)).collect::<Vec<_>>(),
            [1, 1, 0, 0, 0]
        );
        assert!(plan.slab(4).is_empty());
    }

    #[test]
    fn test_slab_ranges_are_contiguous_and_disjoint() {
        let plan = PartitionPlan::new(17, 4);
        let mut covered = Vec::new();
        for rank in 0..4 {
            covered.extend(plan.slab(rank));
        }
        assert_eq!(covered, (0..17).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "at least one rank")]
    fn test_zero_ranks_panics() {
        PartitionPlan::new(10, 0);
    }
}
