//! Contiguous block partitioning of the global array across ranks.
//!
//! Every rank builds the same `PartitionMap` from (L, N); there is no
//! authority distributing offsets. The root additionally uses the full
//! count/offset table to drive the variable-count scatter.

use std::ops::Range;

use crate::error::{HyperscanError, Result};

/// How the remainder of `L / N` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PartitionPolicy {
    /// Every rank gets `L / N`; the last rank also absorbs `L % N`.
    Remainder,
    /// `L` must be a multiple of `N`, otherwise the run fails fast.
    Strict,
}

/// Per-rank chunk lengths and starting offsets into the global array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    len: usize,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl PartitionMap {
    /// Build the partition of `len` elements over `num_ranks` ranks.
    ///
    /// Fails when a chunk would be empty (`len < num_ranks`) or, under
    /// `PartitionPolicy::Strict`, when `len` is not a multiple of
    /// `num_ranks`.
    pub fn build(len: usize, num_ranks: usize, policy: PartitionPolicy) -> Result<Self> {
        if num_ranks == 0 {
            return Err(HyperscanError::Config("cannot partition over zero ranks".into()));
        }
        if len < num_ranks {
            return Err(HyperscanError::TooFewElements {
                len,
                ranks: num_ranks,
            });
        }
        let remainder = len % num_ranks;
        if policy == PartitionPolicy::Strict && remainder != 0 {
            return Err(HyperscanError::UnevenPartition {
                len,
                ranks: num_ranks,
            });
        }

        let base = len / num_ranks;
        let mut counts = vec![base; num_ranks];
        counts[num_ranks - 1] += remainder;

        let offsets = counts
            .iter()
            .scan(0usize, |next, &count| {
                let offset = *next;
                *next += count;
                Some(offset)
            })
            .collect();

        Ok(Self {
            len,
            counts,
            offsets,
        })
    }

    /// Total number of elements covered.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_ranks(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    /// Index range of `rank`'s chunk in the global array.
    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = self.offsets[rank];
        start..start + self.counts[rank]
    }

    /// Borrow `rank`'s chunk out of a materialized global array.
    pub fn chunk<'a, T>(&self, global: &'a [T], rank: usize) -> &'a [T] {
        &global[self.range(rank)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_over_four_ranks() {
        let map = PartitionMap::build(8, 4, PartitionPolicy::Strict).unwrap();
        assert_eq!(map.counts(), &[2, 2, 2, 2]);
        assert_eq!(map.offsets(), &[0, 2, 4, 6]);
    }

    #[test]
    fn last_rank_absorbs_remainder() {
        let map = PartitionMap::build(8, 3, PartitionPolicy::Remainder).unwrap();
        assert_eq!(map.counts(), &[2, 2, 4]);
        assert_eq!(map.offsets(), &[0, 2, 4]);
        assert_eq!(map.range(2), 4..8);

        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(map.chunk(&data, 2), &[5, 6, 7, 8]);
    }

    #[test]
    fn strict_policy_rejects_uneven_length() {
        let err = PartitionMap::build(10, 4, PartitionPolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            HyperscanError::UnevenPartition { len: 10, ranks: 4 }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_fewer_elements_than_ranks() {
        let err = PartitionMap::build(3, 4, PartitionPolicy::Remainder).unwrap_err();
        assert!(matches!(err, HyperscanError::TooFewElements { .. }));
    }

    #[test]
    fn single_rank_owns_everything() {
        let map = PartitionMap::build(5, 1, PartitionPolicy::Strict).unwrap();
        assert_eq!(map.counts(), &[5]);
        assert_eq!(map.range(0), 0..5);
        assert_eq!(map.len(), 5);
        assert!(!map.is_empty());
    }

    #[test]
    fn chunks_are_contiguous_and_cover_array() {
        for ranks in 1..=9 {
            for len in ranks..ranks * 4 {
                let map = PartitionMap::build(len, ranks, PartitionPolicy::Remainder).unwrap();
                let mut next = 0;
                for rank in 0..ranks {
                    let range = map.range(rank);
                    assert_eq!(range.start, next);
                    assert!(!range.is_empty());
                    next = range.end;
                }
                assert_eq!(next, len);
                assert_eq!(map.counts().iter().sum::<usize>(), len);
            }
        }
    }
}
