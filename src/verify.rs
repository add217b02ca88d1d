//! Sequential oracle and verification of the distributed result.
//!
//! The oracle sees the whole array and is only scaffolding for checking;
//! the distributed path never consults it.

use crate::partition::PartitionMap;
use crate::reduce::local_inclusive_scan;

/// Which rank reports the verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReporterRank {
    /// Rank 0.
    First,
    /// Rank N-1.
    Last,
}

impl ReporterRank {
    pub fn resolve(self, num_ranks: usize) -> usize {
        match self {
            ReporterRank::First => 0,
            ReporterRank::Last => num_ranks.saturating_sub(1),
        }
    }
}

/// Sequential inclusive scan of the full array.
#[derive(Debug, Clone)]
pub struct Oracle {
    prefixes: Vec<i64>,
}

impl Oracle {
    pub fn new(global: &[i64]) -> Self {
        Self {
            prefixes: local_inclusive_scan(global, 0),
        }
    }

    /// Sum of the whole array.
    pub fn total(&self) -> i64 {
        self.prefixes.last().copied().unwrap_or(0)
    }

    /// Sum of every chunk owned by ranks `0..=rank`.
    pub fn rank_prefix(&self, partition: &PartitionMap, rank: usize) -> i64 {
        let end = partition.range(rank).end;
        if end == 0 {
            0
        } else {
            self.prefixes[end - 1]
        }
    }

    /// Expected per-element prefixes of `rank`'s chunk.
    pub fn chunk_prefixes(&self, partition: &PartitionMap, rank: usize) -> &[i64] {
        &self.prefixes[partition.range(rank)]
    }
}

/// Calculated against independently computed values, as seen by one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub rank: usize,
    pub actual_ranks: usize,
    pub padded_ranks: usize,
    pub calculated_sum: i64,
    pub correct_sum: i64,
    /// `(calculated, correct)` rank prefix, in scan mode.
    pub prefix: Option<(i64, i64)>,
    /// Whether per-element prefixes matched, in scan mode.
    pub elements_match: Option<bool>,
}

impl Verification {
    pub fn sum_matches(&self) -> bool {
        self.calculated_sum == self.correct_sum
    }

    pub fn prefix_matches(&self) -> bool {
        self.prefix.map_or(true, |(calculated, correct)| calculated == correct)
    }

    pub fn is_match(&self) -> bool {
        self.sum_matches() && self.prefix_matches() && self.elements_match.unwrap_or(true)
    }
}

/// Values a rank hands to the verifier.
#[derive(Debug, Clone, Copy)]
pub struct Calculated<'a> {
    pub sum: i64,
    pub prefix_sum: Option<i64>,
    pub element_prefixes: Option<&'a [i64]>,
}

/// Compares one rank's distributed result against the oracle.
pub struct Verifier<'a> {
    oracle: &'a Oracle,
    partition: &'a PartitionMap,
    padded_ranks: usize,
}

impl<'a> Verifier<'a> {
    pub fn new(oracle: &'a Oracle, partition: &'a PartitionMap, padded_ranks: usize) -> Self {
        Self {
            oracle,
            partition,
            padded_ranks,
        }
    }

    pub fn check(&self, rank: usize, calculated: Calculated<'_>) -> Verification {
        let prefix = calculated
            .prefix_sum
            .map(|p| (p, self.oracle.rank_prefix(self.partition, rank)));
        let elements_match = calculated
            .element_prefixes
            .map(|got| got == self.oracle.chunk_prefixes(self.partition, rank));

        let verification = Verification {
            rank,
            actual_ranks: self.partition.num_ranks(),
            padded_ranks: self.padded_ranks,
            calculated_sum: calculated.sum,
            correct_sum: self.oracle.total(),
            prefix,
            elements_match,
        };

        if !verification.is_match() {
            tracing::warn!(
                rank,
                calculated = verification.calculated_sum,
                correct = verification.correct_sum,
                prefix = ?verification.prefix,
                "distributed result does not match sequential oracle"
            );
        }
        verification
    }
}
