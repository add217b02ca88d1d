//! Hypercube round planning and padding for non-power-of-two groups.
//!
//! The group is embedded in the smallest hypercube of `padded_size(n)`
//! vertices. Vertices at or above `n` are never contacted: a rank whose
//! round partner is fictitious skips the exchange for that round, but still
//! joins the round barrier.

use std::ops::Range;

use crate::error::{HyperscanError, Result};

/// What a rank does when its round partner lies outside the real group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PaddingPolicy {
    /// No padding: the group size must be a power of two.
    None,
    /// Skip the round; `sum` and `prefix_sum` stay unchanged.
    Skip,
    /// Skip the exchange, but receive the missing sub-cube total from the
    /// lowest real rank of the partner's sub-cube.
    Backfill,
}

/// Smallest power of two that is `>= n`.
pub fn padded_size(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Number of exchange rounds, `ceil(log2(n))`.
pub fn dimension(n: usize) -> u32 {
    padded_size(n).trailing_zeros()
}

/// The communication partner of a rank in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Pairwise exchange with a real rank.
    Exchange { partner: usize },
    /// Partner id is outside the group. `donor` is set when the padding
    /// policy backfills and some real rank holds the missing sub-cube total.
    Skip { partner: usize, donor: Option<usize> },
}

/// One rank's plan for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    pub round: u32,
    pub link: Link,
    /// Skipped ranks this rank forwards its pre-round `sum` to.
    pub backfill_targets: Range<usize>,
}

impl RoundPlan {
    pub fn is_skip(&self) -> bool {
        matches!(self.link, Link::Skip { .. })
    }
}

/// Hypercube embedding of a process group of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hypercube {
    size: usize,
    padding: PaddingPolicy,
}

impl Hypercube {
    pub fn new(size: usize, padding: PaddingPolicy) -> Result<Self> {
        if size == 0 {
            return Err(HyperscanError::Config("process group is empty".into()));
        }
        if padding == PaddingPolicy::None && !size.is_power_of_two() {
            return Err(HyperscanError::NotPowerOfTwo(size));
        }
        Ok(Self { size, padding })
    }

    /// Real group size N.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn padded_size(&self) -> usize {
        padded_size(self.size)
    }

    pub fn dimension(&self) -> u32 {
        dimension(self.size)
    }

    /// Plan for `rank` in `round`.
    pub fn plan(&self, rank: usize, round: u32) -> RoundPlan {
        let mask = 1usize << round;
        let partner = rank ^ mask;

        let link = if partner < self.size {
            Link::Exchange { partner }
        } else {
            // The partner's sub-cube shares every bit of `partner` above
            // `round`; its lowest vertex is the only candidate donor.
            let base = partner & !(mask - 1);
            let backfills = self.padding == PaddingPolicy::Backfill;
            let donor = (backfills && base < self.size).then_some(base);
            Link::Skip { partner, donor }
        };

        RoundPlan {
            round,
            link,
            backfill_targets: self.backfill_targets(rank, mask),
        }
    }

    /// Full plan for `rank`, one entry per round.
    pub fn plans(&self, rank: usize) -> Vec<RoundPlan> {
        (0..self.dimension()).map(|round| self.plan(rank, round)).collect()
    }

    /// Number of (rank, round) pairs that skip, across the whole group.
    pub fn skip_events(&self) -> usize {
        (0..self.size)
            .flat_map(|rank| (0..self.dimension()).map(move |round| (rank, round)))
            .filter(|&(rank, round)| self.plan(rank, round).is_skip())
            .count()
    }

    // A donor is the lowest vertex of its sub-cube with bit `mask` set. Its
    // targets are the ranks of the opposite sub-cube whose partner is
    // fictitious.
    fn backfill_targets(&self, rank: usize, mask: usize) -> Range<usize> {
        let empty = rank..rank;
        if self.padding != PaddingPolicy::Backfill
            || rank & mask == 0
            || rank & (mask - 1) != 0
            || rank + mask <= self.size
        {
            return empty;
        }
        let opposite = rank - mask;
        opposite.max(self.size - mask)..rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_size_and_dimension() {
        let cases = [
            (1, 1, 0),
            (2, 2, 1),
            (3, 4, 2),
            (4, 4, 2),
            (5, 8, 3),
            (7, 8, 3),
            (8, 8, 3),
            (9, 16, 4),
        ];
        for (n, padded, dim) in cases {
            assert_eq!(padded_size(n), padded, "padded_size({n})");
            assert_eq!(dimension(n), dim, "dimension({n})");
        }
    }

    #[test]
    fn power_of_two_never_skips() {
        for n in [1, 2, 4, 8, 16] {
            for padding in [PaddingPolicy::None, PaddingPolicy::Skip, PaddingPolicy::Backfill] {
                let cube = Hypercube::new(n, padding).unwrap();
                assert_eq!(cube.skip_events(), 0);
                for rank in 0..n {
                    assert!(cube.plans(rank).iter().all(|p| p.backfill_targets.is_empty()));
                }
            }
        }
    }

    #[test]
    fn unpadded_rejects_non_power_of_two() {
        assert!(matches!(
            Hypercube::new(6, PaddingPolicy::None),
            Err(HyperscanError::NotPowerOfTwo(6))
        ));
        assert!(Hypercube::new(0, PaddingPolicy::Skip).is_err());
    }

    #[test]
    fn three_ranks_plan() {
        let cube = Hypercube::new(3, PaddingPolicy::Backfill).unwrap();

        assert_eq!(cube.plan(2, 0).link, Link::Skip { partner: 3, donor: None });
        assert_eq!(cube.plan(1, 1).link, Link::Skip { partner: 3, donor: Some(2) });
        assert_eq!(cube.plan(0, 1).link, Link::Exchange { partner: 2 });
        assert_eq!(cube.plan(2, 1).backfill_targets, 1..2);
        assert_eq!(cube.skip_events(), 2);
    }

    #[test]
    fn skip_policy_has_no_donors() {
        let cube = Hypercube::new(3, PaddingPolicy::Skip).unwrap();
        assert_eq!(cube.plan(1, 1).link, Link::Skip { partner: 3, donor: None });
        assert!(cube.plan(2, 1).backfill_targets.is_empty());
    }

    #[test]
    fn donors_and_targets_agree() {
        for n in 1..=17 {
            let cube = Hypercube::new(n, PaddingPolicy::Backfill).unwrap();
            for round in 0..cube.dimension() {
                for rank in 0..n {
                    if let Link::Skip { donor: Some(donor), .. } = cube.plan(rank, round).link {
                        assert!(donor < n);
                        assert!(
                            cube.plan(donor, round).backfill_targets.contains(&rank),
                            "n={n} round={round}: donor {donor} does not serve {rank}"
                        );
                    }
                    for target in cube.plan(rank, round).backfill_targets {
                        assert_eq!(
                            cube.plan(target, round).link,
                            Link::Skip {
                                partner: target ^ (1 << round),
                                donor: Some(rank)
                            }
                        );
                    }
                }
            }
        }
    }
}
