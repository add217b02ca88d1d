//! Exchange counters for `--stats` output.

/// Per-rank counters collected by the exchange engine.
///
/// Always collected; they are a handful of integers per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub rank: usize,
    /// Rounds executed (`ceil(log2(N))` for every rank).
    pub rounds: u32,
    /// Rounds with a real partner.
    pub exchanges: u32,
    /// Rounds whose partner id fell outside the group.
    pub skips: u32,
    pub backfills_sent: u32,
    pub backfills_received: u32,
    pub barriers: u32,
}

impl ExchangeStats {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            ..Self::default()
        }
    }
}

/// Group-wide totals over a set of per-rank counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub ranks: usize,
    /// Rounds per rank; identical across a correct run.
    pub rounds: u32,
    pub exchanges: u32,
    pub skips: u32,
    pub backfills: u32,
}

impl GroupStats {
    pub fn collect<'a>(stats: impl IntoIterator<Item = &'a ExchangeStats>) -> Self {
        stats.into_iter().fold(GroupStats::default(), |mut acc, s| {
            acc.ranks += 1;
            acc.rounds = acc.rounds.max(s.rounds);
            acc.exchanges += s.exchanges;
            acc.skips += s.skips;
            acc.backfills += s.backfills_received;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_over_ranks() {
        let a = ExchangeStats {
            rounds: 2,
            exchanges: 2,
            ..ExchangeStats::new(0)
        };
        let b = ExchangeStats {
            rounds: 2,
            exchanges: 1,
            skips: 1,
            backfills_received: 1,
            ..ExchangeStats::new(1)
        };
        let total = GroupStats::collect([&a, &b]);
        assert_eq!(total.ranks, 2);
        assert_eq!(total.rounds, 2);
        assert_eq!(total.exchanges, 3);
        assert_eq!(total.skips, 1);
        assert_eq!(total.backfills, 1);
    }
}
