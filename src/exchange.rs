//! Hypercube exchange engine.
//!
//! Turns one partial sum per rank into the global total on every rank and,
//! in scan mode, the inclusive prefix over ranks. Round `d` pairs each rank
//! with `rank ^ (1 << d)`; after round `d` a rank's `sum` covers its
//! `(d + 1)`-bit sub-cube. A barrier closes every round, so a partner's
//! `sum` is always its value as of the end of the previous round.

use crate::comm::CommunicationBackend;
use crate::error::{HyperscanError, Result};
use crate::stats::ExchangeStats;
use crate::topology::{Hypercube, Link, RoundPlan};

/// What the engine accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExchangeMode {
    /// Global sum only.
    Reduce,
    /// Global sum and inclusive prefix over ranks.
    Scan,
}

/// Running values of one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    pub sum: i64,
    /// Only advanced in `ExchangeMode::Scan`.
    pub prefix_sum: i64,
}

impl ScanState {
    pub fn new(local_sum: i64) -> Self {
        Self {
            sum: local_sum,
            prefix_sum: local_sum,
        }
    }
}

/// Result of a full exchange on one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub sum: i64,
    /// `None` in `ExchangeMode::Reduce`.
    pub prefix_sum: Option<i64>,
    pub stats: ExchangeStats,
}

pub struct ExchangeEngine {
    cube: Hypercube,
    mode: ExchangeMode,
}

impl ExchangeEngine {
    pub fn new(cube: Hypercube, mode: ExchangeMode) -> Self {
        Self { cube, mode }
    }

    /// Run all `ceil(log2(N))` rounds starting from this rank's local sum.
    ///
    /// Every rank of the group must call this with the same engine
    /// parameters; ranks that skip a round still join its barrier.
    pub fn run(&self, comm: &dyn CommunicationBackend, local_sum: i64) -> Result<ExchangeOutcome> {
        let rank = comm.rank();
        if comm.num_ranks() != self.cube.size() {
            return Err(HyperscanError::Config(format!(
                "engine planned for {} ranks, group has {}",
                self.cube.size(),
                comm.num_ranks()
            )));
        }

        let dim = self.cube.dimension();
        let _span = tracing::debug_span!("hypercube_exchange", rank, dim).entered();

        let mut state = ScanState::new(local_sum);
        let mut stats = ExchangeStats::new(rank);

        for round in 0..dim {
            let plan = self.cube.plan(rank, round);
            state = self.step(comm, &plan, state, &mut stats)?;
            comm.barrier()?;
            stats.barriers += 1;
            stats.rounds += 1;
        }

        Ok(ExchangeOutcome {
            sum: state.sum,
            prefix_sum: (self.mode == ExchangeMode::Scan).then_some(state.prefix_sum),
            stats,
        })
    }

    fn step(
        &self,
        comm: &dyn CommunicationBackend,
        plan: &RoundPlan,
        state: ScanState,
        stats: &mut ExchangeStats,
    ) -> Result<ScanState> {
        let rank = comm.rank();
        // Everything sent this round is the pre-round value.
        let outgoing = state.sum;
        let mut next = state;

        match plan.link {
            Link::Exchange { partner } => {
                let received = comm.exchange(partner, plan.round, outgoing)?;
                next.sum = next.sum.wrapping_add(received);
                if self.mode == ExchangeMode::Scan && partner < rank {
                    next.prefix_sum = next.prefix_sum.wrapping_add(received);
                }
                stats.exchanges += 1;
                tracing::debug!(round = plan.round, partner, received, sum = next.sum, "exchanged");
            }
            Link::Skip { partner, donor } => {
                stats.skips += 1;
                // A donor always sits above this rank, so only `sum` absorbs it.
                if let Some(donor) = donor {
                    let received = comm.receive(donor, plan.round)?;
                    next.sum = next.sum.wrapping_add(received);
                    stats.backfills_received += 1;
                    tracing::debug!(round = plan.round, partner, donor, received, "backfilled");
                } else {
                    tracing::debug!(round = plan.round, partner, "skipped");
                }
            }
        }

        for target in plan.backfill_targets.clone() {
            comm.send(target, plan.round, outgoing)?;
            stats.backfills_sent += 1;
        }

        Ok(next)
    }
}
