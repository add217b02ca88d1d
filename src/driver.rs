//! Per-rank orchestration of one distributed scan.
//!
//! Broadcast L from the root, partition, scatter, reduce locally, run the
//! hypercube exchange, then derive per-element prefixes and, on the
//! reporter rank, verify against the oracle.

use crate::comm::CommunicationBackend;
use crate::comm_local::{LocalComm, MAX_LOCAL_RANKS};
use crate::config::ScanConfig;
use crate::error::{HyperscanError, Result};
use crate::exchange::{ExchangeEngine, ExchangeMode};
use crate::partition::PartitionMap;
use crate::reduce::{local_inclusive_scan, local_sum};
use crate::stats::ExchangeStats;
use crate::topology::Hypercube;
use crate::verify::{Calculated, Oracle, Verification, Verifier};

/// Everything one rank knows after the run.
#[derive(Debug, Clone)]
pub struct RankReport {
    pub rank: usize,
    pub num_ranks: usize,
    pub padded_ranks: usize,
    pub count: usize,
    pub offset: usize,
    pub local_sum: i64,
    /// Global total as accumulated by this rank.
    pub sum: i64,
    /// Sum of chunks on ranks `0..=rank`, in scan mode.
    pub prefix_sum: Option<i64>,
    /// Global inclusive prefix of each element of this rank's chunk.
    pub element_prefixes: Option<Vec<i64>>,
    pub stats: ExchangeStats,
    /// Set on the reporter rank when an oracle was supplied.
    pub verification: Option<Verification>,
}

/// Run one rank's share of the scan.
///
/// `source` is the global array and is only read on `config.root`.
/// `oracle` is only consulted on the reporter rank. Configuration errors
/// detected here abort the whole group before any rank enters the exchange.
pub fn run_rank(
    comm: &dyn CommunicationBackend,
    config: &ScanConfig,
    source: Option<&[i64]>,
    oracle: Option<&Oracle>,
) -> Result<RankReport> {
    let rank = comm.rank();
    let num_ranks = comm.num_ranks();
    let _span = tracing::info_span!("scan_rank", rank, num_ranks).entered();

    config.validate(num_ranks).map_err(|e| escalate(comm, e))?;

    let root_len = if rank == config.root {
        root_source_len(config, source).map_err(|e| escalate(comm, e))?
    } else {
        0
    };
    let len = comm.broadcast_len(config.root, root_len)?;

    let partition =
        PartitionMap::build(len, num_ranks, config.partition).map_err(|e| escalate(comm, e))?;
    let cube = Hypercube::new(num_ranks, config.padding).map_err(|e| escalate(comm, e))?;

    comm.barrier()?;
    let chunk = comm.scatter_varcount(config.root, source, &partition)?;
    let local = local_sum(&chunk);
    tracing::debug!(count = chunk.len(), local_sum = local, "local chunk reduced");

    let engine = ExchangeEngine::new(cube, config.mode);
    let outcome = engine.run(comm, local)?;

    let element_prefixes = match (config.mode, outcome.prefix_sum) {
        (ExchangeMode::Scan, Some(prefix)) => {
            // Everything on lower ranks: the inclusive rank prefix minus our own chunk.
            let below = prefix.wrapping_sub(local);
            Some(local_inclusive_scan(&chunk, below))
        }
        _ => None,
    };

    let verification = oracle
        .filter(|_| rank == config.reporter.resolve(num_ranks))
        .map(|oracle| {
            Verifier::new(oracle, &partition, cube.padded_size()).check(
                rank,
                Calculated {
                    sum: outcome.sum,
                    prefix_sum: outcome.prefix_sum,
                    element_prefixes: element_prefixes.as_deref(),
                },
            )
        });

    tracing::info!(sum = outcome.sum, prefix_sum = ?outcome.prefix_sum, "rank finished");

    Ok(RankReport {
        rank,
        num_ranks,
        padded_ranks: cube.padded_size(),
        count: partition.count(rank),
        offset: partition.offset(rank),
        local_sum: local,
        sum: outcome.sum,
        prefix_sum: outcome.prefix_sum,
        element_prefixes,
        stats: outcome.stats,
        verification,
    })
}

/// Run a whole group of `num_ranks` in this process, one thread per rank.
///
/// Every rank sees the same `data` (only the root reads it) and the same
/// oracle. Reports come back in rank order. If any rank fails, the first
/// error that is not a secondary abort is returned.
pub fn run_local(config: &ScanConfig, num_ranks: usize, data: &[i64]) -> Result<Vec<RankReport>> {
    if num_ranks == 0 {
        return Err(HyperscanError::Config("process group is empty".into()));
    }
    if num_ranks > MAX_LOCAL_RANKS {
        return Err(HyperscanError::Config(format!(
            "{num_ranks} ranks exceeds the in-process limit of {MAX_LOCAL_RANKS}"
        )));
    }
    let oracle = Oracle::new(data);
    let results = LocalComm::run(num_ranks, |comm| {
        let source = (comm.rank() == config.root).then_some(data);
        run_rank(comm, config, source, Some(&oracle))
    });

    let mut reports = Vec::with_capacity(num_ranks);
    let mut aborted = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err @ HyperscanError::Aborted { .. }) => {
                aborted.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    match aborted {
        Some(err) => Err(err),
        None => Ok(reports),
    }
}

fn root_source_len(config: &ScanConfig, source: Option<&[i64]>) -> Result<usize> {
    let source =
        source.ok_or_else(|| HyperscanError::Config("root rank holds no source array".into()))?;
    if source.len() != config.len {
        return Err(HyperscanError::Config(format!(
            "source array has {} elements, configured length is {}",
            source.len(),
            config.len
        )));
    }
    Ok(source.len())
}

fn escalate(comm: &dyn CommunicationBackend, err: HyperscanError) -> HyperscanError {
    if err.is_configuration() {
        tracing::error!(rank = comm.rank(), %err, "configuration error, aborting group");
        comm.abort(err.abort_code());
    }
    err
}
