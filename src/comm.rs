//! Communication backend abstraction for the distributed scan.
//!
//! Provides the trait every substrate implements (collectives used once per
//! run, scalar point-to-point used once per round) and a no-op
//! single-process implementation.

use crate::error::{HyperscanError, Result};
use crate::partition::PartitionMap;

/// Abstraction over inter-process communication for the hypercube scan.
///
/// Implementations: `SingleProcessComm` (no-op), `LocalComm` (one thread per
/// rank), `MpiComm` (via mpi crate, `distributed` feature).
///
/// Every call blocks until its counterpart on the peer (or, for
/// collectives, on every rank) has been reached. There is no timeout: a
/// peer that never arrives blocks the caller indefinitely.
pub trait CommunicationBackend: Send {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks, fixed for the lifetime of the group.
    fn num_ranks(&self) -> usize;

    /// Synchronization barrier.
    fn barrier(&self) -> Result<()>;

    /// Distribute the problem size from `root` to every rank.
    ///
    /// The value passed by non-root ranks is ignored.
    fn broadcast_len(&self, root: usize, len: usize) -> Result<usize>;

    /// Scatter `partition`-sized chunks of `global` from `root`.
    ///
    /// Only `root` needs to pass `Some(global)`. Returns this rank's chunk.
    fn scatter_varcount(
        &self,
        root: usize,
        global: Option<&[i64]>,
        partition: &PartitionMap,
    ) -> Result<Vec<i64>>;

    /// Blocking send of one scalar.
    fn send(&self, dest: usize, tag: u32, value: i64) -> Result<()>;

    /// Blocking receive of one scalar.
    fn receive(&self, source: usize, tag: u32) -> Result<i64>;

    /// Mutual exchange of one scalar with `partner`.
    ///
    /// Both sides call this with each other's rank. The lower rank sends
    /// first and the higher rank receives first, so the two blocking calls
    /// never wait on each other.
    fn exchange(&self, partner: usize, tag: u32, value: i64) -> Result<i64> {
        if self.rank() < partner {
            self.send(partner, tag, value)?;
            self.receive(partner, tag)
        } else {
            let received = self.receive(partner, tag)?;
            self.send(partner, tag, value)?;
            Ok(received)
        }
    }

    /// Tear down the whole group.
    ///
    /// Backends that can terminate the processes (MPI) never return.
    /// In-process backends wake every blocked rank and return the error
    /// each of them observes.
    fn abort(&self, code: i32) -> HyperscanError;
}

/// No-op communication backend for a group of one.
///
/// Collectives pass through unchanged. Point-to-point calls fail because
/// there is no peer to talk to.
pub struct SingleProcessComm;

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn broadcast_len(&self, _root: usize, len: usize) -> Result<usize> {
        Ok(len)
    }

    fn scatter_varcount(
        &self,
        _root: usize,
        global: Option<&[i64]>,
        partition: &PartitionMap,
    ) -> Result<Vec<i64>> {
        let global = global
            .ok_or_else(|| HyperscanError::Config("root rank holds no source array".into()))?;
        Ok(partition.chunk(global, 0).to_vec())
    }

    fn send(&self, dest: usize, _tag: u32, _value: i64) -> Result<()> {
        Err(HyperscanError::Comm(format!(
            "single process group has no rank {dest}"
        )))
    }

    fn receive(&self, source: usize, _tag: u32) -> Result<i64> {
        Err(HyperscanError::Comm(format!(
            "single process group has no rank {source}"
        )))
    }

    fn abort(&self, code: i32) -> HyperscanError {
        HyperscanError::Aborted { code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionPolicy;

    #[test]
    fn single_process_rank_and_size() {
        let comm = SingleProcessComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.num_ranks(), 1);
        assert!(comm.barrier().is_ok());
    }

    #[test]
    fn single_process_collectives_pass_through() {
        let comm = SingleProcessComm;
        assert_eq!(comm.broadcast_len(0, 8).unwrap(), 8);

        let data = [1, 2, 3];
        let map = PartitionMap::build(3, 1, PartitionPolicy::Strict).unwrap();
        assert_eq!(comm.scatter_varcount(0, Some(&data), &map).unwrap(), vec![1, 2, 3]);
        assert!(comm.scatter_varcount(0, None, &map).is_err());
    }

    #[test]
    fn single_process_has_no_peers() {
        let comm = SingleProcessComm;
        assert!(comm.send(1, 0, 5).is_err());
        assert!(comm.receive(1, 0).is_err());
        assert!(matches!(comm.abort(3), HyperscanError::Aborted { code: 3 }));
    }
}
