//! MPI communication backend for the distributed scan.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` using `mpi::traits::*` for
//! inter-process communication.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! Point-to-point calls are blocking `MPI_Send`/`MPI_Recv`; the pairwise
//! exchange relies on the trait's rank-ordered default to stay deadlock
//! free even when the MPI library does not buffer eagerly.

use mpi::datatype::Partition;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use super::comm::CommunicationBackend;
use crate::error::{HyperscanError, Result};
use crate::partition::PartitionMap;

/// MPI-based communication backend.
///
/// Wraps the MPI world communicator. Requires `mpi::initialize()` to have
/// been called before construction.
pub struct MpiComm;

impl MpiComm {
    /// Create a new MPI communication backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

fn to_count(value: usize) -> Result<Count> {
    Count::try_from(value)
        .map_err(|_| HyperscanError::Config(format!("{value} exceeds the MPI count range")))
}

fn to_tag(tag: u32) -> Result<i32> {
    i32::try_from(tag)
        .map_err(|_| HyperscanError::Comm(format!("tag {tag} exceeds the MPI tag range")))
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.size() as usize
    }

    fn barrier(&self) -> Result<()> {
        let world = SimpleCommunicator::world();
        world.barrier();
        Ok(())
    }

    fn broadcast_len(&self, root: usize, len: usize) -> Result<usize> {
        let world = SimpleCommunicator::world();
        let mut value = len as u64;
        world
            .process_at_rank(to_count(root)?)
            .broadcast_into(&mut value);
        Ok(value as usize)
    }

    fn scatter_varcount(
        &self,
        root: usize,
        global: Option<&[i64]>,
        partition: &PartitionMap,
    ) -> Result<Vec<i64>> {
        let world = SimpleCommunicator::world();
        let rank = world.rank() as usize;
        let root_process = world.process_at_rank(to_count(root)?);
        let mut chunk = vec![0i64; partition.count(rank)];

        if rank == root {
            let global = global
                .ok_or_else(|| HyperscanError::Config("root rank holds no source array".into()))?;
            let counts = partition
                .counts()
                .iter()
                .map(|&c| to_count(c))
                .collect::<Result<Vec<Count>>>()?;
            let displs = partition
                .offsets()
                .iter()
                .map(|&o| to_count(o))
                .collect::<Result<Vec<Count>>>()?;
            let send = Partition::new(global, counts, displs);
            root_process.scatter_varcount_into_root(&send, &mut chunk[..]);
        } else {
            root_process.scatter_varcount_into(&mut chunk[..]);
        }
        Ok(chunk)
    }

    fn send(&self, dest: usize, tag: u32, value: i64) -> Result<()> {
        let world = SimpleCommunicator::world();
        world
            .process_at_rank(to_count(dest)?)
            .send_with_tag(&value, to_tag(tag)?);
        Ok(())
    }

    fn receive(&self, source: usize, tag: u32) -> Result<i64> {
        let world = SimpleCommunicator::world();
        let (value, _status) = world
            .process_at_rank(to_count(source)?)
            .receive_with_tag::<i64>(to_tag(tag)?);
        Ok(value)
    }

    fn abort(&self, code: i32) -> HyperscanError {
        let world = SimpleCommunicator::world();
        tracing::error!(rank = world.rank(), code, "aborting MPI job");
        world.abort(code)
    }
}
