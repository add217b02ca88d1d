//! Distributed prefix sum over a hypercube exchange topology.
//!
//! Each rank of a process group owns a contiguous chunk of a global array.
//! After `ceil(log2(N))` pairwise exchange rounds every rank holds the
//! global total and the inclusive prefix sum over ranks, from which it
//! derives per-element prefixes of its own chunk.

pub mod comm;
pub mod comm_local;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod output;
pub mod partition;
pub mod reduce;
pub mod stats;
pub mod topology;
pub mod verify;
