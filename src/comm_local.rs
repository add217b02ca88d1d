//! In-process communication backend: one OS thread per rank.
//!
//! Every ordered pair of ranks gets its own zero-capacity channel, so a
//! receive from a named source only ever sees that source's messages and a
//! send completes only once the peer has taken the message, as a blocking
//! `MPI_Ssend` would. The group barrier doubles as the abort signal:
//! `abort` wakes every rank parked in the barrier, and blocked sends and
//! receives poll the same flag.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::comm::CommunicationBackend;
use crate::error::{HyperscanError, Result};
use crate::partition::PartitionMap;

const BROADCAST_TAG: u32 = u32::MAX - 1;
const SCATTER_TAG: u32 = u32::MAX - 2;

/// How often a blocked receive checks for a group abort.
const ABORT_POLL: Duration = Duration::from_millis(20);

/// Back-off between attempts to hand a message to a peer that is not yet
/// receiving.
const SEND_POLL: Duration = Duration::from_micros(50);

/// Largest group `LocalComm` will build: one thread per rank and one
/// channel per ordered pair.
pub const MAX_LOCAL_RANKS: usize = 256;

#[derive(Debug)]
enum Payload {
    Scalar(i64),
    Len(usize),
    Chunk(Vec<i64>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Scalar(_) => "scalar",
            Payload::Len(_) => "length",
            Payload::Chunk(_) => "chunk",
        }
    }
}

#[derive(Debug)]
struct Envelope {
    tag: u32,
    payload: Payload,
}

struct GroupState {
    arrived: usize,
    generation: u64,
    abort: Option<i32>,
}

/// Barrier and abort flag shared by every rank of one group.
struct Shared {
    size: usize,
    state: Mutex<GroupState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, GroupState>> {
        self.state
            .lock()
            .map_err(|_| HyperscanError::Comm("group state poisoned".into()))
    }

    fn barrier(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(code) = state.abort {
            return Err(HyperscanError::Aborted { code });
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.wake.notify_all();
            return Ok(());
        }

        while state.generation == generation {
            if let Some(code) = state.abort {
                return Err(HyperscanError::Aborted { code });
            }
            state = self
                .wake
                .wait(state)
                .map_err(|_| HyperscanError::Comm("group state poisoned".into()))?;
        }
        Ok(())
    }

    fn abort(&self, code: i32) -> i32 {
        let code = match self.state.lock() {
            Ok(mut state) => *state.abort.get_or_insert(code),
            Err(_) => code,
        };
        self.wake.notify_all();
        code
    }

    fn aborted(&self) -> Option<i32> {
        self.state.lock().ok().and_then(|state| state.abort)
    }
}

/// Communication handle of one rank in an in-process group.
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
    /// `outboxes[dest]` delivers to `dest`.
    outboxes: Vec<SyncSender<Envelope>>,
    /// `inboxes[source]` receives from `source`.
    inboxes: Vec<Receiver<Envelope>>,
}

impl LocalComm {
    /// Create the handles of a group of `size` ranks, in rank order.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(GroupState {
                arrived: 0,
                generation: 0,
                abort: None,
            }),
            wake: Condvar::new(),
        });

        // channels[src][dst]
        let mut outboxes: Vec<Vec<SyncSender<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = mpsc::sync_channel(0);
                outboxes[src].push(tx);
                inboxes[dst].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                shared: Arc::clone(&shared),
                outboxes,
                inboxes,
            })
            .collect()
    }

    /// Run `f` on every rank of a fresh group of `size`, one thread each.
    ///
    /// Results are returned in rank order. A rank that fails raises a group
    /// abort so that peers blocked on it return instead of hanging.
    pub fn run<T, F>(size: usize, f: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(&LocalComm) -> Result<T> + Sync,
    {
        let comms = LocalComm::group(size);
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let result = f(&comm);
                        if let Err(err) = &result {
                            if !matches!(err, HyperscanError::Aborted { .. }) {
                                comm.shared.abort(err.abort_code());
                            }
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(HyperscanError::Comm(format!("rank {rank} panicked")))
                    })
                })
                .collect()
        })
    }

    fn check_rank(&self, peer: usize) -> Result<()> {
        if peer >= self.outboxes.len() {
            return Err(HyperscanError::Comm(format!(
                "rank {peer} is outside a group of {}",
                self.outboxes.len()
            )));
        }
        Ok(())
    }

    fn post(&self, dest: usize, tag: u32, payload: Payload) -> Result<()> {
        self.check_rank(dest)?;
        let mut envelope = Envelope { tag, payload };
        loop {
            match self.outboxes[dest].try_send(envelope) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(pending)) => {
                    if let Some(code) = self.shared.aborted() {
                        return Err(HyperscanError::Aborted { code });
                    }
                    envelope = pending;
                    thread::sleep(SEND_POLL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(match self.shared.aborted() {
                        Some(code) => HyperscanError::Aborted { code },
                        None => HyperscanError::Comm(format!("rank {dest} has left the group")),
                    })
                }
            }
        }
    }

    fn take(&self, source: usize, tag: u32) -> Result<Payload> {
        self.check_rank(source)?;
        loop {
            match self.inboxes[source].recv_timeout(ABORT_POLL) {
                Ok(envelope) if envelope.tag == tag => return Ok(envelope.payload),
                Ok(envelope) => {
                    return Err(HyperscanError::Protocol {
                        rank: self.rank,
                        source_rank: source,
                        expected: format!("tag {tag}"),
                        got: format!("tag {}", envelope.tag),
                    })
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(code) = self.shared.aborted() {
                        return Err(HyperscanError::Aborted { code });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(match self.shared.aborted() {
                        Some(code) => HyperscanError::Aborted { code },
                        None => HyperscanError::Comm(format!("rank {source} has left the group")),
                    })
                }
            }
        }
    }

    fn unexpected(&self, source: usize, expected: &str, got: &Payload) -> HyperscanError {
        HyperscanError::Protocol {
            rank: self.rank,
            source_rank: source,
            expected: expected.into(),
            got: got.kind().into(),
        }
    }
}

impl CommunicationBackend for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.outboxes.len()
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier()
    }

    fn broadcast_len(&self, root: usize, len: usize) -> Result<usize> {
        self.check_rank(root)?;
        if self.rank == root {
            for dest in (0..self.num_ranks()).filter(|&r| r != root) {
                self.post(dest, BROADCAST_TAG, Payload::Len(len))?;
            }
            return Ok(len);
        }
        match self.take(root, BROADCAST_TAG)? {
            Payload::Len(len) => Ok(len),
            other => Err(self.unexpected(root, "length", &other)),
        }
    }

    fn scatter_varcount(
        &self,
        root: usize,
        global: Option<&[i64]>,
        partition: &PartitionMap,
    ) -> Result<Vec<i64>> {
        self.check_rank(root)?;
        if self.rank == root {
            let global = global
                .ok_or_else(|| HyperscanError::Config("root rank holds no source array".into()))?;
            if global.len() != partition.len() {
                return Err(HyperscanError::Config(format!(
                    "source array has {} elements, partition covers {}",
                    global.len(),
                    partition.len()
                )));
            }
            for dest in (0..self.num_ranks()).filter(|&r| r != root) {
                let chunk = partition.chunk(global, dest).to_vec();
                self.post(dest, SCATTER_TAG, Payload::Chunk(chunk))?;
            }
            return Ok(partition.chunk(global, root).to_vec());
        }

        match self.take(root, SCATTER_TAG)? {
            Payload::Chunk(chunk) if chunk.len() == partition.count(self.rank) => Ok(chunk),
            Payload::Chunk(chunk) => Err(HyperscanError::Protocol {
                rank: self.rank,
                source_rank: root,
                expected: format!("{} elements", partition.count(self.rank)),
                got: format!("{} elements", chunk.len()),
            }),
            other => Err(self.unexpected(root, "chunk", &other)),
        }
    }

    fn send(&self, dest: usize, tag: u32, value: i64) -> Result<()> {
        self.post(dest, tag, Payload::Scalar(value))
    }

    fn receive(&self, source: usize, tag: u32) -> Result<i64> {
        match self.take(source, tag)? {
            Payload::Scalar(value) => Ok(value),
            other => Err(self.unexpected(source, "scalar", &other)),
        }
    }

    fn abort(&self, code: i32) -> HyperscanError {
        let code = self.shared.abort(code);
        tracing::debug!(rank = self.rank, code, "local group aborted");
        HyperscanError::Aborted { code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionPolicy;

    #[test]
    fn ranks_are_assigned_in_order() {
        let ranks = LocalComm::run(3, |comm| Ok((comm.rank(), comm.num_ranks())));
        let ranks: Vec<_> = ranks.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(ranks, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn pairwise_exchange_does_not_deadlock() {
        let got = LocalComm::run(2, |comm| {
            let partner = 1 - comm.rank();
            comm.exchange(partner, 0, 10 * comm.rank() as i64 + 1)
        });
        assert_eq!(got[0].as_ref().unwrap(), &11);
        assert_eq!(got[1].as_ref().unwrap(), &1);
    }

    #[test]
    fn symmetric_sends_block_until_abort() {
        // Ranks 0 and 1 both send before receiving; neither send can
        // complete, so only rank 2's abort releases them.
        let out = LocalComm::run(3, |comm| {
            if comm.rank() == 2 {
                thread::sleep(Duration::from_millis(200));
                return Err(comm.abort(9));
            }
            let partner = 1 - comm.rank();
            comm.send(partner, 0, comm.rank() as i64)?;
            comm.receive(partner, 0)
        });
        for result in out {
            assert!(matches!(result, Err(HyperscanError::Aborted { code: 9 })));
        }
    }

    #[test]
    fn send_completes_only_when_received() {
        let out = LocalComm::run(2, |comm| {
            if comm.rank() == 0 {
                let start = std::time::Instant::now();
                comm.send(1, 0, 5)?;
                return Ok(start.elapsed().as_millis() as i64);
            }
            thread::sleep(Duration::from_millis(100));
            comm.receive(0, 0)
        });
        assert!(*out[0].as_ref().unwrap() >= 100);
        assert_eq!(out[1].as_ref().unwrap(), &5);
    }

    #[test]
    fn broadcast_and_scatter_from_root() {
        let data: Vec<i64> = (1..=8).collect();
        let chunks = LocalComm::run(3, |comm| {
            let source = (comm.rank() == 1).then_some(&data[..]);
            let len = comm.broadcast_len(1, source.map_or(0, <[i64]>::len))?;
            let map = PartitionMap::build(len, comm.num_ranks(), PartitionPolicy::Remainder)?;
            comm.scatter_varcount(1, source, &map)
        });
        let chunks: Vec<_> = chunks.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn barrier_separates_rounds() {
        let out = LocalComm::run(4, |comm| {
            for _ in 0..10 {
                comm.barrier()?;
            }
            Ok(comm.rank())
        });
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn abort_releases_blocked_ranks() {
        let out = LocalComm::run(3, |comm| {
            if comm.rank() == 2 {
                return Err(comm.abort(7));
            }
            comm.barrier()?;
            comm.receive(2, 0)
        });
        for result in out {
            assert!(matches!(result, Err(HyperscanError::Aborted { code: 7 })));
        }
    }

    #[test]
    fn failing_rank_unblocks_receivers() {
        let out = LocalComm::run(2, |comm| {
            if comm.rank() == 0 {
                return Err(HyperscanError::Config("bad".into()));
            }
            comm.receive(0, 0)
        });
        assert!(matches!(out[0], Err(HyperscanError::Config(_))));
        assert!(matches!(out[1], Err(HyperscanError::Aborted { code: 1 })));
    }

    #[test]
    fn mismatched_tag_is_a_protocol_error() {
        let out = LocalComm::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, 3, 9)?;
                return Ok(0);
            }
            comm.receive(0, 4)
        });
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(HyperscanError::Protocol { .. })));
    }
}
