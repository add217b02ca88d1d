//! Run configuration shared by every rank.
//!
//! All ranks must hold an identical `ScanConfig`; the partition map, the
//! round plan and the reporter rank are all derived from it locally.

use crate::error::{HyperscanError, Result};
use crate::exchange::ExchangeMode;
use crate::partition::PartitionPolicy;
use crate::topology::PaddingPolicy;
use crate::verify::ReporterRank;

/// Array length used by the reference runs.
pub const DEFAULT_LEN: usize = 1 << 20;

/// Exclusive upper bound of generated element values.
pub const DEFAULT_MAX_VALUE: i64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Global array length L.
    pub len: usize,
    /// Seed for the data generator.
    pub seed: u64,
    /// Elements are drawn from `0..max_value`.
    pub max_value: i64,
    /// Rank that owns the source array and broadcasts L.
    pub root: usize,
    pub partition: PartitionPolicy,
    pub padding: PaddingPolicy,
    pub reporter: ReporterRank,
    pub mode: ExchangeMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            len: DEFAULT_LEN,
            seed: 0,
            max_value: DEFAULT_MAX_VALUE,
            root: 0,
            partition: PartitionPolicy::Remainder,
            padding: PaddingPolicy::Backfill,
            reporter: ReporterRank::First,
            mode: ExchangeMode::Scan,
        }
    }
}

impl ScanConfig {
    /// Config for an explicit array length, everything else default.
    pub fn with_len(len: usize) -> Self {
        Self {
            len,
            ..Self::default()
        }
    }

    /// Check the parts of the config that do not depend on the data.
    ///
    /// Partition feasibility (`len` against `num_ranks`) is checked by the
    /// partitioner itself, after L has been broadcast.
    pub fn validate(&self, num_ranks: usize) -> Result<()> {
        if num_ranks == 0 {
            return Err(HyperscanError::Config("process group is empty".into()));
        }
        if self.root >= num_ranks {
            return Err(HyperscanError::Config(format!(
                "root rank {} is outside a group of {num_ranks}",
                self.root
            )));
        }
        if self.max_value <= 0 {
            return Err(HyperscanError::Config(format!(
                "max value must be positive, got {}",
                self.max_value
            )));
        }
        Ok(())
    }
}
