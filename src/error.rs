use thiserror::Error;

#[derive(Debug, Error)]
pub enum HyperscanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Array length {len} is not a multiple of the group size {ranks}")]
    UnevenPartition { len: usize, ranks: usize },

    #[error("Array length {len} is smaller than the group size {ranks}")]
    TooFewElements { len: usize, ranks: usize },

    #[error("Group size {0} is not a power of two and padding is disabled")]
    NotPowerOfTwo(usize),

    #[error("Communication error: {0}")]
    Comm(String),

    #[error("Protocol error: rank {rank} expected {expected} from rank {source_rank}, got {got}")]
    Protocol {
        rank: usize,
        source_rank: usize,
        expected: String,
        got: String,
    },

    #[error("Process group aborted with code {code}")]
    Aborted { code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HyperscanError {
    /// Exit code used when this error tears down the whole group.
    pub fn abort_code(&self) -> i32 {
        match self {
            HyperscanError::Aborted { code } => *code,
            HyperscanError::Config(_)
            | HyperscanError::UnevenPartition { .. }
            | HyperscanError::TooFewElements { .. }
            | HyperscanError::NotPowerOfTwo(_) => 1,
            _ => 2,
        }
    }

    /// True for errors that must be escalated to a group-wide abort.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HyperscanError::Config(_)
                | HyperscanError::UnevenPartition { .. }
                | HyperscanError::TooFewElements { .. }
                | HyperscanError::NotPowerOfTwo(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HyperscanError>;
