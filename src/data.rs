//! Deterministic source data.
//!
//! Every rank that generates with the same seed gets the same array, which
//! is what lets each rank build its own oracle without communication.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{HyperscanError, Result};

/// `len` values drawn uniformly from `0..max_value`.
pub fn generate(len: usize, seed: u64, max_value: i64) -> Result<Vec<i64>> {
    if max_value <= 0 {
        return Err(HyperscanError::Config(format!(
            "max value must be positive, got {max_value}"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok((0..len).map(|_| rng.gen_range(0..max_value)).collect())
}
