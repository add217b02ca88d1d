//! Local reduction and per-element scan over a rank's own chunk.
//!
//! Both use wrapping addition so the distributed result and the sequential
//! oracle agree bit-for-bit even when the sum overflows.

/// Sum of a chunk. The empty chunk sums to zero.
pub fn local_sum(chunk: &[i64]) -> i64 {
    chunk.iter().fold(0i64, |acc, &v| acc.wrapping_add(v))
}

/// Inclusive prefix sums of `chunk`, shifted by `base`.
///
/// `out[i] = base + chunk[0] + ... + chunk[i]`. With `base` set to the sum
/// of all chunks on lower ranks this yields the global per-element prefix.
pub fn local_inclusive_scan(chunk: &[i64], base: i64) -> Vec<i64> {
    chunk
        .iter()
        .scan(base, |running, &v| {
            *running = running.wrapping_add(v);
            Some(*running)
        })
        .collect()
}
