//! Sum and maximum over a partition, keyed by [`transform`].

use rayon::prelude::*;

use crate::transform::transform;

/// Result of a maximum over an empty partition.
pub const EMPTY_MAX: f32 = 0.0;

/// Sum of `transform(v)` over `data`, accumulated serially.
pub fn sum(data: &[f32]) -> f32 {
    partial_sum(data) as f32
}

/// Sum of `transform(v)` with one independent partial sum per part,
/// added together at the end. Must run inside the target rayon pool.
pub fn sum_parallel(data: &[f32], parts: usize) -> f32 {
    data.par_chunks(chunk_len(data.len(), parts))
        .map(partial_sum)
        .sum::<f64>() as f32
}

fn partial_sum(data: &[f32]) -> f64 {
    data.iter().map(|&v| transform(v) as f64).sum()
}

/// The stored value with the greatest key. Equal keys resolve to the larger
/// stored value so the result does not depend on scan order.
pub fn max_by_key(a: f32, b: f32) -> f32 {
    let (ka, kb) = (transform(a), transform(b));
    if kb > ka || (kb == ka && b > a) {
        b
    } else {
        a
    }
}

/// Maximum by key, scanned serially. Empty input yields [`EMPTY_MAX`].
pub fn max(data: &[f32]) -> f32 {
    data.iter().copied().reduce(max_by_key).unwrap_or(EMPTY_MAX)
}

/// Maximum by key from per-part local maxima. Must run inside the target
/// rayon pool.
pub fn max_parallel(data: &[f32], parts: usize) -> f32 {
    data.par_chunks(chunk_len(data.len(), parts))
        .map(max)
        .reduce_with(max_by_key)
        .unwrap_or(EMPTY_MAX)
}

fn chunk_len(len: usize, parts: usize) -> usize {
    len.div_ceil(parts.max(1)).max(1)
}
