use rayon::prelude::*;
use rayon::ThreadPool;

/// Deterministic value for a global element index, in `[1.0, 1000.9]`.
///
/// The index is scrambled with the MurmurHash3 32-bit finalizer so that
/// neighbouring indices produce unrelated values.
pub fn pseudo_random(index: u64) -> f32 {
    let mut x = index as u32;
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^= x >> 16;
    (x % 10_000) as f32 / 10.0 + 1.0
}

/// Fills `buffer` with the values for global indices `offset..offset + len`.
pub fn init(buffer: &mut [f32], offset: u64) {
    buffer
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, v)| *v = pseudo_random(offset + i as u64));
}

/// Generates one side's partition on `pool`.
pub fn generate(len: usize, offset: u64, pool: &ThreadPool) -> Vec<f32> {
    let mut data = vec![0.0f32; len];
    pool.install(|| init(&mut data, offset));
    data
}
