//! Stable merge sort by [`transform`] key, serial or fork/join.

use super::merge::merge_into;

/// Sorts a copy of `data` on the calling thread.
pub fn sort(data: &[f32]) -> Vec<f32> {
    sort_with(data, &mut Vec::new(), None)
}

/// Sorts a copy of `data`, forking ranges of at least `threshold` elements
/// onto the current rayon pool. Must run inside the target pool.
pub fn sort_parallel(data: &[f32], threshold: usize) -> Vec<f32> {
    sort_with(data, &mut Vec::new(), Some(threshold))
}

/// Sorts a copy of `data`, merging through `scratch`.
///
/// `scratch` grows to `data.len()` if it is shorter and keeps its
/// allocation, so a caller sorting the same partition repeatedly allocates
/// it once. `None` sorts serially.
pub fn sort_with(data: &[f32], scratch: &mut Vec<f32>, threshold: Option<usize>) -> Vec<f32> {
    let mut out = data.to_vec();
    if scratch.len() < out.len() {
        scratch.resize(out.len(), 0.0);
    }
    let len = out.len();
    merge_sort(&mut out, &mut scratch[..len], threshold.map(|t| t.max(2)));
    out
}

/// Sorts `buf` in place using `scratch` (same length) for merging.
///
/// With a threshold, ranges at or above it sort their halves as two rayon
/// tasks and merge after both finish; smaller ranges recurse serially.
/// Sibling tasks get disjoint halves of both `buf` and `scratch`.
fn merge_sort(buf: &mut [f32], scratch: &mut [f32], threshold: Option<usize>) {
    let len = buf.len();
    if len <= 1 {
        return;
    }
    let mid = len / 2;
    {
        let (left, right) = buf.split_at_mut(mid);
        let (left_scratch, right_scratch) = scratch.split_at_mut(mid);
        match threshold {
            Some(t) if len >= t => {
                rayon::join(
                    || merge_sort(left, left_scratch, threshold),
                    || merge_sort(right, right_scratch, threshold),
                );
            }
            _ => {
                merge_sort(left, left_scratch, threshold);
                merge_sort(right, right_scratch, threshold);
            }
        }
    }
    merge_into(&buf[..mid], &buf[mid..], scratch);
    buf.copy_from_slice(scratch);
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rayon::ThreadPoolBuilder;

    use super::*;
    use crate::{
        engine::merge::{is_sorted_by_key, key_twins},
        transform::transform,
    };

    fn random_data(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(1.0f32..1001.0)).collect()
    }

    fn is_permutation(a: &[f32], b: &[f32]) -> bool {
        let mut a = a.to_vec();
        let mut b = b.to_vec();
        a.sort_by(f32::total_cmp);
        b.sort_by(f32::total_cmp);
        a == b
    }

    fn parallel(data: &[f32], threshold: usize) -> Vec<f32> {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        pool.install(|| sort_parallel(data, threshold))
    }

    #[test]
    fn trivial_inputs() {
        assert!(sort(&[]).is_empty());
        assert_eq!(sort(&[3.0]), vec![3.0]);
        assert_eq!(parallel(&[], 2), Vec::<f32>::new());
        assert_eq!(parallel(&[2.0, 1.0], 2), vec![1.0, 2.0]);
    }

    #[test]
    fn serial_and_parallel_agree() {
        for len in [2, 3, 17, 1000, 20_000] {
            let data = random_data(len, len as u64);
            let basic = sort(&data);
            let fast = parallel(&data, 64);
            assert!(is_sorted_by_key(&basic));
            assert!(is_permutation(&basic, &data));
            assert_eq!(basic, fast);
        }
    }

    #[test]
    fn threshold_boundary() {
        let threshold = 128;
        for len in [threshold - 1, threshold, threshold + 1] {
            let data = random_data(len, 99 + len as u64);
            let sorted = parallel(&data, threshold);
            assert_eq!(sorted.len(), len);
            assert!(is_sorted_by_key(&sorted), "len {len} not sorted");
            assert!(is_permutation(&sorted, &data));
        }
    }

    #[test]
    fn equal_keys_keep_their_order() {
        // Neighbouring f32 values collapse to the same key, so their
        // relative order must survive the sort untouched. They are pushed
        // in a cycle, so the expected order is not ascending by value.
        let twins = key_twins(1000.0);
        let base = twins[0];

        let mut data = Vec::new();
        for round in 0..300 {
            data.push(1.0 + round as f32);
            data.push(twins[round % twins.len()]);
        }
        let expected: Vec<f32> = data
            .iter()
            .copied()
            .filter(|&v| transform(v) == transform(base))
            .collect();

        for sorted in [sort(&data), parallel(&data, 16)] {
            assert!(is_sorted_by_key(&sorted));
            let run: Vec<f32> = sorted
                .iter()
                .copied()
                .filter(|&v| transform(v) == transform(base))
                .collect();
            assert_eq!(run, expected);
        }
    }

    #[test]
    fn scratch_is_reused_across_calls() {
        let mut scratch = Vec::new();
        let long = random_data(5000, 7);
        let short = random_data(300, 8);

        let first = sort_with(&long, &mut scratch, None);
        assert_eq!(scratch.len(), long.len());
        let ptr = scratch.as_ptr();

        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let second = pool.install(|| sort_with(&short, &mut scratch, Some(32)));
        let third = sort_with(&long, &mut scratch, None);

        assert_eq!(scratch.as_ptr(), ptr);
        assert_eq!(scratch.len(), long.len());
        assert_eq!(first, sort(&long));
        assert_eq!(second, sort(&short));
        assert_eq!(third, first);
    }

    #[test]
    fn sorts_the_reference_partition() {
        assert_eq!(
            sort(&[1000.0, 1.0, 1001.0, 500.5]),
            vec![1.0, 500.5, 1000.0, 1001.0]
        );
    }
}
