use crate::transform::transform;

/// Merges two runs already sorted by key into `out`, taking from `left` on
/// equal keys.
///
/// `out` must be exactly `left.len() + right.len()` long.
pub fn merge_into(left: &[f32], right: &[f32], out: &mut [f32]) {
    debug_assert_eq!(out.len(), left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    for slot in out.iter_mut() {
        let take_left = match (left.get(i), right.get(j)) {
            (Some(&l), Some(&r)) => transform(l) <= transform(r),
            (Some(_), None) => true,
            _ => false,
        };
        if take_left {
            *slot = left[i];
            i += 1;
        } else {
            *slot = right[j];
            j += 1;
        }
    }
}

/// Unifies the local sorted partition with the one received from the peer.
pub fn merge(local: &[f32], remote: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; local.len() + remote.len()];
    merge_into(local, remote, &mut out);
    out
}

/// True when `data` is non-decreasing by key.
pub fn is_sorted_by_key(data: &[f32]) -> bool {
    data.windows(2).all(|w| transform(w[0]) <= transform(w[1]))
}

/// Distinct, ascending stored values near `base` that all share one key.
#[cfg(test)]
pub(crate) fn key_twins(base: f32) -> Vec<f32> {
    let mut run: Vec<f32> = Vec::new();
    for i in 0..256 {
        let v = f32::from_bits(base.to_bits() + i);
        match run.last() {
            Some(&last) if transform(last) == transform(v) => run.push(v),
            _ if run.len() >= 2 => break,
            _ => run = vec![v],
        }
    }
    assert!(run.len() >= 2, "no values share a key near {base}");
    run
}
