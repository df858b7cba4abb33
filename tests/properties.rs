//! Property-based invariants over randomized rows.

use proptest::collection::vec;
use proptest::prelude::*;
use sortilege::{
    min_p_sampling_from_prob, sampling_from_prob, top_k_renorm_prob, top_k_sampling_from_prob,
    top_p_renorm_prob, SamplingOptions,
};

/// Rows with arbitrary zeros but a positive tail entry, normalized to
/// unit mass.
fn prob_row() -> impl Strategy<Value = Vec<f32>> {
    (vec(0.0f32..1.0, 0..40), 0.01f32..1.0).prop_map(|(mut row, last)| {
        row.push(last);
        let sum: f32 = row.iter().sum();
        row.iter().map(|v| v / sum).collect()
    })
}

proptest! {
    /// Sampled indices always carry positive probability.
    #[test]
    fn multinomial_lands_in_the_support(row in prob_row(), seed in 0u64..1000) {
        let d = row.len();
        let mut out = [0u32; 1];
        let options = SamplingOptions::with_seed(seed, 0);
        sampling_from_prob(&row, &mut out, 1, d, &options).unwrap();
        prop_assert!(row[out[0] as usize] > 0.0);
    }

    /// Top-k samples come from the k largest values (boundary ties
    /// included): fewer than k entries lie strictly above the pick.
    #[test]
    fn top_k_sample_is_inside_the_top_k_set(
        row in prob_row(),
        k in 1u32..8,
        seed in 0u64..1000,
    ) {
        let d = row.len();
        let mut out = [0u32; 1];
        let options = SamplingOptions::with_seed(seed, 1);
        top_k_sampling_from_prob(&row, &mut out, None, k, 1, d, &options).unwrap();
        let picked = row[out[0] as usize];
        prop_assert!(picked > 0.0);
        let strictly_above = row.iter().filter(|&&v| v > picked).count();
        prop_assert!(strictly_above < k as usize);
    }

    /// Min-p samples clear the relative probability bar.
    #[test]
    fn min_p_sample_clears_the_bar(
        row in prob_row(),
        min_p in 0.0f32..1.0,
        seed in 0u64..1000,
    ) {
        let d = row.len();
        let mut out = [0u32; 1];
        let options = SamplingOptions::with_seed(seed, 2);
        min_p_sampling_from_prob(&row, None, &mut out, min_p, 1, d, &options).unwrap();
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        prop_assert!(row[out[0] as usize] >= max * min_p);
    }

    /// Top-p renorm output is a normalized sub-distribution of its input.
    #[test]
    fn top_p_renorm_is_a_normalized_subset(row in prob_row(), p in 0.05f32..1.0) {
        let d = row.len();
        let mut out = vec![0.0f32; d];
        top_p_renorm_prob(&row, &mut out, None, p, 1, d).unwrap();
        let sum: f64 = out.iter().map(|&v| f64::from(v)).sum();
        prop_assert!((sum - 1.0).abs() < 1e-3, "sum = {sum}");
        for (&r, &o) in row.iter().zip(&out) {
            prop_assert!(o == 0.0 || r > 0.0);
        }
    }

    /// Top-k renorm keeps at least one and at most all entries, summing
    /// to one.
    #[test]
    fn top_k_renorm_is_a_normalized_subset(row in prob_row(), k in 1u32..64) {
        let d = row.len();
        let mut out = vec![0.0f32; d];
        top_k_renorm_prob(&row, &mut out, None, k, 1, d).unwrap();
        let sum: f64 = out.iter().map(|&v| f64::from(v)).sum();
        prop_assert!((sum - 1.0).abs() < 1e-3, "sum = {sum}");
    }
}
