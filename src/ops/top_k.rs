//! Top-k sampling: restrict each row to its k largest entries without
//! sorting, then sample from the renormalized survivors.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{truncated_sample, SamplingTempStorage};
use crate::Result;

/// Sample one token per row among the row's top-k entries.
///
/// `top_k_arr` overrides `top_k_val` per row when present. Values tied
/// with the k-th largest are all kept. `k ≥ d` degrades to plain
/// multinomial sampling.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn top_k_sampling_from_prob<F: Elem>(
    probs: &[F],
    output: &mut [u32],
    top_k_arr: Option<&[u32]>,
    top_k_val: u32,
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("output", batch, output.len())?;
    if let Some(arr) = top_k_arr {
        check_len("top_k_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let row = &probs[i * d..][..d];
        let k = top_k_arr.map_or(top_k_val, |arr| arr[i]);
        let mut temp = SamplingTempStorage::new(shape);
        let mut rng = PhiloxStream::new(options.philox_seed, i as u64, options.philox_offset);
        *out = truncated_sample(row, &mut temp, &mut rng, options.deterministic, |agg| {
            agg.count < k
        });
    });
    Ok(())
}
