//! Combined top-k ∩ top-p sampling: the surviving set must satisfy both
//! the count and the mass goal.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{truncated_sample, SamplingTempStorage};
use crate::Result;

/// Sample one token per row from the intersection of the top-k set and
/// the top-p nucleus.
///
/// Per-row arrays override the scalar defaults when present.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
#[allow(clippy::too_many_arguments)]
pub fn top_k_top_p_sampling_from_prob<F: Elem>(
    probs: &[F],
    top_k_arr: Option<&[u32]>,
    top_p_arr: Option<&[f32]>,
    output: &mut [u32],
    top_k_val: u32,
    top_p_val: f32,
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("output", batch, output.len())?;
    if let Some(arr) = top_k_arr {
        check_len("top_k_arr", batch, arr.len())?;
    }
    if let Some(arr) = top_p_arr {
        check_len("top_p_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let row = &probs[i * d..][..d];
        let k = top_k_arr.map_or(top_k_val, |arr| arr[i]);
        let top_p = top_p_arr.map_or(top_p_val, |arr| arr[i]);
        let mut temp = SamplingTempStorage::new(shape);
        let mut rng = PhiloxStream::new(options.philox_seed, i as u64, options.philox_offset);
        *out = truncated_sample(row, &mut temp, &mut rng, options.deterministic, |agg| {
            agg.count < k && agg.value < top_p
        });
    });
    Ok(())
}
