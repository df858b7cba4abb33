//! Top-p (nucleus) sampling: restrict each row to the smallest mass
//! `≥ top_p` of its largest entries, found by pivot search.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{truncated_sample, SamplingTempStorage};
use crate::Result;

/// Sample one token per row from the row's top-p nucleus.
///
/// `top_p_arr` overrides `top_p_val` per row when present. `top_p ≥ 1`
/// degrades to plain multinomial sampling.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn top_p_sampling_from_prob<F: Elem>(
    probs: &[F],
    output: &mut [u32],
    top_p_arr: Option<&[f32]>,
    top_p_val: f32,
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("output", batch, output.len())?;
    if let Some(arr) = top_p_arr {
        check_len("top_p_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let row = &probs[i * d..][..d];
        let top_p = top_p_arr.map_or(top_p_val, |arr| arr[i]);
        let mut temp = SamplingTempStorage::new(shape);
        let mut rng = PhiloxStream::new(options.philox_seed, i as u64, options.philox_offset);
        *out = truncated_sample(row, &mut temp, &mut rng, options.deterministic, |agg| {
            agg.value < top_p
        });
    });
    Ok(())
}
