//! Min-p sampling: keep entries at least `min_p` times the row maximum,
//! then sample once from the surviving mass. One-shot pivot, no search.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{row_masked_sum, row_max, scan_select, ProbRow, SamplingTempStorage};
use crate::Result;

/// Sample one token per row among entries with `p ≥ max(row) · min_p`.
///
/// `min_p_arr` overrides `min_p_val` per row when present. `min_p = 0`
/// degrades to plain multinomial sampling.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
#[allow(clippy::cast_possible_truncation)]
pub fn min_p_sampling_from_prob<F: Elem>(
    probs: &[F],
    min_p_arr: Option<&[f32]>,
    output: &mut [u32],
    min_p_val: f32,
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("output", batch, output.len())?;
    if let Some(arr) = min_p_arr {
        check_len("min_p_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let row = &probs[i * d..][..d];
        let min_p = min_p_arr.map_or(min_p_val, |arr| arr[i]);
        let src = ProbRow { row };
        let mut temp = SamplingTempStorage::new(shape);
        let mut rng = PhiloxStream::new(options.philox_seed, i as u64, options.philox_offset);

        let max_val = row_max(&src, shape, &mut temp.tile, &mut temp.scratch);
        let pivot = max_val * min_p;
        // surviving mass becomes the normalizer for the single draw
        let q = row_masked_sum(&src, shape, &mut temp.tile, &mut temp.scratch, |x| {
            x >= pivot
        });
        let u = rng.next_f32() * q;
        temp.sampled_id = d - 1;
        scan_select(&src, &mut temp, |x| x >= pivot, u, options.deterministic);
        *out = temp.sampled_id as u32;
    });
    Ok(())
}
