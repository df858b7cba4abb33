//! Unconstrained multinomial sampling from probability rows.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{scan_select, ProbRow, SamplingTempStorage};
use crate::Result;

/// Sample one token per row from the full distribution.
///
/// Rows with no positive mass fall back to index `d - 1`.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn sampling_from_prob<F: Elem>(
    probs: &[F],
    output: &mut [u32],
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("output", batch, output.len())?;
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(row_idx, out)| {
        let row = &probs[row_idx * d..][..d];
        *out = sample_row(row, shape, row_idx as u64, options);
    });
    Ok(())
}

/// Same as [`sampling_from_prob`], with each logical batch entry drawing
/// its physical row through `row_indices`.
///
/// The Philox stream is keyed by the *logical* entry index, so physically
/// permuting rows while remapping `row_indices` leaves every per-entry
/// sample unchanged.
///
/// # Errors
/// Returns an error if a buffer does not match the batch geometry.
pub fn parallel_sampling_from_prob<F: Elem>(
    probs: &[F],
    output: &mut [u32],
    row_indices: &[u32],
    batch: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    check_len("output", batch, output.len())?;
    check_len("row_indices", batch, row_indices.len())?;
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let row = &probs[row_indices[i] as usize * d..][..d];
        *out = sample_row(row, shape, i as u64, options);
    });
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn sample_row<F: Elem>(
    row: &[F],
    shape: BlockShape,
    stream_idx: u64,
    options: &SamplingOptions,
) -> u32 {
    let mut temp = SamplingTempStorage::new(shape);
    let mut rng = PhiloxStream::new(options.philox_seed, stream_idx, options.philox_offset);
    let u = rng.next_f32();
    temp.sampled_id = row.len() - 1;
    scan_select(
        &ProbRow { row },
        &mut temp,
        |x| x > 0.0,
        u,
        options.deterministic,
    );
    temp.sampled_id as u32
}
