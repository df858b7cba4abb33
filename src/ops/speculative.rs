//! Chain speculative decoding: accept or reject a row of draft tokens
//! against the target distribution, then resample the first rejected
//! position from the residual `relu(target − draft)`.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::options::SamplingOptions;
use crate::philox::PhiloxStream;
use crate::row::{row_masked_sum, scan_select, ResidualRow, SamplingTempStorage};
use crate::Result;

/// Verify `num_speculative_tokens` draft tokens per row against the
/// target model's distributions.
///
/// Shapes: `draft_probs [batch, k, d]`, `draft_ids [batch, k]`,
/// `target_probs [batch, k+1, d]`, `output_token_ids [batch, k+1]`.
/// Draft token `i` is accepted while `u · draft < target` holds at its
/// id; the first rejected position is resampled from the residual
/// distribution, and later slots are filled with `-1`. When every draft
/// survives, slot `k` receives a bonus token drawn from the target's
/// `k`-th distribution.
///
/// `output_accepted_token_num` and `output_emitted_token_num` accumulate
/// with `+=` so callers can track acceptance statistics across calls.
/// Accepted counts the per-position accept draws (positions past the
/// first rejection are redrawn, counted, and not emitted), so
/// `accepted ≥ emitted` always holds.
///
/// # Errors
/// Returns an error if a buffer does not match the batch geometry.
#[allow(
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
pub fn chain_speculative_sampling<F: Elem>(
    draft_probs: &[F],
    draft_ids: &[u32],
    target_probs: &[F],
    output_token_ids: &mut [i32],
    output_accepted_token_num: &mut [u32],
    output_emitted_token_num: &mut [u32],
    batch: usize,
    num_speculative_tokens: usize,
    d: usize,
    options: &SamplingOptions,
) -> Result<()> {
    let k = num_speculative_tokens;
    check_len("draft_probs", batch * k * d, draft_probs.len())?;
    check_len("draft_ids", batch * k, draft_ids.len())?;
    check_len("target_probs", batch * (k + 1) * d, target_probs.len())?;
    check_len("output_token_ids", batch * (k + 1), output_token_ids.len())?;
    check_len(
        "output_accepted_token_num",
        batch,
        output_accepted_token_num.len(),
    )?;
    check_len(
        "output_emitted_token_num",
        batch,
        output_emitted_token_num.len(),
    )?;
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    output_token_ids
        .par_chunks_mut(k + 1)
        .zip(output_accepted_token_num.par_iter_mut())
        .zip(output_emitted_token_num.par_iter_mut())
        .enumerate()
        .for_each(|(row, ((out_row, accepted_slot), emitted_slot))| {
            let mut rng =
                PhiloxStream::new(options.philox_seed, row as u64, options.philox_offset);

            let accept_draw = |i: usize, rng: &mut PhiloxStream| {
                let token = draft_ids[row * k + i] as usize;
                let p = draft_probs[(row * k + i) * d + token].to_f32();
                let q = target_probs[(row * (k + 1) + i) * d + token].to_f32();
                rng.next_f32() * p < q
            };

            let mut pos = k;
            for i in 0..k {
                if accept_draw(i, &mut rng) {
                    out_row[i] = draft_ids[row * k + i] as i32;
                } else {
                    pos = i;
                    break;
                }
            }
            let emitted = pos;

            // fresh draws for the remaining positions, counted but not
            // emitted, so the acceptance-rate statistic covers the whole
            // chain
            let mut accepted = pos;
            for i in pos..k {
                if accept_draw(i, &mut rng) {
                    accepted += 1;
                }
            }

            // resample position `pos` from the residual distribution
            // (target-only for the bonus slot)
            let target_row = &target_probs[(row * (k + 1) + pos) * d..][..d];
            let draft_row = (pos < k).then(|| &draft_probs[(row * k + pos) * d..][..d]);
            let src = ResidualRow {
                target: target_row,
                draft: draft_row,
            };
            let mut temp = SamplingTempStorage::new(shape);
            let q_residual =
                row_masked_sum(&src, shape, &mut temp.tile, &mut temp.scratch, |x| x > 0.0);
            let u = rng.next_f32() * q_residual;
            temp.sampled_id = d - 1;
            scan_select(&src, &mut temp, |x| x > 0.0, u, options.deterministic);
            out_row[pos] = temp.sampled_id as i32;
            for slot in &mut out_row[pos + 1..] {
                *slot = -1;
            }

            *accepted_slot += accepted as u32;
            *emitted_slot += emitted as u32;
        });
    Ok(())
}
