//! Renormalization kernels: truncate a row by pivot search, then rewrite
//! it in place as a normalized distribution over the survivors.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::row::{renorm_pivot_search, row_max, ProbRow, RenormTempStorage};
use crate::Result;

/// Floor for the recorded survivor mass, so degenerate rows never divide
/// by zero.
const SUM_EPS: f32 = 1e-8;

/// Keep the smallest set of largest entries whose mass reaches `top_p`,
/// renormalized to sum to one; everything else becomes zero.
///
/// `top_p_arr` overrides `top_p_val` per row when present. `top_p` at or
/// above the row mass leaves the distribution intact.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn top_p_renorm_prob<F: Elem>(
    probs: &[F],
    renormed_prob: &mut [F],
    top_p_arr: Option<&[f32]>,
    top_p_val: f32,
    batch: usize,
    d: usize,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("renormed_prob", batch * d, renormed_prob.len())?;
    if let Some(arr) = top_p_arr {
        check_len("top_p_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    renormed_prob
        .par_chunks_mut(d)
        .enumerate()
        .for_each(|(i, out_row)| {
            let row = &probs[i * d..][..d];
            let top_p = top_p_arr.map_or(top_p_val, |arr| arr[i]);
            let mut temp = RenormTempStorage::new(shape);
            let max_val = row_max(&ProbRow { row }, shape, &mut temp.tile, &mut temp.scratch);
            let (low, sum_low) =
                renorm_pivot_search(row, &mut temp, 0.0, f64::from(max_val), |agg| {
                    agg.value >= top_p
                });
            rewrite_normalized(row, out_row, low, sum_low);
        });
    Ok(())
}

/// Keep the k largest entries (all of a boundary tie), renormalized to
/// sum to one; everything else becomes zero.
///
/// `top_k_arr` overrides `top_k_val` per row when present. `k ≥ d` skips
/// the search and emits the input unchanged.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn top_k_renorm_prob<F: Elem>(
    probs: &[F],
    renormed_prob: &mut [F],
    top_k_arr: Option<&[u32]>,
    top_k_val: u32,
    batch: usize,
    d: usize,
) -> Result<()> {
    check_len("probs", batch * d, probs.len())?;
    check_len("renormed_prob", batch * d, renormed_prob.len())?;
    if let Some(arr) = top_k_arr {
        check_len("top_k_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    renormed_prob
        .par_chunks_mut(d)
        .enumerate()
        .for_each(|(i, out_row)| {
            let row = &probs[i * d..][..d];
            let k = top_k_arr.map_or(top_k_val, |arr| arr[i]);
            if k as usize >= d {
                out_row.copy_from_slice(row);
                return;
            }
            let mut temp = RenormTempStorage::new(shape);
            let max_val = row_max(&ProbRow { row }, shape, &mut temp.tile, &mut temp.scratch);
            let (low, sum_low) =
                renorm_pivot_search(row, &mut temp, 0.0, f64::from(max_val), |agg| {
                    agg.count >= k
                });
            rewrite_normalized(row, out_row, low, sum_low);
        });
    Ok(())
}

fn rewrite_normalized<F: Elem>(row: &[F], out_row: &mut [F], low: f64, sum_low: f32) {
    let normalizer = 1.0 / sum_low.max(SUM_EPS);
    for (o, &x) in out_row.iter_mut().zip(row) {
        let v = x.to_f32();
        *o = F::from_f32(if f64::from(v) > low { v * normalizer } else { 0.0 });
    }
}
