//! Top-k logit masking: pivot search on raw logits, everything outside
//! the top-k set becomes −∞.

use rayon::prelude::*;

use crate::block::BlockShape;
use crate::elem::Elem;
use crate::ops::check_len;
use crate::row::{renorm_pivot_search, row_max, row_min, ProbRow, RenormTempStorage};
use crate::Result;

/// Mask each row's logits outside its top-k set to negative infinity.
///
/// Values tied with the k-th largest all stay finite. `top_k_arr`
/// overrides `top_k_val` per row when present; `k ≥ d` skips the search
/// and emits the input unchanged.
///
/// # Errors
/// Returns an error if a buffer does not match `[batch, d]` geometry.
pub fn top_k_mask_logits<F: Elem>(
    logits: &[F],
    masked_logits: &mut [F],
    top_k_arr: Option<&[u32]>,
    top_k_val: u32,
    batch: usize,
    d: usize,
) -> Result<()> {
    check_len("logits", batch * d, logits.len())?;
    check_len("masked_logits", batch * d, masked_logits.len())?;
    if let Some(arr) = top_k_arr {
        check_len("top_k_arr", batch, arr.len())?;
    }
    if batch == 0 || d == 0 {
        return Ok(());
    }
    let shape = BlockShape::for_row::<F>(d);
    masked_logits
        .par_chunks_mut(d)
        .enumerate()
        .for_each(|(i, out_row)| {
            let row = &logits[i * d..][..d];
            let k = top_k_arr.map_or(top_k_val, |arr| arr[i]);
            if k as usize >= d {
                out_row.copy_from_slice(row);
                return;
            }
            let src = ProbRow { row };
            let mut temp = RenormTempStorage::new(shape);
            let max_val = row_max(&src, shape, &mut temp.tile, &mut temp.scratch);
            let min_val = row_min(&src, shape, &mut temp.tile, &mut temp.scratch);
            let (low, _) = renorm_pivot_search(
                row,
                &mut temp,
                f64::from(min_val) - 1.0,
                f64::from(max_val),
                |agg| agg.count >= k,
            );
            for (o, &x) in out_row.iter_mut().zip(row) {
                let v = x.to_f32();
                *o = if f64::from(v) > low {
                    x
                } else {
                    F::NEG_INF
                };
            }
        });
    Ok(())
}
