//! Per-row sampling engine: worker-group state, the streaming
//! scan-and-select sampler, and the fused pivot-search sweeps.
//!
//! Everything here operates on a single row through its worker-group
//! scratch. Batch orchestration (and row parallelism) lives in `ops`.

use crate::block::{self, BlockShape, Pair};
use crate::elem::Elem;
use crate::philox::PhiloxStream;

/// One row's worth of tiled data.
///
/// The same streaming selector serves plain probability rows and the
/// speculative kernel's on-the-fly residual `relu(target − draft)`, so
/// tile loading sits behind this seam.
pub(crate) trait TileSource {
    fn len(&self) -> usize;

    /// Load tile `tile` into `out`, zero-padding out-of-range lanes.
    fn load(&self, shape: BlockShape, tile: usize, out: &mut [f32]);
}

pub(crate) struct ProbRow<'a, F> {
    pub row: &'a [F],
}

impl<F: Elem> TileSource for ProbRow<'_, F> {
    fn len(&self) -> usize {
        self.row.len()
    }

    fn load(&self, shape: BlockShape, tile: usize, out: &mut [f32]) {
        block::load_tile(self.row, shape, tile, out);
    }
}

/// Residual distribution `relu(target − draft)`; `draft = None` for the
/// bonus-token case, where the draft term is zero.
pub(crate) struct ResidualRow<'a, F> {
    pub target: &'a [F],
    pub draft: Option<&'a [F]>,
}

impl<F: Elem> TileSource for ResidualRow<'_, F> {
    fn len(&self) -> usize {
        self.target.len()
    }

    fn load(&self, shape: BlockShape, tile: usize, out: &mut [f32]) {
        let base = tile * shape.tile_len();
        for (j, slot) in out.iter_mut().enumerate() {
            let idx = base + j;
            *slot = if idx < self.target.len() {
                let t = self.target[idx].to_f32();
                let dr = self.draft.map_or(0.0, |row| row[idx].to_f32());
                (t - dr).max(0.0)
            } else {
                0.0
            };
        }
    }
}

/// Worker-group scratch for the sampling kernels.
///
/// Mirrors the per-group shared-memory block: the broadcast slots plus a
/// scratch region in which exactly one primitive is live at a time.
pub(crate) struct SamplingTempStorage {
    pub shape: BlockShape,
    /// Current best candidate; updated with a minimum, initial `d - 1`.
    pub sampled_id: usize,
    /// Raw lane values of the current tile.
    pub(crate) tile: Vec<f32>,
    /// Predicate-masked lane values; input to the sum and the scan.
    masked: Vec<f32>,
    /// Reduce/scan tree scratch.
    pub(crate) scratch: Vec<f32>,
    lane_totals: Vec<f32>,
    pair_scratch: Vec<Pair>,
    flags: Vec<bool>,
}

impl SamplingTempStorage {
    pub(crate) fn new(shape: BlockShape) -> Self {
        let tile_len = shape.tile_len();
        Self {
            shape,
            sampled_id: 0,
            tile: vec![0.0; tile_len],
            masked: vec![0.0; tile_len],
            scratch: vec![0.0; tile_len],
            lane_totals: vec![0.0; shape.threads],
            pair_scratch: vec![Pair::default(); tile_len],
            flags: vec![false; tile_len],
        }
    }
}

/// Worker-group scratch for the renorm and mask kernels.
pub(crate) struct RenormTempStorage {
    pub shape: BlockShape,
    pub(crate) tile: Vec<f32>,
    pub(crate) scratch: Vec<f32>,
    pair_scratch: Vec<Pair>,
}

impl RenormTempStorage {
    pub(crate) fn new(shape: BlockShape) -> Self {
        let tile_len = shape.tile_len();
        Self {
            shape,
            tile: vec![0.0; tile_len],
            scratch: vec![0.0; tile_len],
            pair_scratch: vec![Pair::default(); tile_len],
        }
    }
}

/// Inverse-CDF selection inside a predicate-masked row in one streaming
/// pass.
///
/// On return `temp.sampled_id` holds the first index whose masked running
/// CDF crosses `u`, folded in with a minimum; if no masked element
/// crosses, the slot keeps its prior value (callers reset it to `d - 1`).
pub(crate) fn scan_select<S, P>(
    src: &S,
    temp: &mut SamplingTempStorage,
    pred: P,
    u: f32,
    deterministic: bool,
) where
    S: TileSource,
    P: Fn(f32) -> bool,
{
    let d = src.len();
    let shape = temp.shape;
    let tile_len = shape.tile_len();
    let mut aggregate = 0.0f32;
    for tile_idx in 0..shape.num_tiles(d) {
        src.load(shape, tile_idx, &mut temp.tile);
        let base = tile_idx * tile_len;
        for j in 0..tile_len {
            let p = temp.tile[j];
            temp.masked[j] = if pred(p) && base + j < d { p } else { 0.0 };
        }
        temp.scratch.copy_from_slice(&temp.masked);
        let tile_sum = block::reduce_sum(&mut temp.scratch);

        if aggregate + tile_sum > u {
            // crossing tile: locate the first lane whose running CDF
            // clears u
            if deterministic {
                block::inclusive_scan_deterministic(&mut temp.masked, &mut temp.scratch);
            } else {
                block::inclusive_scan_fast(&mut temp.masked, &mut temp.lane_totals, shape.vec);
            }
            for j in 0..tile_len {
                let p = temp.tile[j];
                temp.flags[j] = temp.masked[j] + aggregate > u && pred(p) && base + j < d;
            }
            if let Some(flip) = block::first_flip(&temp.flags) {
                temp.sampled_id = temp.sampled_id.min(base + flip);
            }
        }

        aggregate += tile_sum;
        if aggregate > u {
            break;
        }
    }
}

/// One fused streaming pass computing the `(sum, count)` of elements
/// strictly above two pivots simultaneously.
pub(crate) fn sweep_pair_above<S: TileSource>(
    src: &S,
    temp: &mut SamplingTempStorage,
    pivot_0: f64,
    pivot_1: f64,
) -> (Pair, Pair) {
    let d = src.len();
    let shape = temp.shape;
    let tile_len = shape.tile_len();
    let mut agg_0 = Pair::default();
    let mut agg_1 = Pair::default();
    for tile_idx in 0..shape.num_tiles(d) {
        src.load(shape, tile_idx, &mut temp.tile);
        let base = tile_idx * tile_len;
        for (j, pair) in temp.pair_scratch.iter_mut().enumerate() {
            let p = temp.tile[j];
            let above = f64::from(p) > pivot_0 && base + j < d;
            *pair = Pair::new(if above { p } else { 0.0 }, u32::from(above));
        }
        agg_0 = agg_0 + block::reduce_pair(&mut temp.pair_scratch);
        for (j, pair) in temp.pair_scratch.iter_mut().enumerate() {
            let p = temp.tile[j];
            let above = f64::from(p) > pivot_1 && base + j < d;
            *pair = Pair::new(if above { p } else { 0.0 }, u32::from(above));
        }
        agg_1 = agg_1 + block::reduce_pair(&mut temp.pair_scratch);
    }
    (agg_0, agg_1)
}

/// Rejection-resampling loop shared by the truncated sampling policies.
///
/// Each round samples under the working pivot, proposes two refinements,
/// and either accepts the sampled element (its aggregate fits the goal)
/// or tightens the bracket, remeasures the surviving mass `q`, and
/// redraws `u ∈ [0, q)` from the same per-row stream.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn truncated_sample<F, G>(
    row: &[F],
    temp: &mut SamplingTempStorage,
    rng: &mut PhiloxStream,
    deterministic: bool,
    fits: G,
) -> u32
where
    F: Elem,
    G: Fn(Pair) -> bool,
{
    let d = row.len();
    let src = ProbRow { row };
    let mut q = 1.0f32;
    let mut low = 0.0f64;
    let mut high = 1.0f64;
    loop {
        temp.sampled_id = d - 1;
        let u = rng.next_f32() * q;
        scan_select(&src, temp, |x| f64::from(x) > low, u, deterministic);
        let sampled = temp.sampled_id;
        // The d-1 fallback can propose a pivot outside the truncated
        // support; the bracket still tightens and the loop converges.
        let pivot_0 = f64::from(row[sampled].to_f32());
        let pivot_1 = (pivot_0 + high) / 2.0;
        let (agg_0, agg_1) = sweep_pair_above(&src, temp, pivot_0, pivot_1);
        if fits(agg_0) {
            return sampled as u32;
        }
        if fits(agg_1) {
            low = pivot_0;
            high = pivot_1;
            q = agg_0.value;
        } else {
            low = pivot_1;
            q = agg_1.value;
        }
        if low >= high {
            return sampled as u32;
        }
    }
}

/// Maximum over the in-range lanes of a row.
pub(crate) fn row_max<S: TileSource>(
    src: &S,
    shape: BlockShape,
    tile: &mut [f32],
    scratch: &mut [f32],
) -> f32 {
    let d = src.len();
    let tile_len = shape.tile_len();
    let mut best = f32::NEG_INFINITY;
    for tile_idx in 0..shape.num_tiles(d) {
        src.load(shape, tile_idx, tile);
        let base = tile_idx * tile_len;
        for (j, slot) in scratch.iter_mut().enumerate() {
            *slot = if base + j < d {
                tile[j]
            } else {
                f32::NEG_INFINITY
            };
        }
        best = best.max(block::reduce_max(scratch));
    }
    best
}

/// Minimum over the in-range lanes of a row.
pub(crate) fn row_min<S: TileSource>(
    src: &S,
    shape: BlockShape,
    tile: &mut [f32],
    scratch: &mut [f32],
) -> f32 {
    let d = src.len();
    let tile_len = shape.tile_len();
    let mut best = f32::INFINITY;
    for tile_idx in 0..shape.num_tiles(d) {
        src.load(shape, tile_idx, tile);
        let base = tile_idx * tile_len;
        for (j, slot) in scratch.iter_mut().enumerate() {
            *slot = if base + j < d { tile[j] } else { f32::INFINITY };
        }
        best = best.min(block::reduce_min(scratch));
    }
    best
}

/// Mass of the in-range lanes satisfying `pred`.
pub(crate) fn row_masked_sum<S, P>(
    src: &S,
    shape: BlockShape,
    tile: &mut [f32],
    scratch: &mut [f32],
    pred: P,
) -> f32
where
    S: TileSource,
    P: Fn(f32) -> bool,
{
    let d = src.len();
    let tile_len = shape.tile_len();
    let mut total = 0.0f32;
    for tile_idx in 0..shape.num_tiles(d) {
        src.load(shape, tile_idx, tile);
        let base = tile_idx * tile_len;
        for (j, slot) in scratch.iter_mut().enumerate() {
            let p = tile[j];
            *slot = if pred(p) && base + j < d { p } else { 0.0 };
        }
        total += block::reduce_sum(scratch);
    }
    total
}

/// One streaming pass of the renorm-form pivot search: `(sum, count)` of
/// elements above `pivot`, plus the bracket gap statistics
/// `min{p : p > low}` and `max{p : p ≤ high}`.
pub(crate) struct RenormSweep {
    pub agg: Pair,
    pub min_gt_low: f32,
    pub max_le_high: f32,
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn sweep_renorm<F: Elem>(
    row: &[F],
    temp: &mut RenormTempStorage,
    pivot: f64,
    low: f64,
    high: f64,
) -> RenormSweep {
    let d = row.len();
    let shape = temp.shape;
    let tile_len = shape.tile_len();
    let mut agg = Pair::default();
    let mut min_gt_low = high as f32;
    let mut max_le_high = low as f32;
    for tile_idx in 0..shape.num_tiles(d) {
        block::load_tile(row, shape, tile_idx, &mut temp.tile);
        let base = tile_idx * tile_len;
        for (j, pair) in temp.pair_scratch.iter_mut().enumerate() {
            let p = temp.tile[j];
            let above = f64::from(p) > pivot && base + j < d;
            *pair = Pair::new(if above { p } else { 0.0 }, u32::from(above));
        }
        agg = agg + block::reduce_pair(&mut temp.pair_scratch);

        for (j, slot) in temp.scratch.iter_mut().enumerate() {
            let p = temp.tile[j];
            *slot = if f64::from(p) > low && base + j < d {
                p
            } else {
                f32::INFINITY
            };
        }
        min_gt_low = min_gt_low.min(block::reduce_min(&mut temp.scratch));

        for (j, slot) in temp.scratch.iter_mut().enumerate() {
            let p = temp.tile[j];
            *slot = if f64::from(p) <= high && base + j < d {
                p
            } else {
                f32::NEG_INFINITY
            };
        }
        max_le_high = max_le_high.max(block::reduce_max(&mut temp.scratch));
    }
    RenormSweep {
        agg,
        min_gt_low,
        max_le_high,
    }
}

/// Midpoint bisection for the renorm-form kernels.
///
/// Tightens `[low, high]` until no row value lies strictly between the
/// bracket endpoints, keeping `g(low) ≥ target` throughout. Returns the
/// final `(low, sum_low)`: the pivot and the recorded mass above it.
/// `sum_low` starts at 1 and is only assigned when the meets branch is
/// taken.
#[allow(clippy::float_cmp)]
pub(crate) fn renorm_pivot_search<F, G>(
    row: &[F],
    temp: &mut RenormTempStorage,
    mut low: f64,
    mut high: f64,
    meets: G,
) -> (f64, f32)
where
    F: Elem,
    G: Fn(Pair) -> bool,
{
    let mut sum_low = 1.0f32;
    loop {
        let pivot = (low + high) / 2.0;
        let sweep = sweep_renorm(row, temp, pivot, low, high);
        if meets(sweep.agg) {
            low = pivot;
            sum_low = sweep.agg.value;
        } else {
            high = pivot.min(f64::from(sweep.max_le_high));
        }
        if sweep.min_gt_low == sweep.max_le_high {
            return (low, sum_low);
        }
    }
}
