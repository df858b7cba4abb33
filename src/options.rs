//! Options shared by the randomized sampling entry points.

use serde::{Deserialize, Serialize};

/// Options for the randomized sampling kernels.
///
/// The seed/offset pair is caller-owned: the engine never persists PRNG
/// state, so the caller steps `philox_offset` between launches to advance
/// the stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Use the fixed-tree prefix sum inside every sampling pass so that
    /// repeat runs with the same `(seed, offset)` are bit-identical.
    /// Reductions keep their tree order either way; they are only consumed
    /// through monotone comparisons.
    pub deterministic: bool,
    /// Philox key.
    pub philox_seed: u64,
    /// Philox counter base. Same `(seed, offset, row)` always yields the
    /// same draw sequence, regardless of batch size.
    pub philox_offset: u64,
}

impl SamplingOptions {
    /// Options with a fixed seed, non-deterministic scan variant.
    #[must_use]
    pub fn with_seed(philox_seed: u64, philox_offset: u64) -> Self {
        Self {
            deterministic: false,
            philox_seed,
            philox_offset,
        }
    }
}
