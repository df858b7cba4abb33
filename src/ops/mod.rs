//! Batched sampling, renormalization, masking, and speculative kernels.
//!
//! One module per kernel. Each entry point checks output-buffer geometry,
//! then fans rows out over the rayon pool; everything per-row lives in
//! `crate::row`.

mod mask;
mod min_p;
mod renorm;
mod sampling;
mod speculative;
mod top_k;
mod top_k_top_p;
mod top_p;

pub use mask::top_k_mask_logits;
pub use min_p::min_p_sampling_from_prob;
pub use renorm::{top_k_renorm_prob, top_p_renorm_prob};
pub use sampling::{parallel_sampling_from_prob, sampling_from_prob};
pub use speculative::chain_speculative_sampling;
pub use top_k::top_k_sampling_from_prob;
pub use top_k_top_p::top_k_top_p_sampling_from_prob;
pub use top_p::top_p_sampling_from_prob;

use crate::error::{Error, Result};

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ShapeMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}
