//! Sortilege: batched truncated token sampling for LLM decoding.
//!
//! Given per-row categorical distributions over a vocabulary, the kernels
//! here select one token per row under the usual serving policies
//! (multinomial, top-k, top-p, min-p, top-k ∩ top-p, and chain speculative
//! acceptance), plus top-p/top-k renormalization and top-k logit masking.
//!
//! No kernel ever sorts a row or materialises the truncated support: each
//! policy is a pivot search driven by block-style reductions and prefix
//! scans that stream the unsorted row O(log d) times. Randomness is a
//! counter-based Philox stream keyed per row by `(seed, row, offset)`, and
//! an optional `deterministic` mode fixes the prefix-sum tree so repeat
//! runs are bit-identical.
//!
//! Rows are independent and run concurrently on the rayon pool; all state
//! is ephemeral per call.

pub mod elem;
pub mod error;
pub mod ops;
pub mod options;

mod block;
mod philox;
mod row;

pub use elem::Elem;
pub use error::{Error, Result};
pub use ops::{
    chain_speculative_sampling, min_p_sampling_from_prob, parallel_sampling_from_prob,
    sampling_from_prob, top_k_mask_logits, top_k_renorm_prob, top_k_sampling_from_prob,
    top_k_top_p_sampling_from_prob, top_p_renorm_prob, top_p_sampling_from_prob,
};
pub use options::SamplingOptions;
