//! Error types for sortilege

use thiserror::Error;

/// Result type alias using sortilege's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sortilege operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("shape mismatch in {what}: expected {expected} elements, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}
