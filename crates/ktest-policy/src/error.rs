//! Error types for admission policies

use thiserror::Error;

/// Errors raised while preparing an admission check
///
/// None of these escalate: callers resolve every variant to an allow verdict.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The old or new document is absent or not a structured object
    #[error("Decode failure: {0}")]
    DecodeFailure(String),
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
