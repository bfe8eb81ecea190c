//! Error types for the firstmatch library
//!
//! Building is all-or-nothing: on any error no automaton is produced and no
//! resources leak. Matching itself is infallible and reports "no match"
//! through `Option` instead of an error.

use thiserror::Error;

/// Result type alias for firstmatch operations
pub type Result<T> = std::result::Result<T, AcError>;

/// Main error type for automaton construction and adoption
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcError {
    /// Empty pattern, null pattern element, or a pattern too long to encode
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Memory allocation failed
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Packed buffer exceeds the supported offset width even after widening
    #[error("offset overflow: {0}")]
    Overflow(String),

    /// A buffer handed to [`crate::PackedAc::from_bytes`] failed structural
    /// validation
    #[error("validation failed: {0}")]
    Validation(String),
}
