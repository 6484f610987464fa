//! Numeric backend errors.

use thiserror::Error;

/// Errors raised by a [`NumericBackend`](super::NumericBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend refused a new allocation (resource exhaustion).
    #[error("Backend allocation failed: {live} live allocations, limit {limit}")]
    AllocationFailed { live: usize, limit: usize },

    /// The handle was never issued by this backend or has been released.
    #[error("Unknown or released tensor handle: {0}")]
    UnknownHandle(u64),

    /// Elementwise operands differ in length.
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}
