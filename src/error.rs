//! Error taxonomy shared across the retrieval pipeline.

use thiserror::Error;

/// Errors surfaced by pipeline operations.
///
/// Every failure maps onto exactly one of these kinds so callers can tell a
/// rejected input apart from a broken backend or a tripped rate limit. No
/// operation retries internally; failures propagate to the immediate caller.
#[derive(Debug, Error)]
pub enum RagError {
    /// The caller supplied input of the wrong shape or size. Recoverable.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Two vectors of different dimensionality were compared or stored.
    /// This indicates a configuration bug, not a per-request condition.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality established by the store or the left-hand vector.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// The storage backend rejected an operation or is unreachable.
    #[error("storage error: {0}")]
    Storage(String),

    /// The caller exhausted its request budget for the current window.
    #[error("rate limit exceeded: maximum {limit} requests per minute")]
    RateLimitExceeded {
        /// Configured per-window request budget, returned for client backoff.
        limit: u32,
    },

    /// The remote embedding service failed or timed out.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The remote generation service failed or timed out.
    #[error("generation error: {0}")]
    Generation(String),
}
