//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// An unknown aggregate on load is not an error: it is an empty stream at
/// version 0. `AggregateNotFound` is only raised by handlers that require an
/// existing stream.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict. Nothing was written; reload and retry.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A business rule was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored event could not be decoded into its declared kind.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled before it completed; nothing was written.
    #[error("operation cancelled")]
    Cancelled,

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` if the caller may retry after reloading the stream.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
