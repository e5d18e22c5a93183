//! Error types for cached reads and cache-aware mutations.

use thiserror::Error;

/// Errors returned by [`crate::QueryCache::fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError<E> {
    /// The fetcher itself failed; the previous cached value is untouched.
    #[error("query fetch failed: {0}")]
    Fetch(E),
    /// A value is cached under the key but with another Rust type.
    #[error("cached value for {key} has an unexpected type")]
    TypeMismatch {
        /// Rendered cache key.
        key: String,
    },
    /// The background fetch task stopped without producing a result.
    #[error("fetch for {key} stopped before completing")]
    Aborted {
        /// Rendered cache key.
        key: String,
    },
}

/// Errors returned by [`crate::QueryCache::run_mutation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError<E> {
    /// The mutation failed; nothing was invalidated.
    #[error("mutation failed: {0}")]
    Failed(E),
    /// The mutation task stopped without producing a result.
    #[error("mutation stopped before completing")]
    Aborted,
}
