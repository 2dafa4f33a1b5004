//! Error types for the store layer.
//!
//! Only the dynamic, string-keyed accessor surface can fail at runtime:
//! typed cell handles make unknown fields and type mismatches
//! unrepresentable. The one fatal variant, [`StoreError::InfiniteLoop`],
//! is the runaway-recomputation guard firing.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the keyed accessor API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested field name is not part of the store's cell set.
    #[error("no field named '{field}' in store '{store}'")]
    UnknownField { store: String, field: String },

    /// The field exists but does not hold a value of the requested type.
    #[error("field '{field}' does not hold a value of the requested type")]
    TypeMismatch { field: String },

    /// Attempted to write a derived (read-only) field through the keyed API.
    #[error("field '{field}' is read-only and cannot be written")]
    ReadOnlyField { field: String },

    /// The runaway-recomputation guard tripped. Best-effort diagnostic: the
    /// usual cause is a selector or equality function that is rebuilt on
    /// every call instead of being created once and reused.
    #[error(
        "value accessors evaluated {limit} times without a scheduler tick; \
         a selector/equality function is likely recreated on every call, \
         causing an infinite re-evaluation loop"
    )]
    InfiniteLoop { limit: usize },
}
