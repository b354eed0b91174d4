//! Error types for the pivot save behavior.

use thiserror::Error;

/// Boxed error produced by storage collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pivot operations.
pub type PivotResult<T> = Result<T, PivotError>;

/// Errors raised while staging or synchronizing pivots.
#[derive(Debug, Error)]
pub enum PivotError {
    /// The record type cannot manage pivot rows.
    #[error("record type {type_name} must implement PivotCapable to save pivots")]
    MissingCapability { type_name: String },

    /// The record has neither a virtual nor a real property with this name.
    #[error("unknown property {type_name}::{name}")]
    UnknownProperty { type_name: String, name: String },

    /// Failure reported by the storage layer, passed through untouched.
    #[error(transparent)]
    Storage(BoxError),

    /// Options could not be parsed.
    #[error("invalid pivot options: {0}")]
    Options(String),
}

impl PivotError {
    pub(crate) fn storage(err: BoxError) -> Self {
        Self::Storage(err)
    }

    /// Attempts to recover the original storage error.
    pub fn downcast_storage<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Storage(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}
