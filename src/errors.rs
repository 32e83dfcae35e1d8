//! Unified error types for the toggle store.
//!
//! Primary-path store failures surface as `StoreUnavailable`; multi-key writes that
//! stopped half way surface as `PartialWrite` so the caller can decide on repair.

use thiserror::Error;

/// Errors produced by the store adapters and the core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An application, feature, metadata record or toggle entry is absent
    #[error("Not found: {what}")]
    NotFound {
        /// Human-readable description of what was looked up
        what: String,
    },

    /// The underlying key-value store failed or timed out
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Cause reported by the adapter
        message: String,
    },

    /// Input rejected before touching the store
    #[error("Validation error: {message}")]
    Validation {
        /// Why the input was rejected
        message: String,
    },

    /// One step of a multi-key write succeeded and a later one failed
    #[error("Partial write: {completed} written, {failed} failed: {message}")]
    PartialWrite {
        /// Key(s) that were written before the failure
        completed: String,
        /// Key that could not be written
        failed: String,
        /// Cause of the failing step
        message: String,
    },

    /// Operation against a key holding another kind of value
    #[error("WRONGTYPE operation against key {key} holding the wrong kind of value")]
    WrongType {
        /// Offending key
        key: String,
    },

    /// Configuration could not be read or is malformed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong while loading
        message: String,
    },

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sea_orm::DbErr> for Error {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::StoreUnavailable {
            message: value.to_string(),
        }
    }
}

impl Error {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
