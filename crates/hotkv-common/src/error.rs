//! Error types for HotKV
//!
//! Expected conditions (absence, duplicate creation, transaction outcomes)
//! are returned as [`Error`]. Broken invariants are not: they are logged and
//! the thread panics.

use crate::types::Key;
use thiserror::Error;

/// Common result type for HotKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for HotKV
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Store errors
    #[error("no such key: {0}")]
    KeyNotFound(Key),

    #[error("key already exists: {0}")]
    DuplicateKey(Key),

    // Transaction outcomes, produced and consumed above the store
    #[error("transaction aborted")]
    Abort,

    #[error("transaction stashed for later")]
    Stash,

    #[error("application error: no retry")]
    NoRetry,

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if the transaction may be run again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Abort | Self::Stash)
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Check if a locked creation lost to an existing record
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}
