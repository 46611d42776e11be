//! Error types for Gatekeeper

use std::io;

use thiserror::Error;

/// Result type alias for Gatekeeper
pub type Result<T> = std::result::Result<T, Error>;

/// Gatekeeper errors
///
/// Contention (a lock held by someone else, depleted inventory) is never an
/// error; it is reported as a negative return value by the operation itself.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backing store returned data that contradicts what was written
    #[error("Backend data error: {0}")]
    Backend(String),

    /// Backing store could not complete the operation (unreachable, poisoned, ...)
    #[error("Backend access error: {0}")]
    Access(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an access error from anything displayable
    pub fn access(message: impl Into<String>) -> Self {
        Self::Access(message.into())
    }

    /// Returns `true` for faults where the backend could not be reached or
    /// failed mid-operation, as opposed to returning inconsistent data.
    #[must_use]
    pub fn is_access_fault(&self) -> bool {
        matches!(self, Self::Access(_) | Self::Io(_) | Self::Internal(_))
    }
}
