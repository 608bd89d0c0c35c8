//! Error types for configuration store access

use std::fmt;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No endpoint answered
    Unreachable(String),

    /// The requested key does not exist
    NotFound(String),

    /// The store answered with something we could not understand
    Protocol(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unreachable(msg) => write!(f, "configuration store unreachable: {}", msg),
            StoreError::NotFound(key) => write!(f, "key not found in configuration store: {}", key),
            StoreError::Protocol(msg) => write!(f, "configuration store protocol error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Protocol(err.to_string())
        } else {
            StoreError::Unreachable(err.to_string())
        }
    }
}
