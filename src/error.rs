//! Error types for check definition construction

use std::fmt;

/// Result type alias for check construction
pub type CheckResult<T> = Result<T, CheckError>;

/// Reasons a configuration subtree cannot become a [`Check`](crate::check::Check)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The subtree has no `URL` key (or it is empty)
    MissingUrl,

    /// The `URL` value is not an absolute http(s) URL
    InvalidUrl { value: String, reason: String },

    /// The `REGEX` value does not compile
    InvalidRegex { pattern: String, reason: String },

    /// A top-level entry under the checks prefix is a plain key, not a directory
    NotADirectory { key: String },
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::MissingUrl => write!(f, "no URL for check"),
            CheckError::InvalidUrl { value, reason } => {
                write!(f, "URL '{}' is not valid: {}", value, reason)
            }
            CheckError::InvalidRegex { pattern, reason } => {
                write!(f, "couldn't compile regex '{}': {}", pattern, reason)
            }
            CheckError::NotADirectory { key } => write!(f, "{} is not a directory", key),
        }
    }
}

impl std::error::Error for CheckError {}
