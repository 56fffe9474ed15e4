//! Error types for the resolution cache.

use thiserror::Error;

/// Errors surfaced by cache lookups.
///
/// [`CacheError::NotFound`] is the caller-visible "no such node, VM or scale
/// set is currently known" sentinel. Remote failures carry the operation and
/// key they happened on.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("instance not found")]
    NotFound,
    /// The remote call failed but may succeed later (network, 5xx, throttling).
    #[error("{operation}({key}) failed: {source}")]
    Transient {
        operation: &'static str,
        key: String,
        #[source]
        source: vmssflex_api::Error,
    },
    /// The remote side answered with something we cannot use.
    #[error("{operation}({key}) returned an unexpected response: {reason}")]
    Fatal {
        operation: &'static str,
        key: String,
        reason: String,
    },
    /// More than one VM matched a computer name lookup.
    #[error("more than one virtual machine matches computer name {computer_name}")]
    MultipleMatches { computer_name: String },
}

impl CacheError {
    /// Classifies an API error raised by `operation` on `key`.
    pub fn from_api(operation: &'static str, key: &str, err: vmssflex_api::Error) -> Self {
        if err.is_not_found() {
            Self::NotFound
        } else if err.is_retryable() {
            Self::Transient {
                operation,
                key: key.to_string(),
                source: err,
            }
        } else {
            Self::Fatal {
                operation,
                key: key.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
