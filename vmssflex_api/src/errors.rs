//! Error types for the ARM client.

use std::time::Duration;

/// Errors that can occur when calling Azure Resource Manager.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The request could not be sent or the response body could not be read.
    #[error("Request failed")]
    RequestFailed,
    /// The addressed resource (or its resource group) does not exist.
    #[error("Resource not found")]
    NotFound,
    /// ARM answered with HTTP 429. `retry_after` comes from the `Retry-After` header.
    #[error("Request throttled (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },
    /// ARM returned a non-success status with a body snippet.
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The response was well-formed HTTP but not the shape we expected.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the same request may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed | Self::Throttled { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound | Self::Malformed(_) => false,
        }
    }

    /// The server-requested backoff, if this is a throttling error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::NotFound.is_retryable());
        assert!(Error::RequestFailed.is_retryable());
        assert!(Error::Throttled { retry_after: None }.is_retryable());
        assert!(Error::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!Error::HttpStatus {
            status: 403,
            body: String::new()
        }
        .is_retryable());
        assert!(!Error::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_for_throttling() {
        let throttled = Error::Throttled {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::RequestFailed.retry_after(), None);
    }
}
