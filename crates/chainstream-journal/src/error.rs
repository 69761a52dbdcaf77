//! Journal service error types.

use thiserror::Error;

use chainstream_core::error::StreamError;

/// Errors returned by the journal / resource service client.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The request never got a response (connect failure, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl JournalError {
    /// Returns `true` if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }

    /// Returns `true` if the service rejected the caller's token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

impl From<JournalError> for StreamError {
    fn from(e: JournalError) -> Self {
        if e.is_unauthorized() {
            StreamError::Unauthorized(e.to_string())
        } else {
            StreamError::Journal(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(JournalError::Http("connection reset".into()).is_retryable());
        assert!(JournalError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(JournalError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!JournalError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!JournalError::Decode("missing field".into()).is_retryable());
    }

    #[test]
    fn converts_into_stream_error() {
        let err: StreamError = JournalError::Status { status: 502, body: "bad gateway".into() }.into();
        assert_eq!(err.to_string(), "Journal error: HTTP 502: bad gateway");

        let err: StreamError = JournalError::Status { status: 401, body: "bad token".into() }.into();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Unauthorized: HTTP 401: bad token");
    }
}
