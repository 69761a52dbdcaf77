//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use chainstream_core::error::StreamError;
use chainstream_journal::JournalError;

/// Errors while turning a [`ServerConfig`](crate::config::ServerConfig) into a running server.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Request failures, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::Stream(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            Self::Stream(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        let boundary = StreamError::InvalidStreamBoundary {
            start_time: 0,
            end_time: Some(10),
            max_window_seconds: 5,
        };
        assert_eq!(ApiError::from(boundary).status(), StatusCode::BAD_REQUEST);
        let contract = StreamError::ContractViolation("no end_time".into());
        assert_eq!(ApiError::from(contract).status(), StatusCode::BAD_REQUEST);
        let strict = StreamError::ReceivingEvents {
            provider: "ethereum_txpool".into(),
            reason: "timed out after 10ms".into(),
        };
        assert_eq!(ApiError::from(strict).status(), StatusCode::INTERNAL_SERVER_ERROR);
        let rejected = StreamError::Unauthorized("HTTP 401: unknown token".into());
        assert_eq!(ApiError::from(rejected).status(), StatusCode::UNAUTHORIZED);
        let storage = StreamError::Storage("disk full".into());
        assert_eq!(ApiError::from(storage).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
