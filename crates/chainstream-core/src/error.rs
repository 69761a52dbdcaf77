//! Error types for the event stream layer.

use thiserror::Error;

/// Errors that can occur while querying event providers.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The requested window is wider than the provider allows.
    #[error(
        "Invalid stream boundary: window {start_time}..{} exceeds {max_window_seconds}s",
        fmt_end(.end_time)
    )]
    InvalidStreamBoundary {
        start_time: i64,
        end_time: Option<i64>,
        max_window_seconds: i64,
    },

    /// A provider failed while the caller requested strict aggregation.
    #[error("Error receiving events from provider '{provider}': {reason}")]
    ReceivingEvents { provider: String, reason: String },

    /// A provider operation was called with arguments that break its contract.
    #[error("Provider contract violated: {0}")]
    ContractViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Journal error: {0}")]
    Journal(String),

    /// A collaborating service rejected the caller's credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A backing call did not complete in time.
    #[error("Provider '{provider}' timed out after {ms}ms")]
    Timeout { provider: String, ms: u64 },

    #[error("{0}")]
    Other(String),
}

fn fmt_end(end_time: &Option<i64>) -> String {
    end_time.map_or_else(|| "now".to_string(), |t| t.to_string())
}

impl StreamError {
    /// Returns `true` if the error was caused by caller-supplied input
    /// rather than a backing-store failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStreamBoundary { .. } | Self::ContractViolation(_)
        )
    }

    /// Returns `true` if a collaborating service rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
