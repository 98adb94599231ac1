//! Telemetry source errors

use thiserror::Error;

/// Errors returned by a [`TelemetrySource`](super::TelemetrySource)
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller lacks permission to read the log group or metric
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Source returned an error response
    #[error("Service error: {status} - {message}")]
    Service { status: u16, message: String },

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Throttled by the source's rate limiter
    #[error("Throttled, retry after {retry_after_ms}ms")]
    Throttled { retry_after_ms: u64 },

    /// Log group or metric does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for telemetry source operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

impl TelemetryError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Network(_)
            | TelemetryError::Timeout(_)
            | TelemetryError::Throttled { .. } => true,
            TelemetryError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry delay in milliseconds, if any
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            TelemetryError::Throttled { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
