//! Error types for dlhub
//!
//! This module provides:
//! - [`TaskError`] / [`FailureKind`] - per-task failures reported by work units
//! - [`Error`] - crate-level errors (hub, configuration, API server)
//! - HTTP status code mapping and structured error responses for the API

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for dlhub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dlhub
///
/// Per-task failures never surface here: they are captured in
/// [`TaskResult`](crate::types::TaskResult)s.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "hub.queue_capacity")
        key: Option<String>,
    },

    /// The hub's coordination loop is no longer running
    #[error("broadcast hub is closed")]
    HubClosed,

    /// Request rejected before any work started
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No work unit is configured to execute batches
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Kind of per-task failure
///
/// The declaration order is the severity order used for exit codes: a later
/// variant is a worse failure. See [`FailureKind::severity`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unclassified failure
    Failed,
    /// Network or remote-server failure (timeouts, resets, 5xx)
    Network,
    /// Source is gone, private, or geo-restricted
    Unavailable,
    /// Source or format is not supported by the work unit
    Unsupported,
    /// Credentials missing or rejected
    Auth,
    /// Local I/O failure (disk full, permission denied)
    Io,
}

impl FailureKind {
    /// Severity rank used for exit-code aggregation (1..=6)
    pub fn severity(&self) -> i32 {
        match self {
            FailureKind::Failed => 1,
            FailureKind::Network => 2,
            FailureKind::Unavailable => 3,
            FailureKind::Unsupported => 4,
            FailureKind::Auth => 5,
            FailureKind::Io => 6,
        }
    }

    /// Machine-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Failed => "failed",
            FailureKind::Network => "network",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Auth => "auth",
            FailureKind::Io => "io",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a work unit for one task
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[error("{kind}: {message}")]
pub struct TaskError {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable description
    pub message: String,
}

impl TaskError {
    /// Create a task error
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Unclassified failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Failed, message)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe => FailureKind::Network,
            std::io::ErrorKind::PermissionDenied => FailureKind::Io,
            std::io::ErrorKind::NotFound => FailureKind::Unavailable,
            _ => FailureKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_request",
///     "message": "invalid request: batch contains no tasks"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_request", "hub_closed")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 400,
            Error::NotSupported(_) => 501,
            Error::HubClosed => 503,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::NotSupported(_) => "not_supported",
            Error::HubClosed => "hub_closed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        match &error {
            Error::Config { key: Some(key), .. } => {
                ApiError::with_details(code, message, serde_json::json!({ "key": key }))
            }
            _ => ApiError::new(code, message),
        }
    }
}
