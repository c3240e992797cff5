//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type. Per-connection failures
//! (transport, serialization) are contained by the session that hit them;
//! the variants that can reach an HTTP client map to a status code and the
//! structured JSON body below.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "route not found: /nope",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Config     | 500 Internal Server Error |
/// | 2000–2999 | Not Found  | 404 Not Found             |
/// | 3000–3999 | Server     | 500 / 503                 |
/// | 4000–4999 | Connection | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A connection id was registered twice.
    #[error("connection already registered: {0}")]
    DuplicateConnection(ConnectionId),

    /// The websocket transport failed (peer gone, socket error).
    #[error("transport error: {0}")]
    Transport(#[source] axum::Error),

    /// An outbound payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No route serves the requested path.
    #[error("route not found: {0}")]
    NotFound(String),

    /// `/metrics` was requested but no recorder is installed.
    #[error("metrics recorder not installed")]
    MetricsUnavailable,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::NotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::MetricsUnavailable => 3002,
            Self::DuplicateConnection(_) => 4001,
            Self::Transport(_) => 4002,
            Self::Serialization(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MetricsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DuplicateConnection(_)
            | Self::Transport(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
