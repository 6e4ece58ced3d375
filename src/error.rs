//! Unified error contract surfaced to the browser client.
//!
//! Every signer, token and transport failure is classified into exactly one
//! [`ErrorKind`] before it leaves the proxy. The HTTP boundary renders it as
//! `{"error": <message>, "code": <kind>}` and never exposes internals.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

/// Classification of a proxy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Required secrets or settings are missing.
    ConfigError,
    /// The vendor credential endpoint failed.
    AuthError,
    /// Transport-level socket or HTTP failure.
    ConnectionFailed,
    /// No terminal response within the budget.
    Timeout,
    /// The vendor spoke an unexpected protocol (status, frame order).
    ProtocolError,
    /// The vendor returned a structured error code.
    VendorRejected,
    /// The vendor response did not match the expected envelope.
    ParseError,
    /// The session was cancelled before it settled.
    Cancelled,
    /// The client sent an invalid request.
    BadRequest,
    /// The configured vendor lacks the requested capability.
    Unsupported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "ConfigError",
            Self::AuthError => "AuthError",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::Timeout => "Timeout",
            Self::ProtocolError => "ProtocolError",
            Self::VendorRejected => "VendorRejected",
            Self::ParseError => "ParseError",
            Self::Cancelled => "Cancelled",
            Self::BadRequest => "BadRequest",
            Self::Unsupported => "Unsupported",
        }
    }

    /// HTTP status used when this kind reaches the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ConfigError | Self::ProtocolError | Self::ParseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::AuthError | Self::ConnectionFailed | Self::VendorRejected => {
                StatusCode::BAD_GATEWAY
            }
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unsupported => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced anywhere between the client request and the vendor.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to obtain vendor credentials: {0}")]
    Auth(String),

    #[error("connection to vendor failed: {0}")]
    ConnectionFailed(String),

    #[error("vendor did not respond in time: {0}")]
    Timeout(String),

    #[error("unexpected vendor protocol: {0}")]
    Protocol(String),

    #[error("vendor rejected the request (code {code}): {message}")]
    VendorRejected { code: i64, message: String },

    #[error("failed to parse vendor response: {0}")]
    Parse(String),

    #[error("evaluation session was cancelled")]
    Cancelled,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unsupported(String),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Auth(_) => ErrorKind::AuthError,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) => ErrorKind::ProtocolError,
            Self::VendorRejected { .. } => ErrorKind::VendorRejected,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Collapse into the client-facing `{error, code}` body.
    pub fn normalize(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: self.kind(),
        }
    }

    /// Classify a `reqwest` failure from a call to the vendor.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<base64::DecodeError> for ProxyError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Parse(format!("invalid base64: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProxyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::ConnectionFailed(err.to_string())
    }
}

/// JSON body returned to the client on failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorKind,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status();
        if status.is_server_error() {
            error!(code = %kind, "{}", self);
        } else {
            warn!(code = %kind, "{}", self);
        }
        (status, Json(self.normalize())).into_response()
    }
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
