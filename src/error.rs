//! Error handling for the check-in kiosk

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::{ApiError, ApiResponse};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable camera device
    #[error("No camera device: {0}")]
    NoDevice(String),

    /// Platform refused camera access
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// Decode stream failed to open or died mid-scan
    #[error("Decode stream error: {0}")]
    DecodeStream(String),

    /// Backend rejected or never received a check-in
    #[error("Submission failed: {0}")]
    Submit(String),

    /// No colaboradorID stored on this kiosk
    #[error("Identity missing: {0}")]
    IdentityMissing(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (operation not allowed in current state)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, shared by HTTP responses and realtime frames.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoDevice(_) => "NO_DEVICE",
            Error::PermissionDenied(_) => "PERMISSION_DENIED",
            Error::DecodeStream(_) => "DECODE_STREAM_ERROR",
            Error::Submit(_) => "SUBMIT_ERROR",
            Error::IdentityMissing(_) => "IDENTITY_MISSING",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Conflict(_) => "CONFLICT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let error_code = self.error_code();
        let (status, message) = match &self {
            Error::NoDevice(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Error::DecodeStream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Error::Submit(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Error::IdentityMissing(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Serialization(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(ApiResponse::<()>::error(ApiError {
            code: error_code.to_string(),
            message,
        }));

        (status, body).into_response()
    }
}
