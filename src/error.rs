//! Error handling for the gondola audit API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Image bytes could not be decoded
    #[error("Image decode error: {0}")]
    Decode(String),

    /// Request validation error (missing file, bad base64, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Detection capability failed (opaque upstream message)
    #[error("Detection error: {0}")]
    Detection(String),

    /// Artifact storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // All request failures surface uniformly as a client error with the
        // underlying message in "detail" (no structured error taxonomy).
        let message = self.to_string();

        tracing::error!(
            status = %StatusCode::BAD_REQUEST,
            message = %message,
            "Request error"
        );

        let body = Json(json!({ "detail": message }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
