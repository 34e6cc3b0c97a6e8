//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request adaptation (multipart and JSON/base64 into one call shape)
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Health check endpoint
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "gondola audit API running"
    }))
}
