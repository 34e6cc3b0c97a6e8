//! API Routes

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{InferencePayload, RequestMetadata};
use crate::state::AppState;

/// Uploaded shelf photos can be large; the axum default of 2 MB is too low
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::root))
        .route("/predict", post(predict))
        .route("/predict_base64", post(predict_base64))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// JSON body for the base64 path.
///
/// `conf_threshold` and `imgsz` are accepted for forward compatibility but
/// are not forwarded to inference; the detector is configured once at
/// process startup.
#[derive(Debug, Deserialize)]
struct PredictBase64Body {
    image_base64: String,
    store_code: Option<String>,
    room_code: Option<String>,
    auditor: Option<String>,
    #[serde(default = "default_true")]
    return_image: bool,
    conf_threshold: Option<f32>,
    imgsz: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn parse_form_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        other => Err(Error::Validation(format!(
            "invalid boolean value '{}' for return_image",
            other
        ))),
    }
}

// ========================================
// Predict Handlers
// ========================================

/// Multipart upload path. `return_image` defaults to false here.
async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<InferencePayload>> {
    let mut file: Option<Vec<u8>> = None;
    let mut meta = RequestMetadata::default();
    let mut return_image = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("failed to read upload: {}", e)))?;
                file = Some(bytes.to_vec());
            }
            "store_code" => meta.store_code = Some(read_text(field).await?),
            "room_code" => meta.room_code = Some(read_text(field).await?),
            "auditor" => meta.auditor = Some(read_text(field).await?),
            "return_image" => return_image = parse_form_bool(&read_text(field).await?)?,
            _ => {}
        }
    }

    let file = file.ok_or_else(|| Error::Validation("missing required field 'file'".to_string()))?;

    let outcome = state.pipeline.process(file, meta, return_image).await?;
    Ok(Json(outcome.payload))
}

/// JSON/base64 path. `return_image` defaults to true here.
async fn predict_base64(
    State(state): State<AppState>,
    Json(body): Json<PredictBase64Body>,
) -> Result<Json<InferencePayload>> {
    if body.image_base64.is_empty() {
        return Err(Error::Validation("image_base64 is empty".to_string()));
    }

    // MIME-style wrapped base64 is accepted: whitespace is discarded
    // before decoding, everything else must be valid alphabet.
    let compact: String = body
        .image_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let content = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::Validation(format!("invalid base64: {}", e)))?;

    if body.conf_threshold.is_some() || body.imgsz.is_some() {
        tracing::debug!(
            conf_threshold = ?body.conf_threshold,
            imgsz = ?body.imgsz,
            "Per-request inference overrides accepted but not applied"
        );
    }

    let meta = RequestMetadata {
        store_code: body.store_code,
        room_code: body.room_code,
        auditor: body.auditor,
    };

    let outcome = state.pipeline.process(content, meta, body.return_image).await?;
    Ok(Json(outcome.payload))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| Error::Validation(format!("failed to read form field: {}", e)))
}
