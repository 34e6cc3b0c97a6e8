//! Shared data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Round to a fixed number of decimal places
fn round_places(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// One detected object, derived from the model's raw output.
/// Immutable once created; values are rounded at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    /// Human-readable label
    pub sku: String,
    /// Integer class id
    pub class_id: i64,
    /// Confidence score 0-1, rounded to 4 decimals
    pub confidence: f64,
    /// [left, top, right, bottom], rounded to 2 decimals
    pub bbox_xyxy: [f64; 4],
    /// [left, top, width, height], rounded to 2 decimals
    pub bbox_xywh: [f64; 4],
}

impl DetectionResult {
    /// Build from raw detector output (corner-pair box in image coordinates).
    pub fn new(sku: String, class_id: i64, confidence: f64, bbox_xyxy: [f64; 4]) -> Self {
        let [x1, y1, x2, y2] = bbox_xyxy;
        let (w, h) = (x2 - x1, y2 - y1);

        Self {
            sku,
            class_id,
            confidence: round_places(confidence, 4),
            bbox_xyxy: [
                round_places(x1, 2),
                round_places(y1, 2),
                round_places(x2, 2),
                round_places(y2, 2),
            ],
            bbox_xywh: [
                round_places(x1, 2),
                round_places(y1, 2),
                round_places(w, 2),
                round_places(h, 2),
            ],
        }
    }
}

/// Summary counts over the detections of one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionCounts {
    pub total_detections: usize,
    pub by_sku: BTreeMap<String, u64>,
}

impl DetectionCounts {
    pub fn from_detections(detections: &[DetectionResult]) -> Self {
        let mut by_sku: BTreeMap<String, u64> = BTreeMap::new();
        for det in detections {
            *by_sku.entry(det.sku.clone()).or_insert(0) += 1;
        }

        Self {
            total_detections: detections.len(),
            by_sku,
        }
    }
}

/// Caller-supplied audit metadata, passed through verbatim.
/// Absent fields serialize as explicit nulls so downstream consumers
/// see a stable schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestMetadata {
    pub store_code: Option<String>,
    pub room_code: Option<String>,
    pub auditor: Option<String>,
}

/// Aggregate response for one inference request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferencePayload {
    /// UTC timestamp of the inference (ISO-8601)
    pub datetime: DateTime<Utc>,
    /// File name of the weights in use
    pub model: String,
    /// Inference resolution used
    pub imgsz: u32,
    /// Confidence threshold used
    pub conf_threshold: f32,
    /// Detections in model output order (not sorted)
    pub detections: Vec<DetectionResult>,
    pub counts: DetectionCounts,
    /// Path of the persisted raw artifact
    pub image_path: String,
    /// Path of the persisted annotated artifact
    pub annotated_path: String,
    pub meta: RequestMetadata,
    /// Base64 of the annotated artifact, only when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_base64: Option<String>,
}
