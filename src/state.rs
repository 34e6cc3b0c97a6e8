//! Application state
//!
//! Holds configuration and the shared per-request pipeline

use crate::detector::DetectorConfig;
use crate::pipeline::InferencePipeline;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration, read from the environment once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Artifact output directory
    pub output_dir: PathBuf,
    /// ONNX weights path
    pub weights_path: PathBuf,
    /// Optional class label file (one label per line)
    pub class_names_path: Option<PathBuf>,
    /// Confidence threshold
    pub conf: f32,
    /// NMS IOU threshold
    pub iou: f32,
    /// Inference resolution
    pub imgsz: u32,
    /// Maximum detections per image
    pub max_det: usize,
    /// Test-time augmentation flag
    pub augment: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("outputs_api")),
            weights_path: std::env::var("BEST_WEIGHTS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/best.onnx")),
            class_names_path: std::env::var("CLASS_NAMES").ok().map(PathBuf::from),
            conf: std::env::var("CONF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.30),
            iou: std::env::var("IOU")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.65),
            imgsz: std::env::var("IMG_SZ")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(832),
            max_det: std::env::var("MAX_DET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            augment: std::env::var("AUGMENT")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(true),
        }
    }
}

impl AppConfig {
    /// Detector slice of the configuration
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            weights_path: self.weights_path.clone(),
            class_names_path: self.class_names_path.clone(),
            conf: self.conf,
            iou: self.iou,
            imgsz: self.imgsz,
            max_det: self.max_det,
            augment: self.augment,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Inference & evidence pipeline (shared, stateless between requests)
    pub pipeline: Arc<InferencePipeline>,
}
