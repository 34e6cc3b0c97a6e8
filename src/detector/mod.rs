//! Detector - Object Detection Capability
//!
//! ## Responsibilities
//!
//! - `Detect` trait: the seam between the pipeline and the concrete model
//! - Process-wide detector configuration (read once at startup)
//! - Annotated frame normalization (pixel buffers vs. decoded images)

mod draw;
mod yolo;

pub use draw::draw_detections;
pub use yolo::YoloDetector;

use crate::error::Result;
use image::RgbImage;
use std::path::PathBuf;

/// Detector configuration, fixed at process startup.
/// Per-request overrides are intentionally not supported here.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// ONNX weights path
    pub weights_path: PathBuf,
    /// Optional label file, one label per line (index = class id)
    pub class_names_path: Option<PathBuf>,
    /// Confidence threshold
    pub conf: f32,
    /// IOU threshold for non-maximum suppression
    pub iou: f32,
    /// Inference resolution (square letterbox)
    pub imgsz: u32,
    /// Maximum detections per image
    pub max_det: usize,
    /// Horizontal-flip test-time augmentation
    pub augment: bool,
}

impl DetectorConfig {
    /// File name of the weights, used as the model identifier in payloads
    pub fn model_name(&self) -> String {
        self.weights_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.weights_path.display().to_string())
    }
}

/// One raw detection straight from the model, in original-image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: i64,
    pub label: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2]
    pub bbox: [f32; 4],
}

/// Channel order of a raw pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Annotated frame as returned by a detection capability.
///
/// Capabilities may hand back a raw interleaved pixel buffer (possibly
/// BGR-ordered), an already-decoded RGB image, or nothing at all. The
/// `Unavailable` variant is the explicit degraded-mode case: detections
/// still ran, only the rendered annotation is missing.
#[derive(Debug, Clone)]
pub enum AnnotatedFrame {
    Pixels {
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
    },
    Image(RgbImage),
    Unavailable,
}

impl AnnotatedFrame {
    /// Normalize into an RGB image. BGR buffers are channel-reversed.
    /// Returns None for `Unavailable` and for pixel buffers whose length
    /// does not match their claimed dimensions.
    pub fn into_rgb(self) -> Option<RgbImage> {
        match self {
            AnnotatedFrame::Image(img) => Some(img),
            AnnotatedFrame::Pixels {
                mut data,
                width,
                height,
                order,
            } => {
                if data.len() != (width as usize) * (height as usize) * 3 {
                    return None;
                }
                if order == ChannelOrder::Bgr {
                    for px in data.chunks_exact_mut(3) {
                        px.swap(0, 2);
                    }
                }
                RgbImage::from_raw(width, height, data)
            }
            AnnotatedFrame::Unavailable => None,
        }
    }
}

/// Output of one detection call
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    /// Detections in model output order
    pub detections: Vec<RawDetection>,
    /// Rendered annotated frame, if the capability produced one
    pub annotated: AnnotatedFrame,
}

/// Detection capability seam.
///
/// Implementations must be safe for concurrent inference: the loaded model
/// is shared read-only across request handlers for the process lifetime.
pub trait Detect: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<DetectorOutput>;
}
