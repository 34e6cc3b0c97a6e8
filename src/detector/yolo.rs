//! YoloDetector - ONNX Runtime YOLO Inference
//!
//! ## Responsibilities
//!
//! - Load the ONNX session once at startup (shared read-only thereafter)
//! - Letterbox preprocessing and tensor conversion
//! - Output decoding, class-aware NMS, optional horizontal-flip TTA
//! - Rendering the annotated frame

use super::{draw_detections, AnnotatedFrame, Detect, DetectorConfig, DetectorOutput, RawDetection};
use crate::error::{Error, Result};
use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::sync::Mutex;

/// Letterbox padding color (YOLO convention)
const PAD_VALUE: u8 = 114;

/// YOLO detector over an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex; everything else is immutable after `load`.
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    names: Vec<String>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load the model and resolve class names. Called once at startup.
    pub fn load(config: DetectorConfig) -> Result<Self> {
        let session = Session::builder()
            .and_then(|b| Ok(b.with_log_level(LogLevel::Error)?))
            .and_then(|mut b| b.commit_from_file(&config.weights_path))
            .map_err(|e| {
                Error::Detection(format!(
                    "failed to load weights {}: {}",
                    config.weights_path.display(),
                    e
                ))
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| Error::Detection("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| Error::Detection("model declares no outputs".to_string()))?;

        let names = match &config.class_names_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| {
                    Error::Detection(format!("failed to read class names {}: {}", path.display(), e))
                })?
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            None => Vec::new(),
        };

        tracing::info!(
            weights = %config.weights_path.display(),
            input = %input_name,
            output = %output_name,
            classes = names.len(),
            imgsz = config.imgsz,
            "YOLO model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            names,
            config,
        })
    }

    fn label_for(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    /// One forward pass over a letterboxed frame, returning candidates
    /// in original-image coordinates.
    fn forward(&self, image: &RgbImage) -> Result<Vec<Candidate>> {
        let imgsz = self.config.imgsz;
        let lb = LetterboxParams::for_image(image.width(), image.height(), imgsz);
        let canvas = letterbox(image, &lb, imgsz);
        let tensor = to_input_tensor(&canvas);

        let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let data = tensor
            .as_slice()
            .ok_or_else(|| Error::Detection("input tensor is not contiguous".to_string()))?;
        let input = TensorRef::from_array_view((dims, data))
            .map_err(|e| Error::Detection(format!("failed to build input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Detection("model session lock poisoned".to_string()))?;

        let inputs: SessionInputs<'_, '_, 0> =
            SessionInputs::ValueMap(vec![(Cow::Borrowed(self.input_name.as_str()), input.into())]);
        let outputs = session
            .run(inputs)
            .map_err(|e| Error::Detection(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Detection(format!("unexpected output tensor: {}", e)))?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        let mut candidates = decode_output(data, &shape, self.config.conf)?;
        for c in &mut candidates {
            c.bbox = lb.to_original(c.bbox, image.width() as f32, image.height() as f32);
        }
        Ok(candidates)
    }
}

impl Detect for YoloDetector {
    fn detect(&self, image: &RgbImage) -> Result<DetectorOutput> {
        let mut candidates = self.forward(image)?;

        // Horizontal-flip TTA: second pass on the mirrored frame, boxes
        // mapped back before suppression.
        if self.config.augment {
            let flipped = imageops::flip_horizontal(image);
            let mut extra = self.forward(&flipped)?;
            let w = image.width() as f32;
            for c in &mut extra {
                c.bbox = unflip_box(c.bbox, w);
            }
            candidates.extend(extra);
        }

        let kept = nms(candidates, self.config.iou, self.config.max_det);

        let detections: Vec<RawDetection> = kept
            .into_iter()
            .map(|c| RawDetection {
                class_id: c.class_id as i64,
                label: self.label_for(c.class_id),
                confidence: c.confidence,
                bbox: c.bbox,
            })
            .collect();

        let mut annotated = image.clone();
        draw_detections(&mut annotated, &detections);

        Ok(DetectorOutput {
            detections,
            annotated: AnnotatedFrame::Image(annotated),
        })
    }
}

/// Detection candidate before suppression
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    /// [x1, y1, x2, y2]
    pub bbox: [f32; 4],
}

/// Geometry of an aspect-preserving letterbox resize
#[derive(Debug, Clone, Copy)]
pub(crate) struct LetterboxParams {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub new_w: u32,
    pub new_h: u32,
}

impl LetterboxParams {
    pub fn for_image(orig_w: u32, orig_h: u32, imgsz: u32) -> Self {
        let scale = (imgsz as f32 / orig_w as f32).min(imgsz as f32 / orig_h as f32);
        let new_w = ((orig_w as f32 * scale).round() as u32).min(imgsz);
        let new_h = ((orig_h as f32 * scale).round() as u32).min(imgsz);
        Self {
            scale,
            pad_x: (imgsz - new_w) as f32 / 2.0,
            pad_y: (imgsz - new_h) as f32 / 2.0,
            new_w,
            new_h,
        }
    }

    /// Map a letterbox-space box back to original-image coordinates,
    /// clamped to the image bounds.
    pub fn to_original(&self, bbox: [f32; 4], orig_w: f32, orig_h: f32) -> [f32; 4] {
        let [x1, y1, x2, y2] = bbox;
        [
            ((x1 - self.pad_x) / self.scale).clamp(0.0, orig_w),
            ((y1 - self.pad_y) / self.scale).clamp(0.0, orig_h),
            ((x2 - self.pad_x) / self.scale).clamp(0.0, orig_w),
            ((y2 - self.pad_y) / self.scale).clamp(0.0, orig_h),
        ]
    }
}

fn letterbox(image: &RgbImage, lb: &LetterboxParams, imgsz: u32) -> RgbImage {
    let resized = imageops::resize(image, lb.new_w, lb.new_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(imgsz, imgsz, Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]));
    imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);
    canvas
}

/// NCHW float tensor, scaled to 0-1
fn to_input_tensor(canvas: &RgbImage) -> Array4<f32> {
    let (w, h) = (canvas.width() as usize, canvas.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, px) in canvas.enumerate_pixels() {
        for ch in 0..3 {
            tensor[[0, ch, y as usize, x as usize]] = px.0[ch] as f32 / 255.0;
        }
    }
    tensor
}

/// Decode a YOLOv8-layout output tensor `[1, 4 + nc, n]`: center boxes in
/// letterbox space plus per-class scores, thresholded by confidence.
pub(crate) fn decode_output(data: &[f32], shape: &[i64], conf: f32) -> Result<Vec<Candidate>> {
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(Error::Detection(format!(
            "unsupported output shape {:?}, expected [1, 4+nc, n]",
            shape
        )));
    }
    let channels = shape[1] as usize;
    let anchors = shape[2] as usize;
    let nc = channels - 4;

    if data.len() < channels * anchors {
        return Err(Error::Detection("output tensor shorter than its shape".to_string()));
    }

    let at = |ch: usize, j: usize| data[ch * anchors + j];

    let mut candidates = Vec::new();
    for j in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for c in 0..nc {
            let score = at(4 + c, j);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < conf {
            continue;
        }

        let (cx, cy, w, h) = (at(0, j), at(1, j), at(2, j), at(3, j));
        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }
    Ok(candidates)
}

/// Mirror a box back after horizontal-flip TTA
pub(crate) fn unflip_box(bbox: [f32; 4], width: f32) -> [f32; 4] {
    let [x1, y1, x2, y2] = bbox;
    [width - x2, y1, width - x1, y2]
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    inter / (area_a + area_b - inter)
}

/// Greedy class-aware non-maximum suppression, capped at `max_det`
pub(crate) fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_det: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_det {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}
