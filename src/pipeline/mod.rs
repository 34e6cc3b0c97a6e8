//! InferencePipeline - Inference & Evidence Pipeline
//!
//! ## Responsibilities
//!
//! - Decode request bytes into an RGB image
//! - Invoke the detection capability (blocking pool, strictly sequential)
//! - Normalize the annotated frame, with an explicit degraded-mode fallback
//! - Persist raw + annotated artifacts under a fresh request id
//! - Assemble the InferencePayload, optionally embedding the annotated
//!   artifact as base64
//!
//! Both request adapters (multipart and JSON/base64) converge here.

use crate::detector::Detect;
use crate::error::{Error, Result};
use crate::evidence_store::EvidenceStore;
use crate::models::{DetectionCounts, DetectionResult, InferencePayload, RequestMetadata};
use chrono::Utc;
use image::RgbImage;
use std::sync::Arc;
use uuid::Uuid;

/// Where the persisted annotated artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationSource {
    /// Rendered frame produced by the detection capability
    Detector,
    /// Degraded mode: the capability produced no usable frame, the
    /// original image was persisted instead. Detections still ran.
    OriginalFallback,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub payload: InferencePayload,
    pub annotation: AnnotationSource,
}

/// The single reusable per-request code path
pub struct InferencePipeline {
    detector: Arc<dyn Detect>,
    store: EvidenceStore,
    model_name: String,
    imgsz: u32,
    conf_threshold: f32,
}

impl InferencePipeline {
    pub fn new(
        detector: Arc<dyn Detect>,
        store: EvidenceStore,
        model_name: String,
        imgsz: u32,
        conf_threshold: f32,
    ) -> Self {
        Self {
            detector,
            store,
            model_name,
            imgsz,
            conf_threshold,
        }
    }

    /// Run the full pipeline for one request.
    ///
    /// Stages run strictly sequentially; inference is CPU-bound and moves
    /// to the blocking pool.
    pub async fn process(
        &self,
        bytes: Vec<u8>,
        meta: RequestMetadata,
        return_image: bool,
    ) -> Result<PipelineOutcome> {
        let decoded = decode_rgb(&bytes)?;
        let datetime = Utc::now();

        let detector = self.detector.clone();
        let inference_input = decoded.clone();
        let output = tokio::task::spawn_blocking(move || detector.detect(&inference_input))
            .await
            .map_err(|e| Error::Detection(format!("inference task panicked: {}", e)))??;

        let detections: Vec<DetectionResult> = output
            .detections
            .iter()
            .map(|d| {
                DetectionResult::new(
                    d.label.clone(),
                    d.class_id,
                    d.confidence as f64,
                    [
                        d.bbox[0] as f64,
                        d.bbox[1] as f64,
                        d.bbox[2] as f64,
                        d.bbox[3] as f64,
                    ],
                )
            })
            .collect();
        let counts = DetectionCounts::from_detections(&detections);

        let (annotated_img, annotation) = match output.annotated.into_rgb() {
            Some(img) => (img, AnnotationSource::Detector),
            None => {
                tracing::warn!("no annotated frame from detector, persisting original image");
                (decoded, AnnotationSource::OriginalFallback)
            }
        };

        let request_id = Uuid::new_v4();
        let artifact = self.store.persist(request_id, &bytes, &annotated_img).await?;

        let annotated_base64 = if return_image {
            Some(self.store.read_base64(&artifact.annotated_path).await?)
        } else {
            None
        };

        tracing::info!(
            request_id = %request_id,
            total_detections = counts.total_detections,
            degraded = annotation == AnnotationSource::OriginalFallback,
            "Inference request processed"
        );

        let payload = InferencePayload {
            datetime,
            model: self.model_name.clone(),
            imgsz: self.imgsz,
            conf_threshold: self.conf_threshold,
            detections,
            counts,
            image_path: artifact.raw_path.display().to_string(),
            annotated_path: artifact.annotated_path.display().to_string(),
            meta,
            annotated_base64,
        };

        Ok(PipelineOutcome {
            payload,
            annotation,
        })
    }
}

fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)
        .map_err(|e| Error::Decode(e.to_string()))?
        .to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{AnnotatedFrame, ChannelOrder, DetectorOutput, RawDetection};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::collections::HashSet;
    use std::io::Cursor;
    use tempdir::TempDir;

    /// Fixed-output detector so the pipeline is testable without weights
    struct StubDetector {
        output: DetectorOutput,
    }

    impl Detect for StubDetector {
        fn detect(&self, _image: &RgbImage) -> Result<DetectorOutput> {
            Ok(self.output.clone())
        }
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline_with(dir: &TempDir, output: DetectorOutput) -> InferencePipeline {
        InferencePipeline::new(
            Arc::new(StubDetector { output }),
            EvidenceStore::new(dir.path().to_path_buf()),
            "best.onnx".to_string(),
            832,
            0.3,
        )
    }

    fn sample_detection() -> RawDetection {
        RawDetection {
            class_id: 2,
            label: "cola_330".to_string(),
            confidence: 0.87654,
            bbox: [10.0, 20.0, 60.0, 90.0],
        }
    }

    #[tokio::test]
    async fn test_process_persists_raw_and_annotated() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(32, 32, image::Rgb([200, 10, 10]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![sample_detection()],
                annotated: AnnotatedFrame::Image(img.clone()),
            },
        );

        let bytes = png_bytes(&img);
        let outcome = pipeline
            .process(bytes.clone(), RequestMetadata::default(), false)
            .await
            .unwrap();

        assert_eq!(outcome.annotation, AnnotationSource::Detector);
        let payload = outcome.payload;
        assert_eq!(payload.model, "best.onnx");
        assert_eq!(payload.imgsz, 832);
        assert_eq!(payload.conf_threshold, 0.3);
        assert_eq!(payload.counts.total_detections, 1);
        assert_eq!(payload.counts.by_sku.get("cola_330"), Some(&1));
        assert_eq!(payload.detections[0].confidence, 0.8765);

        // raw artifact is byte-identical to the upload
        assert_eq!(std::fs::read(&payload.image_path).unwrap(), bytes);
        assert!(std::path::Path::new(&payload.annotated_path).exists());
        assert!(payload.annotated_base64.is_none());
    }

    #[tokio::test]
    async fn test_return_image_embeds_exact_artifact_bytes() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(16, 16, image::Rgb([0, 128, 0]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![],
                annotated: AnnotatedFrame::Image(img.clone()),
            },
        );

        let outcome = pipeline
            .process(png_bytes(&img), RequestMetadata::default(), true)
            .await
            .unwrap();

        let embedded = outcome.payload.annotated_base64.expect("annotated_base64 requested");
        let decoded = BASE64.decode(embedded).unwrap();
        assert_eq!(decoded, std::fs::read(&outcome.payload.annotated_path).unwrap());
    }

    #[tokio::test]
    async fn test_zero_detections_counts() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(16, 16, image::Rgb([50, 50, 50]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![],
                annotated: AnnotatedFrame::Image(img.clone()),
            },
        );

        let outcome = pipeline
            .process(png_bytes(&img), RequestMetadata::default(), false)
            .await
            .unwrap();

        assert_eq!(outcome.payload.counts.total_detections, 0);
        assert!(outcome.payload.counts.by_sku.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_frame_falls_back_to_original() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(24, 12, image::Rgb([10, 200, 10]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![sample_detection()],
                annotated: AnnotatedFrame::Unavailable,
            },
        );

        let outcome = pipeline
            .process(png_bytes(&img), RequestMetadata::default(), false)
            .await
            .unwrap();

        // degraded mode is explicit, payload still carries detections
        assert_eq!(outcome.annotation, AnnotationSource::OriginalFallback);
        assert_eq!(outcome.payload.counts.total_detections, 1);

        let ann = image::open(&outcome.payload.annotated_path).unwrap();
        assert_eq!((ann.width(), ann.height()), (24, 12));
    }

    #[tokio::test]
    async fn test_bgr_frame_is_normalized_before_persisting() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));

        // solid red frame delivered in BGR order
        let bgr: Vec<u8> = std::iter::repeat([0u8, 0, 255])
            .take(64)
            .flatten()
            .collect();
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![],
                annotated: AnnotatedFrame::Pixels {
                    data: bgr,
                    width: 8,
                    height: 8,
                    order: ChannelOrder::Bgr,
                },
            },
        );

        let outcome = pipeline
            .process(png_bytes(&img), RequestMetadata::default(), false)
            .await
            .unwrap();

        let ann = image::open(&outcome.payload.annotated_path).unwrap().to_rgb8();
        let px = ann.get_pixel(4, 4).0;
        // JPEG is lossy, check channel dominance rather than exact values
        assert!(px[0] > 200 && px[1] < 60 && px[2] < 60, "expected red, got {:?}", px);
    }

    #[tokio::test]
    async fn test_metadata_passes_through_verbatim() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![],
                annotated: AnnotatedFrame::Image(img.clone()),
            },
        );

        let meta = RequestMetadata {
            store_code: Some("S042".to_string()),
            room_code: None,
            auditor: Some("maria".to_string()),
        };
        let outcome = pipeline
            .process(png_bytes(&img), meta.clone(), false)
            .await
            .unwrap();

        assert_eq!(outcome.payload.meta, meta);
        let json = serde_json::to_value(&outcome.payload).unwrap();
        assert!(json["meta"]["room_code"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_bytes_fail_before_any_write() {
        let dir = TempDir::new("pipeline").unwrap();
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![],
                annotated: AnnotatedFrame::Unavailable,
            },
        );

        let err = pipeline
            .process(b"definitely not an image".to_vec(), RequestMetadata::default(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_repeat_requests_get_distinct_artifacts() {
        let dir = TempDir::new("pipeline").unwrap();
        let img = RgbImage::from_pixel(8, 8, image::Rgb([9, 9, 9]));
        let pipeline = pipeline_with(
            &dir,
            DetectorOutput {
                detections: vec![sample_detection()],
                annotated: AnnotatedFrame::Image(img.clone()),
            },
        );

        let bytes = png_bytes(&img);
        let a = pipeline
            .process(bytes.clone(), RequestMetadata::default(), false)
            .await
            .unwrap();
        let b = pipeline
            .process(bytes, RequestMetadata::default(), false)
            .await
            .unwrap();

        assert_ne!(a.payload.image_path, b.payload.image_path);
        // same input, same detections and counts on both paths
        assert_eq!(a.payload.detections, b.payload.detections);
        assert_eq!(a.payload.counts, b.payload.counts);
    }

    #[test]
    fn test_request_ids_do_not_collide() {
        let ids: HashSet<Uuid> = (0..10_000).map(|_| Uuid::new_v4()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
