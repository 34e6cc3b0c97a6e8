//! EvidenceStore - Artifact Persistence
//!
//! ## Responsibilities
//!
//! - Write the raw upload verbatim as `{uuid}_raw.jpg`
//! - Compress and write the annotated frame as `{uuid}_ann.jpg`
//! - Read the annotated artifact back for base64 embedding
//!
//! The output directory is append-only; artifacts are never updated or
//! deleted here (retention is an external concern).

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// JPEG quality for annotated evidence
const ANNOTATED_JPEG_QUALITY: u8 = 90;

/// Paths of one persisted request
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub raw_path: PathBuf,
    pub annotated_path: PathBuf,
}

/// Evidence artifact store over a flat output directory
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    output_dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Persist raw bytes and the annotated frame under a request id.
    /// The directory is created on first use.
    pub async fn persist(
        &self,
        request_id: Uuid,
        raw_bytes: &[u8],
        annotated: &RgbImage,
    ) -> Result<StoredArtifact> {
        fs::create_dir_all(&self.output_dir).await?;

        let raw_path = self.output_dir.join(format!("{}_raw.jpg", request_id));
        let annotated_path = self.output_dir.join(format!("{}_ann.jpg", request_id));

        fs::write(&raw_path, raw_bytes).await?;

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, ANNOTATED_JPEG_QUALITY)
            .encode_image(annotated)
            .map_err(|e| Error::Storage(format!("failed to encode annotated jpeg: {}", e)))?;
        fs::write(&annotated_path, encoded).await?;

        tracing::debug!(
            request_id = %request_id,
            raw = %raw_path.display(),
            annotated = %annotated_path.display(),
            "Evidence artifacts written"
        );

        Ok(StoredArtifact {
            raw_path,
            annotated_path,
        })
    }

    /// Read an artifact back from disk and base64-encode it.
    ///
    /// Deliberately a file round-trip instead of reusing the in-memory
    /// frame: the embedded string must be byte-identical to the stored
    /// file for downstream hash comparisons.
    pub async fn read_base64(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).await?;
        Ok(BASE64.encode(bytes))
    }
}
