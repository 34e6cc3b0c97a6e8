//! Gondola Audit Detection API
//!
//! HTTP service exposing a retail shelf/gondola object-detection model.
//!
//! ## Architecture (4 Components)
//!
//! 1. WebAPI - request adapters (multipart + JSON/base64 endpoints)
//! 2. InferencePipeline - the single per-request code path
//! 3. Detector - YOLO inference behind the `Detect` seam
//! 4. EvidenceStore - raw/annotated artifact persistence
//!
//! ## Design Principles
//!
//! - Every request is synchronous, single-shot, and stateless; the only
//!   shared state is the model (read-only after startup) and the
//!   append-only output directory
//! - Both transport encodings converge on one pipeline call shape

pub mod detector;
pub mod evidence_store;
pub mod pipeline;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
