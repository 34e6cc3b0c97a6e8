//! Gondola Audit Detection API
//!
//! Main entry point for the audit service.

use gondola_audit::{
    detector::YoloDetector,
    evidence_store::EvidenceStore,
    pipeline::InferencePipeline,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gondola_audit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gondola audit API v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        output_dir = %config.output_dir.display(),
        weights = %config.weights_path.display(),
        conf = config.conf,
        iou = config.iou,
        imgsz = config.imgsz,
        max_det = config.max_det,
        augment = config.augment,
        "Configuration loaded"
    );

    // Load the model once; shared read-only for the process lifetime
    let detector = Arc::new(YoloDetector::load(config.detector_config())?);
    tracing::info!("Detector initialized");

    let store = EvidenceStore::new(config.output_dir.clone());
    let pipeline = Arc::new(InferencePipeline::new(
        detector,
        store,
        config.detector_config().model_name(),
        config.imgsz,
        config.conf,
    ));

    let state = AppState {
        config: config.clone(),
        pipeline,
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
