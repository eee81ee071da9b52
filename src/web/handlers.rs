use crate::{
    detection::{Detection, DetectionSource},
    models::ModelStats,
    web::{
        upload::{ImageForm, ImageUpload},
        AppState,
    },
    Result,
};
use axum::{
    extract::State,
    response::Json,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub success: bool,
    pub objects: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DetectionSource>,
}

#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub status: &'static str,
    pub environment: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub model: ModelStats,
    pub runtime: RuntimeInfo,
}

#[derive(Debug, Serialize)]
pub struct RuntimeInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub pid: u32,
    pub workers: usize,
    pub intra_threads: usize,
}

/// Multipart upload -> detections
pub async fn detect_handler(
    State(state): State<AppState>,
    ImageForm(multipart): ImageForm,
) -> Result<Json<DetectResponse>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!("Received detection request: request_id={}", request_id);

    let upload =
        ImageUpload::from_multipart(multipart, state.config.server_config.max_upload_size).await?;

    tracing::info!(
        "Processing image: request_id={}, file={}, type={}, size={} bytes",
        request_id,
        upload.file_name,
        upload.content_type,
        upload.data.len()
    );

    let result = state.pipeline.detect_tagged(&upload.data).await;

    tracing::info!(
        "Detection completed: request_id={}, objects={}, source={:?}, time={:.3}s",
        request_id,
        result.objects.len(),
        result.source,
        start_time.elapsed().as_secs_f32()
    );

    let source = state
        .config
        .server_config
        .expose_source
        .then_some(result.source);

    Ok(Json(DetectResponse {
        success: true,
        objects: result.objects,
        source,
    }))
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "message": "Object Detection API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn debug_handler(State(state): State<AppState>) -> Json<DebugInfo> {
    let config = &state.config;

    Json(DebugInfo {
        status: "OK",
        environment: config.environment.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        model: state.pipeline.manager().stats(),
        runtime: RuntimeInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            pid: std::process::id(),
            workers: config.workers,
            intra_threads: config.onnx_config.intra_threads,
        },
    })
}

pub async fn docs_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Object Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "API for detecting objects in images using an ONNX SSD model",
        "endpoints": [
            {
                "path": "/api/health",
                "method": "GET",
                "description": "Check if the API is running",
                "parameters": []
            },
            {
                "path": "/api/detect",
                "method": "POST",
                "description": "Detect objects in an uploaded image",
                "parameters": [
                    {
                        "name": "image",
                        "type": "file",
                        "required": true,
                        "description": "The image file to analyze (jpeg, png or gif, max 10MB)"
                    }
                ]
            },
            {
                "path": "/api/debug",
                "method": "GET",
                "description": "Get debug information about the API",
                "parameters": []
            },
            {
                "path": "/api/docs",
                "method": "GET",
                "description": "Get API documentation",
                "parameters": []
            }
        ]
    }))
}
