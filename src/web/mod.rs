pub mod handlers;
pub mod middleware;
pub mod upload;

use crate::{detection::DetectionPipeline, utils::error::DetectError, Config, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<DetectionPipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, pipeline: Arc<DetectionPipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            started_at: Instant::now(),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let pipeline = Arc::new(DetectionPipeline::with_onnx(&config));

    // Eager load in the background; requests arriving meanwhile join it.
    let manager = Arc::clone(pipeline.manager());
    tokio::spawn(async move { manager.preload().await });

    let addr = config.socket_addr()?;
    let app = create_app(AppState::new(config, pipeline));

    tracing::info!("Server running on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /api/detect - Multipart image upload (field 'image')");
    tracing::info!("  GET  /api/health - Health check");
    tracing::info!("  GET  /api/debug  - Runtime diagnostics");
    tracing::info!("  GET  /api/docs   - API documentation");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DetectError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DetectError::Internal(format!("Server failed: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    let api = Router::new()
        .route("/detect", post(handlers::detect_handler))
        .route("/health", get(handlers::health_handler))
        .route("/debug", get(handlers::debug_handler))
        .route("/docs", get(handlers::docs_handler));

    Router::new()
        .nest("/api", api)
        // Enforced while the multipart body is read, so oversize uploads get the JSON 413.
        .layer(DefaultBodyLimit::max(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
