use anyhow::{Context, Result};
use clap::Parser;
use onnx_detect::{
    config::{Config, DetectionConfig},
    detection::DetectionPipeline,
    web::serve,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-detect")]
#[command(about = "ONNX-powered object detection service")]
struct Args {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Path to the SSD detection model (.onnx)
    #[arg(long, default_value = "models/ssd_mobilenet_v1.onnx")]
    model_path: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Environment name reported by /api/debug
    #[arg(long, env = "APP_ENV", default_value = "development")]
    environment: String,

    /// Minimum prediction score kept by the model
    #[arg(long, default_value_t = 0.5)]
    min_score: f32,

    /// Maximum predictions per image
    #[arg(long, default_value_t = 20)]
    max_detections: usize,

    /// Tag responses with "source": "model" | "fallback"
    #[arg(long)]
    expose_source: bool,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    /// Run one detection on this image, print the result and exit
    #[arg(long)]
    test_image: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let detection = DetectionConfig {
        min_score: args.min_score,
        max_detections: args.max_detections,
        ..DetectionConfig::default()
    };

    let config = Config::new(args.bind, args.model_path, args.workers, args.dev)?
        .with_environment(args.environment)
        .with_expose_source(args.expose_source)
        .with_detection(detection)?;

    let test_image = args.test_image;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        match test_image {
            Some(path) => run_test_detection(config, path).await,
            None => {
                tracing::info!("Starting object detection service...");
                tracing::info!("Bind address: {}", config.bind_addr);
                tracing::info!("Model path: {}", config.model_path.display());
                serve(config).await?;
                Ok(())
            }
        }
    })
}

async fn run_test_detection(config: Config, path: PathBuf) -> Result<()> {
    tracing::info!("Running test detection on {}", path.display());

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Test image not found at: {}", path.display()))?;

    let pipeline = DetectionPipeline::with_onnx(&config);
    let result = pipeline.detect_tagged(&bytes).await;

    tracing::info!("Test detection source: {:?}", result.source);
    println!("{}", serde_json::to_string_pretty(&result.objects)?);
    Ok(())
}
