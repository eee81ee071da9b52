use crate::models::{ObjectDetector, SsdDetector};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of the inference model. Loading may take seconds.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ObjectDetector>>;

    /// Human readable origin, used in load events
    fn describe(&self) -> String;
}

/// Loads the SSD detector from the configured ONNX file on the blocking pool.
pub struct OnnxModelLoader {
    config: Config,
}

impl OnnxModelLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<Arc<dyn ObjectDetector>> {
        let config = self.config.clone();
        let detector = tokio::task::spawn_blocking(move || SsdDetector::new(&config))
            .await
            .map_err(|e| DetectError::ModelLoad(format!("Model load task failed: {}", e)))??;

        Ok(Arc::new(detector))
    }

    fn describe(&self) -> String {
        self.config.model_path.display().to_string()
    }
}
