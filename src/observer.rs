//! Load and detection events, passed explicitly to the model manager and the
//! pipeline instead of logging from ambient state.

use crate::detection::{Detection, DetectionStage};
use crate::utils::error::DetectError;
use std::time::Duration;

pub trait PipelineObserver: Send + Sync {
    fn load_started(&self, _source: &str) {}

    fn load_succeeded(&self, _source: &str, _elapsed: Duration) {}

    fn load_failed(&self, _source: &str, _error: &DetectError) {}

    fn detection_succeeded(&self, _objects: &[Detection], _elapsed: Duration) {}

    fn fallback_used(&self, _stage: DetectionStage, _error: &DetectError) {}
}

/// Default observer, forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn load_started(&self, source: &str) {
        tracing::info!("Loading detection model from {}...", source);
    }

    fn load_succeeded(&self, source: &str, elapsed: Duration) {
        tracing::info!(
            "Detection model loaded from {} in {:.3}s",
            source,
            elapsed.as_secs_f32()
        );
    }

    fn load_failed(&self, source: &str, error: &DetectError) {
        tracing::error!("Error loading detection model from {}: {}", source, error);
    }

    fn detection_succeeded(&self, objects: &[Detection], elapsed: Duration) {
        if objects.is_empty() {
            tracing::info!("No objects detected ({:.3}s)", elapsed.as_secs_f32());
        } else {
            let labels: Vec<&str> = objects.iter().map(|d| d.object.as_str()).collect();
            tracing::info!(
                "Detected {} objects in {:.3}s: {}",
                objects.len(),
                elapsed.as_secs_f32(),
                labels.join(", ")
            );
        }
    }

    fn fallback_used(&self, stage: DetectionStage, error: &DetectError) {
        tracing::warn!(
            "Object detection failed at {:?} ({}): {}; using fallback detection results",
            stage,
            error.error_code(),
            error
        );
    }
}
