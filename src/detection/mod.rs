pub mod fallback;
pub mod pipeline;
pub mod types;

pub use fallback::fallback_detections;
pub use pipeline::{map_predictions, DetectionPipeline, StageFailure};
pub use types::{Detection, DetectionResult, DetectionSource, DetectionStage, TaggedDetections};
