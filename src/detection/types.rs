use serde::{Deserialize, Serialize};

/// One detected object in the external schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label
    pub object: String,
    /// Score in [0, 1]
    pub confidence: f32,
    /// `[x, y, width, height]`, pixels, origin top-left
    #[serde(rename = "boundingBox")]
    pub bounding_box: [f32; 4],
}

/// Detections in model order.
pub type DetectionResult = Vec<Detection>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Model,
    Fallback,
}

/// Detections together with where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedDetections {
    pub source: DetectionSource,
    pub objects: DetectionResult,
}

impl TaggedDetections {
    pub fn is_fallback(&self) -> bool {
        self.source == DetectionSource::Fallback
    }
}

/// Stages of a single detection call, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    EnsureModel,
    Preprocess,
    Infer,
    Map,
}
