pub mod detector;
pub mod labels;
pub mod loader;
pub mod manager;

pub use detector::{ObjectDetector, RawPrediction, SsdDetector};
pub use loader::{ModelLoader, OnnxModelLoader};
pub use manager::{ModelManager, ModelStats};
