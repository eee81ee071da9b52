pub mod config;
pub mod detection;
pub mod image;
pub mod models;
pub mod observer;
pub mod utils;
pub mod web;

pub use config::Config;
pub use detection::{Detection, DetectionPipeline, DetectionResult};
pub use utils::error::DetectError;

pub type Result<T> = std::result::Result<T, DetectError>;
