pub mod loader;
pub mod preprocessing;

pub use loader::ImageLoader;
pub use preprocessing::{fit_inside, ImagePreprocessor, NormalizedImage};
