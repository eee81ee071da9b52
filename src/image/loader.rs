use crate::utils::error::DetectError;
use crate::Result;
use image::{DynamicImage, ImageFormat};

pub struct ImageLoader;

impl ImageLoader {
    /// Decode an uploaded image held in memory
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(DetectError::Decode("Image data is empty".to_string()));
        }

        if bytes.len() > max_size {
            return Err(DetectError::FileTooLarge(bytes.len(), max_size));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| DetectError::Decode("Unrecognized image format".to_string()))?;

        if !Self::is_supported_format(format) {
            return Err(DetectError::Decode(format!(
                "Unsupported image format: {:?}",
                format
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format)?;

        tracing::debug!(
            "Decoded {:?} image: {}x{}",
            format,
            image.width(),
            image.height()
        );

        Ok(image)
    }

    /// Detect the encoding from magic bytes
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif)
    }
}
