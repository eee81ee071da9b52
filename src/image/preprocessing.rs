use crate::config::DetectionConfig;
use crate::utils::error::DetectError;
use crate::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array4;

/// Canonical form of an upload: fitted into the detection frame and
/// re-encoded as JPEG. Lives for a single detection call.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    max_width: u32,
    max_height: u32,
    jpeg_quality: u8,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Fit inside the frame without enlarging, then re-encode as JPEG.
    pub fn normalize(&self, image: DynamicImage) -> Result<NormalizedImage> {
        let rgb = image.to_rgb8();
        let (orig_w, orig_h) = rgb.dimensions();
        let (width, height) = fit_inside(orig_w, orig_h, self.max_width, self.max_height);

        let rgb = if (width, height) == (orig_w, orig_h) {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::CatmullRom)
        };

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality).encode_image(&rgb)?;

        tracing::debug!(
            "Image processed for detection: {}x{} -> {}x{} ({} bytes)",
            orig_w,
            orig_h,
            width,
            height,
            bytes.len()
        );

        Ok(NormalizedImage {
            bytes,
            width,
            height,
        })
    }

    /// Decode the canonical JPEG back into the model's RGB input.
    pub fn decode_normalized(normalized: &NormalizedImage) -> Result<RgbImage> {
        let image = image::load_from_memory_with_format(&normalized.bytes, ImageFormat::Jpeg)?;
        Ok(image.to_rgb8())
    }

    /// `[1, H, W, 3]` uint8 tensor; `RgbImage` is already row-major HWC.
    pub fn to_nhwc_tensor(image: &RgbImage) -> Result<Array4<u8>> {
        let (width, height) = image.dimensions();
        Array4::from_shape_vec(
            (1, height as usize, width as usize, 3),
            image.as_raw().clone(),
        )
        .map_err(|e| DetectError::Inference(format!("Failed to build input tensor: {}", e)))
    }
}

/// Largest size within `max_w` x `max_h` keeping the aspect ratio; never upscales.
pub fn fit_inside(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }

    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (new_w, new_h)
}
