use crate::image::ImagePreprocessor;
use crate::models::labels::coco_label;
use crate::utils::error::DetectError;
use crate::{Config, Result};
use image::RgbImage;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::{DynValue, Tensor},
};
use parking_lot::Mutex;
use std::sync::Arc;

/// One prediction as the model reports it, before schema mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub class: String,
    pub score: f32,
    /// `[x, y, width, height]` in pixels of the image handed to the model
    pub bbox: Vec<f32>,
}

/// The loaded model's detection operation.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<RawPrediction>>;

    fn name(&self) -> &str;
}

/// SSD-MobileNet style detector exported with the TF object detection API
/// post-processing baked into the graph.
pub struct SsdDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    outputs: SsdOutputs,
    min_score: f32,
    max_detections: usize,
}

#[derive(Debug, Clone)]
struct SsdOutputs {
    boxes: String,
    classes: String,
    scores: String,
    count: Option<String>,
}

impl SsdDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(DetectError::ModelLoad(format!(
                "Detection model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading detection model from: {}", model_path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(optimization_level(config.onnx_config.optimization_level)))
            .and_then(|b| b.with_intra_threads(config.onnx_config.intra_threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| DetectError::ModelLoad("Detection model has no inputs".to_string()))?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        for (i, name) in output_names.iter().enumerate() {
            tracing::debug!("Detection output[{}]: '{}'", i, name);
        }

        let find = |fragment: &str| output_names.iter().find(|n| n.contains(fragment)).cloned();
        let require = |fragment: &str| {
            find(fragment).ok_or_else(|| {
                DetectError::ModelLoad(format!(
                    "Detection model has no '{}' output. Available outputs: {:?}",
                    fragment, output_names
                ))
            })
        };

        let outputs = SsdOutputs {
            boxes: require("detection_boxes")?,
            classes: require("detection_classes")?,
            scores: require("detection_scores")?,
            count: find("num_detections"),
        };

        tracing::info!("Detection model input: '{}', outputs: {:?}", input_name, outputs);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            outputs,
            min_score: config.detection_config.min_score,
            max_detections: config.detection_config.max_detections,
        })
    }
}

impl ObjectDetector for SsdDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<RawPrediction>> {
        let (width, height) = image.dimensions();
        let input = ImagePreprocessor::to_nhwc_tensor(image)?;
        let input = Tensor::from_array(input).map_err(|e| DetectError::Inference(e.to_string()))?;

        // Copy the outputs out while the session is locked; the ort values are
        // released when this block ends.
        let (boxes, classes, scores, count) = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![self.input_name.as_str() => input])
                .map_err(|e| DetectError::Inference(e.to_string()))?;

            let boxes = tensor_values(outputs.get(self.outputs.boxes.as_str()), &self.outputs.boxes)?;
            let classes = tensor_values(outputs.get(self.outputs.classes.as_str()), &self.outputs.classes)?;
            let scores = tensor_values(outputs.get(self.outputs.scores.as_str()), &self.outputs.scores)?;
            let count = match &self.outputs.count {
                Some(name) => tensor_values(outputs.get(name.as_str()), name)?.first().copied(),
                None => None,
            };
            (boxes, classes, scores, count)
        };

        let predictions = decode_ssd_output(
            &boxes,
            &classes,
            &scores,
            count,
            width,
            height,
            self.min_score,
            self.max_detections,
        )?;

        tracing::debug!("Detected {} objects", predictions.len());
        Ok(predictions)
    }

    fn name(&self) -> &str {
        "ssd-mobilenet"
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

fn tensor_values(value: Option<&DynValue>, name: &str) -> Result<Vec<f32>> {
    let value = value.ok_or_else(|| {
        DetectError::MalformedResult(format!("Output '{}' missing from model result", name))
    })?;
    let array = value
        .try_extract_array::<f32>()
        .map_err(|e| DetectError::Inference(format!("Output '{}': {}", name, e)))?;
    Ok(array.iter().copied().collect())
}

/// Turn SSD tensors into pixel-space predictions.
///
/// `boxes` holds normalized `[ymin, xmin, ymax, xmax]` quadruples; the model
/// order is kept, low scores are dropped and the list is capped.
#[allow(clippy::too_many_arguments)]
pub fn decode_ssd_output(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    count: Option<f32>,
    width: u32,
    height: u32,
    min_score: f32,
    max_detections: usize,
) -> Result<Vec<RawPrediction>> {
    if boxes.len() % 4 != 0 || boxes.len() / 4 != scores.len() || classes.len() != scores.len() {
        return Err(DetectError::MalformedResult(format!(
            "Inconsistent SSD outputs: {} box values, {} classes, {} scores",
            boxes.len(),
            classes.len(),
            scores.len()
        )));
    }

    let available = match count {
        Some(n) if n.is_finite() && n >= 0.0 => (n as usize).min(scores.len()),
        Some(n) => {
            return Err(DetectError::MalformedResult(format!(
                "Invalid detection count: {}",
                n
            )))
        }
        None => scores.len(),
    };

    let (w, h) = (width as f32, height as f32);
    let predictions = (0..available)
        .filter(|&i| scores[i] >= min_score)
        .take(max_detections)
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            let (ymin, xmin) = (b[0].clamp(0.0, 1.0), b[1].clamp(0.0, 1.0));
            let (ymax, xmax) = (b[2].clamp(0.0, 1.0), b[3].clamp(0.0, 1.0));

            let class_id = classes[i].round().max(0.0) as u32;
            let class = coco_label(class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", class_id));

            RawPrediction {
                class,
                score: scores[i],
                bbox: vec![
                    xmin * w,
                    ymin * h,
                    (xmax - xmin).max(0.0) * w,
                    (ymax - ymin).max(0.0) * h,
                ],
            }
        })
        .collect();

    Ok(predictions)
}
