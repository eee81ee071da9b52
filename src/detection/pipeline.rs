use crate::{
    detection::{
        fallback_detections, Detection, DetectionResult, DetectionSource, DetectionStage,
        TaggedDetections,
    },
    image::{ImageLoader, ImagePreprocessor},
    models::{ModelManager, OnnxModelLoader, RawPrediction},
    observer::{PipelineObserver, TracingObserver},
    utils::error::DetectError,
    Config,
};
use std::sync::Arc;
use std::time::Instant;

/// A failure tagged with the stage it happened in.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: DetectionStage,
    pub error: DetectError,
}

impl StageFailure {
    fn at(stage: DetectionStage) -> impl FnOnce(DetectError) -> Self {
        move |error| Self { stage, error }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.stage, self.error)
    }
}

/// Turns uploaded image bytes into detections.
///
/// `detect` never fails: any error on the way (model load, decode, inference,
/// malformed output) is converted to the synthetic fallback result in
/// `detect_tagged`, the only place that conversion happens.
pub struct DetectionPipeline {
    manager: Arc<ModelManager>,
    preprocessor: ImagePreprocessor,
    max_input_size: usize,
    observer: Arc<dyn PipelineObserver>,
}

impl DetectionPipeline {
    pub fn new(
        manager: Arc<ModelManager>,
        preprocessor: ImagePreprocessor,
        max_input_size: usize,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            manager,
            preprocessor,
            max_input_size,
            observer,
        }
    }

    /// Pipeline backed by the configured ONNX model, logging through `tracing`.
    pub fn with_onnx(config: &Config) -> Self {
        let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);
        let loader = Arc::new(OnnxModelLoader::new(config.clone()));
        let manager = Arc::new(ModelManager::new(loader, Arc::clone(&observer)));

        Self::new(
            manager,
            ImagePreprocessor::new(&config.detection_config),
            config.server_config.max_upload_size,
            observer,
        )
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    pub async fn detect(&self, raw: &[u8]) -> DetectionResult {
        self.detect_tagged(raw).await.objects
    }

    pub async fn detect_tagged(&self, raw: &[u8]) -> TaggedDetections {
        let start = Instant::now();
        tracing::debug!("Starting object detection on {} bytes", raw.len());

        match self.run(raw).await {
            Ok(objects) => {
                self.observer.detection_succeeded(&objects, start.elapsed());
                TaggedDetections {
                    source: DetectionSource::Model,
                    objects,
                }
            }
            Err(failure) => {
                self.observer.fallback_used(failure.stage, &failure.error);
                let objects = fallback_detections(&mut rand::thread_rng());
                TaggedDetections {
                    source: DetectionSource::Fallback,
                    objects,
                }
            }
        }
    }

    async fn run(&self, raw: &[u8]) -> Result<DetectionResult, StageFailure> {
        let model = self
            .manager
            .ensure_loaded()
            .await
            .map_err(StageFailure::at(DetectionStage::EnsureModel))?;

        let bytes = raw.to_vec();
        let preprocessor = self.preprocessor.clone();
        let max_input_size = self.max_input_size;
        let normalized = tokio::task::spawn_blocking(move || {
            let image = ImageLoader::from_bytes(&bytes, max_input_size)?;
            preprocessor.normalize(image)
        })
        .await
        .map_err(|e| DetectError::Decode(format!("Preprocessing task failed: {}", e)))
        .and_then(|r| r)
        .map_err(StageFailure::at(DetectionStage::Preprocess))?;

        // The decoded frame and tensors are dropped inside the task on every path.
        let predictions = tokio::task::spawn_blocking(move || {
            let rgb = ImagePreprocessor::decode_normalized(&normalized)?;
            model.detect(&rgb)
        })
        .await
        .map_err(|e| DetectError::Inference(format!("Inference task failed: {}", e)))
        .and_then(|r| r)
        .map_err(StageFailure::at(DetectionStage::Infer))?;

        map_predictions(predictions).map_err(StageFailure::at(DetectionStage::Map))
    }
}

/// Rename to the external schema, keeping model order and box values.
pub fn map_predictions(predictions: Vec<RawPrediction>) -> Result<DetectionResult, DetectError> {
    predictions
        .into_iter()
        .enumerate()
        .map(|(i, prediction)| {
            let bounding_box: [f32; 4] = prediction.bbox.as_slice().try_into().map_err(|_| {
                DetectError::MalformedResult(format!(
                    "prediction {} has {} bounding box values, expected 4",
                    i,
                    prediction.bbox.len()
                ))
            })?;

            if bounding_box.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(DetectError::MalformedResult(format!(
                    "prediction {} has an invalid bounding box {:?}",
                    i, bounding_box
                )));
            }

            if !prediction.score.is_finite() || !(0.0..=1.0).contains(&prediction.score) {
                return Err(DetectError::MalformedResult(format!(
                    "prediction {} has score {} outside [0, 1]",
                    i, prediction.score
                )));
            }

            Ok(Detection {
                object: prediction.class,
                confidence: prediction.score,
                bounding_box,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelLoader, ObjectDetector};
    use crate::Result;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reports a person covering the middle of whatever frame it receives.
    struct PersonDetector {
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl ObjectDetector for PersonDetector {
        fn detect(&self, image: &RgbImage) -> Result<Vec<RawPrediction>> {
            let (w, h) = image.dimensions();
            self.seen.lock().push((w, h));
            Ok(vec![
                RawPrediction {
                    class: "person".to_string(),
                    score: 0.91,
                    bbox: vec![w as f32 / 4.0, h as f32 / 4.0, w as f32 / 2.0, h as f32 / 2.0],
                },
                RawPrediction {
                    class: "chair".to_string(),
                    score: 0.55,
                    bbox: vec![0.0, 0.0, 10.0, 10.0],
                },
            ])
        }

        fn name(&self) -> &str {
            "person"
        }
    }

    struct ScriptedDetector(Result<Vec<RawPrediction>>);

    impl ObjectDetector for ScriptedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<RawPrediction>> {
            match &self.0 {
                Ok(predictions) => Ok(predictions.clone()),
                Err(e) => Err(DetectError::Inference(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedLoader {
        model: Option<Arc<dyn ObjectDetector>>,
        loads: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ModelLoader for FixedLoader {
        async fn load(&self) -> Result<Arc<dyn ObjectDetector>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.model
                .clone()
                .ok_or_else(|| DetectError::ModelLoad("model artifact missing".to_string()))
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        fallbacks: Mutex<Vec<DetectionStage>>,
        successes: AtomicUsize,
    }

    impl PipelineObserver for RecordingObserver {
        fn detection_succeeded(&self, _objects: &[Detection], _elapsed: Duration) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn fallback_used(&self, stage: DetectionStage, _error: &DetectError) {
            self.fallbacks.lock().push(stage);
        }
    }

    fn pipeline_with(
        model: Option<Arc<dyn ObjectDetector>>,
        delay: Duration,
    ) -> (DetectionPipeline, Arc<FixedLoader>, Arc<RecordingObserver>) {
        let loader = Arc::new(FixedLoader {
            model,
            loads: AtomicUsize::new(0),
            delay,
        });
        let observer = Arc::new(RecordingObserver::default());
        let manager = Arc::new(ModelManager::new(loader.clone(), observer.clone()));
        let pipeline = DetectionPipeline::new(
            manager,
            ImagePreprocessor::default(),
            crate::config::MAX_UPLOAD_BYTES,
            observer.clone(),
        );
        (pipeline, loader, observer)
    }

    fn person_pipeline() -> (DetectionPipeline, Arc<PersonDetector>, Arc<RecordingObserver>) {
        let detector = Arc::new(PersonDetector {
            seen: Mutex::new(Vec::new()),
        });
        let (pipeline, _, observer) = pipeline_with(Some(detector.clone() as Arc<dyn ObjectDetector>), Duration::ZERO);
        (pipeline, detector, observer)
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([90u8, 140, 200]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    fn assert_fallback(result: &TaggedDetections) {
        assert!(result.is_fallback());
        let labels: Vec<&str> = result.objects.iter().map(|d| d.object.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog"]);
    }

    #[tokio::test]
    async fn test_valid_image_is_normalized_and_mapped() {
        let (pipeline, detector, observer) = person_pipeline();

        let result = pipeline.detect_tagged(&jpeg(1200, 900)).await;

        assert_eq!(result.source, DetectionSource::Model);
        assert_eq!(*detector.seen.lock(), vec![(640, 480)]);
        assert_eq!(result.objects.len(), 2);

        let person = &result.objects[0];
        assert_eq!(person.object, "person");
        assert_eq!(person.confidence, 0.91);
        assert_eq!(person.bounding_box, [160.0, 120.0, 320.0, 240.0]);
        assert!(person.bounding_box[0] + person.bounding_box[2] <= 640.0);
        assert!(person.bounding_box[1] + person.bounding_box[3] <= 480.0);
        assert_eq!(result.objects[1].object, "chair");
        assert_eq!(observer.successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_small_image_is_not_enlarged() {
        let (pipeline, detector, _) = person_pipeline();
        pipeline.detect(&jpeg(100, 80)).await;
        assert_eq!(*detector.seen.lock(), vec![(100, 80)]);
    }

    #[tokio::test]
    async fn test_empty_input_falls_back() {
        let (pipeline, _, observer) = person_pipeline();
        let result = pipeline.detect_tagged(&[]).await;
        assert_fallback(&result);
        assert_eq!(*observer.fallbacks.lock(), vec![DetectionStage::Preprocess]);
    }

    #[tokio::test]
    async fn test_corrupt_input_falls_back_with_stable_shape() {
        let (pipeline, _, _) = person_pipeline();
        let mut corrupt = jpeg(64, 64);
        corrupt.truncate(30);

        let first = pipeline.detect_tagged(&corrupt).await;
        let second = pipeline.detect_tagged(&corrupt).await;
        assert_fallback(&first);
        assert_fallback(&second);
    }

    #[tokio::test]
    async fn test_load_failure_falls_back() {
        let (pipeline, loader, observer) = pipeline_with(None, Duration::ZERO);

        let result = pipeline.detect_tagged(&jpeg(32, 32)).await;
        assert_fallback(&result);
        assert_eq!(*observer.fallbacks.lock(), vec![DetectionStage::EnsureModel]);

        // Not cached: the next call tries to load again.
        pipeline.detect(&jpeg(32, 32)).await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_inference_error_falls_back() {
        let detector = Arc::new(ScriptedDetector(Err(DetectError::Inference(
            "kernel crashed".to_string(),
        ))));
        let (pipeline, _, observer) = pipeline_with(Some(detector as Arc<dyn ObjectDetector>), Duration::ZERO);

        assert_fallback(&pipeline.detect_tagged(&jpeg(32, 32)).await);
        assert_eq!(*observer.fallbacks.lock(), vec![DetectionStage::Infer]);
    }

    #[tokio::test]
    async fn test_malformed_prediction_falls_back() {
        let detector = Arc::new(ScriptedDetector(Ok(vec![RawPrediction {
            class: "cat".to_string(),
            score: 0.7,
            bbox: vec![1.0, 2.0, 3.0],
        }])));
        let (pipeline, _, observer) = pipeline_with(Some(detector as Arc<dyn ObjectDetector>), Duration::ZERO);

        assert_fallback(&pipeline.detect_tagged(&jpeg(32, 32)).await);
        assert_eq!(*observer.fallbacks.lock(), vec![DetectionStage::Map]);
    }

    #[tokio::test]
    async fn test_empty_model_output_is_not_fallback() {
        let detector = Arc::new(ScriptedDetector(Ok(Vec::new())));
        let (pipeline, _, _) = pipeline_with(Some(detector as Arc<dyn ObjectDetector>), Duration::ZERO);

        let result = pipeline.detect_tagged(&jpeg(32, 32)).await;
        assert_eq!(result.source, DetectionSource::Model);
        assert!(result.objects.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_load_once() {
        let detector = Arc::new(PersonDetector {
            seen: Mutex::new(Vec::new()),
        });
        let (pipeline, loader, _) = pipeline_with(Some(detector as Arc<dyn ObjectDetector>), Duration::from_millis(50));
        let pipeline = Arc::new(pipeline);
        let image = Arc::new(jpeg(200, 100));

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let image = Arc::clone(&image);
                tokio::spawn(async move { pipeline.detect_tagged(&image).await })
            })
            .collect();

        for call in calls {
            let result = call.await.unwrap();
            assert_eq!(result.source, DetectionSource::Model);
            assert_eq!(result.objects[0].object, "person");
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_map_preserves_order_and_values() {
        let mapped = map_predictions(vec![
            RawPrediction {
                class: "dog".to_string(),
                score: 0.3,
                bbox: vec![5.0, 6.0, 7.0, 8.0],
            },
            RawPrediction {
                class: "person".to_string(),
                score: 0.99,
                bbox: vec![1.5, 2.5, 3.5, 4.5],
            },
        ])
        .unwrap();

        assert_eq!(mapped[0].object, "dog");
        assert_eq!(mapped[0].bounding_box, [5.0, 6.0, 7.0, 8.0]);
        assert_eq!(mapped[1].object, "person");
        assert_eq!(mapped[1].confidence, 0.99);
    }

    #[test]
    fn test_map_rejects_invalid_values() {
        let bad_score = RawPrediction {
            class: "cat".to_string(),
            score: 1.2,
            bbox: vec![0.0; 4],
        };
        let negative_box = RawPrediction {
            class: "cat".to_string(),
            score: 0.5,
            bbox: vec![-1.0, 0.0, 1.0, 1.0],
        };
        let nan_box = RawPrediction {
            class: "cat".to_string(),
            score: 0.5,
            bbox: vec![f32::NAN, 0.0, 1.0, 1.0],
        };

        for prediction in [bad_score, negative_box, nan_box] {
            assert!(matches!(
                map_predictions(vec![prediction]),
                Err(DetectError::MalformedResult(_))
            ));
        }
    }
}
