use crate::models::{ModelLoader, ObjectDetector};
use crate::observer::PipelineObserver;
use crate::utils::error::DetectError;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

type LoadOutcome = std::result::Result<Arc<dyn ObjectDetector>, String>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Idle,
    Loading { generation: u64, load: SharedLoad },
    Ready(Arc<dyn ObjectDetector>),
}

/// Owner of the process-wide detection model.
///
/// Callers only ever see "not loaded" or a fully constructed model. The load
/// is single-flight: it runs in its own task, racing callers await the same
/// shared result, and a failure returns the manager to `Idle` so the next
/// call retries.
pub struct ModelManager {
    loader: Arc<dyn ModelLoader>,
    observer: Arc<dyn PipelineObserver>,
    state: Mutex<LoadState>,
    generation: AtomicU64,
    load_attempts: AtomicU64,
    loaded_at: Mutex<Option<DateTime<Utc>>>,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn ModelLoader>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            loader,
            observer,
            state: Mutex::new(LoadState::Idle),
            generation: AtomicU64::new(0),
            load_attempts: AtomicU64::new(0),
            loaded_at: Mutex::new(None),
        }
    }

    /// Return the loaded model, loading it first if needed.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn ObjectDetector>> {
        let (generation, load) = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(model) => return Ok(Arc::clone(model)),
                LoadState::Loading { generation, load } => (*generation, load.clone()),
                LoadState::Idle => {
                    let (generation, load) = self.begin_load();
                    *state = LoadState::Loading {
                        generation,
                        load: load.clone(),
                    };
                    (generation, load)
                }
            }
        };

        let outcome = load.await;
        self.settle(generation, &outcome);
        outcome.map_err(DetectError::ModelLoad)
    }

    /// Eager startup load. Failure is not fatal; the first request retries.
    pub async fn preload(&self) {
        // The failure already went to the observer as `load_failed`.
        let _ = self.ensure_loaded().await;
    }

    /// Drop the current model and load a fresh one. Joins a load already in flight.
    pub async fn reload(&self) -> Result<Arc<dyn ObjectDetector>> {
        {
            let mut state = self.state.lock();
            if matches!(*state, LoadState::Ready(_)) {
                tracing::info!("Reloading detection model");
                *state = LoadState::Idle;
                *self.loaded_at.lock() = None;
            }
        }
        self.ensure_loaded().await
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LoadState::Ready(_))
    }

    pub fn stats(&self) -> ModelStats {
        let (status, model) = match &*self.state.lock() {
            LoadState::Idle => ("idle", None),
            LoadState::Loading { .. } => ("loading", None),
            LoadState::Ready(model) => ("ready", Some(model.name().to_string())),
        };

        ModelStats {
            status,
            model,
            source: self.loader.describe(),
            load_attempts: self.load_attempts.load(Ordering::SeqCst),
            loaded_at: self.loaded_at.lock().map(|t| t.to_rfc3339()),
        }
    }

    fn begin_load(&self) -> (u64, SharedLoad) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.load_attempts.fetch_add(1, Ordering::SeqCst);

        let loader = Arc::clone(&self.loader);
        let observer = Arc::clone(&self.observer);
        let source = loader.describe();
        observer.load_started(&source);

        // Spawned so that a cancelled caller never abandons the load midway.
        let task = tokio::spawn(async move {
            let start = Instant::now();
            match loader.load().await {
                Ok(model) => {
                    observer.load_succeeded(&source, start.elapsed());
                    Ok(model)
                }
                Err(e) => {
                    observer.load_failed(&source, &e);
                    Err(match e {
                        DetectError::ModelLoad(msg) => msg,
                        other => other.to_string(),
                    })
                }
            }
        });

        let load = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("Model load task aborted: {}", e)),
            }
        }
        .boxed()
        .shared();

        (generation, load)
    }

    /// First caller back from a load publishes its outcome; later ones see it settled.
    fn settle(&self, generation: u64, outcome: &LoadOutcome) {
        let mut state = self.state.lock();
        let current = matches!(
            &*state,
            LoadState::Loading { generation: g, .. } if *g == generation
        );
        if !current {
            return;
        }

        *state = match outcome {
            Ok(model) => {
                *self.loaded_at.lock() = Some(Utc::now());
                LoadState::Ready(Arc::clone(model))
            }
            Err(_) => LoadState::Idle,
        };
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub source: String,
    pub load_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPrediction;
    use crate::observer::TracingObserver;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct StubDetector;

    impl ObjectDetector for StubDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<RawPrediction>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: usize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(fail_first: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail_first,
                delay,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn ObjectDetector>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.fail_first {
                return Err(DetectError::ModelLoad("weights unavailable".to_string()));
            }
            Ok(Arc::new(StubDetector))
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn manager(loader: Arc<CountingLoader>) -> Arc<ModelManager> {
        Arc::new(ModelManager::new(loader, Arc::new(TracingObserver)))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_load() {
        let loader = CountingLoader::new(0, Duration::from_millis(50));
        let manager = manager(Arc::clone(&loader));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_loaded().await })
            })
            .collect();

        let mut models = Vec::new();
        for handle in handles {
            models.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(loader.loads(), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(manager.is_loaded());
        assert_eq!(manager.stats().status, "ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_observe_same_failure() {
        let loader = CountingLoader::new(usize::MAX, Duration::from_millis(50));
        let manager = manager(Arc::clone(&loader));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_loaded().await })
            })
            .collect();

        for handle in handles {
            match handle.await.unwrap() {
                Err(DetectError::ModelLoad(msg)) => assert_eq!(msg, "weights unavailable"),
                Err(other) => panic!("unexpected error: {}", other),
                Ok(_) => panic!("load should have failed"),
            }
        }

        assert_eq!(loader.loads(), 1);
        assert!(!manager.is_loaded());
        assert_eq!(manager.stats().status, "idle");
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loader = CountingLoader::new(1, Duration::ZERO);
        let manager = manager(Arc::clone(&loader));

        assert!(manager.ensure_loaded().await.is_err());
        assert!(manager.ensure_loaded().await.is_ok());
        assert_eq!(loader.loads(), 2);
        assert_eq!(manager.stats().load_attempts, 2);
    }

    #[tokio::test]
    async fn test_loaded_model_is_reused() {
        let loader = CountingLoader::new(0, Duration::ZERO);
        let manager = manager(Arc::clone(&loader));

        let first = manager.ensure_loaded().await.unwrap();
        let second = manager.ensure_loaded().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert!(manager.stats().loaded_at.is_some());
    }

    #[tokio::test]
    async fn test_preload_failure_is_not_fatal() {
        let loader = CountingLoader::new(1, Duration::ZERO);
        let manager = manager(Arc::clone(&loader));

        manager.preload().await;
        assert!(!manager.is_loaded());

        manager.ensure_loaded().await.unwrap();
        assert!(manager.is_loaded());
    }

    #[derive(Default)]
    struct FailureCounter {
        failures: AtomicUsize,
    }

    impl PipelineObserver for FailureCounter {
        fn load_failed(&self, _source: &str, _error: &DetectError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_preload_failure_reported_once_through_observer() {
        let observer = Arc::new(FailureCounter::default());
        let manager = ModelManager::new(
            CountingLoader::new(1, Duration::ZERO),
            Arc::clone(&observer) as Arc<dyn PipelineObserver>,
        );

        manager.preload().await;

        assert_eq!(observer.failures.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().status, "idle");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_caller_does_not_abandon_load() {
        let loader = CountingLoader::new(0, Duration::from_millis(100));
        let manager = manager(Arc::clone(&loader));

        let early = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.ensure_loaded().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        early.abort();

        manager.ensure_loaded().await.unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_reload_replaces_model() {
        let loader = CountingLoader::new(0, Duration::ZERO);
        let manager = manager(Arc::clone(&loader));

        let first = manager.ensure_loaded().await.unwrap();
        let second = manager.reload().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 2);
    }
}
