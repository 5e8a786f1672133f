//! Model lifecycle: discovery, loading, warmup, status and disposal
//!
//! [`ModelManager`] owns the single model handle. Loading is idempotent and
//! single-flight: concurrent callers share one in-flight future. A
//! generation counter lets [`ModelManager::dispose`] invalidate a load that
//! is still running, so its result is discarded instead of resurrecting a
//! disposed model. The next load waits for that orphaned attempt to finish
//! before starting its own discovery.

use crate::config::ModelConfig;
use crate::model_loader::{
    discover, select_device, CandleModelLoader, Discovery, ImageModel, ModelLoader,
    SecondaryArtifact,
};
use crate::preprocess;
use candle_core::Device;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use geolens_core::{Backend, Error, ModelFormat, ModelState, ModelStatus, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A model that passed discovery, with the device it lives on
pub struct LoadedModel {
    pub model: Arc<dyn ImageModel>,
    pub device: Device,
    pub backend: Backend,
    pub location: PathBuf,
}

impl LoadedModel {
    /// Throwaway forward pass on an all-zero input
    pub fn warmup(&self) -> Result<()> {
        let input = preprocess::zeros(&self.device)?;
        self.model
            .forward(&input)
            .map(|_| ())
            .map_err(|e| Error::warmup(e.to_string()))
    }
}

type LoadFuture = Shared<BoxFuture<'static, ()>>;

enum Slot {
    Unloaded,
    Loading {
        done: LoadFuture,
    },
    Loaded(Arc<LoadedModel>),
    FallbackOnly {
        backend: Backend,
        secondary: Option<SecondaryArtifact>,
    },
}

struct Inner {
    config: ModelConfig,
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<Slot>,
    /// Load invalidated by `dispose` that may still be running
    orphan: Mutex<Option<LoadFuture>>,
    generation: AtomicU64,
    selected: Mutex<Option<Backend>>,
}

/// Owner of the model handle
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl ModelManager {
    /// Create a manager with a custom loader
    pub fn new(config: ModelConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                loader,
                slot: Mutex::new(Slot::Unloaded),
                orphan: Mutex::new(None),
                generation: AtomicU64::new(0),
                selected: Mutex::new(None),
            }),
        }
    }

    /// Create a manager that loads candle artifacts
    pub fn with_candle(config: ModelConfig) -> Self {
        Self::new(config, Arc::new(CandleModelLoader::new()))
    }

    /// Ensure a load has been attempted
    ///
    /// Returns immediately once the manager is `Loaded` or `FallbackOnly`;
    /// otherwise joins (or starts) the one in-flight load.
    pub async fn load(&self) {
        let done = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Loaded(_) | Slot::FallbackOnly { .. } => return,
                Slot::Loading { done } => done.clone(),
                Slot::Unloaded => {
                    let generation = self.inner.generation.load(Ordering::SeqCst);
                    let weak = Arc::downgrade(&self.inner);
                    let orphan = self.inner.orphan.lock().take();
                    let done = async move {
                        if let Some(orphan) = orphan {
                            tracing::debug!(generation, "Waiting for disposed load to finish");
                            orphan.await;
                        }
                        run_load(weak, generation).await;
                    }
                    .boxed()
                    .shared();
                    *slot = Slot::Loading { done: done.clone() };
                    tracing::info!(generation, "Model load started");
                    done
                }
            }
        };
        done.await;
    }

    /// Release the model handle and return to `Unloaded`
    ///
    /// Calls already holding the model keep their reference until they
    /// finish. A load still in flight is discarded when it completes, and
    /// the next [`load`](Self::load) waits for it first.
    pub fn dispose(&self) {
        let mut slot = self.inner.slot.lock();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        match std::mem::replace(&mut *slot, Slot::Unloaded) {
            Slot::Loaded(_) => tracing::info!("Model disposed"),
            Slot::Loading { done } => {
                // a later load future already awaits any earlier orphan
                *self.inner.orphan.lock() = Some(done);
                tracing::info!("Model disposed during load");
            }
            _ => {}
        }
    }

    /// Model handle, if one is loaded
    pub fn current_model(&self) -> Option<Arc<LoadedModel>> {
        match &*self.inner.slot.lock() {
            Slot::Loaded(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ModelState {
        match &*self.inner.slot.lock() {
            Slot::Unloaded => ModelState::Unloaded,
            Slot::Loading { .. } => ModelState::Loading,
            Slot::Loaded(model) => ModelState::Loaded {
                backend: model.backend,
                format: ModelFormat::Primary,
            },
            Slot::FallbackOnly { .. } => ModelState::FallbackOnly,
        }
    }

    /// Status report derived from the current state
    pub fn status(&self) -> ModelStatus {
        let selected = self.inner.selected.lock().unwrap_or(Backend::Cpu);
        match &*self.inner.slot.lock() {
            Slot::Loaded(model) => ModelStatus {
                loaded: true,
                format: ModelFormat::Primary,
                backend: model.backend,
                message: format!(
                    "Model {} loaded from {} and ready",
                    model.model.name(),
                    model.location.display()
                ),
            },
            Slot::FallbackOnly {
                backend,
                secondary: Some(artifact),
            } => ModelStatus {
                loaded: false,
                format: ModelFormat::Secondary,
                backend: *backend,
                message: format!(
                    "TFLite model detected at {} but it needs conversion; using heuristic classification",
                    artifact.describe()
                ),
            },
            Slot::FallbackOnly {
                backend,
                secondary: None,
            } => ModelStatus {
                loaded: false,
                format: ModelFormat::Fallback,
                backend: *backend,
                message: "Using heuristic classification".to_string(),
            },
            Slot::Loading { .. } => ModelStatus {
                loaded: false,
                format: ModelFormat::Fallback,
                backend: selected,
                message: "Model loading".to_string(),
            },
            Slot::Unloaded => ModelStatus {
                loaded: false,
                format: ModelFormat::Fallback,
                backend: selected,
                message: "Model not loaded".to_string(),
            },
        }
    }
}

async fn run_load(inner: Weak<Inner>, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let next = inner.attempt_load().await;

    let mut slot = inner.slot.lock();
    if inner.generation.load(Ordering::SeqCst) != generation {
        tracing::debug!(generation, "Discarding load result after dispose");
        return;
    }
    *slot = next;
}

impl Inner {
    async fn attempt_load(&self) -> Slot {
        let (device, backend) = select_device(self.config.backend);
        *self.selected.lock() = Some(backend);

        match discover(self.loader.as_ref(), &self.config.candidates, &device).await {
            Discovery::Found {
                location, model, ..
            } => {
                metrics::counter!("geolens_model_loads_total", "outcome" => "primary").increment(1);
                let loaded = Arc::new(LoadedModel {
                    model,
                    device,
                    backend,
                    location,
                });
                if self.config.warmup {
                    warmup(loaded.clone()).await;
                }
                Slot::Loaded(loaded)
            }
            Discovery::NotFound { attempts } => {
                tracing::info!(
                    attempts = attempts.len(),
                    "No primary model could be loaded"
                );
                let secondary = self.probe_secondary().await;
                metrics::counter!("geolens_model_loads_total", "outcome" => "fallback")
                    .increment(1);
                tracing::info!("Using heuristic classification");
                Slot::FallbackOnly { backend, secondary }
            }
        }
    }

    async fn probe_secondary(&self) -> Option<SecondaryArtifact> {
        let location = self.config.secondary.as_ref()?;
        match SecondaryArtifact::probe(location).await {
            Ok(artifact) => {
                if let Err(e) = artifact.load() {
                    tracing::info!(error = %e, "Secondary artifact found");
                }
                Some(artifact)
            }
            Err(e) => {
                tracing::debug!(error = %e, "No secondary artifact");
                None
            }
        }
    }
}

async fn warmup(model: Arc<LoadedModel>) {
    let result = tokio::task::spawn_blocking(move || model.warmup())
        .await
        .map_err(|e| Error::warmup(e.to_string()))
        .and_then(|r| r);
    match result {
        Ok(()) => tracing::info!("Model warmed up"),
        Err(e) => tracing::warn!(error = %e, "Warmup failed, keeping model loaded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPreference;
    use candle_core::Tensor;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Echo;

    impl ImageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn forward(&self, input: &Tensor) -> Result<Tensor> {
            Ok(input.clone())
        }
    }

    struct SlowLoader {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        succeed: bool,
    }

    #[async_trait::async_trait]
    impl ModelLoader for SlowLoader {
        async fn load(&self, _location: &Path, _device: &Device) -> Result<Arc<dyn ImageModel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.succeed {
                Ok(Arc::new(Echo))
            } else {
                Err(Error::discovery("missing"))
            }
        }
    }

    fn manager(succeed: bool) -> (ModelManager, Arc<SlowLoader>) {
        let loader = Arc::new(SlowLoader {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            succeed,
        });
        let config = ModelConfig {
            candidates: vec![PathBuf::from("model.json")],
            secondary: None,
            backend: BackendPreference::Cpu,
            warmup: true,
        };
        (ModelManager::new(config, loader.clone()), loader)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (manager, _) = manager(true);
        assert_eq!(manager.state(), ModelState::Unloaded);
        let status = manager.status();
        assert!(!status.loaded);
        assert_eq!(status.format, ModelFormat::Fallback);
        assert_eq!(status.backend, Backend::Cpu);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let (manager, loader) = manager(true);
        manager.load().await;
        manager.load().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager.state(),
            ModelState::Loaded {
                backend: Backend::Cpu,
                format: ModelFormat::Primary
            }
        );
        assert!(manager.status().loaded);
    }

    #[tokio::test]
    async fn test_failed_discovery_is_terminal_fallback() {
        let (manager, loader) = manager(false);
        manager.load().await;
        manager.load().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ModelState::FallbackOnly);
        assert!(manager.current_model().is_none());
        assert_eq!(manager.status().format, ModelFormat::Fallback);
    }

    #[tokio::test]
    async fn test_dispose_during_load_discards_result() {
        let (manager, loader) = manager(true);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.load().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.dispose();
        pending.await.unwrap();

        assert_eq!(manager.state(), ModelState::Unloaded);

        manager.load().await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert!(manager.current_model().is_some());
    }

    #[tokio::test]
    async fn test_reload_after_dispose_waits_for_orphaned_load() {
        let (manager, loader) = manager(true);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.load().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.dispose();

        // reload twice while the disposed attempt is still sleeping
        let second = manager.load();
        let third = manager.load();
        tokio::join!(second, third);
        first.await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.max_active.load(Ordering::SeqCst), 1);
        assert!(manager.current_model().is_some());
    }

    #[tokio::test]
    async fn test_orphaned_load_is_driven_without_original_caller() {
        let (manager, loader) = manager(true);

        // start a load, poll it once, then drop the only caller
        let started = tokio::time::timeout(Duration::from_millis(5), manager.load()).await;
        assert!(started.is_err());
        assert_eq!(manager.state(), ModelState::Loading);
        manager.dispose();

        manager.load().await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.max_active.load(Ordering::SeqCst), 1);
        assert!(manager.current_model().is_some());
    }
}
