//! Identification orchestrator
//!
//! `identify` ensures a model load has been attempted, decodes the image,
//! then takes the model path when a model is loaded and the heuristic path
//! otherwise. A model-path failure drops to the heuristic path for that call
//! only. Decode failures are the one error a caller can observe.

use crate::config::EngineConfig;
use crate::features;
use crate::heuristic::{HeuristicClassifier, Jitter};
use crate::inference::{infer, InferenceOutcome};
use crate::lifecycle::ModelManager;
use crate::model_loader::ModelLoader;
use crate::source::{Fetcher, ImageSource};
use geolens_core::{Error, IdentificationResult, ModelStatus, Result};
use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which classifier produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferencePath {
    Model,
    Heuristic,
}

impl InferencePath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for InferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A result plus how it was produced
#[derive(Debug, Clone)]
pub struct Identification {
    pub result: IdentificationResult,
    pub path: InferencePath,
    /// Why the model path was abandoned, if it was
    pub fallback_reason: Option<String>,
    /// Confidence fell below the configured threshold
    pub low_confidence: bool,
    pub elapsed: Duration,
}

/// Landmark identification engine
pub struct Engine {
    config: EngineConfig,
    models: ModelManager,
    heuristic: Arc<HeuristicClassifier>,
    fetcher: Fetcher,
}

impl Engine {
    /// Create an engine that loads candle artifacts
    pub fn new(config: EngineConfig) -> Self {
        let models = ModelManager::with_candle(config.model.clone());
        Self::with_manager(config, models)
    }

    /// Create an engine with a custom model loader
    pub fn with_loader(config: EngineConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let models = ModelManager::new(config.model.clone(), loader);
        Self::with_manager(config, models)
    }

    fn with_manager(config: EngineConfig, models: ModelManager) -> Self {
        let heuristic = HeuristicClassifier::new(Jitter::from_seed(config.heuristic.seed));
        let fetcher = Fetcher::new(&config.fetch);
        Self {
            config,
            models,
            heuristic: Arc::new(heuristic),
            fetcher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The model lifecycle manager
    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Attempt a model load (idempotent)
    pub async fn load_model(&self) {
        self.models.load().await;
    }

    pub fn status(&self) -> ModelStatus {
        self.models.status()
    }

    /// Release the model; the next call re-runs discovery
    pub fn dispose(&self) {
        self.models.dispose();
    }

    /// Identify the landmark in an image
    pub async fn identify(&self, source: impl Into<ImageSource>) -> Result<IdentificationResult> {
        self.identify_detailed(source).await.map(|id| id.result)
    }

    /// Identify, also reporting the path taken and timing
    pub async fn identify_detailed(
        &self,
        source: impl Into<ImageSource>,
    ) -> Result<Identification> {
        let start = Instant::now();
        let source = source.into();

        self.models.load().await;

        let image = match source.decode(&self.fetcher).await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                metrics::counter!("geolens_decode_errors_total").increment(1);
                tracing::warn!(error = %e, "Image decode failed");
                return Err(e);
            }
        };

        let (result, path, fallback_reason) = match self.models.current_model() {
            Some(model) => {
                let input = image.clone();
                let outcome = tokio::task::spawn_blocking(move || infer(&model, &input))
                    .await
                    .unwrap_or_else(|e| {
                        InferenceOutcome::Fallback(Error::inference(format!(
                            "inference task failed: {}",
                            e
                        )))
                    });
                match outcome {
                    InferenceOutcome::Ok(result) => (result, InferencePath::Model, None),
                    InferenceOutcome::Fallback(reason) => {
                        metrics::counter!("geolens_inference_fallbacks_total").increment(1);
                        tracing::warn!(
                            error = %reason,
                            "Model inference failed, using heuristic classification"
                        );
                        let result = self.classify_heuristically(image).await?;
                        (result, InferencePath::Heuristic, Some(reason.to_string()))
                    }
                }
            }
            None => {
                let result = self.classify_heuristically(image).await?;
                (result, InferencePath::Heuristic, None)
            }
        };

        let low_confidence = result.confidence < self.config.low_confidence_threshold;
        if low_confidence {
            metrics::counter!("geolens_low_confidence_total").increment(1);
            tracing::warn!(
                label = %result.name,
                confidence = result.confidence,
                threshold = self.config.low_confidence_threshold,
                "Low confidence identification"
            );
        }

        metrics::counter!("geolens_identify_total", "path" => path.as_str()).increment(1);
        metrics::histogram!("geolens_identify_latency_us")
            .record(start.elapsed().as_micros() as f64);

        tracing::info!(
            label = %result.name,
            confidence = result.confidence,
            path = %path,
            "Identified image"
        );

        let delay = match path {
            InferencePath::Model => self.config.pacing.model_delay(),
            InferencePath::Heuristic => self.config.pacing.heuristic_delay(),
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(Identification {
            result,
            path,
            fallback_reason,
            low_confidence,
            elapsed: start.elapsed(),
        })
    }

    async fn classify_heuristically(
        &self,
        image: Arc<DynamicImage>,
    ) -> Result<IdentificationResult> {
        let heuristic = self.heuristic.clone();
        tokio::task::spawn_blocking(move || heuristic.classify(&features::analyze(&image)))
            .await
            .map_err(|e| Error::internal(format!("heuristic task failed: {}", e)))
    }
}
