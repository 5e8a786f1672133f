//! Model artifacts, loaders and discovery
//!
//! A primary artifact is a `model.json` manifest next to a safetensors
//! weights file:
//!
//! ```json
//! { "architecture": "resnet18", "num_classes": 9, "weights": "model.safetensors" }
//! ```
//!
//! Loading goes through the [`ModelLoader`] trait so tests and embedders
//! can supply their own backends. Discovery walks an ordered candidate
//! list and stops at the first location that loads.

use crate::config::BackendPreference;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{efficientnet, resnet};
use geolens_core::{Backend, Error, ModelFormat, Result, NUM_CLASSES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded image classifier
///
/// Input is `[1, 224, 224, 3]` f32 in [0, 1]; output must flatten to one
/// score per class in label order.
pub trait ImageModel: Send + Sync {
    /// Model name for logs and status
    fn name(&self) -> &str;

    /// Run one forward pass
    fn forward(&self, input: &Tensor) -> Result<Tensor>;
}

/// Pluggable backend for loading a model from an artifact location
#[async_trait::async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the artifact at `location` onto `device`
    async fn load(&self, location: &Path, device: &Device) -> Result<Arc<dyn ImageModel>>;
}

/// Supported network architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "resnet18")]
    Resnet18,
    #[serde(rename = "resnet34")]
    Resnet34,
    #[serde(rename = "resnet50")]
    Resnet50,
    #[serde(rename = "efficientnet-b0")]
    EfficientNetB0,
    #[serde(rename = "efficientnet-b1")]
    EfficientNetB1,
    #[serde(rename = "efficientnet-b2")]
    EfficientNetB2,
    #[serde(rename = "efficientnet-b3")]
    EfficientNetB3,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resnet18 => "resnet18",
            Self::Resnet34 => "resnet34",
            Self::Resnet50 => "resnet50",
            Self::EfficientNetB0 => "efficientnet-b0",
            Self::EfficientNetB1 => "efficientnet-b1",
            Self::EfficientNetB2 => "efficientnet-b2",
            Self::EfficientNetB3 => "efficientnet-b3",
        };
        f.write_str(name)
    }
}

/// Primary artifact manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub architecture: Architecture,

    pub num_classes: usize,

    /// Weights file, relative to the manifest
    #[serde(default = "default_weights")]
    pub weights: PathBuf,
}

fn default_weights() -> PathBuf {
    PathBuf::from("model.safetensors")
}

impl ModelManifest {
    /// Read and validate a manifest
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::discovery(format!("{}: {}", path.display(), e)))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| Error::discovery(format!("{}: invalid manifest: {}", path.display(), e)))?;

        if manifest.num_classes != NUM_CLASSES {
            return Err(Error::discovery(format!(
                "{}: manifest declares {} classes, expected {}",
                path.display(),
                manifest.num_classes,
                NUM_CLASSES
            )));
        }
        Ok(manifest)
    }

    /// Weights path resolved against the manifest's directory
    pub fn weights_path(&self, manifest: &Path) -> PathBuf {
        if self.weights.is_absolute() {
            return self.weights.clone();
        }
        manifest
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.weights)
    }
}

/// Candle vision model behind the [`ImageModel`] interface
struct CandleImageModel {
    name: String,
    module: Box<dyn Module + Send + Sync>,
}

impl ImageModel for CandleImageModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        // candle vision models are channels-first
        input
            .permute((0, 3, 1, 2))
            .and_then(|t| t.contiguous())
            .and_then(|t| self.module.forward(&t))
            .map_err(|e| Error::inference(e.to_string()))
    }
}

/// Loads manifest + safetensors artifacts with candle
#[derive(Debug, Default, Clone)]
pub struct CandleModelLoader;

impl CandleModelLoader {
    pub fn new() -> Self {
        Self
    }

    fn build(
        architecture: Architecture,
        weights: &Path,
        device: &Device,
    ) -> candle_core::Result<Box<dyn Module + Send + Sync>> {
        // Safety: the weights file is mapped read-only and must not be
        // modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };

        let module: Box<dyn Module + Send + Sync> = match architecture {
            Architecture::Resnet18 => Box::new(resnet::resnet18(NUM_CLASSES, vb)?),
            Architecture::Resnet34 => Box::new(resnet::resnet34(NUM_CLASSES, vb)?),
            Architecture::Resnet50 => Box::new(resnet::resnet50(NUM_CLASSES, vb)?),
            Architecture::EfficientNetB0 => Box::new(efficientnet::EfficientNet::new(
                vb,
                efficientnet::MBConvConfig::b0(),
                NUM_CLASSES,
            )?),
            Architecture::EfficientNetB1 => Box::new(efficientnet::EfficientNet::new(
                vb,
                efficientnet::MBConvConfig::b1(),
                NUM_CLASSES,
            )?),
            Architecture::EfficientNetB2 => Box::new(efficientnet::EfficientNet::new(
                vb,
                efficientnet::MBConvConfig::b2(),
                NUM_CLASSES,
            )?),
            Architecture::EfficientNetB3 => Box::new(efficientnet::EfficientNet::new(
                vb,
                efficientnet::MBConvConfig::b3(),
                NUM_CLASSES,
            )?),
        };
        Ok(module)
    }
}

#[async_trait::async_trait]
impl ModelLoader for CandleModelLoader {
    async fn load(&self, location: &Path, device: &Device) -> Result<Arc<dyn ImageModel>> {
        let manifest = ModelManifest::from_file(location).await?;
        let weights = manifest.weights_path(location);

        if !tokio::fs::try_exists(&weights).await.unwrap_or(false) {
            return Err(Error::discovery(format!(
                "weights not found: {}",
                weights.display()
            )));
        }

        tracing::info!(
            architecture = %manifest.architecture,
            weights = %weights.display(),
            "Loading candle model"
        );

        let device = device.clone();
        let architecture = manifest.architecture;
        let module =
            tokio::task::spawn_blocking(move || Self::build(architecture, &weights, &device))
                .await
                .map_err(|e| Error::internal(format!("model load task failed: {}", e)))?
                .map_err(|e| Error::discovery(format!("{}: {}", location.display(), e)))?;

        Ok(Arc::new(CandleImageModel {
            name: architecture.to_string(),
            module,
        }))
    }
}

/// Pick a compute device, preferring CUDA, then Metal, then CPU
pub fn select_device(preference: BackendPreference) -> (Device, Backend) {
    if preference == BackendPreference::Cpu {
        return (Device::Cpu, Backend::Cpu);
    }

    match Device::new_cuda(0) {
        Ok(device) => {
            tracing::info!("Using CUDA backend");
            return (device, Backend::Gpu);
        }
        Err(e) => tracing::debug!(error = %e, "CUDA unavailable"),
    }

    match Device::new_metal(0) {
        Ok(device) => {
            tracing::info!("Using Metal backend");
            (device, Backend::Gpu)
        }
        Err(e) => {
            tracing::warn!(error = %e, "GPU backend unavailable, falling back to CPU");
            (Device::Cpu, Backend::Cpu)
        }
    }
}

/// A candidate location that failed to load
#[derive(Debug)]
pub struct FailedAttempt {
    pub location: PathBuf,
    pub error: Error,
}

/// Outcome of walking the candidate list
pub enum Discovery {
    Found {
        format: ModelFormat,
        location: PathBuf,
        model: Arc<dyn ImageModel>,
    },
    NotFound {
        attempts: Vec<FailedAttempt>,
    },
}

impl fmt::Debug for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found {
                format,
                location,
                model,
            } => f
                .debug_struct("Found")
                .field("format", format)
                .field("location", location)
                .field("model", &model.name())
                .finish(),
            Self::NotFound { attempts } => f
                .debug_struct("NotFound")
                .field("attempts", attempts)
                .finish(),
        }
    }
}

/// Try each candidate in order; the first success wins and later
/// candidates are never attempted
pub async fn discover(
    loader: &dyn ModelLoader,
    candidates: &[PathBuf],
    device: &Device,
) -> Discovery {
    let mut attempts = Vec::new();

    for location in candidates {
        match loader.load(location, device).await {
            Ok(model) => {
                tracing::info!(
                    location = %location.display(),
                    model = model.name(),
                    "Model loaded"
                );
                return Discovery::Found {
                    format: ModelFormat::Primary,
                    location: location.clone(),
                    model,
                };
            }
            Err(error) => {
                tracing::debug!(location = %location.display(), error = %error, "Candidate failed");
                attempts.push(FailedAttempt {
                    location: location.clone(),
                    error,
                });
            }
        }
    }

    Discovery::NotFound { attempts }
}

/// Sidecar written next to a converted TFLite model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub model_file: Option<String>,
    #[serde(default)]
    pub input_shape: Option<Vec<i64>>,
    #[serde(default)]
    pub output_shape: Option<Vec<i64>>,
    #[serde(default)]
    pub num_classes: Option<usize>,
}

/// Name of the descriptor file next to the secondary artifact
pub const DESCRIPTOR_FILE: &str = "model_config.json";

/// A TFLite flatbuffer found on disk
///
/// It can be read and described but never executed.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryArtifact {
    pub location: PathBuf,
    pub size: usize,
    pub descriptor: Option<ArtifactDescriptor>,
}

impl SecondaryArtifact {
    /// Read the artifact and its optional descriptor
    pub async fn probe(location: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(location)
            .await
            .map_err(|e| Error::discovery(format!("{}: {}", location.display(), e)))?;

        let descriptor_path = location
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DESCRIPTOR_FILE);
        let descriptor = match tokio::fs::read_to_string(&descriptor_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring malformed artifact descriptor");
                    None
                }
            },
            Err(_) => None,
        };

        Ok(Self {
            location: location.to_path_buf(),
            size: bytes.len(),
            descriptor,
        })
    }

    /// Attempt to build an inference model from this artifact
    pub fn load(&self) -> Result<Arc<dyn ImageModel>> {
        Err(Error::unsupported(format!(
            "{} is a TFLite model; inference requires a candle artifact",
            self.location.display()
        )))
    }

    /// One-line description for status messages
    pub fn describe(&self) -> String {
        let mut text = format!("{} ({} bytes)", self.location.display(), self.size);
        if let Some(d) = &self.descriptor {
            if let (Some(input), Some(output)) = (&d.input_shape, &d.output_shape) {
                text.push_str(&format!(", input {:?}, output {:?}", input, output));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Dummy;

    impl ImageModel for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }

        fn forward(&self, input: &Tensor) -> Result<Tensor> {
            Ok(input.clone())
        }
    }

    /// Loads only locations whose file name contains "good"
    #[derive(Default)]
    struct Picky {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelLoader for Picky {
        async fn load(&self, location: &Path, _device: &Device) -> Result<Arc<dyn ImageModel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if location.to_string_lossy().contains("good") {
                Ok(Arc::new(Dummy))
            } else {
                Err(Error::discovery("nope"))
            }
        }
    }

    #[tokio::test]
    async fn test_discovery_stops_at_first_success() {
        let loader = Picky::default();
        let candidates = vec![
            PathBuf::from("a/bad.json"),
            PathBuf::from("b/good.json"),
            PathBuf::from("c/good.json"),
        ];

        match discover(&loader, &candidates, &Device::Cpu).await {
            Discovery::Found {
                location, format, ..
            } => {
                assert_eq!(location, PathBuf::from("b/good.json"));
                assert_eq!(format, ModelFormat::Primary);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discovery_records_every_failure() {
        let loader = Picky::default();
        let candidates = vec![PathBuf::from("x.json"), PathBuf::from("y.json")];

        match discover(&loader, &candidates, &Device::Cpu).await {
            Discovery::NotFound { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[1].location, PathBuf::from("y.json"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manifest_rejects_wrong_class_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"architecture": "resnet18", "num_classes": 1000}"#).unwrap();

        let err = ModelManifest::from_file(&path).await.unwrap_err();
        assert!(matches!(err, Error::ModelDiscovery(_)));
    }

    #[tokio::test]
    async fn test_manifest_resolves_weights_relative_to_itself() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"architecture": "efficientnet-b0", "num_classes": 9, "weights": "w.safetensors"}"#,
        )
        .unwrap();

        let manifest = ModelManifest::from_file(&path).await.unwrap();
        assert_eq!(manifest.architecture, Architecture::EfficientNetB0);
        assert_eq!(manifest.weights_path(&path), dir.path().join("w.safetensors"));
    }

    #[tokio::test]
    async fn test_candle_loader_missing_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"architecture": "resnet18", "num_classes": 9}"#).unwrap();

        let result = CandleModelLoader::new().load(&path, &Device::Cpu).await;
        assert!(matches!(result, Err(Error::ModelDiscovery(_))));

        let result = CandleModelLoader::new()
            .load(&dir.path().join("missing.json"), &Device::Cpu)
            .await;
        assert!(matches!(result, Err(Error::ModelDiscovery(_))));
    }

    #[tokio::test]
    async fn test_secondary_probe_with_descriptor() {
        let dir = TempDir::new().unwrap();
        let tflite = dir.path().join("model.tflite");
        std::fs::write(&tflite, b"TFL3 fake flatbuffer").unwrap();
        std::fs::write(
            dir.path().join(DESCRIPTOR_FILE),
            r#"{"format": "tflite", "modelFile": "model.tflite",
                "inputShape": [1, 224, 224, 3], "outputShape": [1, 9], "numClasses": 9}"#,
        )
        .unwrap();

        let artifact = SecondaryArtifact::probe(&tflite).await.unwrap();
        assert_eq!(artifact.size, 20);
        let descriptor = artifact.descriptor.clone().unwrap();
        assert_eq!(descriptor.num_classes, Some(9));
        assert!(artifact.describe().contains("[1, 224, 224, 3]"));
        assert!(matches!(artifact.load(), Err(Error::UnsupportedArtifact(_))));
    }

    #[tokio::test]
    async fn test_secondary_probe_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(SecondaryArtifact::probe(&dir.path().join("model.tflite"))
            .await
            .is_err());
    }

    #[test]
    fn test_cpu_preference_never_selects_gpu() {
        let (device, backend) = select_device(BackendPreference::Cpu);
        assert!(device.is_cpu());
        assert_eq!(backend, Backend::Cpu);
    }
}
