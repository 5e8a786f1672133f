//! Configuration for the identification engine and model discovery

use geolens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the whole engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model discovery and lifecycle settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Heuristic classifier settings
    #[serde(default)]
    pub heuristic: HeuristicConfig,

    /// Artificial response pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Limits for images fetched from `http(s)` URLs
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Results below this confidence emit a low-confidence warning
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f32,
}

/// Model discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Primary artifact manifests, consulted in order; the first that loads wins
    #[serde(default = "default_candidates")]
    pub candidates: Vec<PathBuf>,

    /// Secondary artifact location (status only, never runs inference)
    #[serde(default = "default_secondary")]
    pub secondary: Option<PathBuf>,

    /// Compute backend preference
    #[serde(default)]
    pub backend: BackendPreference,

    /// Run a throwaway forward pass after loading
    #[serde(default = "default_true")]
    pub warmup: bool,
}

/// Backend preference (for config files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Try GPU first, fall back to CPU
    #[default]
    Auto,
    /// Same as auto; a missing GPU still degrades to CPU
    Gpu,
    /// Never touch the GPU
    Cpu,
}

/// Heuristic classifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Fixed jitter seed; `None` seeds from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Pacing delay applied after classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_model_ms")]
    pub model_ms: u64,

    #[serde(default = "default_heuristic_ms")]
    pub heuristic_ms: u64,
}

/// Remote image fetch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Whole-request deadline, connect through last body byte
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest accepted response body
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            heuristic: HeuristicConfig::default(),
            pacing: PacingConfig::default(),
            fetch: FetchConfig::default(),
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            secondary: default_secondary(),
            backend: BackendPreference::Auto,
            warmup: true,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_ms: default_model_ms(),
            heuristic_ms: default_heuristic_ms(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_fetch_max_bytes(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PacingConfig {
    /// Delay for the model path, if pacing is on
    pub fn model_delay(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_millis(self.model_ms))
    }

    /// Delay for the heuristic path, if pacing is on
    pub fn heuristic_delay(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_millis(self.heuristic_ms))
    }
}

impl EngineConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load from file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values outside their domain
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(Error::config(format!(
                "low_confidence_threshold must be within [0, 1], got {}",
                self.low_confidence_threshold
            )));
        }
        if self.fetch.timeout_ms == 0 || self.fetch.max_bytes == 0 {
            return Err(Error::config("fetch.timeout_ms and fetch.max_bytes must be positive"));
        }
        Ok(())
    }

    /// Replace the candidate list with a single manifest
    pub fn with_model(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.model.candidates = vec![manifest.into()];
        self
    }

    /// Fix the heuristic jitter seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.heuristic.seed = Some(seed);
        self
    }

    /// Set the backend preference
    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.model.backend = backend;
        self
    }
}

fn default_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("model/model.json"),
        PathBuf::from("./model/model.json"),
        PathBuf::from("model/candle/model.json"),
    ]
}

fn default_secondary() -> Option<PathBuf> {
    Some(PathBuf::from("model/model.tflite"))
}

fn default_low_confidence_threshold() -> f32 {
    0.6
}

fn default_model_ms() -> u64 {
    600
}

fn default_heuristic_ms() -> u64 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_max_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_yaml() {
        let yaml = r#"
model:
  candidates:
    - ./assets/model.json
    - ./assets/alt/model.json
  secondary: ./assets/model.tflite
  backend: cpu
  warmup: false
heuristic:
  seed: 42
pacing:
  enabled: true
  model_ms: 100
fetch:
  timeout_ms: 2500
low_confidence_threshold: 0.5
"#;

        let config = EngineConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.model.candidates.len(), 2);
        assert_eq!(config.model.candidates[0], PathBuf::from("./assets/model.json"));
        assert_eq!(config.model.backend, BackendPreference::Cpu);
        assert!(!config.model.warmup);
        assert_eq!(config.heuristic.seed, Some(42));
        assert_eq!(config.pacing.model_delay(), Some(Duration::from_millis(100)));
        assert_eq!(config.pacing.heuristic_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(config.fetch.timeout(), Duration::from_millis(2500));
        assert_eq!(config.fetch.max_bytes, 16 * 1024 * 1024);
        assert_eq!(config.low_confidence_threshold, 0.5);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml("{}").unwrap();

        assert_eq!(config.model.candidates, default_candidates());
        assert_eq!(config.model.secondary, default_secondary());
        assert_eq!(config.model.backend, BackendPreference::Auto);
        assert!(config.model.warmup);
        assert_eq!(config.heuristic.seed, None);
        assert_eq!(config.pacing.model_delay(), None);
        assert_eq!(config.low_confidence_threshold, 0.6);
    }

    #[test]
    fn test_secondary_can_be_disabled() {
        let config = EngineConfig::from_yaml("model:\n  secondary: ~\n").unwrap();
        assert_eq!(config.model.secondary, None);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let err = EngineConfig::from_yaml("low_confidence_threshold: 1.5").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = EngineConfig::from_yaml("fetch:\n  max_bytes: 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_model("/opt/models/model.json")
            .with_seed(7)
            .with_backend(BackendPreference::Cpu);

        assert_eq!(config.model.candidates, vec![PathBuf::from("/opt/models/model.json")]);
        assert_eq!(config.heuristic.seed, Some(7));
        assert_eq!(config.model.backend, BackendPreference::Cpu);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = EngineConfig::load_or_default("/nonexistent/geolens.yaml").unwrap();
        assert_eq!(config.low_confidence_threshold, 0.6);
    }
}
