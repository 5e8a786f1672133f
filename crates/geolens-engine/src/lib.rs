//! GeoLens Engine
//!
//! On-device landmark identification that keeps working without a trained
//! model.
//!
//! Three execution paths share one output contract:
//! - Model path: a candle artifact was discovered and runs the forward pass
//! - Unsupported-artifact path: only a TFLite file exists; it is reported in
//!   status and classification falls through to heuristics
//! - Heuristic path: color and texture statistics feed a rule-based
//!   classifier with seedable jitter
//!
//! [`Engine::identify`] is the single entry point.

pub mod config;
pub mod engine;
pub mod features;
pub mod heuristic;
pub mod inference;
pub mod lifecycle;
pub mod model_loader;
pub mod preprocess;
pub mod source;

pub use config::{
    BackendPreference, EngineConfig, FetchConfig, HeuristicConfig, ModelConfig, PacingConfig,
};
pub use engine::{Engine, Identification, InferencePath};
pub use features::{analyze, analyze_rgb, ColorProfile, DominantHue, FeatureVector};
pub use heuristic::{HeuristicClassifier, Jitter};
pub use inference::InferenceOutcome;
pub use lifecycle::{LoadedModel, ModelManager};
pub use model_loader::{
    discover, select_device, Architecture, ArtifactDescriptor, CandleModelLoader, Discovery,
    ImageModel, ModelLoader, ModelManifest, SecondaryArtifact,
};
pub use source::{Fetcher, ImageSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{Engine, Identification, InferencePath};
    pub use crate::model_loader::{ImageModel, ModelLoader};
    pub use crate::source::ImageSource;
    pub use crate::EngineConfig;
    pub use geolens_core::prelude::*;
}
