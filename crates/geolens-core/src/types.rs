//! Core types for GeoLens

use crate::labels::ClassLabel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One ranked class in an identification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    /// Class label
    pub name: ClassLabel,

    /// Share of the ranking, 0-100
    pub percentage: u8,
}

impl ClassificationEntry {
    /// Create a new entry, clamping the percentage into 0-100
    pub fn new(name: ClassLabel, percentage: u32) -> Self {
        Self {
            name,
            percentage: percentage.min(100) as u8,
        }
    }
}

/// The value returned by `identify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    /// Primary class
    pub name: ClassLabel,

    /// Category of the primary class
    #[serde(rename = "type")]
    pub kind: String,

    /// Confidence in the primary class (0.0-1.0)
    pub confidence: f32,

    /// Educational facts for the primary class
    pub facts: Vec<String>,

    /// Up to three ranked classes, highest first
    pub classes: Vec<ClassificationEntry>,

    /// Where the primary class is found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl IdentificationResult {
    /// Build a result for `name`, resolving type, facts and location from
    /// the class metadata table
    pub fn for_label(name: ClassLabel, confidence: f32, classes: Vec<ClassificationEntry>) -> Self {
        let meta = name.metadata();
        Self {
            name,
            kind: meta.kind.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            facts: meta.facts.iter().map(|f| f.to_string()).collect(),
            classes,
            location: Some(meta.location.to_string()),
        }
    }

    /// Sum of the ranked percentages
    pub fn percentage_total(&self) -> u32 {
        self.classes.iter().map(|c| c.percentage as u32).sum()
    }

    /// Check the result contract: bounded confidence, 1-3 distinct classes
    /// in non-increasing order
    pub fn is_well_formed(&self) -> bool {
        let bounded = (0.0..=1.0).contains(&self.confidence);
        let sized = !self.classes.is_empty() && self.classes.len() <= 3;
        let ordered = self
            .classes
            .windows(2)
            .all(|w| w[0].percentage >= w[1].percentage);
        let distinct = self
            .classes
            .iter()
            .enumerate()
            .all(|(i, a)| self.classes[i + 1..].iter().all(|b| b.name != a.name));
        bounded && sized && ordered && distinct
    }
}

/// Compute substrate selected for a loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Gpu,
    Cpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Which artifact family the engine is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Trained model loaded from a primary candidate location
    Primary,
    /// Secondary artifact detected; it cannot run inference here
    Secondary,
    /// Heuristic classification only
    Fallback,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Lifecycle state of the model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded { backend: Backend, format: ModelFormat },
    FallbackOnly,
}

/// Status report derived from the lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub format: ModelFormat,
    pub backend: Backend,
    pub message: String,
}
