//! GeoLens Core
//!
//! Core types and error handling shared across GeoLens components.
//!
//! This crate provides:
//! - The fixed set of nine landmark classes and their metadata
//! - The identification result contract returned to callers
//! - Model status vocabulary (state, backend, artifact format)
//! - Error types and result handling

pub mod error;
pub mod labels;
pub mod types;

pub use error::{Error, Result};
pub use labels::{ClassLabel, ClassMetadata, NUM_CLASSES};
pub use types::{
    Backend, ClassificationEntry, IdentificationResult, ModelFormat, ModelState, ModelStatus,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::labels::{ClassLabel, ClassMetadata};
    pub use crate::types::{ClassificationEntry, IdentificationResult, ModelStatus};
}
