//! Error types for GeoLens

/// Result type alias using GeoLens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for GeoLens operations
///
/// Only [`Error::ImageDecode`] ever reaches a caller of `identify`; the
/// model-related variants are absorbed by the engine's path selection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate artifact location could be loaded
    #[error("model discovery failed: {0}")]
    ModelDiscovery(String),

    /// An artifact was found in a format this engine cannot run
    #[error("unsupported artifact format: {0}")]
    UnsupportedArtifact(String),

    /// Forward pass failed (shape mismatch, backend error, ...)
    #[error("inference error: {0}")]
    Inference(String),

    /// The input could not be fetched or decoded into pixels
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Warmup pass after load failed
    #[error("warmup error: {0}")]
    Warmup(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new model discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::ModelDiscovery(msg.into())
    }

    /// Create a new unsupported artifact error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedArtifact(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new image decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new warmup error
    pub fn warmup(msg: impl Into<String>) -> Self {
        Self::Warmup(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must be surfaced to the caller of `identify`
    pub fn is_fatal_for_call(&self) -> bool {
        matches!(self, Self::ImageDecode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_decode_errors_are_fatal() {
        assert!(Error::decode("truncated png").is_fatal_for_call());
        assert!(!Error::inference("shape mismatch").is_fatal_for_call());
        assert!(!Error::discovery("nothing found").is_fatal_for_call());
        assert!(!Error::warmup("backend lost").is_fatal_for_call());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::unsupported("tflite").to_string(),
            "unsupported artifact format: tflite"
        );
        assert_eq!(
            Error::decode("empty image").to_string(),
            "image decode error: empty image"
        );
    }
}
