//! Domain error types
//!
//! This module defines the error taxonomy for SafeHarbor. Provider and
//! resolver failures carry enough context to be logged without exposing the
//! PHI they were processing.

use thiserror::Error;

/// Main SafeHarbor error type
#[derive(Debug, Error)]
pub enum DeidError {
    /// A detector returned a span that is out of bounds, not on a character
    /// boundary, or whose stored text disagrees with the input slice.
    ///
    /// Fatal for that detection only: it is logged and dropped.
    #[error("Malformed detection from provider '{provider}': {reason}")]
    MalformedDetection { provider: String, reason: String },

    /// The post-merge entity list overlaps or is out of order.
    ///
    /// Aborts the current document, never the batch.
    #[error("Resolver invariant violated: {0}")]
    ResolverInvariantViolation(String),

    /// The configured salt is missing or equals a documented insecure default.
    ///
    /// Non-fatal; processing continues with the insecure default.
    #[error("Weak salt: {0}")]
    WeakSalt(String),

    /// Configuration references a strategy the engine does not implement
    #[error("Unsupported strategy '{strategy}' for category '{category}'")]
    UnsupportedStrategy { category: String, strategy: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl DeidError {
    /// Builds a [`DeidError::MalformedDetection`] for the named provider
    pub fn malformed(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        DeidError::MalformedDetection {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only degrades the current run instead of stopping it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeidError::MalformedDetection { .. } | DeidError::WeakSalt(_)
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for DeidError {
    fn from(err: std::io::Error) -> Self {
        DeidError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DeidError {
    fn from(err: serde_json::Error) -> Self {
        DeidError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DeidError {
    fn from(err: toml::de::Error) -> Self {
        DeidError::Configuration(format!("TOML parse error: {err}"))
    }
}
