//! MetaHuman error types
//!
//! Propagation policy: only a generation failure (after its base-model
//! retry) and an unmet required-input precondition may abort a pipeline
//! call. Everything else degrades with a warning embedded in the
//! corresponding layer execution record.

use thiserror::Error;

/// MetaHuman error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (raised at build or reload time, never per request)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A layer precondition was not met (e.g. empty user message)
    #[error("Invalid input for layer '{layer}': {reason}")]
    InvalidInput {
        /// Layer whose precondition failed
        layer: String,
        /// Human-readable reason
        reason: String,
    },

    /// LLM generation failed after the base-model retry
    #[error("Generation error: {0}")]
    Generation(String),

    /// Adapter storage or discovery error
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Context retrieval error
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Validator error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persona resolution error
    #[error("Persona error: {0}")]
    Persona(String),

    /// A fatal layer aborted the pipeline
    #[error("Layer '{layer}' failed: {source}")]
    Layer {
        /// Name of the fatal layer
        layer: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// A layer exceeded its configured timeout
    #[error("Layer '{layer}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Layer that timed out
        layer: String,
        /// Configured budget, milliseconds
        timeout_ms: u64,
    },

    /// Cooperative cancellation tripped
    #[error("Pipeline cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an error as the fatal cause for a named layer.
    pub fn in_layer(layer: impl Into<String>, source: Error) -> Self {
        Self::Layer {
            layer: layer.into(),
            source: Box::new(source),
        }
    }

    /// Name of the fatal layer, if this error identifies one.
    pub fn fatal_layer(&self) -> Option<&str> {
        match self {
            Self::Layer { layer, .. } => Some(layer),
            Self::InvalidInput { layer, .. } => Some(layer),
            Self::Timeout { layer, .. } => Some(layer),
            _ => None,
        }
    }
}

/// Result type alias for MetaHuman operations
pub type Result<T> = std::result::Result<T, Error>;
