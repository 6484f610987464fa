//! Error types for the agent core.
//!
//! Recoverable numeric anomalies (a predictor that fails or emits NaN/∞) never
//! appear here as runtime errors: the step engine absorbs them into state and
//! reports `valid: false`.  What remains are structural faults that end the
//! session.

use thiserror::Error;

use crate::backend::BackendError;

/// Fatal errors from agent construction or stepping.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The concatenated step input does not match the predictor's declared width.
    #[error("Shape mismatch: predictor expects input width {expected}, step input is {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The numeric backend failed mid-step; the engine must be rebuilt.
    #[error("Numeric backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration rejected at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A previous backend fault left the engine unusable.
    #[error("Step engine is unusable after a backend fault; reconstruct the agent")]
    EngineUnusable,
}

/// Errors from loading or validating an [`AgentConfig`](crate::config::AgentConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value is out of its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure reported by an [`EmotionPredictor`](crate::predictor::EmotionPredictor).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictorError {
    /// The predictor could not produce an estimate.
    #[error("Prediction failed: {0}")]
    Failed(String),
}
