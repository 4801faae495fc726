//! Error types for regime classification and weighting

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, RegimeError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum RegimeError {
    /// Too few rows for the configured windows
    #[error("Insufficient data: need at least {required} rows, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// EM stopped without reaching the configured tolerance
    #[error("EM did not converge after {iterations} iterations (last delta {last_delta:.6})")]
    Convergence { iterations: usize, last_delta: f64 },

    /// Classification requested before any model was fitted
    #[error("Model not trained: call fit before classify")]
    ModelNotTrained,

    /// Weights summed to zero. Recovered inside the mapper, never returned to callers.
    #[error("Degenerate weights: sum is zero")]
    DegenerateWeights,

    /// Feature columns differ from the ones the model was fitted on
    #[error("Feature schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Snapshot encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RegimeError {
    /// Whether the caller may retry, e.g. with a relaxed tolerance
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegimeError::Convergence { .. })
    }

    /// Structural errors mean no classification can be justified
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RegimeError::InsufficientData { .. }
                | RegimeError::ModelNotTrained
                | RegimeError::Convergence { .. }
                | RegimeError::SchemaMismatch { .. }
        )
    }
}
