use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the interval tuner
#[derive(Error, Debug)]
pub enum HadesError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Validation errors (malformed device identity, bad measurement)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Snapshot / checkpoint / model files
    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    // Experience replay
    #[error("Not enough experience to sample: have {available}, need {required}")]
    EmptyBuffer { available: usize, required: usize },

    // External trainer capability
    #[error("Trainer error: {0}")]
    Trainer(String),

    #[error("Model export error: {0}")]
    Export(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HadesError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        HadesError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for HadesError
pub type Result<T> = std::result::Result<T, HadesError>;
