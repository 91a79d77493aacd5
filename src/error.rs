//! Error types for the citibike lifecycle pipelines

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Metric field missing from comparison result: {field} (path {path})")]
    MissingMetric { field: String, path: String },

    #[error("Invalid tag: {key} = {value:?}, {reason}")]
    InvalidTag {
        key: String,
        value: String,
        reason: String,
    },

    #[error("No candidate version registered for model {0}")]
    MissingCandidate(String),

    #[error("Alias {alias} not found for model {model}")]
    AliasNotFound { model: String, alias: String },

    #[error("Version {version} not found for model {model}")]
    VersionNotFound { model: String, version: String },

    #[error("Metrics row already stored for timestamp {0}")]
    MetricsConflict(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for PipelineError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::StoreError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::DataError(format!("invalid shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::MissingCandidate("xgb-citibike-reg-model".to_string());
        assert_eq!(
            err.to_string(),
            "No candidate version registered for model xgb-citibike-reg-model"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }

    #[test]
    fn test_invalid_tag_display() {
        let err = PipelineError::InvalidTag {
            key: "rmse".to_string(),
            value: "abc".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid tag: rmse = \"abc\", not a number");
    }
}
