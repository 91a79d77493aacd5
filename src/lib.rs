//! Citi Bike demand model lifecycle
//!
//! Training, champion/candidate promotion, batch inference and weekly
//! drift monitoring for an hourly bike-share demand regressor.
//!
//! # Modules
//!
//! ## Data and features
//! - [`data`] - Yearly trip and weather partitions
//! - [`features`] - Holiday, weather and cyclic calendar features
//!
//! ## Model lifecycle
//! - [`training`] - Split, hyperparameter search, fit and registration
//! - [`tracking`] - Per-run parameter and score records
//! - [`registry`] - Versioned model store with aliases and tags
//! - [`promotion`] - Champion/candidate gating
//! - [`inference`] - Batch prediction over feature frames
//! - [`deploy`] - Deployment bundle export
//! - [`serving`] - Request-time prediction contract
//!
//! ## Monitoring
//! - [`drift`] - Weekly drift and regression quality metrics
//! - [`monitoring`] - SQLite metrics store
//!
//! ## Orchestration
//! - [`config`] - YAML pipeline parameters
//! - [`pipelines`] - Pipeline runners
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod features;

pub mod deploy;
pub mod inference;
pub mod promotion;
pub mod registry;
pub mod serving;
pub mod tracking;
pub mod training;

pub mod drift;
pub mod monitoring;

pub mod cli;
pub mod config;
pub mod pipelines;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PipelineError, Result};

    pub use crate::config::{DeploymentParams, MonitoringParams, PipelineConfig, PipelineKind, TrainingParams};
    pub use crate::data::{InMemorySource, ObservationSource, ParquetSource};
    pub use crate::features::{FeatureBuilder, FeatureFrame, FeatureRecord, Observation, UsFederalHolidays, Weather};

    pub use crate::inference::{InferenceRunner, Regressor};
    pub use crate::promotion::{promote_models, PromotionEngine, PromotionOutcome};
    pub use crate::registry::{Alias, LocalRegistry, ModelRegistry, ModelVersion};
    pub use crate::tracking::{RunRecord, RunStore};
    pub use crate::training::{GradientBoostedTrees, HyperparameterSearch, TrainingPipeline};

    pub use crate::drift::{ColumnMapping, DriftMetricRow, DriftMetricsEngine};
    pub use crate::monitoring::MetricsStore;

    pub use crate::deploy::{export_bundle, DeployTarget};
    pub use crate::serving::{PredictionService, RawTripRecord};
}
