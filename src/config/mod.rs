//! Pipeline configuration
//!
//! One YAML file carries the parameters of every pipeline:
//!
//! ```yaml
//! pipelines:
//!   training:
//!     parameters:
//!       data_url: data/
//!       start_train_date: "2025-01-01"
//!       ...
//! ```

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::registry::Alias;

/// Default registered model name
pub const DEFAULT_MODEL_NAME: &str = "xgb-citibike-reg-model";

/// Runnable pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Training,
    DeployMlflow,
    DeployBentoml,
    Monitoring,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 4] = [
        PipelineKind::Training,
        PipelineKind::DeployMlflow,
        PipelineKind::DeployBentoml,
        PipelineKind::Monitoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Training => "training",
            PipelineKind::DeployMlflow => "deploy-mlflow",
            PipelineKind::DeployBentoml => "deploy-bentoml",
            PipelineKind::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        PipelineKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PipelineError::ConfigError(format!("unknown pipeline: {}", s)))
    }
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_folds() -> usize {
    3
}

/// Parameters of the training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Base directory of the yearly partitions
    pub data_url: PathBuf,
    pub start_train_date: NaiveDate,
    pub end_train_date: NaiveDate,
    pub test_size: f64,
    pub shuffle: bool,
    pub random_state: u64,
    pub n_trials: usize,
    #[serde(default = "default_folds")]
    pub cv_folds: usize,
    #[serde(default = "default_model_name")]
    pub registered_model_name: String,
    /// Where trained model artifacts are written
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

/// Parameters of both deployment pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentParams {
    pub model_name: String,
    pub model_alias: Alias,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Service entry point recorded in the bundle, e.g. `service.py:CitibikeService`
    #[serde(default)]
    pub service_class: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Parameters of the monitoring pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringParams {
    pub data_url: PathBuf,
    pub model_name: String,
    pub model_alias: Alias,
    /// SQLite database file of the metrics store
    pub database: PathBuf,
    pub start_reference_date: NaiveDate,
    pub end_reference_date: NaiveDate,
    pub start_current_date: NaiveDate,
    pub end_current_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
struct PipelineSection {
    parameters: Option<serde_yaml_ng::Value>,
}

/// Parsed configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pipelines: BTreeMap<String, PipelineSection>,
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Reading config");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(raw)?)
    }

    /// Typed `parameters` block of one pipeline
    pub fn parameters<T: DeserializeOwned>(&self, kind: PipelineKind) -> Result<T> {
        let params = self
            .pipelines
            .get(kind.as_str())
            .and_then(|section| section.parameters.clone())
            .ok_or_else(|| {
                PipelineError::ConfigError(format!("no parameters found for pipeline '{}'", kind))
            })?;
        serde_yaml_ng::from_value(params)
            .map_err(|e| PipelineError::ConfigError(format!("pipeline '{}': {}", kind, e)))
    }

    pub fn training(&self) -> Result<TrainingParams> {
        self.parameters(PipelineKind::Training)
    }

    pub fn deployment(&self, kind: PipelineKind) -> Result<DeploymentParams> {
        match kind {
            PipelineKind::DeployMlflow | PipelineKind::DeployBentoml => self.parameters(kind),
            other => Err(PipelineError::ConfigError(format!(
                "'{}' is not a deployment pipeline",
                other
            ))),
        }
    }

    pub fn monitoring(&self) -> Result<MonitoringParams> {
        self.parameters(PipelineKind::Monitoring)
    }
}
