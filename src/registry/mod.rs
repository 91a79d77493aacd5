//! Model registry abstraction
//!
//! The promotion engine and the pipelines only talk to the
//! [`ModelRegistry`] capability set, so the backing store is swappable.
//! Clients are explicit handles passed by reference; there is no global
//! registry state.

mod local;
mod tags;

pub use local::LocalRegistry;
pub use tags::{parse_rmse, Alias, Stage, ValidationStatus, VersionTags, METRIC_KEY, STAGE_KEY, STATUS_KEY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Descriptor of one registered model version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,
    /// Registry-assigned version identifier
    pub version: String,
    /// Artifact location
    pub source: String,
    /// Training run that produced the artifact
    pub run_id: Option<String>,
    /// Aliases currently resolving to this version
    pub aliases: Vec<Alias>,
    /// Raw string tags
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Typed view of the tags
    pub fn typed_tags(&self) -> Result<VersionTags> {
        VersionTags::parse(&self.tags)
    }

    /// The `rmse` tag as a float
    pub fn rmse(&self) -> Result<f64> {
        parse_rmse(&self.tags)
    }
}

/// Capabilities required of a versioned model store
pub trait ModelRegistry {
    /// Resolve an alias; `None` when no version holds it
    fn version_by_alias(&self, name: &str, alias: Alias) -> Result<Option<ModelVersion>>;

    /// Point `alias` at `version`, moving it off any other version
    fn set_alias(&mut self, name: &str, alias: Alias, version: &str) -> Result<()>;

    /// Remove `alias` from the model
    fn delete_alias(&mut self, name: &str, alias: Alias) -> Result<()>;

    /// Set one string tag on a version
    fn set_tag(&mut self, name: &str, version: &str, key: &str, value: &str) -> Result<()>;

    /// All tags of a version
    fn tags(&self, name: &str, version: &str) -> Result<BTreeMap<String, String>>;

    /// Most recently created version of a model
    fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>>;

    /// Register a new version pointing at `source`
    fn create_version(&mut self, name: &str, source: &str, run_id: Option<&str>) -> Result<ModelVersion>;
}

/// Resolve an alias that must exist
pub fn require_alias<R: ModelRegistry + ?Sized>(registry: &R, name: &str, alias: Alias) -> Result<ModelVersion> {
    registry
        .version_by_alias(name, alias)?
        .ok_or_else(|| PipelineError::AliasNotFound {
            model: name.to_string(),
            alias: alias.to_string(),
        })
}

/// Register a trained artifact as the new candidate
///
/// Creates the version, points `candidate` at it and tags it
/// `stage=Staging`, `validation_status=pending` plus every metric.
/// `metrics` must contain `rmse`, the promotion engine's input.
pub fn register_candidate<R: ModelRegistry + ?Sized>(
    registry: &mut R,
    name: &str,
    source: &str,
    run_id: Option<&str>,
    metrics: &BTreeMap<String, f64>,
) -> Result<ModelVersion> {
    if !metrics.contains_key(METRIC_KEY) {
        return Err(PipelineError::InvalidInput(format!(
            "candidate metrics must include {}",
            METRIC_KEY
        )));
    }

    let created = registry.create_version(name, source, run_id)?;
    info!(model = name, version = %created.version, "Registering candidate");

    registry.set_alias(name, Alias::Candidate, &created.version)?;
    registry.set_tag(name, &created.version, STAGE_KEY, Stage::Staging.as_str())?;
    registry.set_tag(name, &created.version, STATUS_KEY, ValidationStatus::Pending.as_str())?;
    for (key, value) in metrics {
        registry.set_tag(name, &created.version, key, &value.to_string())?;
    }

    require_alias(registry, name, Alias::Candidate)
}
