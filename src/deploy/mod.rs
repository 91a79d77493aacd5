//! Deployment bundle export
//!
//! Resolves an aliased model version and writes a self-contained bundle:
//! the model artifact plus a manifest naming what it is and how it is to
//! be served.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::features::model_columns;
use crate::registry::{require_alias, Alias, ModelRegistry};
use crate::training::GradientBoostedTrees;

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Serving runtime a bundle is prepared for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployTarget {
    Mlflow,
    Bentoml,
}

impl DeployTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployTarget::Mlflow => "mlflow",
            DeployTarget::Bentoml => "bentoml",
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployTarget {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mlflow" => Ok(DeployTarget::Mlflow),
            "bentoml" => Ok(DeployTarget::Bentoml),
            other => Err(PipelineError::ConfigError(format!("unknown deploy target: {}", other))),
        }
    }
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub model_name: String,
    pub version: String,
    pub alias: Alias,
    pub target: DeployTarget,
    pub run_id: Option<String>,
    /// Artifact location in the registry
    pub source: String,
    /// Model inputs in fit order
    pub feature_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub exported_at: DateTime<Utc>,
}

impl BundleManifest {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(dir.as_ref().join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Builds bundles for one target
#[derive(Debug, Clone)]
pub struct BundleExporter {
    target: DeployTarget,
    service_class: Option<String>,
    image_name: Option<String>,
    image_tag: Option<String>,
    packages: Vec<String>,
}

impl BundleExporter {
    pub fn new(target: DeployTarget) -> Self {
        Self {
            target,
            service_class: None,
            image_name: None,
            image_tag: None,
            packages: Vec::new(),
        }
    }

    pub fn with_service_class(mut self, service_class: impl Into<String>) -> Self {
        self.service_class = Some(service_class.into());
        self
    }

    pub fn with_image(mut self, name: impl Into<String>, tag: Option<String>) -> Self {
        self.image_name = Some(name.into());
        self.image_tag = tag;
        self
    }

    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    /// Export the version `alias` resolves to into `out_dir`
    pub fn export<R: ModelRegistry + ?Sized>(
        &self,
        registry: &R,
        name: &str,
        alias: Alias,
        out_dir: impl AsRef<Path>,
    ) -> Result<BundleManifest> {
        let out_dir = out_dir.as_ref();
        let version = require_alias(registry, name, alias)?;
        info!(
            model = name,
            alias = %alias,
            version = %version.version,
            target = %self.target,
            "Exporting deployment bundle"
        );

        // Refuse to ship an artifact that does not load
        let model = GradientBoostedTrees::load_json(&version.source)?;
        let feature_columns = if model.feature_names().is_empty() {
            model_columns()
        } else {
            model.feature_names().to_vec()
        };

        fs::create_dir_all(out_dir)?;
        fs::copy(&version.source, out_dir.join(MODEL_FILE))?;

        let image = self.image_name.as_ref().map(|image| {
            let tag = self
                .image_tag
                .clone()
                .unwrap_or_else(|| format!("v{}", version.version));
            format!("{}:{}", image, tag)
        });
        let labels = BTreeMap::from([
            ("dataset".to_string(), "citibike".to_string()),
            ("framework".to_string(), "gbt".to_string()),
        ]);

        let manifest = BundleManifest {
            model_name: name.to_string(),
            version: version.version,
            alias,
            target: self.target,
            run_id: version.run_id,
            source: version.source,
            feature_columns,
            service_class: self.service_class.clone(),
            image,
            packages: self.packages.clone(),
            labels,
            exported_at: Utc::now(),
        };
        fs::write(out_dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

        info!(dir = %out_dir.display(), "Bundle written");
        Ok(manifest)
    }
}

/// Export with no service or image settings
pub fn export_bundle<R: ModelRegistry + ?Sized>(
    registry: &R,
    name: &str,
    alias: Alias,
    target: DeployTarget,
    out_dir: impl AsRef<Path>,
) -> Result<BundleManifest> {
    BundleExporter::new(target).export(registry, name, alias, out_dir)
}

/// Bundle directory for a model and target under `root`
pub fn bundle_dir(root: &Path, name: &str, target: DeployTarget) -> PathBuf {
    root.join(name).join(target.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LocalRegistry;
    use crate::training::BoosterParams;
    use ndarray::{Array1, Array2};
    use tempfile::TempDir;

    fn registry_with_champion(dir: &Path) -> LocalRegistry {
        let x = Array2::from_shape_fn((20, 11), |(r, c)| ((r + c) % 5) as f64);
        let y = Array1::from_shape_fn(20, |r| (r % 5) as f64);
        let mut model = GradientBoostedTrees::new(BoosterParams {
            n_estimators: 3,
            max_depth: 2,
            ..BoosterParams::default()
        })
        .with_feature_names(model_columns());
        model.fit(&x, &y).unwrap();
        let artifact = dir.join("artifact.json");
        model.save_json(&artifact).unwrap();

        let mut registry = LocalRegistry::in_memory();
        let v = registry
            .create_version("citibike", artifact.to_str().unwrap(), Some("run-1"))
            .unwrap();
        registry.set_alias("citibike", Alias::Champion, &v.version).unwrap();
        registry
    }

    #[test]
    fn test_export_writes_bundle() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with_champion(dir.path());
        let out = dir.path().join("bundle");

        let manifest = BundleExporter::new(DeployTarget::Bentoml)
            .with_service_class("service.py:CitibikeService")
            .with_image("citibike", None)
            .export(&registry, "citibike", Alias::Champion, &out)
            .unwrap();

        assert_eq!(manifest.version, "1");
        assert_eq!(manifest.image.as_deref(), Some("citibike:v1"));
        assert_eq!(manifest.feature_columns, model_columns());
        assert!(out.join(MODEL_FILE).exists());
        assert_eq!(BundleManifest::load(&out).unwrap(), manifest);
        assert!(GradientBoostedTrees::load_json(out.join(MODEL_FILE)).is_ok());
    }

    #[test]
    fn test_missing_alias() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with_champion(dir.path());
        let result = export_bundle(&registry, "citibike", Alias::Candidate, DeployTarget::Mlflow, dir.path());
        assert!(matches!(result, Err(PipelineError::AliasNotFound { .. })));
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("mlflow".parse::<DeployTarget>().unwrap(), DeployTarget::Mlflow);
        assert!("docker".parse::<DeployTarget>().is_err());
    }
}
