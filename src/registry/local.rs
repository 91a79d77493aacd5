//! Directory-backed model registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Alias, ModelRegistry, ModelVersion};
use crate::error::{PipelineError, Result};

/// One version in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionEntry {
    version: String,
    source: String,
    run_id: Option<String>,
    tags: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

/// All versions and aliases of one registered model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegisteredModel {
    versions: Vec<VersionEntry>,
    /// alias name -> version
    aliases: BTreeMap<String, String>,
}

/// Registry index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryIndex {
    models: BTreeMap<String, RegisteredModel>,
}

/// Registry keeping its index in `<root>/index.json`
///
/// Every mutation rewrites the index (write to a temporary file, then
/// rename). [`LocalRegistry::in_memory`] keeps the index in memory only.
/// Each alias maps to exactly one version, which is what keeps
/// `champion` and `candidate` unique per model.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: Option<PathBuf>,
    index: RegistryIndex,
}

impl LocalRegistry {
    /// Registry that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            root: None,
            index: RegistryIndex::default(),
        }
    }

    /// Create or open a registry at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                PipelineError::StoreError(format!("Failed to create registry: {}", e))
            })?;
        }

        let index_path = root.join("index.json");
        let index = if index_path.exists() {
            let file = File::open(&index_path).map_err(|e| {
                PipelineError::StoreError(format!("Failed to open index: {}", e))
            })?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                PipelineError::SerializationError(format!("Failed to read index: {}", e))
            })?
        } else {
            RegistryIndex::default()
        };

        Ok(Self {
            root: Some(root),
            index,
        })
    }

    /// Registered model names
    pub fn list_models(&self) -> Vec<String> {
        self.index.models.keys().cloned().collect()
    }

    /// All versions of a model, oldest first
    pub fn list_versions(&self, name: &str) -> Vec<ModelVersion> {
        self.index
            .models
            .get(name)
            .map(|model| model.versions.iter().map(|e| describe(name, model, e)).collect())
            .unwrap_or_default()
    }

    fn save_index(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let tmp_path = root.join("index.json.tmp");
        let file = File::create(&tmp_path).map_err(|e| {
            PipelineError::StoreError(format!("Failed to create index: {}", e))
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.index).map_err(|e| {
            PipelineError::SerializationError(format!("Failed to write index: {}", e))
        })?;
        fs::rename(&tmp_path, root.join("index.json")).map_err(|e| {
            PipelineError::StoreError(format!("Failed to replace index: {}", e))
        })?;
        Ok(())
    }

    fn model_mut(&mut self, name: &str) -> Result<&mut RegisteredModel> {
        self.index
            .models
            .get_mut(name)
            .ok_or_else(|| PipelineError::VersionNotFound {
                model: name.to_string(),
                version: "*".to_string(),
            })
    }
}

fn describe(name: &str, model: &RegisteredModel, entry: &VersionEntry) -> ModelVersion {
    let aliases = [Alias::Candidate, Alias::Champion]
        .into_iter()
        .filter(|a| model.aliases.get(a.as_str()) == Some(&entry.version))
        .collect();

    ModelVersion {
        name: name.to_string(),
        version: entry.version.clone(),
        source: entry.source.clone(),
        run_id: entry.run_id.clone(),
        aliases,
        tags: entry.tags.clone(),
        created_at: entry.created_at,
    }
}

fn find_entry<'a>(model: &'a RegisteredModel, name: &str, version: &str) -> Result<&'a VersionEntry> {
    model
        .versions
        .iter()
        .find(|e| e.version == version)
        .ok_or_else(|| not_found(name, version))
}

fn not_found(name: &str, version: &str) -> PipelineError {
    PipelineError::VersionNotFound {
        model: name.to_string(),
        version: version.to_string(),
    }
}

impl ModelRegistry for LocalRegistry {
    fn version_by_alias(&self, name: &str, alias: Alias) -> Result<Option<ModelVersion>> {
        let Some(model) = self.index.models.get(name) else {
            return Ok(None);
        };
        let Some(version) = model.aliases.get(alias.as_str()) else {
            return Ok(None);
        };
        let entry = find_entry(model, name, version)?;
        Ok(Some(describe(name, model, entry)))
    }

    fn set_alias(&mut self, name: &str, alias: Alias, version: &str) -> Result<()> {
        let model = self.model_mut(name)?;
        find_entry(model, name, version)?;
        model.aliases.insert(alias.as_str().to_string(), version.to_string());
        debug!(model = name, alias = %alias, version, "Alias set");
        self.save_index()
    }

    fn delete_alias(&mut self, name: &str, alias: Alias) -> Result<()> {
        let model = self.model_mut(name)?;
        if model.aliases.remove(alias.as_str()).is_none() {
            return Err(PipelineError::AliasNotFound {
                model: name.to_string(),
                alias: alias.to_string(),
            });
        }
        debug!(model = name, alias = %alias, "Alias deleted");
        self.save_index()
    }

    fn set_tag(&mut self, name: &str, version: &str, key: &str, value: &str) -> Result<()> {
        let model = self.model_mut(name)?;
        let entry = model
            .versions
            .iter_mut()
            .find(|e| e.version == version)
            .ok_or_else(|| not_found(name, version))?;
        entry.tags.insert(key.to_string(), value.to_string());
        self.save_index()
    }

    fn tags(&self, name: &str, version: &str) -> Result<BTreeMap<String, String>> {
        let model = self
            .index
            .models
            .get(name)
            .ok_or_else(|| not_found(name, version))?;
        Ok(find_entry(model, name, version)?.tags.clone())
    }

    fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        Ok(self
            .index
            .models
            .get(name)
            .and_then(|model| model.versions.last().map(|e| describe(name, model, e))))
    }

    fn create_version(&mut self, name: &str, source: &str, run_id: Option<&str>) -> Result<ModelVersion> {
        let model = self.index.models.entry(name.to_string()).or_default();
        let version = (model.versions.len() + 1).to_string();
        model.versions.push(VersionEntry {
            version: version.clone(),
            source: source.to_string(),
            run_id: run_id.map(str::to_string),
            tags: BTreeMap::new(),
            created_at: Utc::now(),
        });
        let created = model.versions.last().map(|e| describe(name, model, e));
        self.save_index()?;
        created.ok_or_else(|| not_found(name, &version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_sequential() {
        let mut registry = LocalRegistry::in_memory();
        assert_eq!(registry.create_version("m", "a", None).unwrap().version, "1");
        assert_eq!(registry.create_version("m", "b", None).unwrap().version, "2");
        assert_eq!(registry.latest_version("m").unwrap().unwrap().source, "b");
        assert!(registry.latest_version("other").unwrap().is_none());
    }

    #[test]
    fn test_alias_moves_between_versions() {
        let mut registry = LocalRegistry::in_memory();
        registry.create_version("m", "a", None).unwrap();
        registry.create_version("m", "b", None).unwrap();

        registry.set_alias("m", Alias::Champion, "1").unwrap();
        registry.set_alias("m", Alias::Champion, "2").unwrap();

        let holders: Vec<_> = registry
            .list_versions("m")
            .into_iter()
            .filter(|v| v.aliases.contains(&Alias::Champion))
            .collect();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].version, "2");
    }

    #[test]
    fn test_alias_on_unknown_version_fails() {
        let mut registry = LocalRegistry::in_memory();
        registry.create_version("m", "a", None).unwrap();
        let err = registry.set_alias("m", Alias::Candidate, "9").unwrap_err();
        assert!(matches!(err, PipelineError::VersionNotFound { .. }));
    }

    #[test]
    fn test_delete_missing_alias_fails() {
        let mut registry = LocalRegistry::in_memory();
        registry.create_version("m", "a", None).unwrap();
        assert!(registry.delete_alias("m", Alias::Candidate).is_err());
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut registry = LocalRegistry::open(dir.path()).unwrap();
            registry.create_version("m", "a", Some("run")).unwrap();
            registry.set_alias("m", Alias::Candidate, "1").unwrap();
            registry.set_tag("m", "1", "rmse", "3.5").unwrap();
        }

        let reopened = LocalRegistry::open(dir.path()).unwrap();
        let candidate = reopened.version_by_alias("m", Alias::Candidate).unwrap().unwrap();
        assert_eq!(candidate.version, "1");
        assert_eq!(candidate.rmse().unwrap(), 3.5);
        assert_eq!(reopened.list_models(), vec!["m".to_string()]);
    }
}
