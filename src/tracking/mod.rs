//! Training run tracking
//!
//! Every training run leaves a `run.json` record next to its model artifact
//! under `<artifacts_dir>/<run_id>/`, holding the chosen hyperparameters,
//! the search summary and the train and test scores.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::training::{BoosterParams, Scores, SplitQuality};

/// File name of a run record inside its run directory
pub const RUN_FILE: &str = "run.json";

/// Everything logged for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Hyperparameters of the fitted model
    pub params: BoosterParams,
    pub n_trials: usize,
    pub cv_folds: usize,
    pub best_cv_rmse: f64,
    pub train_scores: Scores,
    pub test_scores: Scores,
    pub split: SplitQuality,
    /// Path of the saved model artifact
    pub artifact: String,
}

/// Local directory of run records, one subdirectory per run
#[derive(Debug, Clone)]
pub struct RunStore {
    base_dir: PathBuf,
}

impl RunStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id)
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(RUN_FILE)
    }

    /// Write `record`, replacing an earlier record of the same run
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        let dir = self.run_dir(&record.run_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(RUN_FILE);
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        debug!(run_id = %record.run_id, path = %path.display(), "Run record saved");
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<RunRecord> {
        read_record(&self.record_path(run_id))
    }

    /// All runs under the base directory, oldest first
    pub fn list(&self) -> Result<Vec<RunRecord>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path().join(RUN_FILE);
            if path.is_file() {
                records.push(read_record(&path)?);
            }
        }
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(records)
    }
}

fn read_record(path: &Path) -> Result<RunRecord> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| PipelineError::SerializationError(format!("run record {}: {}", path.display(), e)))
}
