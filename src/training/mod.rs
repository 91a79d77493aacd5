//! Model training
//!
//! Loads a labeled window, builds features, splits it, searches booster
//! hyperparameters with cross-validation, fits the final model, scores it
//! on the held-out split and hands it to the registry as the new
//! candidate before running the promotion decision.

mod booster;
mod search;
mod split;

pub use booster::{BoosterParams, GradientBoostedTrees};
pub use search::{HyperparameterSearch, SearchResult, SearchSpace, Trial};
pub use split::{k_fold, train_test_split, Fold};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TrainingParams;
use crate::data::ObservationSource;
use crate::drift::{ks_p_value, RegressionQuality};
use crate::error::{PipelineError, Result};
use crate::features::{model_columns, FeatureBuilder, FeatureFrame, HolidayCalendar, UsFederalHolidays, TARGET_COLUMN};
use crate::inference::Regressor;
use crate::promotion::{PromotionEngine, PromotionOutcome};
use crate::registry::{register_candidate, ModelRegistry};
use crate::tracking::{RunRecord, RunStore};

/// Held-out evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub r2: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
}

impl Scores {
    /// Metric map as registered on the candidate version
    pub fn to_metrics(&self) -> BTreeMap<String, f64> {
        [("r2", self.r2), ("mae", self.mae), ("mse", self.mse), ("rmse", self.rmse)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// Score `model` on the `features` of `frame` against `target`
pub fn score<M, S>(model: &M, frame: &FeatureFrame, features: &[S], target: &str) -> Result<Scores>
where
    M: Regressor + ?Sized,
    S: AsRef<str>,
{
    let x = frame.select(features)?;
    let y = frame.column(target)?.to_vec();
    let predicted = model.predict(&x)?.to_vec();
    let quality = RegressionQuality::compute(&y, &predicted)?;
    Ok(Scores {
        r2: quality.r2_score,
        mae: quality.mean_abs_error,
        mse: quality.rmse * quality.rmse,
        rmse: quality.rmse,
    })
}

/// Distribution comparison of the train and test splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitQuality {
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_missing: usize,
    pub test_missing: usize,
    /// Feature columns whose KS p-value falls below 0.05
    pub drifted_columns: Vec<String>,
}

/// Check that both splits look like samples of the same distribution
pub fn check_split<S: AsRef<str>>(train: &FeatureFrame, test: &FeatureFrame, columns: &[S]) -> Result<SplitQuality> {
    let mut drifted_columns = Vec::new();
    for column in columns {
        let name = column.as_ref();
        let p = ks_p_value(&train.column(name)?.to_vec(), &test.column(name)?.to_vec());
        if p < 0.05 {
            drifted_columns.push(name.to_string());
        }
    }
    Ok(SplitQuality {
        train_rows: train.len(),
        test_rows: test.len(),
        train_missing: train.missing_count(),
        test_missing: test.missing_count(),
        drifted_columns,
    })
}

/// Summary of one training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub run_id: String,
    pub model_name: String,
    pub version: String,
    pub artifact: String,
    /// Path of the run record
    pub record: PathBuf,
    pub scores: Scores,
    pub best_cv_rmse: f64,
    pub outcome: PromotionOutcome,
}

/// End-to-end training run against an injected source and registry
pub struct TrainingPipeline<'a, S, R, C = UsFederalHolidays>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
    C: HolidayCalendar,
{
    source: &'a S,
    registry: &'a mut R,
    builder: FeatureBuilder<C>,
    params: TrainingParams,
}

impl<'a, S, R> TrainingPipeline<'a, S, R, UsFederalHolidays>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
{
    pub fn new(source: &'a S, registry: &'a mut R, params: TrainingParams) -> Self {
        Self {
            source,
            registry,
            builder: FeatureBuilder::new(UsFederalHolidays::new()),
            params,
        }
    }
}

impl<'a, S, R, C> TrainingPipeline<'a, S, R, C>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
    C: HolidayCalendar,
{
    pub fn with_calendar<C2: HolidayCalendar>(self, calendar: C2) -> TrainingPipeline<'a, S, R, C2> {
        TrainingPipeline {
            source: self.source,
            registry: self.registry,
            builder: FeatureBuilder::new(calendar),
            params: self.params,
        }
    }

    pub fn run(self) -> Result<TrainingReport> {
        let Self {
            source,
            registry,
            builder,
            params,
        } = self;
        let started = Instant::now();
        let started_at = Utc::now();
        info!(
            start = %params.start_train_date,
            end = %params.end_train_date,
            model = %params.registered_model_name,
            "Starting training pipeline"
        );

        let observations = source.load(params.start_train_date, params.end_train_date)?;
        let frame = labeled_rows(&builder.build_frame(&observations)?)?;
        let (train, test) = train_test_split(&frame, params.test_size, params.shuffle, params.random_state)?;
        info!(train_rows = train.len(), test_rows = test.len(), "Split dataset");

        let columns = model_columns();
        let quality = check_split(&train, &test, &columns)?;
        if quality.drifted_columns.is_empty() {
            info!(train_missing = quality.train_missing, test_missing = quality.test_missing, "Split quality check passed");
        } else {
            warn!(columns = ?quality.drifted_columns, "Train and test splits differ");
        }

        let x_train = train.select(&columns)?;
        let y_train = train.column(TARGET_COLUMN)?.to_owned();
        let search = HyperparameterSearch::new(params.n_trials)
            .with_folds(params.cv_folds)
            .with_seed(params.random_state)
            .run(&x_train, &y_train)?;

        let mut model = GradientBoostedTrees::new(search.best.params.clone()).with_feature_names(columns.clone());
        model.fit(&x_train, &y_train)?;
        let train_scores = score(&model, &train, &columns, TARGET_COLUMN)?;
        let scores = score(&model, &test, &columns, TARGET_COLUMN)?;
        info!(
            train_rmse = train_scores.rmse,
            train_mae = train_scores.mae,
            train_r2 = train_scores.r2,
            rmse = scores.rmse,
            mae = scores.mae,
            r2 = scores.r2,
            "Model scored"
        );

        let run_id = Uuid::new_v4().to_string();
        let runs = RunStore::new(&params.artifacts_dir);
        let run_dir = runs.run_dir(&run_id);
        std::fs::create_dir_all(&run_dir)?;
        let artifact_path = run_dir.join("model.json");
        model.save_json(&artifact_path)?;
        let artifact = artifact_path.to_string_lossy().into_owned();

        let name = params.registered_model_name.as_str();
        let record = runs.save(&RunRecord {
            run_id: run_id.clone(),
            model_name: name.to_string(),
            started_at,
            finished_at: Utc::now(),
            start_date: params.start_train_date,
            end_date: params.end_train_date,
            params: search.best.params.clone(),
            n_trials: params.n_trials,
            cv_folds: params.cv_folds,
            best_cv_rmse: search.best.cv_rmse,
            train_scores,
            test_scores: scores,
            split: quality,
            artifact: artifact.clone(),
        })?;
        info!(run_id = %run_id, record = %record.display(), "Run tracked");

        let candidate = register_candidate(&mut *registry, name, &artifact, Some(&run_id), &scores.to_metrics())?;
        let outcome = PromotionEngine::new(&mut *registry).promote(name)?;

        if outcome.is_promoted() {
            info!(model = name, version = %candidate.version, "Training finished, new champion deployed");
        } else {
            info!(model = name, version = %candidate.version, "Training finished, champion unchanged");
        }
        info!(elapsed_secs = started.elapsed().as_secs_f64(), "Training pipeline complete");

        Ok(TrainingReport {
            run_id,
            model_name: name.to_string(),
            version: candidate.version,
            artifact,
            record,
            scores,
            best_cv_rmse: search.best.cv_rmse,
            outcome,
        })
    }
}

/// Rows carrying a target value
fn labeled_rows(frame: &FeatureFrame) -> Result<FeatureFrame> {
    let target = frame.column(TARGET_COLUMN).map_err(|_| {
        PipelineError::DataError("training window has no labeled observations".to_string())
    })?;
    let rows: Vec<usize> = target
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i)
        .collect();
    Ok(frame.take_rows(&rows))
}
