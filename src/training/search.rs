//! Seeded random hyperparameter search with K-fold cross-validation

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::booster::{BoosterParams, GradientBoostedTrees};
use super::split::k_fold;
use crate::error::{PipelineError, Result};
use crate::inference::Regressor;

/// Bounds of the sampled hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub n_estimators: (usize, usize),
    pub max_depth: (usize, usize),
    /// Sampled log-uniformly
    pub learning_rate: (f64, f64),
    pub subsample: (f64, f64),
    pub colsample_bytree: (f64, f64),
    pub reg_lambda: (f64, f64),
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: (50, 300),
            max_depth: (3, 12),
            learning_rate: (1e-3, 0.3),
            subsample: (0.5, 1.0),
            colsample_bytree: (0.5, 1.0),
            reg_lambda: (0.0, 1.0),
        }
    }
}

impl SearchSpace {
    fn sample(&self, rng: &mut ChaCha8Rng, seed: u64) -> BoosterParams {
        let (lr_lo, lr_hi) = (self.learning_rate.0.ln(), self.learning_rate.1.ln());
        BoosterParams {
            n_estimators: rng.gen_range(self.n_estimators.0..=self.n_estimators.1),
            max_depth: rng.gen_range(self.max_depth.0..=self.max_depth.1),
            learning_rate: rng.gen_range(lr_lo..=lr_hi).exp(),
            subsample: rng.gen_range(self.subsample.0..=self.subsample.1),
            colsample_bytree: rng.gen_range(self.colsample_bytree.0..=self.colsample_bytree.1),
            reg_lambda: rng.gen_range(self.reg_lambda.0..=self.reg_lambda.1),
            seed,
            ..BoosterParams::default()
        }
    }
}

/// One evaluated parameter set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub number: usize,
    pub params: BoosterParams,
    /// Mean validation RMSE across folds
    pub cv_rmse: f64,
}

/// Outcome of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best: Trial,
    pub trials: Vec<Trial>,
}

/// Random search minimizing K-fold CV RMSE
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    space: SearchSpace,
    n_trials: usize,
    n_folds: usize,
    seed: u64,
}

impl Default for HyperparameterSearch {
    fn default() -> Self {
        Self {
            space: SearchSpace::default(),
            n_trials: 10,
            n_folds: 3,
            seed: 42,
        }
    }
}

impl HyperparameterSearch {
    pub fn new(n_trials: usize) -> Self {
        Self {
            n_trials,
            ..Self::default()
        }
    }

    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Draw every trial's parameters up front so results do not depend on
    /// evaluation order
    pub fn candidates(&self) -> Vec<BoosterParams> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        (0..self.n_trials)
            .map(|i| self.space.sample(&mut rng, self.seed.wrapping_add(i as u64)))
            .collect()
    }

    pub fn run(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        if self.n_trials == 0 {
            return Err(PipelineError::TrainingError("n_trials must be positive".to_string()));
        }
        let folds = k_fold(x.nrows(), self.n_folds, self.seed)?;
        let start = Instant::now();

        let trials = self
            .candidates()
            .into_par_iter()
            .enumerate()
            .map(|(number, params)| {
                let mut total = 0.0;
                for fold in &folds {
                    let mut model = GradientBoostedTrees::new(params.clone());
                    model.fit(&x.select(Axis(0), &fold.train), &y.select(Axis(0), &fold.train))?;
                    let predicted = model.predict(&x.select(Axis(0), &fold.validation))?;
                    total += rmse(&y.select(Axis(0), &fold.validation), &predicted);
                }
                let cv_rmse = total / folds.len() as f64;
                debug!(trial = number, cv_rmse, "Trial complete");
                Ok(Trial {
                    number,
                    params,
                    cv_rmse,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let best = trials
            .iter()
            .min_by(|a, b| a.cv_rmse.total_cmp(&b.cv_rmse))
            .cloned()
            .ok_or_else(|| PipelineError::TrainingError("no trials evaluated".to_string()))?;

        info!(
            trials = trials.len(),
            best_trial = best.number,
            best_cv_rmse = best.cv_rmse,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Hyperparameter search complete"
        );
        Ok(SearchResult { best, trials })
    }
}

pub(crate) fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let n = actual.len().max(1) as f64;
    (actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}
