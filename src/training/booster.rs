//! Gradient-boosted regression trees
//!
//! Squared-error boosting with row and column subsampling and an L2
//! penalty on leaf weights. Trees are stored as flat node arenas so the
//! whole model serializes to a single JSON artifact.

use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::inference::Regressor;

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Row sampling ratio per tree
    pub subsample: f64,
    /// Column sampling ratio per tree
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        let ratio_ok = |r: f64| r > 0.0 && r <= 1.0;
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(PipelineError::TrainingError(
                "n_estimators and max_depth must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) || !ratio_ok(self.subsample) || !ratio_ok(self.colsample_bytree) {
            return Err(PipelineError::TrainingError(format!(
                "invalid sampling parameters: learning_rate={}, subsample={}, colsample_bytree={}",
                self.learning_rate, self.subsample, self.colsample_bytree
            )));
        }
        if self.reg_lambda < 0.0 {
            return Err(PipelineError::TrainingError("reg_lambda must be >= 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree over absolute feature indices
///
/// Missing values (NaN) always follow the right branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    residuals: &'a [f64],
    features: &'a [usize],
    max_depth: usize,
    min_samples_leaf: usize,
    reg_lambda: f64,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

/// Best split of one feature: (feature, threshold, gain)
type SplitCandidate = (usize, f64, f64);

impl<'a> TreeBuilder<'a> {
    fn leaf_value(&self, sum: f64, count: usize) -> f64 {
        sum / (count as f64 + self.reg_lambda)
    }

    fn score(&self, sum: f64, count: usize) -> f64 {
        sum * sum / (count as f64 + self.reg_lambda)
    }

    fn build(&mut self, rows: &[usize], depth: usize) -> usize {
        let sum: f64 = rows.iter().map(|&r| self.residuals[r]).sum();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(sum, rows.len()),
        });

        if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf.max(1) {
            return id;
        }
        let Some((feature, threshold, gain)) = self.best_split(rows, sum) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| self.x[[r, feature]] <= threshold);
        self.importances[feature] += gain;

        let left = self.build(&left_rows, depth + 1);
        let right = self.build(&right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, rows: &[usize], total: f64) -> Option<SplitCandidate> {
        let parent = self.score(total, rows.len());

        self.features
            .par_iter()
            .filter_map(|&feature| {
                let mut sorted: Vec<(f64, f64)> = rows
                    .iter()
                    .map(|&r| (self.x[[r, feature]], self.residuals[r]))
                    .collect();
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<SplitCandidate> = None;
                let mut left_sum = 0.0;
                for i in 0..sorted.len() - 1 {
                    left_sum += sorted[i].1;
                    let (value, next) = (sorted[i].0, sorted[i + 1].0);
                    if value.is_nan() {
                        break;
                    }
                    if value == next {
                        continue;
                    }
                    let left_count = i + 1;
                    let right_count = sorted.len() - left_count;
                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }
                    let gain = self.score(left_sum, left_count) + self.score(total - left_sum, right_count) - parent;
                    if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                        let threshold = if next.is_nan() { value } else { (value + next) / 2.0 };
                        best = Some((feature, threshold, gain));
                    }
                }
                best
            })
            .max_by(|a, b| a.2.total_cmp(&b.2).then(b.0.cmp(&a.0)))
    }
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Gradient-boosted tree regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoosterParams,
    base_score: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
    /// Input column names in fit order, when known
    #[serde(default)]
    feature_names: Vec<String>,
}

impl GradientBoostedTrees {
    pub fn new(params: BoosterParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            n_features: 0,
            trees: Vec::new(),
            feature_importances: Vec::new(),
            feature_names: Vec::new(),
        }
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Normalized split gain per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.params.validate()?;
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::TrainingError("empty training matrix".to_string()));
        }
        if y.len() != n_samples {
            return Err(PipelineError::TrainingError(format!(
                "{} rows but {} targets",
                n_samples,
                y.len()
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::TrainingError("target contains missing values".to_string()));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != n_features {
            return Err(PipelineError::TrainingError(format!(
                "{} feature names for {} columns",
                self.feature_names.len(),
                n_features
            )));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.seed);
        self.base_score = y.mean().unwrap_or(0.0);
        self.n_features = n_features;
        self.trees.clear();
        let mut importances = vec![0.0; n_features];
        let mut predictions = Array1::from_elem(n_samples, self.base_score);

        for round in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(predictions.iter()).map(|(t, p)| t - p).collect();
            let rows = sample(n_samples, self.params.subsample, &mut rng);
            let features = sample(n_features, self.params.colsample_bytree, &mut rng);

            let mut builder = TreeBuilder {
                x,
                residuals: &residuals,
                features: &features,
                max_depth: self.params.max_depth,
                min_samples_leaf: self.params.min_samples_leaf,
                reg_lambda: self.params.reg_lambda,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.build(&rows, 0);
            for (total, gain) in importances.iter_mut().zip(&builder.importances) {
                *total += gain;
            }
            let tree = RegressionTree { nodes: builder.nodes };

            for (i, row) in x.outer_iter().enumerate() {
                predictions[i] += self.params.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);

            if round % 50 == 0 {
                debug!(round, "Boosting round complete");
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = importances;
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::InferenceError(format!("cannot open model {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

fn sample(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if ratio < 1.0 {
        let size = ((n as f64) * ratio).ceil().max(1.0) as usize;
        indices.shuffle(rng);
        indices.truncate(size);
        indices.sort_unstable();
    }
    indices
}

impl Regressor for GradientBoostedTrees {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::InferenceError("model is not fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::InferenceError(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.base_score
                    + self.params.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}
