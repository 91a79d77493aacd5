//! Batch inference over feature frames
//!
//! Selects the model inputs from a frame in fit order, predicts in
//! parallel row batches and returns a new frame carrying the `prediction`
//! column.

use ndarray::{concatenate, s, Array1, Array2, Axis};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::features::{FeatureFrame, PREDICTION_COLUMN};

/// Anything that maps a feature matrix to one prediction per row
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

impl<T: Regressor + ?Sized> Regressor for Box<T> {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (**self).predict(x)
    }
}

/// Default rows per parallel batch
const DEFAULT_BATCH_SIZE: usize = 4096;

/// Runs a regressor over feature frames
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    batch_size: usize,
}

impl Default for InferenceRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceRunner {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Predict over `frame` using `categorical` then `numerical` columns
    ///
    /// Every named column must be present; the returned frame is `frame`
    /// with the prediction column appended.
    pub fn run<M, S>(&self, model: &M, frame: &FeatureFrame, categorical: &[S], numerical: &[S]) -> Result<FeatureFrame>
    where
        M: Regressor + ?Sized,
        S: AsRef<str>,
    {
        let columns: Vec<&str> = categorical
            .iter()
            .chain(numerical.iter())
            .map(|c| c.as_ref())
            .collect();
        let x = frame.select(&columns)?;

        let start = Instant::now();
        let predictions = self.predict_batched(model, &x)?;
        if predictions.len() != frame.len() {
            return Err(PipelineError::InferenceError(format!(
                "model returned {} predictions for {} rows",
                predictions.len(),
                frame.len()
            )));
        }

        info!(
            rows = frame.len(),
            features = columns.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Inference complete"
        );
        frame.with_column(PREDICTION_COLUMN, predictions)
    }

    fn predict_batched<M: Regressor + ?Sized>(&self, model: &M, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.nrows() <= self.batch_size {
            return model.predict(x);
        }

        let starts: Vec<usize> = (0..x.nrows()).step_by(self.batch_size).collect();
        debug!(batches = starts.len(), batch_size = self.batch_size, "Predicting in batches");

        let parts = starts
            .par_iter()
            .map(|&begin| {
                let end = (begin + self.batch_size).min(x.nrows());
                model.predict(&x.slice(s![begin..end, ..]).to_owned())
            })
            .collect::<Result<Vec<_>>>()?;

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(concatenate(Axis(0), &views)?)
    }
}
