//! Check battery comparing one bucket against the reference frame

use serde_json::{json, Value};
use tracing::debug;

use super::stats::{chi_square_p_value, ks_p_value, missing_share, RegressionQuality};
use super::ColumnMapping;
use crate::error::Result;
use crate::features::FeatureFrame;

/// Produces a nested report for a reference/current frame pair
///
/// The drift engine only depends on the report shape addressed by
/// [`super::fields::METRIC_FIELDS`].
pub trait ComparisonBattery {
    fn run(&self, reference: &FeatureFrame, current: &FeatureFrame, mapping: &ColumnMapping) -> Result<Value>;
}

/// Column drift, dataset drift, missing values and regression quality
#[derive(Debug, Clone)]
pub struct DriftBattery {
    /// p-value below which a column counts as drifted
    threshold: f64,
    /// Share of drifted columns at which the dataset counts as drifted
    drift_share: f64,
}

impl Default for DriftBattery {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            drift_share: 0.5,
        }
    }
}

impl DriftBattery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_drift_share(mut self, drift_share: f64) -> Self {
        self.drift_share = drift_share;
        self
    }

    fn column_drift(&self, reference: &[f64], current: &[f64], categorical: bool) -> Result<(f64, &'static str)> {
        if categorical {
            Ok((chi_square_p_value(reference, current)?, "chi-square p_value"))
        } else {
            Ok((ks_p_value(reference, current), "K-S p_value"))
        }
    }
}

fn column(frame: &FeatureFrame, name: &str) -> Result<Vec<f64>> {
    Ok(frame.column(name)?.to_vec())
}

impl ComparisonBattery for DriftBattery {
    fn run(&self, reference: &FeatureFrame, current: &FeatureFrame, mapping: &ColumnMapping) -> Result<Value> {
        let columns = mapping.drift_columns();
        let ref_columns = columns
            .iter()
            .map(|c| column(reference, c))
            .collect::<Result<Vec<_>>>()?;
        let cur_columns = columns
            .iter()
            .map(|c| column(current, c))
            .collect::<Result<Vec<_>>>()?;

        let ref_target = column(reference, &mapping.target)?;
        let ref_pred = column(reference, &mapping.prediction)?;
        let cur_target = column(current, &mapping.target)?;
        let cur_pred = column(current, &mapping.prediction)?;

        let (drift_score, stattest) = self.column_drift(&ref_pred, &cur_pred, false)?;

        // dataset drift
        let mut drifted = 0usize;
        let mut drift_by_columns = serde_json::Map::new();
        for (i, name) in columns.iter().enumerate() {
            let categorical = mapping.is_categorical(name);
            let (score, test) = self.column_drift(&ref_columns[i], &cur_columns[i], categorical)?;
            let detected = score < self.threshold;
            if detected {
                drifted += 1;
            }
            drift_by_columns.insert(
                name.to_string(),
                json!({
                    "column_type": if categorical { "cat" } else { "num" },
                    "stattest_name": test,
                    "drift_score": score,
                    "drift_detected": detected,
                }),
            );
        }
        let share = drifted as f64 / columns.len() as f64;
        debug!(rows = current.len(), drifted, share, "Dataset drift evaluated");

        let ref_quality = RegressionQuality::compute(&ref_target, &ref_pred)?;
        let cur_quality = RegressionQuality::compute(&cur_target, &cur_pred)?;

        Ok(json!({
            "metrics": [
                {
                    "metric": "ColumnDriftMetric",
                    "result": {
                        "column_name": mapping.prediction,
                        "column_type": "num",
                        "stattest_name": stattest,
                        "stattest_threshold": self.threshold,
                        "drift_score": drift_score,
                        "drift_detected": drift_score < self.threshold,
                    }
                },
                {
                    "metric": "DatasetDriftMetric",
                    "result": {
                        "drift_share": self.drift_share,
                        "number_of_columns": columns.len(),
                        "number_of_drifted_columns": drifted,
                        "share_of_drifted_columns": share,
                        "dataset_drift": share >= self.drift_share,
                        "drift_by_columns": drift_by_columns,
                    }
                },
                {
                    "metric": "DatasetMissingValuesMetric",
                    "result": {
                        "reference": { "share_of_missing_values": missing_share(&ref_columns) },
                        "current": { "share_of_missing_values": missing_share(&cur_columns) },
                    }
                },
                {
                    "metric": "RegressionQualityMetric",
                    "result": {
                        "reference": ref_quality,
                        "current": cur_quality,
                    }
                }
            ]
        }))
    }
}
