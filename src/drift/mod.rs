//! Weekly drift and quality metrics
//!
//! Splits the comparison frame into ISO-week buckets, runs a
//! [`ComparisonBattery`] for every non-empty bucket against the full
//! reference frame and flattens each report into a [`DriftMetricRow`]
//! following [`METRIC_FIELDS`].

mod battery;
mod fields;
mod stats;

pub use battery::{ComparisonBattery, DriftBattery};
pub use fields::{extract_row, field_position, FieldKind, MetricField, METRIC_FIELDS};
pub use stats::{chi_square_p_value, ks_p_value, RegressionQuality, SegmentStats, Underperformance};

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::features::{FeatureFrame, CATEGORICAL_COLUMNS, NUMERICAL_COLUMNS, PREDICTION_COLUMN, TARGET_COLUMN};

/// Number of weekly buckets
pub const WEEK_BUCKETS: usize = 52;

/// Bucket of a timestamp: ISO week minus one, week 53 folded into 51
pub fn week_bucket(timestamp: &NaiveDateTime) -> usize {
    let week = timestamp.iso_week().week() as usize;
    week.min(WEEK_BUCKETS) - 1
}

/// Roles of the frame columns in the comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub target: String,
    pub prediction: String,
    pub categorical: Vec<String>,
    pub numerical: Vec<String>,
}

impl ColumnMapping {
    pub fn new(
        target: impl Into<String>,
        prediction: impl Into<String>,
        categorical: Vec<String>,
        numerical: Vec<String>,
    ) -> Self {
        Self {
            target: target.into(),
            prediction: prediction.into(),
            categorical,
            numerical,
        }
    }

    /// Columns checked for dataset drift: target, prediction, then features
    pub fn drift_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for name in [self.target.as_str(), self.prediction.as_str()]
            .into_iter()
            .chain(self.categorical.iter().map(String::as_str))
            .chain(self.numerical.iter().map(String::as_str))
        {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
        columns
    }

    pub fn is_categorical(&self, column: &str) -> bool {
        self.categorical.iter().any(|c| c == column)
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::new(
            TARGET_COLUMN,
            PREDICTION_COLUMN,
            CATEGORICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            NUMERICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
        )
    }
}

/// Scalar stored in a metrics column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Real(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(v) => *v as f64,
            MetricValue::Real(v) => *v,
        }
    }
}

/// One weekly metrics row; `values` follows [`METRIC_FIELDS`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetricRow {
    pub timestamp: NaiveDateTime,
    pub values: Vec<MetricValue>,
}

impl DriftMetricRow {
    /// Value of a named metric column
    pub fn get(&self, column: &str) -> Option<MetricValue> {
        field_position(column).and_then(|i| self.values.get(i).copied())
    }
}

/// Computes weekly metric rows for a comparison window
#[derive(Debug, Clone)]
pub struct DriftMetricsEngine<B: ComparisonBattery = DriftBattery> {
    battery: B,
    mapping: ColumnMapping,
}

impl DriftMetricsEngine<DriftBattery> {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self::with_battery(DriftBattery::default(), mapping)
    }
}

impl<B: ComparisonBattery> DriftMetricsEngine<B> {
    pub fn with_battery(battery: B, mapping: ColumnMapping) -> Self {
        Self { battery, mapping }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// One row per non-empty week bucket, ascending by bucket
    ///
    /// Each row's timestamp is the last index value of its bucket in frame
    /// order. Any bucket whose report lacks a field fails the whole run.
    pub fn compute(&self, reference: &FeatureFrame, comparison: &FeatureFrame) -> Result<Vec<DriftMetricRow>> {
        if comparison.is_empty() {
            info!("Comparison frame is empty, no metrics computed");
            return Ok(Vec::new());
        }
        if reference.is_empty() {
            return Err(PipelineError::InvalidInput(
                "reference frame is empty".to_string(),
            ));
        }

        let start = Instant::now();
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); WEEK_BUCKETS];
        for (row, ts) in comparison.index().iter().enumerate() {
            buckets[week_bucket(ts)].push(row);
        }

        let mut rows = Vec::new();
        for (bucket, members) in buckets.iter().enumerate() {
            let Some(&last) = members.last() else {
                continue;
            };
            let current = comparison.take_rows(members);
            let report = self.battery.run(reference, &current, &self.mapping)?;
            let row = extract_row(&report, comparison.index()[last])?;
            debug!(bucket, rows = members.len(), timestamp = %row.timestamp, "Bucket evaluated");
            rows.push(row);
        }

        info!(
            buckets = rows.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Drift metrics computed"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_week_bucket() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(week_bucket(&day(2025, 1, 1)), 0);
        // 2020-12-31 is ISO week 53
        assert_eq!(week_bucket(&day(2020, 12, 31)), 51);
        assert_eq!(week_bucket(&day(2025, 12, 22)), 51);
    }

    #[test]
    fn test_drift_columns_dedup() {
        let mapping = ColumnMapping::new("y", "p", vec!["a".into()], vec!["a".into(), "b".into()]);
        assert_eq!(mapping.drift_columns(), vec!["y", "p", "a", "b"]);
    }

    #[test]
    fn test_default_mapping() {
        let mapping = ColumnMapping::default();
        assert!(mapping.is_categorical("holiday"));
        assert_eq!(mapping.drift_columns().len(), 2 + 1 + 10);
    }

    #[test]
    fn test_row_lookup() {
        let mut values = vec![MetricValue::Real(0.0); METRIC_FIELDS.len()];
        values[1] = MetricValue::Integer(3);
        let row = DriftMetricRow {
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            values,
        };
        assert_eq!(row.get("num_drifted_columns"), Some(MetricValue::Integer(3)));
        assert_eq!(row.get("unknown"), None);
    }
}
