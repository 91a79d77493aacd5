//! Declarative mapping from metrics-table columns to report locations
//!
//! Each entry names a column of `citibike_metrics`, its SQL type and the
//! JSON pointer of the scalar inside a battery report. Adding a metric is
//! one new line here; the store DDL and row extraction follow the table.

use chrono::NaiveDateTime;
use serde_json::Value;

use super::{DriftMetricRow, MetricValue};
use crate::error::{PipelineError, Result};

/// Storage type of a metric column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Real,
    Integer,
}

impl FieldKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Real => "REAL",
            FieldKind::Integer => "INTEGER",
        }
    }
}

/// One metric column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricField {
    pub column: &'static str,
    pub kind: FieldKind,
    pub pointer: &'static str,
}

const fn real(column: &'static str, pointer: &'static str) -> MetricField {
    MetricField {
        column,
        kind: FieldKind::Real,
        pointer,
    }
}

const fn integer(column: &'static str, pointer: &'static str) -> MetricField {
    MetricField {
        column,
        kind: FieldKind::Integer,
        pointer,
    }
}

/// Every persisted metric, in column order
pub const METRIC_FIELDS: [MetricField; 27] = [
    real("prediction_drift", "/metrics/0/result/drift_score"),
    integer("num_drifted_columns", "/metrics/1/result/number_of_drifted_columns"),
    real("share_missing_values", "/metrics/2/result/current/share_of_missing_values"),
    real("reference_r2_score", "/metrics/3/result/reference/r2_score"),
    real("reference_rmse", "/metrics/3/result/reference/rmse"),
    real("reference_mean_error", "/metrics/3/result/reference/mean_error"),
    real("reference_mean_abs_error", "/metrics/3/result/reference/mean_abs_error"),
    real("reference_mean_abs_perc_error", "/metrics/3/result/reference/mean_abs_perc_error"),
    real("reference_abs_error_max", "/metrics/3/result/reference/abs_error_max"),
    real("reference_majority_mean_error", "/metrics/3/result/reference/underperformance/majority/mean_error"),
    real("reference_underestimation_mean_error", "/metrics/3/result/reference/underperformance/underestimation/mean_error"),
    real("reference_overestimation_mean_error", "/metrics/3/result/reference/underperformance/overestimation/mean_error"),
    real("reference_majority_std_error", "/metrics/3/result/reference/underperformance/majority/std_error"),
    real("reference_underestimation_std_error", "/metrics/3/result/reference/underperformance/underestimation/std_error"),
    real("reference_overestimation_std_error", "/metrics/3/result/reference/underperformance/overestimation/std_error"),
    real("current_r2_score", "/metrics/3/result/current/r2_score"),
    real("current_rmse", "/metrics/3/result/current/rmse"),
    real("current_mean_error", "/metrics/3/result/current/mean_error"),
    real("current_mean_abs_error", "/metrics/3/result/current/mean_abs_error"),
    real("current_mean_abs_perc_error", "/metrics/3/result/current/mean_abs_perc_error"),
    real("current_abs_error_max", "/metrics/3/result/current/abs_error_max"),
    real("current_majority_mean_error", "/metrics/3/result/current/underperformance/majority/mean_error"),
    real("current_underestimation_mean_error", "/metrics/3/result/current/underperformance/underestimation/mean_error"),
    real("current_overestimation_mean_error", "/metrics/3/result/current/underperformance/overestimation/mean_error"),
    real("current_majority_std_error", "/metrics/3/result/current/underperformance/majority/std_error"),
    real("current_underestimation_std_error", "/metrics/3/result/current/underperformance/underestimation/std_error"),
    real("current_overestimation_std_error", "/metrics/3/result/current/underperformance/overestimation/std_error"),
];

/// Position of a column in [`METRIC_FIELDS`]
pub fn field_position(column: &str) -> Option<usize> {
    METRIC_FIELDS.iter().position(|f| f.column == column)
}

/// Pull every field out of `report`; any absent or mistyped value fails
///
/// A `null` at a real-valued location reads as NaN, which the store keeps
/// as SQL NULL.
pub fn extract_row(report: &Value, timestamp: NaiveDateTime) -> Result<DriftMetricRow> {
    let values = METRIC_FIELDS
        .iter()
        .map(|field| extract(report, field))
        .collect::<Result<Vec<_>>>()?;
    Ok(DriftMetricRow { timestamp, values })
}

fn extract(report: &Value, field: &MetricField) -> Result<MetricValue> {
    let missing = || PipelineError::MissingMetric {
        field: field.column.to_string(),
        path: field.pointer.to_string(),
    };
    let value = report.pointer(field.pointer).ok_or_else(missing)?;
    match field.kind {
        // serde_json writes non-finite floats as null
        FieldKind::Real if value.is_null() => Ok(MetricValue::Real(f64::NAN)),
        FieldKind::Real => value.as_f64().map(MetricValue::Real).ok_or_else(missing),
        FieldKind::Integer => value.as_i64().map(MetricValue::Integer).ok_or_else(missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap().and_hms_opt(23, 0, 0).unwrap()
    }

    #[test]
    fn test_columns_unique() {
        for (i, field) in METRIC_FIELDS.iter().enumerate() {
            assert_eq!(field_position(field.column), Some(i));
        }
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let report = json!({ "metrics": [] });
        let err = extract_row(&report, ts()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingMetric { ref field, .. } if field == "prediction_drift"));
    }

    #[test]
    fn test_wrong_type_is_fatal() {
        let field = METRIC_FIELDS[1];
        let report = json!({ "metrics": [{}, { "result": { "number_of_drifted_columns": 2.5 } }] });
        assert!(extract(&report, &field).is_err());

        let report = json!({ "metrics": [{}, { "result": { "number_of_drifted_columns": 2 } }] });
        assert_eq!(extract(&report, &field).unwrap(), MetricValue::Integer(2));
    }

    #[test]
    fn test_non_finite_real_reads_as_nan() {
        // serialized from f64::INFINITY
        let report = json!({ "metrics": [{ "result": { "drift_score": f64::INFINITY } }] });
        assert!(report["metrics"][0]["result"]["drift_score"].is_null());
        assert!(extract(&report, &METRIC_FIELDS[0]).unwrap().as_f64().is_nan());

        let report = json!({ "metrics": [{}, { "result": { "number_of_drifted_columns": null } }] });
        assert!(matches!(
            extract(&report, &METRIC_FIELDS[1]),
            Err(PipelineError::MissingMetric { .. })
        ));
    }
}
