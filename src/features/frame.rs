//! Timestamp-indexed numeric frame

use chrono::NaiveDateTime;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};

use crate::error::{PipelineError, Result};

/// Table of observations indexed by trip timestamp
///
/// Values are stored row-major in an `Array2<f64>`; missing cells are NaN.
/// Frames are never mutated in place: operations that add or select data
/// return a new frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureFrame {
    /// Create a frame, checking that the shape matches index and columns
    pub fn new(index: Vec<NaiveDateTime>, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != index.len() || values.ncols() != columns.len() {
            return Err(PipelineError::DataError(format!(
                "frame shape {:?} does not match {} rows x {} columns",
                values.shape(),
                index.len(),
                columns.len()
            )));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PipelineError::DataError(format!("duplicate column: {}", name)));
            }
        }
        Ok(Self { index, columns, values })
    }

    /// Frame with the given columns and no rows
    pub fn empty(columns: Vec<String>) -> Self {
        let width = columns.len();
        Self {
            index: Vec::new(),
            columns,
            values: Array2::zeros((0, width)),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// View of a single column
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .column_position(name)
            .ok_or_else(|| PipelineError::FeatureNotFound(name.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Matrix of the named columns, in the order given
    ///
    /// Every name must exist; there is no default fill.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Array2<f64>> {
        let positions = names
            .iter()
            .map(|n| {
                self.column_position(n.as_ref())
                    .ok_or_else(|| PipelineError::FeatureNotFound(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.values.select(Axis(1), &positions))
    }

    /// New frame with `name` appended (or replaced if it already exists)
    pub fn with_column(&self, name: &str, column: Array1<f64>) -> Result<Self> {
        if column.len() != self.len() {
            return Err(PipelineError::DataError(format!(
                "column {} has {} values, frame has {} rows",
                name,
                column.len(),
                self.len()
            )));
        }

        if let Some(idx) = self.column_position(name) {
            let mut values = self.values.clone();
            values.column_mut(idx).assign(&column);
            return Ok(Self {
                index: self.index.clone(),
                columns: self.columns.clone(),
                values,
            });
        }

        let appended = column.insert_axis(Axis(1));
        let values = concatenate(Axis(1), &[self.values.view(), appended.view()])?;
        let mut columns = self.columns.clone();
        columns.push(name.to_string());
        Ok(Self {
            index: self.index.clone(),
            columns,
            values,
        })
    }

    /// New frame holding only the given rows, in the order given
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    /// Number of NaN cells across the whole frame
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn frame() -> FeatureFrame {
        FeatureFrame::new(
            vec![ts(0), ts(1), ts(2)],
            vec!["a".to_string(), "b".to_string()],
            array![[1.0, 10.0], [2.0, 20.0], [3.0, f64::NAN]],
        )
        .unwrap()
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = FeatureFrame::new(vec![ts(0)], vec!["a".to_string()], array![[1.0, 2.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let x = frame().select(&["b", "a"]).unwrap();
        assert_eq!(x[[0, 0]], 10.0);
        assert_eq!(x[[0, 1]], 1.0);
    }

    #[test]
    fn test_select_missing_column() {
        let err = frame().select(&["a", "c"]).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureNotFound(name) if name == "c"));
    }

    #[test]
    fn test_with_column_returns_new_frame() {
        let original = frame();
        let extended = original.with_column("p", array![0.5, 0.6, 0.7]).unwrap();
        assert_eq!(original.column_names().len(), 2);
        assert_eq!(extended.column_names().len(), 3);
        assert_eq!(extended.column("p").unwrap()[2], 0.7);
    }

    #[test]
    fn test_with_column_on_empty_frame() {
        let empty = FeatureFrame::empty(vec!["a".to_string()]);
        let extended = empty.with_column("p", Array1::zeros(0)).unwrap();
        assert!(extended.is_empty());
        assert!(extended.has_column("p"));
    }

    #[test]
    fn test_take_rows_and_missing() {
        let f = frame();
        assert_eq!(f.missing_count(), 1);
        let sub = f.take_rows(&[2, 0]);
        assert_eq!(sub.index()[0], ts(2));
        assert_eq!(sub.column("a").unwrap()[1], 1.0);
    }
}
