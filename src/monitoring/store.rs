//! SQLite metrics store

use chrono::NaiveDateTime;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::drift::{DriftMetricRow, FieldKind, MetricValue, METRIC_FIELDS};
use crate::error::{PipelineError, Result};

/// Table holding one row per monitored week
pub const METRICS_TABLE: &str = "citibike_metrics";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persists drift metric rows
pub struct MetricsStore {
    connection: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore").field("path", &self.path).finish()
    }
}

impl MetricsStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        connection.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            connection: Connection::open_in_memory()?,
            path: None,
        })
    }

    /// Create the metrics table, or verify an existing one
    ///
    /// An existing table must have exactly the expected columns and types
    /// in order.
    pub fn ensure_table(&self) -> Result<()> {
        let existing = self.table_columns()?;
        if existing.is_empty() {
            self.connection.execute_batch(&create_table_sql())?;
            info!(table = METRICS_TABLE, columns = METRIC_FIELDS.len() + 1, "Created metrics table");
            return Ok(());
        }

        let expected = expected_columns();
        if existing != expected {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} has columns {:?}, expected {:?}",
                METRICS_TABLE,
                existing.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                expected.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )));
        }
        debug!(table = METRICS_TABLE, "Metrics table already present");
        Ok(())
    }

    fn table_columns(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .connection
            .prepare(&format!("PRAGMA table_info({})", METRICS_TABLE))?;
        let columns = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?.to_uppercase()))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Insert every row in one transaction
    ///
    /// A duplicate timestamp aborts the batch with `MetricsConflict`; no
    /// row of a failed batch is kept.
    pub fn insert_batch(&mut self, rows: &[DriftMetricRow]) -> Result<usize> {
        if rows.is_empty() {
            return Err(PipelineError::InvalidInput("empty metrics batch".to_string()));
        }
        for row in rows {
            check_row(row)?;
        }

        let sql = insert_sql();
        // dropped without commit on any early return, which rolls back
        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let timestamp = row.timestamp.format(TIMESTAMP_FORMAT).to_string();
                let values = std::iter::once(SqlValue::Text(timestamp.clone())).chain(row.values.iter().map(|v| {
                    match v {
                        MetricValue::Integer(i) => SqlValue::Integer(*i),
                        MetricValue::Real(r) if r.is_nan() => SqlValue::Null,
                        MetricValue::Real(r) => SqlValue::Real(*r),
                    }
                }));
                match stmt.execute(params_from_iter(values)) {
                    Ok(_) => {}
                    Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                        return Err(PipelineError::MetricsConflict(timestamp));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        tx.commit()?;

        info!(table = METRICS_TABLE, rows = rows.len(), "Metrics persisted");
        Ok(rows.len())
    }

    /// Row stored for `timestamp`, if any
    pub fn fetch(&self, timestamp: NaiveDateTime) -> Result<Option<DriftMetricRow>> {
        let sql = format!("{} WHERE timestamp = ?1", select_sql());
        let key = timestamp.format(TIMESTAMP_FORMAT).to_string();
        let row = self
            .connection
            .query_row(&sql, params![key], read_row)
            .optional()?;
        row.transpose()
    }

    /// All rows, ordered by timestamp
    pub fn fetch_all(&self) -> Result<Vec<DriftMetricRow>> {
        let sql = format!("{} ORDER BY timestamp", select_sql());
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }
}

fn expected_columns() -> Vec<(String, String)> {
    std::iter::once(("timestamp".to_string(), "TEXT".to_string()))
        .chain(
            METRIC_FIELDS
                .iter()
                .map(|f| (f.column.to_string(), f.kind.sql_type().to_string())),
        )
        .collect()
}

fn create_table_sql() -> String {
    let columns: Vec<String> = METRIC_FIELDS
        .iter()
        .map(|f| format!("{} {}", f.column, f.kind.sql_type()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (timestamp TEXT PRIMARY KEY, {});",
        METRICS_TABLE,
        columns.join(", ")
    )
}

fn column_list() -> String {
    std::iter::once("timestamp")
        .chain(METRIC_FIELDS.iter().map(|f| f.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql() -> String {
    let placeholders: Vec<String> = (1..=METRIC_FIELDS.len() + 1).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        METRICS_TABLE,
        column_list(),
        placeholders.join(", ")
    )
}

fn select_sql() -> String {
    format!("SELECT {} FROM {}", column_list(), METRICS_TABLE)
}

fn check_row(row: &DriftMetricRow) -> Result<()> {
    if row.values.len() != METRIC_FIELDS.len() {
        return Err(PipelineError::InvalidInput(format!(
            "metrics row has {} values, expected {}",
            row.values.len(),
            METRIC_FIELDS.len()
        )));
    }
    for (field, value) in METRIC_FIELDS.iter().zip(&row.values) {
        let matches = matches!(
            (field.kind, value),
            (FieldKind::Real, MetricValue::Real(_)) | (FieldKind::Integer, MetricValue::Integer(_))
        );
        if !matches {
            return Err(PipelineError::InvalidInput(format!(
                "metric {} expects {}",
                field.column,
                field.kind.sql_type()
            )));
        }
    }
    Ok(())
}

/// Decode a row; a malformed timestamp surfaces as the inner error
fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<DriftMetricRow>> {
    let raw: String = row.get(0)?;
    let mut values = Vec::with_capacity(METRIC_FIELDS.len());
    for (i, field) in METRIC_FIELDS.iter().enumerate() {
        values.push(match field.kind {
            // SQLite stores NaN as NULL
            FieldKind::Real => MetricValue::Real(row.get::<_, Option<f64>>(i + 1)?.unwrap_or(f64::NAN)),
            FieldKind::Integer => MetricValue::Integer(row.get(i + 1)?),
        });
    }

    Ok(NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map(|timestamp| DriftMetricRow { timestamp, values })
        .map_err(|e| PipelineError::StoreError(format!("bad timestamp {:?}: {}", raw, e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, seed: f64) -> DriftMetricRow {
        let values = METRIC_FIELDS
            .iter()
            .enumerate()
            .map(|(i, f)| match f.kind {
                FieldKind::Real => MetricValue::Real(seed + i as f64 * 0.5),
                FieldKind::Integer => MetricValue::Integer(i as i64),
            })
            .collect();
        DriftMetricRow {
            timestamp: NaiveDate::from_ymd_opt(2025, 1, day).unwrap().and_hms_opt(23, 0, 0).unwrap(),
            values,
        }
    }

    fn store() -> MetricsStore {
        let store = MetricsStore::open_in_memory().unwrap();
        store.ensure_table().unwrap();
        store
    }

    #[test]
    fn test_ensure_table_idempotent() {
        let store = store();
        store.ensure_table().unwrap();
        assert_eq!(store.table_columns().unwrap(), expected_columns());
    }

    #[test]
    fn test_round_trip() {
        let mut store = store();
        let rows = vec![row(5, 1.0), row(12, 2.0)];
        assert_eq!(store.insert_batch(&rows).unwrap(), 2);
        assert_eq!(store.fetch_all().unwrap(), rows);
        assert_eq!(store.fetch(rows[1].timestamp).unwrap(), Some(rows[1].clone()));
        assert_eq!(store.fetch(row(1, 0.0).timestamp).unwrap(), None);
    }

    #[test]
    fn test_duplicate_rolls_back_batch() {
        let mut store = store();
        store.insert_batch(&[row(5, 1.0)]).unwrap();

        let err = store.insert_batch(&[row(12, 2.0), row(5, 3.0)]).unwrap_err();
        assert!(matches!(err, PipelineError::MetricsConflict(_)));
        assert_eq!(store.fetch_all().unwrap(), vec![row(5, 1.0)]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let mut store = store();
        assert!(matches!(store.insert_batch(&[]), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_schema_mismatch() {
        let store = MetricsStore::open_in_memory().unwrap();
        store
            .connection
            .execute_batch("CREATE TABLE citibike_metrics (timestamp TEXT PRIMARY KEY, rmse REAL);")
            .unwrap();
        assert!(matches!(store.ensure_table(), Err(PipelineError::SchemaMismatch(_))));
    }

    #[test]
    fn test_nan_metric_stored_as_null() {
        let mut store = store();
        let mut sparse = row(5, 1.0);
        sparse.values[0] = MetricValue::Real(f64::NAN);
        store.insert_batch(&[sparse]).unwrap();

        let nulls: i64 = store
            .connection
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE {} IS NULL", METRICS_TABLE, METRIC_FIELDS[0].column),
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);

        let stored = store.fetch(row(5, 1.0).timestamp).unwrap().unwrap();
        assert!(stored.values[0].as_f64().is_nan());
        assert_eq!(stored.values[1..], row(5, 1.0).values[1..]);
    }

    #[test]
    fn test_wrong_value_kind_rejected() {
        let mut store = store();
        let mut bad = row(5, 1.0);
        bad.values[0] = MetricValue::Integer(1);
        assert!(matches!(store.insert_batch(&[bad]), Err(PipelineError::InvalidInput(_))));
        assert!(store.fetch_all().unwrap().is_empty());
    }
}
