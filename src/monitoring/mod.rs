//! Monitoring persistence
//!
//! Weekly drift and quality metrics land in the `citibike_metrics` table
//! of a SQLite database. The table layout is generated from
//! [`crate::drift::METRIC_FIELDS`].

mod store;

pub use store::{MetricsStore, METRICS_TABLE};
