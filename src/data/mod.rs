//! Observation sources
//!
//! Trips and weather are stored as yearly partitioned files; a source
//! resolves a date window to the merged hourly observations.

mod parquet;

pub use parquet::ParquetSource;

use chrono::NaiveDate;

use crate::error::{PipelineError, Result};
use crate::features::Observation;

/// Anything that can produce merged hourly observations for a date window
pub trait ObservationSource {
    /// Observations whose date lies in `[start, end]`, sorted by timestamp
    fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Observation>>;
}

/// Source backed by observations already in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    observations: Vec<Observation>,
}

impl InMemorySource {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

impl ObservationSource for InMemorySource {
    fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Observation>> {
        check_window(start, end)?;
        let mut selected: Vec<Observation> = self
            .observations
            .iter()
            .filter(|o| in_window(o, start, end))
            .cloned()
            .collect();
        selected.sort_by_key(|o| o.timestamp);
        Ok(selected)
    }
}

pub(crate) fn check_window(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(PipelineError::InvalidInput(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    Ok(())
}

pub(crate) fn in_window(obs: &Observation, start: NaiveDate, end: NaiveDate) -> bool {
    let date = obs.timestamp.date();
    date >= start && date <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Weather;

    fn obs(y: i32, m: u32, d: u32, h: u32) -> Observation {
        Observation {
            timestamp: NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap(),
            weather: Weather { tmax: 1.0, tmin: 0.0, snow: 0.0 },
            holiday: None,
            trips: Some(1.0),
        }
    }

    #[test]
    fn test_window_is_inclusive_and_sorted() {
        let source = InMemorySource::new(vec![
            obs(2025, 1, 3, 5),
            obs(2025, 1, 1, 0),
            obs(2025, 1, 3, 1),
            obs(2025, 1, 4, 0),
        ]);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let loaded = source.load(start, end).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_reversed_window_rejected() {
        let source = InMemorySource::default();
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(source.load(start, end), Err(PipelineError::InvalidInput(_))));
    }
}
