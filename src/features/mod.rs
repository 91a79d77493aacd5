//! Feature engineering for the demand model
//!
//! Turns raw hourly observations (timestamp + weather + optional holiday
//! flag and trip count) into the model's feature layout. The same code
//! path serves batch preprocessing and single requests, so a timestamp
//! always encodes to identical floating-point values.

mod cyclic;
mod frame;
mod holidays;

pub use cyclic::{CyclicFeatures, CYCLIC_COLUMNS, HOUR_PERIOD, MONTH_PERIOD, WEEKDAY_PERIOD, WEEK_PERIOD};
pub use frame::FeatureFrame;
pub use holidays::{HolidayCalendar, UsFederalHolidays};

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Target column: hourly trip count
pub const TARGET_COLUMN: &str = "trips";
/// Column appended by the inference runner
pub const PREDICTION_COLUMN: &str = "prediction";
/// Categorical model inputs
pub const CATEGORICAL_COLUMNS: [&str; 1] = ["holiday"];
/// Numerical model inputs
pub const NUMERICAL_COLUMNS: [&str; 10] = [
    "TMAX",
    "TMIN",
    "hr_sin",
    "hr_cos",
    "weekday_sin",
    "weekday_cos",
    "week_sin",
    "week_cos",
    "mnth_sin",
    "mnth_cos",
];

/// Columns every built frame carries, in order
pub const FRAME_COLUMNS: [&str; 12] = [
    "holiday",
    "TMAX",
    "TMIN",
    "SNOW",
    "hr_sin",
    "hr_cos",
    "weekday_sin",
    "weekday_cos",
    "week_sin",
    "week_cos",
    "mnth_sin",
    "mnth_cos",
];

/// Categorical then numerical model inputs, the order the model was fit on
pub fn model_columns() -> Vec<String> {
    CATEGORICAL_COLUMNS
        .iter()
        .chain(NUMERICAL_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect()
}

/// Daily weather scalars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    #[serde(rename = "TMAX")]
    pub tmax: f64,
    #[serde(rename = "TMIN")]
    pub tmin: f64,
    #[serde(rename = "SNOW")]
    pub snow: f64,
}

/// One raw hourly observation
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub weather: Weather,
    /// Holiday flag supplied by the source, if any
    pub holiday: Option<i64>,
    /// Trip count, absent for unlabeled data
    pub trips: Option<f64>,
}

/// Fully engineered model input for one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub holiday: i64,
    #[serde(flatten)]
    pub weather: Weather,
    #[serde(flatten)]
    pub cyclic: CyclicFeatures,
}

impl FeatureRecord {
    /// Values in [`FRAME_COLUMNS`] order
    pub fn values(&self) -> [f64; 12] {
        let c = self.cyclic.values();
        [
            self.holiday as f64,
            self.weather.tmax,
            self.weather.tmin,
            self.weather.snow,
            c[0],
            c[1],
            c[2],
            c[3],
            c[4],
            c[5],
            c[6],
            c[7],
        ]
    }
}

/// Builds feature records and frames against a holiday calendar
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder<C: HolidayCalendar> {
    calendar: C,
}

impl<C: HolidayCalendar> FeatureBuilder<C> {
    pub fn new(calendar: C) -> Self {
        Self { calendar }
    }

    /// Single-instance path
    ///
    /// A holiday flag supplied by the caller wins over the calendar.
    pub fn build_record(&self, timestamp: NaiveDateTime, weather: Weather, holiday: Option<i64>) -> FeatureRecord {
        let holiday = holiday.unwrap_or_else(|| i64::from(self.calendar.is_holiday(timestamp.date())));
        FeatureRecord {
            holiday,
            weather,
            cyclic: CyclicFeatures::from_datetime(&timestamp),
        }
    }

    /// Batch path: one row per observation, in input order
    ///
    /// The target column is added when any observation carries a trip
    /// count; unlabeled rows get NaN.
    pub fn build_frame(&self, observations: &[Observation]) -> Result<FeatureFrame> {
        let labeled = observations.iter().any(|o| o.trips.is_some());
        let mut columns: Vec<String> = FRAME_COLUMNS.iter().map(|c| c.to_string()).collect();
        if labeled {
            columns.push(TARGET_COLUMN.to_string());
        }

        let width = columns.len();
        let mut values = Array2::<f64>::zeros((observations.len(), width));
        for (row, obs) in observations.iter().enumerate() {
            let record = self.build_record(obs.timestamp, obs.weather, obs.holiday);
            for (col, v) in record.values().iter().enumerate() {
                values[[row, col]] = *v;
            }
            if labeled {
                values[[row, width - 1]] = obs.trips.unwrap_or(f64::NAN);
            }
        }

        let index = observations.iter().map(|o| o.timestamp).collect();
        FeatureFrame::new(index, columns, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn weather() -> Weather {
        Weather { tmax: 28.0, tmin: 17.0, snow: 0.0 }
    }

    fn hourly(start: NaiveDateTime, n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation {
                timestamp: start + Duration::hours(i as i64 * 7),
                weather: weather(),
                holiday: None,
                trips: Some(i as f64),
            })
            .collect()
    }

    #[test]
    fn test_batch_and_single_paths_match_bit_for_bit() {
        let builder = FeatureBuilder::new(UsFederalHolidays::new());
        let start = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap().and_hms_opt(3, 0, 0).unwrap();
        let observations = hourly(start, 200);
        let frame = builder.build_frame(&observations).unwrap();

        for (row, obs) in observations.iter().enumerate() {
            let record = builder.build_record(obs.timestamp, obs.weather, None);
            for (col, expected) in record.values().iter().enumerate() {
                let actual = frame.values()[[row, col]];
                assert_eq!(actual.to_bits(), expected.to_bits(), "row {} column {}", row, FRAME_COLUMNS[col]);
            }
        }
    }

    #[test]
    fn test_holiday_from_calendar_and_override() {
        let builder = FeatureBuilder::new(UsFederalHolidays::new());
        let christmas = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(builder.build_record(christmas, weather(), None).holiday, 1);
        assert_eq!(builder.build_record(christmas, weather(), Some(0)).holiday, 0);
    }

    #[test]
    fn test_unlabeled_frame_has_no_target() {
        let builder = FeatureBuilder::new(UsFederalHolidays::new());
        let ts = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let obs = vec![Observation { timestamp: ts, weather: weather(), holiday: None, trips: None }];
        let frame = builder.build_frame(&obs).unwrap();
        assert!(!frame.has_column(TARGET_COLUMN));
        assert_eq!(frame.column_names().len(), FRAME_COLUMNS.len());
    }

    #[test]
    fn test_record_json_shape() {
        let builder = FeatureBuilder::new(UsFederalHolidays::new());
        let ts = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let json = serde_json::to_value(builder.build_record(ts, weather(), None)).unwrap();
        assert_eq!(json["TMAX"], 28.0);
        assert!(json.get("hr_sin").is_some());
        assert!(json.get("holiday").is_some());
    }
}
