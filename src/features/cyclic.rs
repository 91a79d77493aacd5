//! Cyclic calendar encodings
//!
//! Each calendar component is mapped onto the unit circle so that the
//! model sees hour 23 next to hour 0, December next to January, and so on.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Period of the hour-of-day component
pub const HOUR_PERIOD: f64 = 24.0;
/// Period of the day-of-week component (Monday = 0)
pub const WEEKDAY_PERIOD: f64 = 7.0;
/// Period of the ISO week component (week number offset by one)
pub const WEEK_PERIOD: f64 = 52.0;
/// Period of the month component (month number offset by one)
pub const MONTH_PERIOD: f64 = 12.0;

/// Names of the eight derived columns, in frame order
pub const CYCLIC_COLUMNS: [&str; 8] = [
    "hr_sin",
    "hr_cos",
    "weekday_sin",
    "weekday_cos",
    "week_sin",
    "week_cos",
    "mnth_sin",
    "mnth_cos",
];

/// Sine/cosine encodings of one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclicFeatures {
    pub hr_sin: f64,
    pub hr_cos: f64,
    pub weekday_sin: f64,
    pub weekday_cos: f64,
    pub week_sin: f64,
    pub week_cos: f64,
    pub mnth_sin: f64,
    pub mnth_cos: f64,
}

impl CyclicFeatures {
    /// Encode a trip timestamp
    pub fn from_datetime(timestamp: &NaiveDateTime) -> Self {
        let hour = timestamp.hour() as f64;
        let weekday = timestamp.weekday().num_days_from_monday() as f64;
        let week = timestamp.iso_week().week() as f64 - 1.0;
        let month = timestamp.month0() as f64;

        let (hr_sin, hr_cos) = encode(hour, HOUR_PERIOD);
        let (weekday_sin, weekday_cos) = encode(weekday, WEEKDAY_PERIOD);
        let (week_sin, week_cos) = encode(week, WEEK_PERIOD);
        let (mnth_sin, mnth_cos) = encode(month, MONTH_PERIOD);

        Self {
            hr_sin,
            hr_cos,
            weekday_sin,
            weekday_cos,
            week_sin,
            week_cos,
            mnth_sin,
            mnth_cos,
        }
    }

    /// Values in [`CYCLIC_COLUMNS`] order
    pub fn values(&self) -> [f64; 8] {
        [
            self.hr_sin,
            self.hr_cos,
            self.weekday_sin,
            self.weekday_cos,
            self.week_sin,
            self.week_cos,
            self.mnth_sin,
            self.mnth_cos,
        ]
    }
}

fn encode(value: f64, period: f64) -> (f64, f64) {
    let angle = value * (2.0 * PI / period);
    (angle.sin(), angle.cos())
}
