//! Yearly parquet partitions of trips and weather

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::{check_window, in_window, ObservationSource};
use crate::error::{PipelineError, Result};
use crate::features::{Observation, Weather};

/// Reads `{base}/citibike/{year}-citibike-tripdata.parquet` and
/// `{base}/weather/{year}-weather.parquet`, joined on the date key
#[derive(Debug, Clone)]
pub struct ParquetSource {
    base: PathBuf,
}

impl ParquetSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn trips_path(&self, year: i32) -> PathBuf {
        self.base
            .join("citibike")
            .join(format!("{}-citibike-tripdata.parquet", year))
    }

    pub fn weather_path(&self, year: i32) -> PathBuf {
        self.base.join("weather").join(format!("{}-weather.parquet", year))
    }

    fn load_year(&self, year: i32) -> Result<Vec<Observation>> {
        let trips_path = self.trips_path(year);
        let weather_path = self.weather_path(year);
        info!(path = %trips_path.display(), "Reading trips");
        let trips = read_parquet(&trips_path)?;
        info!(path = %weather_path.display(), "Reading weather");
        let weather = read_parquet(&weather_path)?;

        let weather_by_date = weather_index(&weather)?;

        let dates = date_column(&trips, "date")?;
        let hours = i64_column(&trips, "hour")?;
        let counts = f64_column(&trips, "trips")?;
        let holidays = if trips.get_column_names().iter().any(|c| c.as_str() == "holiday") {
            Some(i64_column(&trips, "holiday")?)
        } else {
            None
        };

        let mut observations = Vec::with_capacity(trips.height());
        for row in 0..trips.height() {
            let (Some(date), Some(hour)) = (dates[row], hours[row]) else {
                continue;
            };
            // inner join: trips without weather are dropped
            let Some(weather) = weather_by_date.get(&date) else {
                continue;
            };
            if !(0..24).contains(&hour) {
                return Err(PipelineError::DataError(format!("hour out of range: {}", hour)));
            }
            observations.push(Observation {
                timestamp: date.and_time(NaiveTime::MIN) + Duration::hours(hour),
                weather: *weather,
                holiday: holidays.as_ref().and_then(|h| h[row]),
                trips: counts[row],
            });
        }
        debug!(year, rows = observations.len(), "Merged trips and weather");
        Ok(observations)
    }
}

impl ObservationSource for ParquetSource {
    fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Observation>> {
        check_window(start, end)?;
        let started = Instant::now();

        let mut observations = Vec::new();
        for year in start.year()..=end.year() {
            observations.extend(
                self.load_year(year)?
                    .into_iter()
                    .filter(|o| in_window(o, start, end)),
            );
        }
        observations.sort_by_key(|o| o.timestamp);

        info!(
            rows = observations.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Loaded observations"
        );
        Ok(observations)
    }
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| PipelineError::DataError(format!("{}: {}", path.display(), e)))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| PipelineError::DataError(format!("{}: {}", path.display(), e)))
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| PipelineError::FeatureNotFound(name.to_string()))
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let casted = series(df, name)?.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let casted = series(df, name)?.cast(&DataType::Int64)?;
    Ok(casted.i64()?.into_iter().collect())
}

/// Date or datetime column as calendar dates
fn date_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let days = series(df, name)?
        .cast(&DataType::Date)?
        .cast(&DataType::Int32)?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    Ok(days
        .i32()?
        .into_iter()
        .map(|d| d.map(|d| epoch + Duration::days(i64::from(d))))
        .collect())
}

fn weather_index(weather: &DataFrame) -> Result<HashMap<NaiveDate, Weather>> {
    let dates = date_column(weather, "DATE")?;
    let tmax = f64_column(weather, "TMAX")?;
    let tmin = f64_column(weather, "TMIN")?;
    let snow = f64_column(weather, "SNOW")?;

    Ok(dates
        .iter()
        .enumerate()
        .filter_map(|(i, d)| {
            d.map(|date| {
                (
                    date,
                    Weather {
                        tmax: tmax[i].unwrap_or(f64::NAN),
                        tmin: tmin[i].unwrap_or(f64::NAN),
                        snow: snow[i].unwrap_or(f64::NAN),
                    },
                )
            })
        })
        .collect())
}
