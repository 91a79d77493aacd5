//! Request-time prediction contract
//!
//! Accepts either pre-engineered feature records or raw
//! `{date, TMAX, TMIN, SNOW}` records and answers with
//! `{"predictions": [{"model": .., "prediction": ..}]}` in input order.

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::deploy::{BundleManifest, MODEL_FILE};
use crate::error::{PipelineError, Result};
use crate::features::{model_columns, FeatureBuilder, FeatureRecord, HolidayCalendar, UsFederalHolidays, Weather, FRAME_COLUMNS};
use crate::inference::Regressor;
use crate::training::GradientBoostedTrees;

/// Raw request record; features are derived from `date`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTripRecord {
    pub date: NaiveDateTime,
    #[serde(rename = "TMAX")]
    pub tmax: f64,
    #[serde(rename = "TMIN")]
    pub tmin: f64,
    #[serde(rename = "SNOW")]
    pub snow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: String,
    pub prediction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Prediction>,
}

/// A loaded model answering prediction requests
pub struct PredictionService<C: HolidayCalendar = UsFederalHolidays> {
    model_name: String,
    model: Box<dyn Regressor>,
    /// Positions of the model inputs within [`FRAME_COLUMNS`]
    positions: Vec<usize>,
    builder: FeatureBuilder<C>,
}

impl PredictionService<UsFederalHolidays> {
    pub fn new(model_name: impl Into<String>, model: Box<dyn Regressor>) -> Result<Self> {
        Self::with_columns(model_name, model, &model_columns())
    }

    /// Service over the model stored in an exported bundle
    pub fn from_bundle(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = BundleManifest::load(dir)?;
        let model = GradientBoostedTrees::load_json(dir.join(MODEL_FILE))?;
        Self::with_columns(manifest.model_name, Box::new(model), &manifest.feature_columns)
    }

    /// Service feeding `columns`, a subset of the engineered columns, to the model
    pub fn with_columns<S: AsRef<str>>(model_name: impl Into<String>, model: Box<dyn Regressor>, columns: &[S]) -> Result<Self> {
        let positions = columns
            .iter()
            .map(|c| {
                FRAME_COLUMNS
                    .iter()
                    .position(|f| *f == c.as_ref())
                    .ok_or_else(|| PipelineError::FeatureNotFound(c.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            model_name: model_name.into(),
            model,
            positions,
            builder: FeatureBuilder::new(UsFederalHolidays::new()),
        })
    }
}

impl<C: HolidayCalendar> PredictionService<C> {
    pub fn with_calendar<C2: HolidayCalendar>(self, calendar: C2) -> PredictionService<C2> {
        PredictionService {
            model_name: self.model_name,
            model: self.model,
            positions: self.positions,
            builder: FeatureBuilder::new(calendar),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Predict for already engineered records
    pub fn predict(&self, records: &[FeatureRecord]) -> Result<PredictionResponse> {
        if records.is_empty() {
            return Ok(PredictionResponse { predictions: Vec::new() });
        }
        let mut x = Array2::zeros((records.len(), self.positions.len()));
        for (row, record) in records.iter().enumerate() {
            let values = record.values();
            for (col, &pos) in self.positions.iter().enumerate() {
                x[[row, col]] = values[pos];
            }
        }

        let predictions = self.model.predict(&x)?;
        debug!(rows = records.len(), model = %self.model_name, "Served predictions");
        Ok(PredictionResponse {
            predictions: predictions
                .iter()
                .map(|&prediction| Prediction {
                    model: self.model_name.clone(),
                    prediction,
                })
                .collect(),
        })
    }

    /// Predict for raw records, deriving holiday and calendar features
    pub fn predict_trips(&self, records: &[RawTripRecord]) -> Result<PredictionResponse> {
        let engineered: Vec<FeatureRecord> = records
            .iter()
            .map(|r| {
                let weather = Weather {
                    tmax: r.tmax,
                    tmin: r.tmin,
                    snow: r.snow,
                };
                self.builder.build_record(r.date, weather, None)
            })
            .collect();
        self.predict(&engineered)
    }
}
