//! Weekly drift monitoring run

use tracing::info;

use crate::config::MonitoringParams;
use crate::data::ObservationSource;
use crate::drift::{ColumnMapping, DriftMetricsEngine};
use crate::error::Result;
use crate::features::{FeatureBuilder, FeatureFrame, HolidayCalendar, UsFederalHolidays, CATEGORICAL_COLUMNS, NUMERICAL_COLUMNS};
use crate::inference::InferenceRunner;
use crate::monitoring::MetricsStore;
use crate::registry::{require_alias, ModelRegistry};
use crate::training::GradientBoostedTrees;

/// What a monitoring run did
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringReport {
    pub model_version: String,
    pub reference_rows: usize,
    pub current_rows: usize,
    pub rows_written: usize,
}

/// Scores the reference and current windows with the aliased model and
/// stores one drift row per week of the current window
pub struct MonitoringPipeline<'a, S, R, C = UsFederalHolidays>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
    C: HolidayCalendar,
{
    source: &'a S,
    registry: &'a R,
    store: &'a mut MetricsStore,
    builder: FeatureBuilder<C>,
    runner: InferenceRunner,
    engine: DriftMetricsEngine,
}

impl<'a, S, R> MonitoringPipeline<'a, S, R, UsFederalHolidays>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
{
    pub fn new(source: &'a S, registry: &'a R, store: &'a mut MetricsStore) -> Self {
        Self {
            source,
            registry,
            store,
            builder: FeatureBuilder::new(UsFederalHolidays::new()),
            runner: InferenceRunner::new(),
            engine: DriftMetricsEngine::new(ColumnMapping::default()),
        }
    }
}

impl<'a, S, R, C> MonitoringPipeline<'a, S, R, C>
where
    S: ObservationSource + ?Sized,
    R: ModelRegistry + ?Sized,
    C: HolidayCalendar,
{
    pub fn with_engine(mut self, engine: DriftMetricsEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_runner(mut self, runner: InferenceRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn run(self, params: &MonitoringParams) -> Result<MonitoringReport> {
        info!(
            model = %params.model_name,
            alias = %params.model_alias,
            reference = %format!("{}..{}", params.start_reference_date, params.end_reference_date),
            current = %format!("{}..{}", params.start_current_date, params.end_current_date),
            "Starting monitoring pipeline"
        );
        self.store.ensure_table()?;

        let version = require_alias(self.registry, &params.model_name, params.model_alias)?;
        let model = GradientBoostedTrees::load_json(&version.source)?;
        info!(version = %version.version, source = %version.source, "Loaded model");

        let reference = self.score_window(&model, params.start_reference_date, params.end_reference_date)?;
        let current = self.score_window(&model, params.start_current_date, params.end_current_date)?;

        let rows = self.engine.compute(&reference, &current)?;
        let rows_written = if rows.is_empty() {
            info!("No drift rows to store, skipping persistence");
            0
        } else {
            self.store.insert_batch(&rows)?
        };

        Ok(MonitoringReport {
            model_version: version.version,
            reference_rows: reference.len(),
            current_rows: current.len(),
            rows_written,
        })
    }

    fn score_window(
        &self,
        model: &GradientBoostedTrees,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<FeatureFrame> {
        let observations = self.source.load(start, end)?;
        let frame = self.builder.build_frame(&observations)?;
        if frame.is_empty() {
            return Ok(frame);
        }
        self.runner.run(model, &frame, &CATEGORICAL_COLUMNS, &NUMERICAL_COLUMNS)
    }
}
