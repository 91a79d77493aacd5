//! Pipeline runners
//!
//! Each [`PipelineKind`] reads its typed parameters from the config file
//! and runs against an explicit registry handle.

mod deployment;
mod monitoring;

pub use deployment::{deploy_target, run_deployment};
pub use monitoring::{MonitoringPipeline, MonitoringReport};

use tracing::info;

use crate::config::{PipelineConfig, PipelineKind};
use crate::data::ParquetSource;
use crate::deploy::BundleManifest;
use crate::error::Result;
use crate::monitoring::MetricsStore;
use crate::registry::ModelRegistry;
use crate::training::{TrainingPipeline, TrainingReport};

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub enum PipelineSummary {
    Training(TrainingReport),
    Deployment(BundleManifest),
    Monitoring(MonitoringReport),
}

/// Run `kind` with parameters from `config`
pub fn run_pipeline<R: ModelRegistry + ?Sized>(
    kind: PipelineKind,
    config: &PipelineConfig,
    registry: &mut R,
) -> Result<PipelineSummary> {
    info!(pipeline = %kind, "Running pipeline");
    match kind {
        PipelineKind::Training => {
            let params = config.training()?;
            let source = ParquetSource::new(params.data_url.clone());
            let report = TrainingPipeline::new(&source, registry, params).run()?;
            Ok(PipelineSummary::Training(report))
        }
        PipelineKind::DeployMlflow | PipelineKind::DeployBentoml => {
            let params = config.deployment(kind)?;
            Ok(PipelineSummary::Deployment(run_deployment(registry, kind, &params)?))
        }
        PipelineKind::Monitoring => {
            let params = config.monitoring()?;
            let source = ParquetSource::new(params.data_url.clone());
            let mut store = MetricsStore::open(&params.database)?;
            let report = MonitoringPipeline::new(&source, registry, &mut store).run(&params)?;
            Ok(PipelineSummary::Monitoring(report))
        }
    }
}
