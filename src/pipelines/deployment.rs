//! Bundle export for the deployment pipelines

use tracing::info;

use crate::config::{DeploymentParams, PipelineKind};
use crate::deploy::{bundle_dir, BundleExporter, BundleManifest, DeployTarget};
use crate::error::{PipelineError, Result};
use crate::registry::ModelRegistry;

/// Target of a deployment pipeline kind
pub fn deploy_target(kind: PipelineKind) -> Result<DeployTarget> {
    match kind {
        PipelineKind::DeployMlflow => Ok(DeployTarget::Mlflow),
        PipelineKind::DeployBentoml => Ok(DeployTarget::Bentoml),
        other => Err(PipelineError::ConfigError(format!(
            "'{}' is not a deployment pipeline",
            other
        ))),
    }
}

/// Export the configured alias into `<output_dir>/<model>/<target>`
pub fn run_deployment<R: ModelRegistry + ?Sized>(
    registry: &R,
    kind: PipelineKind,
    params: &DeploymentParams,
) -> Result<BundleManifest> {
    let target = deploy_target(kind)?;
    let mut exporter = BundleExporter::new(target).with_packages(params.packages.clone());
    if let Some(service) = &params.service_class {
        exporter = exporter.with_service_class(service.clone());
    }
    if let Some(image) = &params.image_name {
        exporter = exporter.with_image(image.clone(), params.image_tag.clone());
    }

    let dir = bundle_dir(&params.output_dir, &params.model_name, target);
    let manifest = exporter.export(registry, &params.model_name, params.model_alias, &dir)?;
    info!(
        model = %manifest.model_name,
        version = %manifest.version,
        dir = %dir.display(),
        "Deployment bundle ready"
    );
    Ok(manifest)
}
