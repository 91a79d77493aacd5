//! citibike - pipeline runner entry point

use clap::Parser;
use citibike_mlops::cli::{cmd_pipeline, cmd_predict, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citibike_mlops=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Predict { bundle, input }) => {
            cmd_predict(&bundle, &input)?;
        }
        None => {
            let Some(pipeline) = cli.pipeline.as_deref() else {
                anyhow::bail!("--pipeline is required (one of: training, deploy-mlflow, deploy-bentoml, monitoring)");
            };
            cmd_pipeline(pipeline, &cli.config, &cli.registry)?;
        }
    }

    Ok(())
}
