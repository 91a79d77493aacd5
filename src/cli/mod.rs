//! Command-line interface
//!
//! `citibike --pipeline <name> --config <FILE>` runs one pipeline;
//! `citibike predict --bundle <DIR> --input <FILE>` serves raw records
//! from an exported bundle.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{PipelineConfig, PipelineKind};
use crate::pipelines::{run_pipeline, PipelineSummary};
use crate::promotion::PromotionOutcome;
use crate::registry::LocalRegistry;
use crate::serving::{PredictionService, RawTripRecord};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "citibike")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Citi Bike demand model lifecycle: training, promotion, deployment and drift monitoring")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Pipeline to run (training, deploy-mlflow, deploy-bentoml, monitoring)
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Pipeline configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Model registry directory
    #[arg(short, long, default_value = "registry")]
    pub registry: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict trips for raw records using an exported bundle
    Predict {
        /// Bundle directory written by a deploy pipeline
        #[arg(short, long)]
        bundle: PathBuf,

        /// JSON file holding a list of {date, TMAX, TMIN, SNOW} records
        #[arg(short, long)]
        input: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_pipeline(pipeline: &str, config_path: &Path, registry_path: &Path) -> anyhow::Result<()> {
    let kind: PipelineKind = pipeline.parse()?;
    section(&format!("Pipeline {}", kind));

    step_run("Reading config");
    let config = PipelineConfig::from_file(config_path)?;
    step_done(&config_path.display().to_string());

    step_run("Opening registry");
    let mut registry = LocalRegistry::open(registry_path)?;
    step_done(&registry_path.display().to_string());

    let start = Instant::now();
    let summary = run_pipeline(kind, &config, &mut registry)?;
    print_summary(&summary);
    kv("Elapsed", &format!("{:.2}s", start.elapsed().as_secs_f64()));
    println!();
    Ok(())
}

pub fn cmd_predict(bundle: &Path, input: &Path) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading bundle");
    let service = PredictionService::from_bundle(bundle)?;
    step_done(service.model_name());

    let records: Vec<RawTripRecord> = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    let response = service.predict_trips(&records)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    section("Summary");
    match summary {
        PipelineSummary::Training(report) => {
            kv("Model", &report.model_name);
            kv("Version", &report.version);
            kv("Run", &report.run_id);
            kv("RMSE", &format!("{:.4}", report.scores.rmse));
            kv("R²", &format!("{:.4}", report.scores.r2));
            kv("CV RMSE", &format!("{:.4}", report.best_cv_rmse));
            kv("Run record", &report.record.display().to_string());
            let decision = match &report.outcome {
                PromotionOutcome::FirstPromotion { .. } => ok("first champion").to_string(),
                PromotionOutcome::Promoted { previous, .. } => {
                    ok(&format!("promoted over v{}", previous)).to_string()
                }
                PromotionOutcome::Rejected { champion, .. } => {
                    format!("{}", format!("kept champion v{}", champion).yellow())
                }
            };
            kv("Promotion", &decision);
        }
        PipelineSummary::Deployment(manifest) => {
            kv("Model", &manifest.model_name);
            kv("Version", &manifest.version);
            kv("Alias", manifest.alias.as_str());
            kv("Target", manifest.target.as_str());
            if let Some(image) = &manifest.image {
                kv("Image", image);
            }
        }
        PipelineSummary::Monitoring(report) => {
            kv("Model version", &report.model_version);
            kv("Reference rows", &report.reference_rows.to_string());
            kv("Current rows", &report.current_rows.to_string());
            kv("Weeks stored", &report.rows_written.to_string());
        }
    }
}
