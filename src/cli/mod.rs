//! Command-line interface: train, predict and inspect catalogs

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifact::{ArtifactStore, LocalArtifactStore};
use crate::catalog::{Catalog, SearchOverrides};
use crate::config::{PipelineConfig, SearchStrategy};
use crate::data::load_data;
use crate::error::FactoryError;
use crate::estimators::EstimatorRegistry;
use crate::pipeline::TrainingPipeline;
use crate::report::{RecordStatus, ReportWriter};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 110, 110) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", bad("✗"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "model-factory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tune a catalog of tabular models and keep the best one")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the factory on train/test data and save the selected model
    Train {
        /// Training data file (CSV or Parquet)
        #[arg(long)]
        train: PathBuf,

        /// Test data file (CSV or Parquet)
        #[arg(long)]
        test: PathBuf,

        /// Model catalog (overrides the configuration)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,

        /// Artifact root directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Minimum cross-validated score a candidate needs
        #[arg(long)]
        base_accuracy: Option<f64>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Search strategy (grid, random)
        #[arg(long)]
        strategy: Option<String>,

        /// Combinations sampled by random search
        #[arg(long)]
        n_iter: Option<usize>,

        /// Worker threads per grid
        #[arg(long)]
        n_jobs: Option<usize>,
    },

    /// Predict with a saved model bundle
    Predict {
        /// Saved bundle (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file (CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a catalog and show what each entry resolves to
    Catalog {
        /// Catalog file
        path: PathBuf,
    },
}

/// Pipeline configuration from `--config`, or defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    Ok(match path {
        Some(p) => PipelineConfig::from_yaml_file(p)?,
        None => PipelineConfig::default(),
    })
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    mut config: PipelineConfig,
    train: &Path,
    test: &Path,
    catalog: Option<PathBuf>,
    target: Option<String>,
    artifact_dir: Option<PathBuf>,
    base_accuracy: Option<f64>,
    cv_folds: Option<usize>,
    strategy: Option<String>,
    n_iter: Option<usize>,
    n_jobs: Option<usize>,
) -> anyhow::Result<()> {
    section("Train");

    if let Some(dir) = artifact_dir {
        config.artifact_dir = dir;
        config.factory.report_path = config
            .trainer_dir()
            .join("all_model_report/all_tuned_model_report.yaml");
    }
    if let Some(c) = catalog {
        config.factory.catalog_path = c;
    }
    if let Some(t) = target {
        config.target_column = t;
    }
    if let Some(b) = base_accuracy {
        config.factory.base_accuracy = b;
    }
    if let Some(cv) = cv_folds {
        config.factory.cv_folds = cv;
    }
    if let Some(name) = strategy {
        config.factory.strategy = SearchStrategy::parse(&name, n_iter).map_err(anyhow::Error::msg)?;
    } else if let (SearchStrategy::Random { .. }, Some(n)) = (config.factory.strategy, n_iter) {
        config.factory.strategy = SearchStrategy::Random { n_iter: n };
    }
    if let Some(n) = n_jobs {
        config.factory.n_jobs = n.max(1);
    }
    config.factory.validate()?;

    println!("  {}", kv("catalog ", &config.factory.catalog_path.display().to_string()));
    println!("  {}", kv("target  ", &config.target_column));
    println!("  {}", kv("folds   ", &config.factory.cv_folds.to_string()));
    println!("  {}", kv("strategy", &format!("{:?}", config.factory.strategy)));
    println!();

    let store = LocalArtifactStore::new(&config.artifact_dir);
    let pipeline = TrainingPipeline::new(config.clone(), &store);

    step_run("Tuning candidates");
    let start = Instant::now();
    let outcome = match pipeline.run(train, test) {
        Ok(outcome) => outcome,
        Err(FactoryError::NoAcceptableModel { base_accuracy, report }) => {
            println!("{}", bad("failed"));
            step_fail(&format!(
                "no candidate reached {:.3} ({} evaluated)",
                base_accuracy,
                report.len()
            ));
            print_report(&config.factory.report_path);
            anyhow::bail!("no acceptable model");
        }
        Err(e) => {
            println!("{}", bad("failed"));
            return Err(e.into());
        }
    };
    step_done(&format!("{:.2?}", start.elapsed()));

    print_report(&outcome.trainer.report_path);

    section("Selected");
    println!("  {}", kv("model     ", &outcome.trainer.model_name));
    println!("  {}", kv("cv score  ", &format!("{:.4}", outcome.trainer.best_score)));
    println!("  {}", kv("test score", &format!("{:.4}", outcome.trainer.test_score)));
    if let Some(m) = &outcome.trainer.metrics {
        println!(
            "  {}",
            kv(
                "metrics   ",
                &format!(
                    "acc {:.3}  f1 {:.3}  precision {:.3}  recall {:.3}",
                    m.accuracy_score, m.f1_score, m.precision_score, m.recall_score
                )
            )
        );
    }
    step_ok(&format!("saved {}", store.path_for(&outcome.trainer.trained_model_key).display()));

    section("Evaluation");
    let eval = &outcome.evaluation;
    println!("  {}", kv("trained ", &format!("{:.4}", eval.trained_score)));
    match eval.deployed_score {
        Some(s) => println!("  {}", kv("deployed", &format!("{:.4}", s))),
        None => println!("  {}", kv("deployed", "none")),
    }
    if outcome.promoted {
        step_ok(&format!("promoted to {}", config.production_key));
    } else {
        println!("  {} {}", muted("·"), "kept the deployed model".yellow());
    }
    println!();
    Ok(())
}

fn print_report(path: &Path) {
    let Ok(records) = ReportWriter::read(path) else {
        return;
    };

    section("Candidates");
    for record in records {
        match record.status {
            RecordStatus::Success => println!(
                "  {} {:<28} {}",
                ok("✓"),
                record.model_name,
                dim(&format!(
                    "cv {:.4}  test {:.4}",
                    record.best_score.unwrap_or(f64::NAN),
                    record.test_score.unwrap_or(f64::NAN)
                ))
            ),
            _ => println!(
                "  {} {:<28} {}",
                bad("✗"),
                record.model_name,
                dim(record.error.as_deref().unwrap_or(""))
            ),
        }
    }
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    let root = model_path.parent().unwrap_or_else(|| Path::new("."));
    let key = model_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid model path {}", model_path.display()))?;

    step_run("Loading model");
    let bundle = LocalArtifactStore::new(root).load(key)?;
    step_done(&bundle.model_name);

    step_run("Loading data");
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let labels = bundle.predict(&df)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    match output {
        Some(path) => {
            let mut out = DataFrame::new(vec![Series::new("prediction", labels)])?;
            let mut file = std::fs::File::create(path)?;
            CsvWriter::new(&mut file).finish(&mut out)?;
            step_ok(&format!("wrote {}", path.display()));
        }
        None => {
            for label in labels.iter().take(20) {
                println!("  {}", label);
            }
            if labels.len() > 20 {
                println!("  {}", dim(&format!("... {} more", labels.len() - 20)));
            }
        }
    }
    println!();
    Ok(())
}

pub fn cmd_catalog(path: &Path) -> anyhow::Result<()> {
    section("Catalog");

    let catalog = Catalog::from_path(path)?;
    let registry = EstimatorRegistry::with_builtins();

    for spec in catalog.iter() {
        let grid = &spec.search_grid;
        match registry.resolve(spec) {
            Ok(resolved) => println!(
                "  {} {:<10} {:<28} {}",
                ok("✓"),
                spec.key,
                spec.class_name,
                dim(&format!(
                    "{:?}, {} combination(s)",
                    resolved.task,
                    grid.n_combinations()
                ))
            ),
            Err(e) => println!("  {} {:<10} {:<28} {}", bad("✗"), spec.key, spec.class_name, dim(&e.to_string())),
        }
        let skipped = grid.skipped_axes();
        if !skipped.is_empty() {
            println!("  {}", dim(&format!("    no candidates for: {}", skipped.join(", "))));
        }
    }

    let search = &catalog.search;
    if *search != SearchOverrides::default() {
        println!();
        if let Some(s) = search.strategy {
            println!("  {}", kv("strategy", &format!("{:?}", s)));
        }
        if let Some(cv) = search.cv_folds {
            println!("  {}", kv("cv      ", &cv.to_string()));
        }
        if let Some(scoring) = &search.scoring {
            println!("  {}", kv("scoring ", scoring));
        }
    }
    println!();
    Ok(())
}
