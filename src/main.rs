//! Model Factory - main entry point

use chrono::Local;
use clap::Parser;
use model_factory::cli::{cmd_catalog, cmd_predict, cmd_train, load_config, Cli, Commands};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging, plus a timestamped log file when `log_dir` is set.
/// The returned guard flushes the file writer on drop.
fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "model_factory=info".into());
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_name = format!("{}.log", Local::now().format("%m_%d_%Y_%H_%M_%S"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            registry.with(fmt::layer().with_ansi(false).with_writer(writer)).init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Train {
            train,
            test,
            catalog,
            target,
            artifact_dir,
            base_accuracy,
            cv_folds,
            strategy,
            n_iter,
            n_jobs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_train(
                config,
                &train,
                &test,
                catalog,
                target,
                artifact_dir,
                base_accuracy,
                cv_folds,
                strategy,
                n_iter,
                n_jobs,
            )?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Catalog { path } => {
            cmd_catalog(&path)?;
        }
    }

    Ok(())
}
