//! AssetDelta CLI - Command-line interface
//!
//! One subcommand per pipeline stage plus `run` for the whole sequence.
//! Summaries are printed to stdout, logs to stderr.

mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;

use assetdelta::config::config_file_path;
use assetdelta::{logging, ConfigFile};
use clap::Parser;
use console::style;

use cli::Cli;
use commands::Context;
use error::CliError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.clone().unwrap_or_else(config_file_path);
    let mut config = ConfigFile::load_from(&config_path)?;
    if let Some(work_dir) = cli.work_dir {
        config.paths.work_dir = work_dir;
    }

    let _log_guard = logging::init(cli.verbose, config.logging.file.as_deref())?;
    tracing::debug!(
        config = %config_path.display(),
        work_dir = %config.paths.work_dir.display(),
        version = assetdelta::VERSION,
        "Starting"
    );

    let ctx = Context {
        config,
        config_path,
    };
    commands::run(cli.command, &ctx)
}
