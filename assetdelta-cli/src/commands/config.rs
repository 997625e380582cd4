//! Configuration file commands.

use assetdelta::ConfigFile;
use clap::Subcommand;

use super::Context;
use crate::error::CliError;
use crate::output;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommands::Show => run_show(ctx),
        ConfigCommands::Init { force } => run_init(ctx, force),
    }
}

fn run_show(ctx: &Context) -> Result<(), CliError> {
    let mut buffer = Vec::new();
    ctx.config
        .to_ini()
        .write_to(&mut buffer)
        .map_err(|e| CliError::Config(e.to_string()))?;
    print!("{}", String::from_utf8_lossy(&buffer));
    Ok(())
}

fn run_init(ctx: &Context, force: bool) -> Result<(), CliError> {
    if ctx.config_path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            ctx.config_path.display()
        )));
    }
    ConfigFile::default().save_to(&ctx.config_path)?;
    output::success(&format!("Wrote {}", ctx.config_path.display()));
    Ok(())
}
