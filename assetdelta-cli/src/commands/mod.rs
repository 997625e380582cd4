//! Subcommand handlers.
//!
//! Each handler receives a [`Context`] holding the loaded configuration,
//! already merged with global command-line overrides.

pub mod config;
pub mod registry;
mod stages;

use std::path::PathBuf;

use assetdelta::fetch::ReqwestTransport;
use assetdelta::pipeline::Pipeline;
use assetdelta::{ConfigFile, ReleaseVersion, VersionRegistry, WorkspaceLayout};

use crate::cli::{Commands, FetchArgs, VersionArgs};
use crate::error::CliError;

/// Shared state for one invocation.
pub struct Context {
    pub config: ConfigFile,
    pub config_path: PathBuf,
}

impl Context {
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.config.paths.work_dir)
    }

    pub fn registry(&self) -> Result<VersionRegistry, CliError> {
        Ok(VersionRegistry::load(&self.layout().registry_path())?)
    }

    /// Build a pipeline, applying download overrides.
    pub fn pipeline(&self, fetch: &FetchArgs) -> Result<Pipeline<ReqwestTransport>, CliError> {
        let mut config = self.config.clone();
        if let Some(parallel) = fetch.parallel {
            config.download.parallel = parallel.max(1);
        }
        if let Some(max_retries) = fetch.max_retries {
            config.download.max_retries = max_retries.max(1);
        }
        Ok(Pipeline::from_config(&config)?)
    }

    /// Resolve the compared pair from arguments and the registry.
    pub fn versions(
        &self,
        args: &VersionArgs,
    ) -> Result<(ReleaseVersion, ReleaseVersion), CliError> {
        let registry = self.registry()?;
        resolve_versions(args, &registry)
    }
}

fn resolve_versions(
    args: &VersionArgs,
    registry: &VersionRegistry,
) -> Result<(ReleaseVersion, ReleaseVersion), CliError> {
    let new = match &args.new {
        Some(v) => v.clone(),
        None => registry.latest().cloned().ok_or_else(|| {
            CliError::Config(
                "No releases registered. Use 'assetdelta registry add' or pass --new.".to_string(),
            )
        })?,
    };
    let old = match &args.old {
        Some(v) => v.clone(),
        None => registry.previous(&new).cloned().ok_or_else(|| {
            CliError::Config(format!(
                "No release registered before {}. Pass --old explicitly.",
                new
            ))
        })?,
    };

    if old == new {
        return Err(CliError::Config(format!(
            "Cannot compare release {} with itself",
            new
        )));
    }
    Ok((old, new))
}

/// Dispatch a parsed command.
pub fn run(command: Commands, ctx: &Context) -> Result<(), CliError> {
    match command {
        Commands::Manifest { version, force } => stages::manifest(ctx, &version, force),
        Commands::Diff { versions, list } => stages::diff(ctx, &versions, list),
        Commands::Download {
            versions,
            retry_failed,
            fetch,
        } => stages::download(ctx, &versions, retry_failed, &fetch),
        Commands::Extract { versions } => stages::extract(ctx, &versions),
        Commands::Reassemble {
            versions,
            keep_segments,
        } => stages::reassemble(ctx, &versions, keep_segments),
        Commands::Decode { versions } => stages::decode(ctx, &versions),
        Commands::Reconcile { versions } => stages::reconcile(ctx, &versions),
        Commands::Flatten { versions } => stages::flatten(ctx, &versions),
        Commands::Run { versions, fetch } => stages::run_all(ctx, &versions, &fetch),
        Commands::Registry(command) => registry::run(command, ctx),
        Commands::Config(command) => config::run(command, ctx),
    }
}
