//! Version registry commands.

use assetdelta::{IncrementLast, ReleaseVersion, VersionPolicy};
use clap::Subcommand;

use super::Context;
use crate::error::CliError;
use crate::output;

/// Registry subcommands.
#[derive(Debug, Subcommand)]
pub enum RegistryCommands {
    /// Register the base URL of a release
    Add {
        /// Release version (omit with --next)
        version: Option<ReleaseVersion>,

        /// Base URL the release's objects are served from
        #[arg(long)]
        url: String,

        /// Register under the version after the latest one
        #[arg(long, conflicts_with = "version")]
        next: bool,
    },

    /// List registered releases, newest first
    List,
}

/// Run a registry subcommand.
pub fn run(command: RegistryCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        RegistryCommands::Add { version, url, next } => run_add(ctx, version, &url, next),
        RegistryCommands::List => run_list(ctx),
    }
}

fn run_add(
    ctx: &Context,
    version: Option<ReleaseVersion>,
    url: &str,
    next: bool,
) -> Result<(), CliError> {
    let path = ctx.layout().registry_path();
    let mut registry = ctx.registry()?;

    let version = match (version, next) {
        (Some(v), _) => v,
        (None, true) => next_version(registry.latest(), &IncrementLast)?,
        (None, false) => {
            return Err(CliError::Config(
                "Give a version or pass --next".to_string(),
            ))
        }
    };

    let previous = registry.insert(version.clone(), url);
    registry.save(&path)?;

    match previous {
        Some(old_url) => output::success(&format!(
            "Updated {}: {} (was {})",
            version, url, old_url
        )),
        None => output::success(&format!("Registered {}: {}", version, url)),
    }
    Ok(())
}

fn next_version(
    latest: Option<&ReleaseVersion>,
    policy: &dyn VersionPolicy,
) -> Result<ReleaseVersion, CliError> {
    let latest = latest.ok_or_else(|| {
        CliError::Config("Registry is empty; give the first version explicitly".to_string())
    })?;
    policy.next_after(latest).ok_or_else(|| {
        CliError::Config(format!("Cannot derive a version after {}", latest))
    })
}

fn run_list(ctx: &Context) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    if registry.is_empty() {
        println!("No releases registered.");
        return Ok(());
    }
    output::header(&format!("{} releases", registry.len()));
    for (version, url) in registry.iter() {
        output::line(version.as_str(), url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_increments_latest() {
        let latest = ReleaseVersion::parse("2.4.9").unwrap();
        let next = next_version(Some(&latest), &IncrementLast).unwrap();
        assert_eq!(next.as_str(), "2.4.10");
    }

    #[test]
    fn test_next_version_needs_a_release() {
        assert!(next_version(None, &IncrementLast).is_err());
    }
}
