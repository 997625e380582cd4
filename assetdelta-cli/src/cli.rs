//! Command-line arguments.

use std::path::PathBuf;

use assetdelta::ReleaseVersion;
use clap::{Args, Parser, Subcommand};

use crate::commands::config::ConfigCommands;
use crate::commands::registry::RegistryCommands;

#[derive(Debug, Parser)]
#[command(name = "assetdelta")]
#[command(version, about = "Fetch and reconcile the delta between two asset bundle releases")]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Working directory for manifests, records and downloads
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download the manifest of a release
    Manifest {
        /// Release version
        version: ReleaseVersion,

        /// Replace an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Compare two release manifests
    Diff {
        #[command(flatten)]
        versions: VersionArgs,

        /// Print every added and changed path
        #[arg(long)]
        list: bool,
    },

    /// Download the added and changed objects between two releases
    Download {
        #[command(flatten)]
        versions: VersionArgs,

        /// Only retry ids recorded as failed by an earlier run
        #[arg(long)]
        retry_failed: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Run the bundle extractor over downloaded objects
    Extract {
        #[command(flatten)]
        versions: VersionArgs,
    },

    /// Merge segmented files in extracted trees
    Reassemble {
        #[command(flatten)]
        versions: VersionArgs,

        /// Keep segment files after merging
        #[arg(long)]
        keep_segments: bool,
    },

    /// Unpack containers and decode streams in extracted trees
    Decode {
        #[command(flatten)]
        versions: VersionArgs,
    },

    /// Delete changed files whose content matches the old release
    Reconcile {
        #[command(flatten)]
        versions: VersionArgs,
    },

    /// Collapse single-child directory chains in the output trees
    Flatten {
        #[command(flatten)]
        versions: VersionArgs,
    },

    /// Run every stage in order
    Run {
        #[command(flatten)]
        versions: VersionArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Manage the version registry
    #[command(subcommand)]
    Registry(RegistryCommands),

    /// Inspect the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Which pair of releases to compare.
///
/// Without `--new`, the latest registered release is used; without `--old`,
/// the release registered just before `--new`.
#[derive(Debug, Clone, Args)]
pub struct VersionArgs {
    /// Older release
    #[arg(long)]
    pub old: Option<ReleaseVersion>,

    /// Newer release
    #[arg(long)]
    pub new: Option<ReleaseVersion>,
}

/// Download overrides for `[download]` settings.
#[derive(Debug, Clone, Default, Args)]
pub struct FetchArgs {
    /// Concurrent downloads
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Attempts per object
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
}
