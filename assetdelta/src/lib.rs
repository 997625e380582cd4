//! AssetDelta - Incremental downloads of versioned asset bundles
//!
//! This library tracks successive releases of a remotely hosted asset bundle,
//! works out which files changed between two releases, downloads only that
//! delta, stitches split files back together and drops anything whose decoded
//! content did not actually change.

pub mod config;
pub mod external;
pub mod fetch;
pub mod fsops;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod segment;
pub mod version;

pub use config::{ConfigError, ConfigFile};
pub use manifest::{diff, DiffResult, HashedManifest};
pub use pipeline::{Pipeline, PipelineError, PipelineResult, WorkspaceLayout};
pub use registry::VersionRegistry;
pub use version::{IncrementLast, ReleaseVersion, VersionPolicy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
