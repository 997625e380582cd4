//! Version -> source URL registry.
//!
//! The registry is a JSON object keyed by version string whose values are
//! the base download URL for that release:
//!
//! ```text
//! {
//!   "1.10": "https://cdn.example.com/bundles/a1b2c3",
//!   "1.9": "https://cdn.example.com/bundles/d4e5f6"
//! }
//! ```
//!
//! Entries are always written newest first.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::version::ReleaseVersion;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while loading, saving or querying the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to read the registry file.
    #[error("failed to read registry {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write the registry file.
    #[error("failed to write registry {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// The registry document is not valid JSON of the expected shape.
    #[error("failed to parse registry {}: {reason}", path.display())]
    ParseFailed { path: PathBuf, reason: String },

    /// No entry exists for the requested version.
    #[error("no source URL registered for version {0}")]
    UnknownVersion(String),
}

/// Mapping from release version to the base URL its objects are served from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionRegistry {
    entries: BTreeMap<ReleaseVersion, String>,
}

impl VersionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry file. A missing file yields an empty registry.
    pub fn load(path: &Path) -> RegistryResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Registry file absent, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(RegistryError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|e| RegistryError::ParseFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the registry, newest version first.
    pub fn save(&self, path: &Path) -> RegistryResult<()> {
        let write_err = |source| RegistryError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;
        fs::write(path, json + "\n").map_err(write_err)
    }

    /// Register (or replace) the source URL for a version.
    pub fn insert(&mut self, version: ReleaseVersion, url: impl Into<String>) -> Option<String> {
        self.entries.insert(version, url.into())
    }

    /// Resolve a version to its base URL.
    pub fn resolve(&self, version: &ReleaseVersion) -> RegistryResult<&str> {
        self.entries
            .get(version)
            .map(String::as_str)
            .ok_or_else(|| RegistryError::UnknownVersion(version.to_string()))
    }

    /// The newest registered version.
    pub fn latest(&self) -> Option<&ReleaseVersion> {
        self.entries.keys().next_back()
    }

    /// The newest registered version strictly older than `version`.
    pub fn previous(&self, version: &ReleaseVersion) -> Option<&ReleaseVersion> {
        self.entries.range(..version.clone()).next_back().map(|(v, _)| v)
    }

    /// All entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = (&ReleaseVersion, &str)> {
        self.entries.iter().rev().map(|(v, u)| (v, u.as_str()))
    }

    /// Number of registered versions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for VersionRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (version, url) in self.entries.iter().rev() {
            map.serialize_entry(version.as_str(), url)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VersionRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = VersionRegistry;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an object mapping version strings to URLs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut registry = VersionRegistry::new();
                while let Some((key, url)) = access.next_entry::<String, String>()? {
                    let version =
                        ReleaseVersion::parse(&key).map_err(serde::de::Error::custom)?;
                    registry.insert(version, url);
                }
                Ok(registry)
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn v(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let mut registry = VersionRegistry::new();
        registry.insert(v("1.2"), "https://cdn.example.com/a");

        assert_eq!(
            registry.resolve(&v("1.2")).unwrap(),
            "https://cdn.example.com/a"
        );
        assert!(matches!(
            registry.resolve(&v("1.3")),
            Err(RegistryError::UnknownVersion(_))
        ));
    }

    #[test]
    fn test_save_writes_newest_first() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");

        let mut registry = VersionRegistry::new();
        registry.insert(v("1.9"), "u9");
        registry.insert(v("1.10"), "u10");
        registry.insert(v("0.5"), "u05");
        registry.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let p10 = text.find("\"1.10\"").unwrap();
        let p9 = text.find("\"1.9\"").unwrap();
        let p05 = text.find("\"0.5\"").unwrap();
        assert!(p10 < p9 && p9 < p05);

        let reloaded = VersionRegistry::load(&path).unwrap();
        assert_eq!(reloaded, registry);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = VersionRegistry::load(&temp.path().join("none.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_rejects_bad_version_key() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        fs::write(&path, r#"{"latest": "https://x"}"#).unwrap();

        assert!(matches!(
            VersionRegistry::load(&path),
            Err(RegistryError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_latest_and_previous() {
        let mut registry = VersionRegistry::new();
        registry.insert(v("2.0"), "a");
        registry.insert(v("2.1"), "b");
        registry.insert(v("1.7"), "c");

        assert_eq!(registry.latest().unwrap().as_str(), "2.1");
        assert_eq!(registry.previous(&v("2.1")).unwrap().as_str(), "2.0");
        assert!(registry.previous(&v("1.7")).is_none());
    }
}
