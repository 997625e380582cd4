//! In-memory manifest snapshots.
//!
//! A manifest maps every asset path of one release to its content hash. The
//! snapshot text is semi-structured: each interesting line carries a path
//! token followed by an `@`-prefixed 64-character hex digest, and anything
//! else on the line (or any line without such a pair) is ignored:
//!
//! ```text
//! # bundle 5.12
//! assets/audio/bgm_01.acb @3f9a...e1   size=88112
//! "assets/ui/atlas.bin" @0c4d...7b
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use super::error::{ManifestError, ManifestResult};

/// Length of a hex SHA-256 digest as it appears in snapshot text.
pub const HASH_HEX_LEN: usize = 64;

/// Content hash of one asset, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap a digest string, normalizing case.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    /// The digest as lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pattern matching one `path @hash` pair.
///
/// - path: a quoted string that may contain spaces, or a run of non-space
///   characters
/// - an optional `:` or `,` separator
/// - `@` followed by exactly 64 hex characters not followed by more hex
fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?:"(?P<dq>[^"@]+)"|'(?P<sq>[^'@]+)'|(?P<bare>[^\s"'@,]+))"#,
            r#"\s*[:,]?\s*@(?P<hash>[0-9A-Fa-f]{64})(?:[^0-9A-Fa-f]|$)"#,
        ))
        .unwrap()
    })
}

/// One release snapshot: asset path -> content hash, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashedManifest {
    entries: BTreeMap<String, ContentHash>,
}

impl HashedManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from `(path, hash)` pairs; later pairs win.
    pub fn from_entries<I, P, H>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, H)>,
        P: Into<String>,
        H: Into<String>,
    {
        let mut manifest = Self::new();
        for (path, hash) in entries {
            manifest.insert(path, ContentHash::new(hash));
        }
        manifest
    }

    /// Parse snapshot text.
    ///
    /// `origin` names the source in error messages. Text with no recognizable
    /// entries is an error rather than an empty manifest.
    pub fn parse(text: &str, origin: &str) -> ManifestResult<Self> {
        let pattern = entry_pattern();
        let mut manifest = Self::new();
        let mut ignored = 0usize;

        for line in text.lines() {
            match pattern.captures(line) {
                Some(caps) => {
                    let path = ["dq", "sq", "bare"]
                        .iter()
                        .find_map(|name| caps.name(name))
                        .map_or("", |m| m.as_str())
                        .trim_start_matches("./");
                    if path.is_empty() {
                        ignored += 1;
                        continue;
                    }
                    if let Some(previous) =
                        manifest.insert(path, ContentHash::new(&caps["hash"]))
                    {
                        trace!(path, previous = %previous, "Duplicate manifest path, keeping last");
                    }
                }
                None => ignored += 1,
            }
        }

        if manifest.is_empty() {
            return Err(ManifestError::Empty {
                origin: origin.to_string(),
            });
        }

        debug!(
            origin,
            entries = manifest.len(),
            ignored_lines = ignored,
            "Parsed manifest"
        );
        Ok(manifest)
    }

    /// Read and parse a snapshot file.
    pub fn from_file(path: &Path) -> ManifestResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Insert an entry, returning the hash it replaced.
    pub fn insert(&mut self, path: impl Into<String>, hash: ContentHash) -> Option<ContentHash> {
        self.entries.insert(path.into(), hash)
    }

    /// Look up the hash of a path.
    pub fn get(&self, path: &str) -> Option<&ContentHash> {
        self.entries.get(path)
    }

    /// Whether the manifest lists a path.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContentHash)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(c: char) -> String {
        std::iter::repeat(c).take(HASH_HEX_LEN).collect()
    }

    #[test]
    fn test_parse_plain_lines() {
        let text = format!(
            "assets/a.bin @{}\nassets/b.bin @{}\n",
            hex('a'),
            hex('b')
        );
        let manifest = HashedManifest::parse(&text, "test").unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("assets/a.bin").unwrap().as_str(), hex('a'));
    }

    #[test]
    fn test_parse_ignores_noise() {
        let text = format!(
            "# header line\n\n\"ui/atlas.bin\" @{}  size=12\nnot an entry @abc\ntrailing garbage\n",
            hex('C')
        );
        let manifest = HashedManifest::parse(&text, "test").unwrap();

        assert_eq!(manifest.len(), 1);
        // Uppercase digests normalize to lowercase
        assert_eq!(manifest.get("ui/atlas.bin").unwrap().as_str(), hex('c'));
    }

    #[test]
    fn test_parse_quoted_path_with_spaces() {
        let text = format!(
            "\"dir name/a.bin\" @{}\n'b c.bin': @{}\n",
            hex('a'),
            hex('b')
        );
        let manifest = HashedManifest::parse(&text, "test").unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(manifest.get("dir name/a.bin").is_some());
        assert!(manifest.get("b c.bin").is_some());
        assert!(manifest.get("name/a.bin").is_none());
    }

    #[test]
    fn test_parse_rejects_overlong_hash() {
        let text = format!("a.bin @{}0\n", hex('a'));
        assert!(HashedManifest::parse(&text, "test").is_err());
    }

    #[test]
    fn test_parse_last_occurrence_wins() {
        let text = format!("x.bin @{}\nx.bin @{}\n", hex('1'), hex('2'));
        let manifest = HashedManifest::parse(&text, "test").unwrap();

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("x.bin").unwrap().as_str(), hex('2'));
    }

    #[test]
    fn test_parse_paths_are_case_sensitive() {
        let text = format!("A.bin @{}\na.bin @{}\n", hex('1'), hex('2'));
        let manifest = HashedManifest::parse(&text, "test").unwrap();
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_parse_empty_is_error() {
        let result = HashedManifest::parse("# nothing here\n", "empty.txt");
        assert!(matches!(result, Err(ManifestError::Empty { .. })));
    }

    #[test]
    fn test_from_file_missing() {
        let result = HashedManifest::from_file(Path::new("/nonexistent/manifest.txt"));
        assert!(matches!(result, Err(ManifestError::ReadFailed { .. })));
    }

    #[test]
    fn test_from_entries() {
        let manifest = HashedManifest::from_entries([("x.bin", "h1"), ("y.bin", "h2")]);
        assert!(manifest.contains("x.bin"));
        assert_eq!(manifest.iter().count(), 2);
    }
}
