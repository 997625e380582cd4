//! Release version identifiers and next-version policies.
//!
//! Bundle releases are identified by dot-separated numeric versions such as
//! `2.4` or `5.12.1`. Versions compare component-wise, so `1.10` sorts after
//! `1.9`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid release version '{0}': expected dot-separated numbers")]
pub struct VersionParseError(pub String);

/// A dot-separated numeric release version.
///
/// The original spelling is preserved for display and file naming, while
/// ordering uses the numeric components. `1.0` and `1.0.0` are distinct
/// keys; numerically equal versions fall back to comparing their spelling.
#[derive(Debug, Clone, Eq, Hash)]
pub struct ReleaseVersion {
    raw: String,
    parts: Vec<u64>,
}

impl ReleaseVersion {
    /// Parse a version string.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }

        let parts = trimmed
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionParseError(s.to_string()))?;

        Ok(Self {
            raw: trimmed.to_string(),
            parts,
        })
    }

    /// Build a version from numeric components.
    pub fn from_parts(parts: Vec<u64>) -> Self {
        let raw = parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Self { raw, parts }
    }

    /// The numeric components.
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// The version as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        // Numerically equal; fall back to spelling so Ord agrees with Eq.
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ReleaseVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Strategy for guessing the release that follows a known one.
///
/// Release numbering is product-specific, so callers supply the rule.
pub trait VersionPolicy: Send + Sync {
    /// Propose the version expected after `current`, if the policy has one.
    fn next_after(&self, current: &ReleaseVersion) -> Option<ReleaseVersion>;
}

/// Increments the last numeric component (`1.4.2` -> `1.4.3`).
#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementLast;

impl VersionPolicy for IncrementLast {
    fn next_after(&self, current: &ReleaseVersion) -> Option<ReleaseVersion> {
        let mut parts = current.parts().to_vec();
        let last = parts.last_mut()?;
        *last = last.checked_add(1)?;
        Some(ReleaseVersion::from_parts(parts))
    }
}
