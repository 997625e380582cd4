//! Segment filename conventions.
//!
//! Two conventions are recognized, both carrying a decimal ordinal:
//!
//! | File name        | Identity    | Ordinal |
//! |------------------|-------------|---------|
//! | `voice-003.acb`  | `voice.acb` | 3       |
//! | `voice.acb.003`  | `voice.acb` | 3       |
//! | `voice.acb`      | `voice.acb` | 0       |
//!
//! A trailing numeric extension takes precedence over a `-NNN` stem suffix.

/// Longest digit run accepted as an ordinal.
const MAX_ORDINAL_DIGITS: usize = 6;

/// A file name split into its logical identity and segment ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    /// Name of the reassembled artifact.
    pub identity: String,
    /// Position within the artifact; 0 for an unsuffixed name.
    pub ordinal: u32,
}

impl SegmentName {
    /// Whether the name carried an explicit ordinal.
    pub fn is_suffixed(&self) -> bool {
        self.ordinal != 0
    }
}

/// Parse a file name according to the segment conventions.
pub fn parse_segment_name(file_name: &str) -> SegmentName {
    if let Some(parsed) = parse_numeric_extension(file_name) {
        return parsed;
    }
    if let Some(parsed) = parse_dash_suffix(file_name) {
        return parsed;
    }
    SegmentName {
        identity: file_name.to_string(),
        ordinal: 0,
    }
}

/// `name.ext.003`
fn parse_numeric_extension(file_name: &str) -> Option<SegmentName> {
    let (stem, digits) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ordinal = parse_ordinal(digits)?;
    Some(SegmentName {
        identity: stem.to_string(),
        ordinal,
    })
}

/// `name-003.ext` (or `name-003` without extension)
fn parse_dash_suffix(file_name: &str) -> Option<SegmentName> {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let (base, digits) = stem.rsplit_once('-')?;
    if base.is_empty() {
        return None;
    }
    let ordinal = parse_ordinal(digits)?;

    let identity = match ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    };
    Some(SegmentName { identity, ordinal })
}

fn parse_ordinal(digits: &str) -> Option<u32> {
    if digits.is_empty()
        || digits.len() > MAX_ORDINAL_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}
