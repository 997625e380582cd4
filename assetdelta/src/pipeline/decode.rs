//! Decode stage: unpack containers, then decode the streams they held.
//!
//! Containers are unpacked into a directory named after the container's
//! stem; encoded streams are decoded beside themselves. Inputs are removed
//! once their output exists so the reconciler only sees decoded content.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::external::{CodecDecoder, ContainerDecoder};
use crate::retry::{is_transient_io, retry_with, RetryPolicy};

use super::error::{PipelineError, PipelineResult};
use super::summary::{DecodeFailure, DecodeSummary};

/// Default number of files decoded at once.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 4;

/// File extensions and key used by the decode stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    pub container_extension: String,
    pub codec_extension: String,
    pub codec_key: Option<String>,
    pub concurrency: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            container_extension: "awb".to_string(),
            codec_extension: "hca".to_string(),
            codec_key: None,
            concurrency: DEFAULT_DECODE_CONCURRENCY,
        }
    }
}

/// Decode every container and stream under `root`.
pub fn decode_tree(
    root: &Path,
    containers: Option<&dyn ContainerDecoder>,
    codec: Option<&dyn CodecDecoder>,
    settings: &DecodeSettings,
) -> PipelineResult<DecodeSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.concurrency.max(1))
        .thread_name(|i| format!("decode-{}", i))
        .build()
        .map_err(|e| PipelineError::PoolBuild(e.to_string()))?;

    let mut summary = DecodeSummary::default();

    if let Some(decoder) = containers {
        let files = files_with_extension(root, &settings.container_extension);
        let failures = Mutex::new(Vec::new());
        let unpacked = pool.install(|| {
            files
                .par_iter()
                .filter(|container| {
                    let output_dir = container.with_extension("");
                    let result = decoder
                        .unpack(container, &output_dir)
                        .map_err(|e| e.to_string())
                        .and_then(|()| remove_input(container));
                    record(result, container, &failures)
                })
                .count()
        });
        summary.unpacked = unpacked;
        summary.failures.extend(failures.into_inner());
    }

    if let Some(decoder) = codec {
        let files = files_with_extension(root, &settings.codec_extension);
        let key = settings.codec_key.as_deref();
        let failures = Mutex::new(Vec::new());
        let decoded = pool.install(|| {
            files
                .par_iter()
                .filter(|input| {
                    let result = decoder
                        .decode(input, key)
                        .map_err(|e| e.to_string())
                        .and_then(|output| {
                            debug!(
                                input = %input.display(),
                                output = %output.display(),
                                "Decoded stream"
                            );
                            remove_input(input)
                        });
                    record(result, input, &failures)
                })
                .count()
        });
        summary.decoded = decoded;
        summary.failures.extend(failures.into_inner());
    }

    summary.failures.sort_by(|a, b| a.path.cmp(&b.path));
    info!(
        root = %root.display(),
        unpacked = summary.unpacked,
        decoded = summary.decoded,
        failed = summary.failures.len(),
        "Decode finished"
    );
    Ok(summary)
}

fn record(result: Result<(), String>, path: &Path, failures: &Mutex<Vec<DecodeFailure>>) -> bool {
    match result {
        Ok(()) => true,
        Err(reason) => {
            warn!(path = %path.display(), error = %reason, "Decode failed");
            failures.lock().push(DecodeFailure {
                path: path.to_path_buf(),
                reason,
            });
            false
        }
    }
}

fn remove_input(path: &Path) -> Result<(), String> {
    retry_with(&RetryPolicy::locked_file(), is_transient_io, || {
        fs::remove_file(path)
    })
    .into_result()
    .map_err(|e| format!("failed to remove {}: {}", path.display(), e))
}

/// Regular files under `root` whose extension matches, case-insensitively.
fn files_with_extension(root: &Path, extension: &str) -> Vec<PathBuf> {
    let extension = extension.trim_start_matches('.');
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, ExternalResult};
    use tempfile::TempDir;

    /// Writes `track_<n>.hca` files named after the container's bytes.
    struct SplitContainer;

    impl ContainerDecoder for SplitContainer {
        fn unpack(&self, container: &Path, output_dir: &Path) -> ExternalResult<()> {
            let data = fs::read(container).map_err(|e| ExternalError::CreateDirFailed {
                path: container.to_path_buf(),
                source: e,
            })?;
            fs::create_dir_all(output_dir).unwrap();
            for (i, byte) in data.iter().enumerate() {
                fs::write(output_dir.join(format!("track_{}.hca", i)), [*byte]).unwrap();
            }
            Ok(())
        }
    }

    /// Upper-cases the input into `<stem>.wav`, failing on empty input.
    struct UpperCodec;

    impl CodecDecoder for UpperCodec {
        fn decode(&self, input: &Path, key: Option<&str>) -> ExternalResult<PathBuf> {
            let data = fs::read(input).unwrap();
            if data.is_empty() {
                return Err(ExternalError::Failed {
                    program: "upper".to_string(),
                    input: input.to_path_buf(),
                    status: "exit status: 1".to_string(),
                    stderr: "empty".to_string(),
                });
            }
            let mut out = data.to_ascii_uppercase();
            if let Some(key) = key {
                out.extend_from_slice(key.as_bytes());
            }
            let output = input.with_extension("wav");
            fs::write(&output, out).unwrap();
            Ok(output)
        }
    }

    #[test]
    fn test_unpack_then_decode() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sound")).unwrap();
        fs::write(temp.path().join("sound/bgm.awb"), b"ab").unwrap();
        fs::write(temp.path().join("voice.hca"), b"hi").unwrap();

        let settings = DecodeSettings {
            codec_key: Some("!".to_string()),
            ..DecodeSettings::default()
        };
        let summary =
            decode_tree(temp.path(), Some(&SplitContainer), Some(&UpperCodec), &settings).unwrap();

        assert_eq!(summary.unpacked, 1);
        assert_eq!(summary.decoded, 3);
        assert!(summary.failures.is_empty());
        assert!(!temp.path().join("sound/bgm.awb").exists());
        assert_eq!(fs::read(temp.path().join("sound/bgm/track_0.wav")).unwrap(), b"A!");
        assert_eq!(fs::read(temp.path().join("voice.wav")).unwrap(), b"HI!");
        assert!(!temp.path().join("voice.hca").exists());
    }

    #[test]
    fn test_failures_are_aggregated() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.hca"), b"").unwrap();
        fs::write(temp.path().join("good.HCA"), b"ok").unwrap();

        let summary =
            decode_tree(temp.path(), None, Some(&UpperCodec), &DecodeSettings::default()).unwrap();

        assert_eq!(summary.decoded, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].path, temp.path().join("bad.hca"));
        assert!(temp.path().join("bad.hca").exists());
        assert!(temp.path().join("good.wav").exists());
    }

    #[test]
    fn test_no_decoders_is_noop() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.hca"), b"x").unwrap();

        let summary = decode_tree(temp.path(), None, None, &DecodeSettings::default()).unwrap();
        assert_eq!(summary.decoded, 0);
        assert!(temp.path().join("x.hca").exists());
    }
}
