//! INI configuration file.
//!
//! Located at `<config dir>/assetdelta/config.ini` unless a path is given
//! explicitly. Every key is optional; absent keys keep their defaults.
//!
//! ```ini
//! [paths]
//! work_dir = /srv/assetdelta
//!
//! [remote]
//! manifest_path = manifest.txt
//!
//! [download]
//! parallel = 8
//! max_retries = 5
//! backoff_ms = 500
//! timeout = 300
//!
//! [reconcile]
//! parallel = 4
//!
//! [segments]
//! delete_sources = true
//!
//! [tools]
//! extractor = unbundle --in {input} --out {output}
//! container_decoder = unpack-archive {input} -d {output}
//! codec_decoder = decode-audio {input} -o {output} --key {key}
//! container_extension = awb
//! codec_extension = hca
//! decoded_extension = wav
//! codec_key = 0011223344556677
//! parallel = 4
//!
//! [logging]
//! file = /var/log/assetdelta.log
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::fetch::{FetchConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS};
use crate::pipeline::{DecodeSettings, DEFAULT_MANIFEST_PATH};
use crate::reconcile::{ReconcileConfig, DEFAULT_HASH_CONCURRENCY};
use crate::retry::DEFAULT_INITIAL_DELAY_MS;
use crate::segment::ReassemblyOptions;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config {}: {reason}", path.display())]
    ReadFailed { path: PathBuf, reason: String },

    /// The file could not be written.
    #[error("failed to write config {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[paths]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSettings {
    /// Root of manifests, registry, diff records and delta trees.
    pub work_dir: PathBuf,
}

/// `[remote]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Manifest location relative to a release's base URL.
    pub manifest_path: String,
}

/// `[download]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub parallel: usize,
    /// Attempts per object, including the first.
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

/// `[reconcile]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub parallel: usize,
}

/// `[segments]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSettings {
    pub delete_sources: bool,
}

/// `[tools]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub extractor: Option<String>,
    pub container_decoder: Option<String>,
    pub codec_decoder: Option<String>,
    pub container_extension: String,
    pub codec_extension: String,
    pub decoded_extension: String,
    pub codec_key: Option<String>,
    /// Files decoded at once.
    pub parallel: usize,
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    pub file: Option<PathBuf>,
}

/// Typed view of `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub paths: PathSettings,
    pub remote: RemoteSettings,
    pub download: DownloadSettings,
    pub reconcile: ReconcileSettings,
    pub segments: SegmentSettings,
    pub tools: ToolSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let decode = DecodeSettings::default();
        Self {
            paths: PathSettings {
                work_dir: PathBuf::from("."),
            },
            remote: RemoteSettings {
                manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            },
            download: DownloadSettings {
                parallel: DEFAULT_CONCURRENCY,
                max_retries: DEFAULT_MAX_ATTEMPTS,
                backoff_ms: DEFAULT_INITIAL_DELAY_MS,
                timeout: DEFAULT_TIMEOUT_SECS,
            },
            reconcile: ReconcileSettings {
                parallel: DEFAULT_HASH_CONCURRENCY,
            },
            segments: SegmentSettings {
                delete_sources: true,
            },
            tools: ToolSettings {
                extractor: None,
                container_decoder: None,
                codec_decoder: None,
                container_extension: decode.container_extension,
                codec_extension: decode.codec_extension,
                decoded_extension: "wav".to_string(),
                codec_key: None,
                parallel: decode.concurrency,
            },
            logging: LoggingSettings::default(),
        }
    }
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("assetdelta")
        .join(CONFIG_FILE_NAME)
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file absent, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse an already-loaded document.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        if let Some(v) = get("paths", "work_dir") {
            config.paths.work_dir = PathBuf::from(v);
        }
        if let Some(v) = get("remote", "manifest_path") {
            config.remote.manifest_path = v;
        }

        if let Some(v) = get("download", "parallel") {
            config.download.parallel = parse_value("download", "parallel", &v)?;
        }
        if let Some(v) = get("download", "max_retries") {
            config.download.max_retries = parse_value("download", "max_retries", &v)?;
        }
        if let Some(v) = get("download", "backoff_ms") {
            config.download.backoff_ms = parse_value("download", "backoff_ms", &v)?;
        }
        if let Some(v) = get("download", "timeout") {
            config.download.timeout = parse_value("download", "timeout", &v)?;
        }
        if let Some(v) = get("reconcile", "parallel") {
            config.reconcile.parallel = parse_value("reconcile", "parallel", &v)?;
        }
        if let Some(v) = get("tools", "parallel") {
            config.tools.parallel = parse_value("tools", "parallel", &v)?;
        }
        if let Some(v) = get("segments", "delete_sources") {
            config.segments.delete_sources = parse_bool("segments", "delete_sources", &v)?;
        }

        let tools = &mut config.tools;
        tools.extractor = get("tools", "extractor");
        tools.container_decoder = get("tools", "container_decoder");
        tools.codec_decoder = get("tools", "codec_decoder");
        tools.codec_key = get("tools", "codec_key");
        if let Some(v) = get("tools", "container_extension") {
            tools.container_extension = v;
        }
        if let Some(v) = get("tools", "codec_extension") {
            tools.codec_extension = v;
        }
        if let Some(v) = get("tools", "decoded_extension") {
            tools.decoded_extension = v;
        }

        config.logging.file = get("logging", "file").map(PathBuf::from);

        for (section, value) in [
            ("download", config.download.parallel),
            ("reconcile", config.reconcile.parallel),
            ("tools", config.tools.parallel),
        ] {
            if value == 0 {
                return Err(invalid(section, "parallel", "0", "must be at least 1"));
            }
        }
        Ok(config)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("paths"))
            .set("work_dir", self.paths.work_dir.to_string_lossy());
        ini.with_section(Some("remote"))
            .set("manifest_path", self.remote.manifest_path.as_str());
        ini.with_section(Some("download"))
            .set("parallel", self.download.parallel.to_string())
            .set("max_retries", self.download.max_retries.to_string())
            .set("backoff_ms", self.download.backoff_ms.to_string())
            .set("timeout", self.download.timeout.to_string());
        ini.with_section(Some("reconcile"))
            .set("parallel", self.reconcile.parallel.to_string());
        ini.with_section(Some("segments"))
            .set("delete_sources", self.segments.delete_sources.to_string());

        let tools = &self.tools;
        ini.with_section(Some("tools"))
            .set("container_extension", tools.container_extension.as_str())
            .set("codec_extension", tools.codec_extension.as_str())
            .set("decoded_extension", tools.decoded_extension.as_str())
            .set("parallel", tools.parallel.to_string());
        for (key, value) in [
            ("extractor", &tools.extractor),
            ("container_decoder", &tools.container_decoder),
            ("codec_decoder", &tools.codec_decoder),
            ("codec_key", &tools.codec_key),
        ] {
            if let Some(value) = value {
                ini.with_section(Some("tools")).set(key, value.as_str());
            }
        }

        if let Some(file) = &self.logging.file {
            ini.with_section(Some("logging"))
                .set("file", file.to_string_lossy());
        }
        ini
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Fetcher settings from `[download]`.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new()
            .with_concurrency(self.download.parallel)
            .with_max_attempts(self.download.max_retries)
            .with_initial_backoff(Duration::from_millis(self.download.backoff_ms))
    }

    /// Per-request timeout from `[download]`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout)
    }

    /// Reconciler settings from `[reconcile]`.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig::new().with_concurrency(self.reconcile.parallel)
    }

    /// Decode stage settings from `[tools]`.
    pub fn decode_settings(&self) -> DecodeSettings {
        DecodeSettings {
            container_extension: self.tools.container_extension.clone(),
            codec_extension: self.tools.codec_extension.clone(),
            codec_key: self.tools.codec_key.clone(),
            concurrency: self.tools.parallel,
        }
    }

    /// In-place reassembly options from `[segments]`.
    pub fn reassembly_options(&self) -> ReassemblyOptions {
        ReassemblyOptions::new().with_delete_sources(self.segments.delete_sources)
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(section, key, value, &e.to_string()))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[download]\nparallel = 16\n\n[segments]\ndelete_sources = no\n\n[tools]\ncodec_key = abc\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.download.parallel, 16);
        assert_eq!(config.download.max_retries, DEFAULT_MAX_ATTEMPTS);
        assert!(!config.segments.delete_sources);
        assert_eq!(config.tools.codec_key.as_deref(), Some("abc"));
        assert_eq!(config.fetch_config().concurrency, 16);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[download]\nmax_retries = many\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("download.max_retries"));
    }

    #[test]
    fn test_zero_parallel_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[reconcile]\nparallel = 0\n").unwrap();
        assert!(ConfigFile::load_from(&path).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.ini");

        let mut config = ConfigFile::default();
        config.paths.work_dir = PathBuf::from("/srv/work");
        config.tools.extractor = Some("unbundle {input} {output}".to_string());
        config.logging.file = Some(PathBuf::from("/tmp/a.log"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_config_path_ends_with_file_name() {
        assert!(config_file_path().ends_with("assetdelta/config.ini"));
    }
}
