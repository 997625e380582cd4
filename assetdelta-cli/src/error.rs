//! CLI error type.

use std::fmt;

use assetdelta::config::ConfigError;
use assetdelta::logging::LoggingError;
use assetdelta::pipeline::PipelineError;
use assetdelta::registry::RegistryError;

/// Errors surfaced to the user. Any of them ends the process with exit code 1.
#[derive(Debug)]
pub enum CliError {
    /// Missing or inconsistent arguments and settings.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Registry(RegistryError),
    Pipeline(PipelineError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Registry(e) => write!(f, "Registry error: {}", e),
            CliError::Pipeline(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Registry(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}
