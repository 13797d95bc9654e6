use std::path::{Path, PathBuf};

use dimse::config::validate_ae_title;
use dimse::{DimseError, ScuConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::config::logging_config::LoggingConfig;
use crate::query::filters::FilterSet;
use crate::storage::StorageConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid AE title: {0}")]
    InvalidAeTitle(String),

    #[error("Peer host cannot be empty")]
    InvalidHost,

    #[error("Peer port must be greater than 0")]
    InvalidPort,

    #[error("Invalid SCU settings: {0}")]
    Scu(#[from] DimseError),

    #[error("Invalid storage settings: {0}")]
    Storage(String),

    #[error("Logging to file requires log_file_path")]
    MissingLogFile,
}

/// Top level configuration file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub scu: ScuConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection parameters and filters for a query run
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct QueryConfig {
    #[serde(default = "default_calling_ae_title")]
    pub calling_ae_title: String,
    #[serde(default = "default_called_ae_title")]
    pub called_ae_title: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub filters: FilterSet,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            calling_ae_title: default_calling_ae_title(),
            called_ae_title: default_called_ae_title(),
            host: default_host(),
            port: default_port(),
            filters: FilterSet::new(),
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for title in [&self.calling_ae_title, &self.called_ae_title] {
            validate_ae_title(title).map_err(|e| ConfigError::InvalidAeTitle(e.to_string()))?;
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

impl Config {
    /// Read and parse a TOML configuration file. Validation is left to the
    /// caller so command line overrides can be applied first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query.validate()?;
        self.scu.validate()?;

        if !matches!(self.storage.backend.as_str(), "filesystem" | "memory") {
            return Err(ConfigError::Storage(format!(
                "unknown backend '{}'",
                self.storage.backend
            )));
        }
        if self.logging.log_to_file && self.logging.log_file_path.trim().is_empty() {
            return Err(ConfigError::MissingLogFile);
        }
        Ok(())
    }
}

fn default_calling_ae_title() -> String {
    "DICOM-QUERY".to_string()
}

fn default_called_ae_title() -> String {
    "ANY-SCP".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    dimse::DEFAULT_DIMSE_PORT
}
