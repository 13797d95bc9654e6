//! Configuration types for DIMSE services

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::DEFAULT_DIMSE_PORT;

/// Configuration for the outbound (SCU) side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScuConfig {
    /// Maximum PDU size in bytes
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single DIMSE exchange in milliseconds
    #[serde(default = "default_dimse_timeout")]
    pub dimse_timeout_ms: u64,

    /// DCMTK `findscu` executable
    #[serde(default = "default_findscu")]
    pub findscu_path: PathBuf,

    /// DCMTK `echoscu` executable
    #[serde(default = "default_echoscu")]
    pub echoscu_path: PathBuf,

    /// Directory under which per-query response directories are created
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

/// Configuration for a remote DICOM node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteNode {
    /// Remote Application Entity Title
    pub ae_title: String,

    /// Remote host address
    pub host: String,

    /// Remote port
    pub port: u16,

    /// Connection timeout in milliseconds (overrides global setting)
    pub connect_timeout_ms: Option<u64>,

    /// Maximum PDU size for this node (overrides global setting)
    pub max_pdu: Option<u32>,
}

impl Default for ScuConfig {
    fn default() -> Self {
        Self {
            max_pdu: default_max_pdu(),
            connect_timeout_ms: default_connect_timeout(),
            dimse_timeout_ms: default_dimse_timeout(),
            findscu_path: default_findscu(),
            echoscu_path: default_echoscu(),
            work_dir: default_work_dir(),
        }
    }
}

impl ScuConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get DIMSE timeout as Duration
    pub fn dimse_timeout(&self) -> Duration {
        Duration::from_millis(self.dimse_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.max_pdu < 4096 || self.max_pdu > 131072 {
            return Err(crate::error::DimseError::config(
                "Max PDU size must be between 4096 and 131072 bytes",
            ));
        }

        if self.connect_timeout_ms == 0 || self.dimse_timeout_ms == 0 {
            return Err(crate::error::DimseError::config(
                "Timeouts must be greater than 0",
            ));
        }

        if !self.work_dir.exists() {
            std::fs::create_dir_all(&self.work_dir).map_err(|e| {
                crate::error::DimseError::config(format!(
                    "Failed to create work directory: {}",
                    e
                ))
            })?;
        }

        Ok(())
    }
}

impl RemoteNode {
    /// Create a new remote node configuration
    pub fn new(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ae_title: ae_title.into(),
            host: host.into(),
            port,
            connect_timeout_ms: None,
            max_pdu: None,
        }
    }

    /// Set connection timeout for this node
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate the remote node configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title(&self.ae_title)?;

        if self.host.is_empty() {
            return Err(crate::error::DimseError::config(
                "Remote host cannot be empty",
            ));
        }

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Remote port must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for RemoteNode {
    fn default() -> Self {
        Self::new("ANY-SCP", "localhost", DEFAULT_DIMSE_PORT)
    }
}

/// AE titles are 1-16 characters of the default repertoire, without backslash
pub fn validate_ae_title(ae_title: &str) -> crate::error::Result<()> {
    let trimmed = ae_title.trim();
    if trimmed.is_empty() || ae_title.len() > 16 {
        return Err(crate::error::DimseError::InvalidAeTitle(format!(
            "'{}' must be 1-16 characters",
            ae_title
        )));
    }
    if ae_title.chars().any(|c| c == '\\' || !c.is_ascii() || c.is_ascii_control()) {
        return Err(crate::error::DimseError::InvalidAeTitle(format!(
            "'{}' contains characters outside the default repertoire",
            ae_title
        )));
    }
    Ok(())
}

// Default value functions
fn default_max_pdu() -> u32 {
    16384
}

fn default_connect_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_dimse_timeout() -> u64 {
    60_000
}

fn default_findscu() -> PathBuf {
    PathBuf::from("findscu")
}

fn default_echoscu() -> PathBuf {
    PathBuf::from("echoscu")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./tmp/dimse")
}
