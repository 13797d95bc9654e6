use async_trait::async_trait;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemIngestor;
pub use memory::MemoryIngestor;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Path error: {0}")]
    Path(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for matched query records.
///
/// Ownership of each record moves into the ingestor. The query run only logs
/// a failed insert; it never retries or stops because of one.
#[async_trait]
pub trait ResultIngestor: Send + Sync {
    /// Persist one matched record
    async fn insert(&self, record: InMemDicomObject) -> StorageResult<()>;

    /// Whether the store is ready to accept records
    fn is_open(&self) -> bool {
        true
    }
}

/// Configuration for the result store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
        }
    }
}

fn default_backend() -> String {
    "filesystem".to_string()
}

fn default_path() -> PathBuf {
    PathBuf::from("./tmp/query-results")
}

/// Create a result store from configuration
pub fn create_ingestor(config: &StorageConfig) -> StorageResult<Arc<dyn ResultIngestor>> {
    match config.backend.as_str() {
        "filesystem" => Ok(Arc::new(FilesystemIngestor::new(&config.path)?)),
        "memory" => Ok(Arc::new(MemoryIngestor::new())),
        _ => Err(StorageError::Config(format!(
            "Unknown storage backend: {}",
            config.backend
        ))),
    }
}
