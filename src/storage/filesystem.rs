use crate::query::dataset::{link_identifier, LEVEL_TAG};
use crate::storage::{ResultIngestor, StorageError, StorageResult};
use async_trait::async_trait;
use dicom_object::InMemDicomObject;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Filesystem result store
///
/// Each record is written as DICOM JSON to
/// `<root>/<StudyInstanceUID>/<level>-<sequence>.json`. Records without a
/// usable study UID land under `unknown/`.
#[derive(Debug)]
pub struct FilesystemIngestor {
    root_path: PathBuf,
    sequence: AtomicUsize,
}

impl FilesystemIngestor {
    /// Create a new store rooted at the given path
    pub fn new<P: AsRef<Path>>(root_path: P) -> StorageResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        if !root_path.exists() {
            std::fs::create_dir_all(&root_path).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create result directory '{}': {}",
                    root_path.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            root_path,
            sequence: AtomicUsize::new(0),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.root_path
    }

    /// Relative location a record is written to
    fn record_path(&self, record: &InMemDicomObject, sequence: usize) -> PathBuf {
        let study = link_identifier(record)
            .ok()
            .filter(|uid| is_dicom_uid(uid))
            .unwrap_or_else(|| "unknown".to_string());
        let level = record
            .element(LEVEL_TAG)
            .ok()
            .and_then(|e| e.to_str().ok().map(|v| v.trim().to_lowercase()))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "record".to_string());
        PathBuf::from(study).join(format!("{}-{:06}.json", sanitize(&level), sequence))
    }
}

#[async_trait]
impl ResultIngestor for FilesystemIngestor {
    async fn insert(&self, record: InMemDicomObject) -> StorageResult<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let full_path = self.root_path.join(self.record_path(&record, sequence));

        let json = dicom_json::to_value(&record)
            .map_err(|e| StorageError::Encoding(format!("{}", e)))?;
        let bytes = serde_json::to_vec_pretty(&json)
            .map_err(|e| StorageError::Encoding(format!("{}", e)))?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, bytes).await?;
        tracing::debug!("Stored match at {}", full_path.display());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.root_path.is_dir()
    }
}

/// Dotted numeric components, at most 64 characters. Anything else coming
/// from the peer is not used as a directory name.
fn is_dicom_uid(uid: &str) -> bool {
    uid.len() <= 64
        && uid
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
