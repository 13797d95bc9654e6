use crate::storage::{ResultIngestor, StorageResult};
use async_trait::async_trait;
use dicom_object::InMemDicomObject;
use std::sync::Mutex;

/// Keeps matched records in memory, in insertion order
#[derive(Debug, Default)]
pub struct MemoryIngestor {
    records: Mutex<Vec<InMemDicomObject>>,
}

impl MemoryIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record stored so far
    pub fn records(&self) -> Vec<InMemDicomObject> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultIngestor for MemoryIngestor {
    async fn insert(&self, record: InMemDicomObject) -> StorageResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| crate::storage::StorageError::Path(format!("record list poisoned: {}", e)))?;
        records.push(record);
        Ok(())
    }
}
