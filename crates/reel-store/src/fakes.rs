//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryProjectStore`, which satisfies the `ProjectStore`
//! contract without touching the filesystem.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::ProjectRecord;
use crate::storage_traits::*;

/// In-memory project store backed by an ordered `Vec`.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    records: Mutex<Vec<ProjectRecord>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn upsert(&self, record: &ProjectRecord) -> StorageResult<()> {
        check_record(record)?;
        let mut records = self.records.lock().unwrap();
        upsert_in(&mut records, record);
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<ProjectRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}
