//! Storage trait definitions for ReelSwarm
//!
//! `ProjectStore` is the only persistence seam: a document store keyed by
//! project id with last-write-wins semantics. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::ProjectRecord;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Document store for compiled projects.
///
/// Guarantees:
/// - `upsert(record)` replaces any record with the same id wholesale.
/// - `get(id)` returns the last record written for `id`, or `None`.
/// - `delete(id)` returns whether a record was removed.
/// - `list_all()` returns records in first-insertion order.
///
/// Implementations serialize their own writes; callers may share one store
/// across concurrent runs.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or replace the record keyed by `record.id`.
    async fn upsert(&self, record: &ProjectRecord) -> StorageResult<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> StorageResult<Option<ProjectRecord>>;

    /// Remove a record by id.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// All stored records.
    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>>;
}

/// Reject records that cannot be keyed.
pub(crate) fn check_record(record: &ProjectRecord) -> StorageResult<()> {
    if record.id.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            id: record.id.clone(),
            reason: "project id must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Replace-or-append on an ordered record list.
pub(crate) fn upsert_in(records: &mut Vec<ProjectRecord>, record: &ProjectRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }
}
