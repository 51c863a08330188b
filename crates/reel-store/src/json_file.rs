use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::schema::ProjectRecord;
use crate::storage_traits::*;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    projects: Vec<ProjectRecord>,
}

/// Project store backed by a single JSON document `{"projects": [...]}`.
///
/// Every write rewrites the whole file through a temp file and rename.
/// A missing file reads as an empty store; a corrupt file is logged and
/// also reads as empty, and is replaced by the next write.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<data_dir>/database.json`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join("database.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<Document> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "project database unreadable, starting empty");
                Ok(Document::default())
            }
        }
    }

    async fn save(&self, doc: &Document) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;

            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        debug!(path = %self.path.display(), projects = doc.projects.len(), "project database written");
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn upsert(&self, record: &ProjectRecord) -> StorageResult<()> {
        check_record(record)?;
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        upsert_in(&mut doc.projects, record);
        self.save(&doc).await
    }

    async fn get(&self, id: &str) -> StorageResult<Option<ProjectRecord>> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc.projects.into_iter().find(|r| r.id == id))
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let before = doc.projects.len();
        doc.projects.retain(|r| r.id != id);
        if doc.projects.len() == before {
            return Ok(false);
        }
        self.save(&doc).await?;
        Ok(true)
    }

    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(store.list_all().await.unwrap().is_empty());

        store
            .upsert(&ProjectRecord::new("proj_1", "History", "Rome"))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["projects"][0]["id"], "proj_1");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deeper/db.json"));
        store
            .upsert(&ProjectRecord::new("proj_1", "n", "t"))
            .await
            .unwrap();
        assert!(store.path().exists());
    }
}
