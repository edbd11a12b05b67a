use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Collections, DocumentStore, StoreError, WriteOperation};

/// Document store persisted as a single JSON snapshot file
///
/// Mutations are applied to a copy of the current state, the copy is written to
/// disk (temp file + rename), and only then swapped in. A failed write leaves
/// both the file and the in-memory state untouched.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    collections: Arc<RwLock<Collections>>,
}

impl FileStore {
    /// Open a store at `path`, loading the existing snapshot if there is one
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Collections::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No store snapshot found, starting empty");
                Collections::new()
            }
            Err(err) => {
                return Err(StoreError::Unavailable(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        debug!(
            path = %path.display(),
            collections = collections.len(),
            "Loaded store snapshot"
        );

        Ok(Self {
            path,
            collections: Arc::new(RwLock::new(collections)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, collections: &Collections) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(collections)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Persistence(e.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Persistence(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Persistence(format!("{}: {}", self.path.display(), e)))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, batch: Vec<WriteOperation>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;

        let mut next = collections.clone();
        let mut changed = false;
        for operation in batch {
            changed |= operation.apply(&mut next);
        }

        if changed {
            self.persist(&next).await?;
            *collections = next;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;

        let mut next = collections.clone();
        if !WriteOperation::delete(collection, id).apply(&mut next) {
            return Ok(false);
        }

        self.persist(&next).await?;
        *collections = next;
        Ok(true)
    }
}
