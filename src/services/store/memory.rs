use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Collections, DocumentStore, StoreError, WriteOperation};

/// In-process document store
///
/// Every collection lives behind one `RwLock`, so a batch commit is atomic with
/// respect to concurrent readers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing documents (used by the file backend and by tests)
    pub fn from_collections(collections: Collections) -> Self {
        Self {
            collections: Arc::new(RwLock::new(collections)),
        }
    }

    /// Copy of every stored document
    pub async fn snapshot(&self) -> Collections {
        self.collections.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
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
        for operation in batch {
            operation.apply(&mut collections);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(WriteOperation::delete(collection, id).apply(&mut collections))
    }
}
