//! Document store boundary
//!
//! The access engine persists three independently keyed collections (pages,
//! roles and permission records) as JSON documents. The [`DocumentStore`] trait
//! is the only thing the engine knows about persistence; backends decide how the
//! documents are kept.
//!
//! Writes that must land together (a role rename moves the permission record to
//! a new key and updates the role document) go through [`DocumentStore::commit`],
//! which applies a batch of [`WriteOperation`]s atomically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod file;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Collection names used by the engine
pub mod collections {
    /// Page control rows, keyed by a generated id and carrying a `pageName` field
    pub const PAGES: &str = "pages";
    /// Role definitions, keyed by a generated id
    pub const ROLES: &str = "roles";
    /// Permission records, keyed by role name
    pub const PERMISSIONS: &str = "permissions";
}

/// In-memory shape of every collection: collection name -> document id -> document
pub type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// A single write inside an atomic batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WriteOperation {
    Put { collection: String, id: String, data: Value },
    Delete { collection: String, id: String },
}

impl WriteOperation {
    pub fn put(collection: &str, id: &str, data: Value) -> Self {
        WriteOperation::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOperation::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Apply this operation to an in-memory collection set.
    ///
    /// Returns `true` when a document was written or removed; deleting a
    /// missing document is a no-op.
    pub(crate) fn apply(self, collections: &mut Collections) -> bool {
        match self {
            WriteOperation::Put { collection, id, data } => {
                collections.entry(collection).or_default().insert(id, data);
                true
            }
            WriteOperation::Delete { collection, id } => collections
                .get_mut(&collection)
                .map(|docs| docs.remove(&id).is_some())
                .unwrap_or(false),
        }
    }
}

/// Document store trait that every backend implements
///
/// # Example
/// ```no_run
/// # use staff_access::services::store::{DocumentStore, MemoryStore, WriteOperation};
/// # use serde_json::json;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.put("roles", "r1", json!({"name": "Nurse"})).await?;
///
/// store.commit(vec![
///     WriteOperation::put("permissions", "Charge Nurse", json!({"pages": {}})),
///     WriteOperation::delete("permissions", "Nurse"),
/// ]).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// List every document of a collection, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Apply a batch of writes atomically: either every operation lands or none does
    async fn commit(&self, batch: Vec<WriteOperation>) -> Result<(), StoreError>;

    /// Delete a document, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Create or replace a document
    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.commit(vec![WriteOperation::put(collection, id, data)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_put_and_delete() {
        let mut collections = Collections::new();

        assert!(WriteOperation::put("roles", "a", json!({"name": "Nurse"})).apply(&mut collections));
        assert_eq!(collections["roles"]["a"], json!({"name": "Nurse"}));

        assert!(WriteOperation::delete("roles", "a").apply(&mut collections));
        assert!(collections["roles"].is_empty());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut collections = Collections::new();
        assert!(!WriteOperation::delete("roles", "missing").apply(&mut collections));
        assert!(!collections.contains_key("roles"));
    }

    #[test]
    fn test_store_error_messages() {
        let err = StoreError::Persistence("disk full".to_string());
        assert_eq!(err.to_string(), "Persistence failed: disk full");

        let err: StoreError = serde_json::from_str::<Value>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("Serialization failed"));
    }
}
