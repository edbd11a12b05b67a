use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{DocumentStore, MemoryStore, StoreError, WriteOperation};

/// Memory store whose reads and writes can be switched to fail
#[derive(Default)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.get(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.list(collection).await
    }

    async fn commit(&self, batch: Vec<WriteOperation>) -> Result<(), StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.delete(collection, id).await
    }
}
