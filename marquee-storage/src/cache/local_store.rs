//! Caller-local durable key-value store behind the revalidation cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use marquee_core::{LocalCacheRecord, MarqueeResult, StorageError};

/// Durable key-value store local to the caller.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> MarqueeResult<Option<LocalCacheRecord>>;

    /// Insert or overwrite the record under `record.key`.
    async fn put(&self, record: &LocalCacheRecord) -> MarqueeResult<()>;

    /// Remove a record. Returns whether one existed.
    async fn remove(&self, key: &str) -> MarqueeResult<bool>;

    /// Number of stored records.
    async fn len(&self) -> MarqueeResult<u64>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocalStore {
    records: Arc<RwLock<HashMap<String, LocalCacheRecord>>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get(&self, key: &str) -> MarqueeResult<Option<LocalCacheRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, record: &LocalCacheRecord) -> MarqueeResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> MarqueeResult<bool> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn len(&self) -> MarqueeResult<u64> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len() as u64)
    }
}
