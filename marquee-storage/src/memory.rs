//! In-memory document store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use marquee_core::{MarqueeResult, StorageError};
use serde_json::Value;

use crate::document::{Document, DocumentStore, Filter};

type Collections = HashMap<String, Vec<Document>>;

/// Operation counters, mostly useful for asserting how much work a cache did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `find_one` calls
    pub finds: u64,
    /// `find_many` calls
    pub scans: u64,
    /// `count_documents` calls
    pub counts: u64,
    /// Calls that mutated a collection
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    finds: AtomicU64,
    scans: AtomicU64,
    counts: AtomicU64,
    writes: AtomicU64,
}

/// In-memory document store.
///
/// Each operation holds the collection map lock for its whole duration,
/// which makes every call atomic in the same way a single-document database
/// operation is.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    counters: Counters,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data. Counters are kept.
    pub fn clear(&self) -> MarqueeResult<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> MarqueeResult<usize> {
        Ok(self.read()?.get(collection).map_or(0, Vec::len))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            finds: self.counters.finds.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            counts: self.counters.counts.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }

    /// Insert without any uniqueness check; for seeding fixtures and for
    /// simulating writes that bypass the toggle and stats paths.
    pub fn insert_raw(&self, collection: &str, document: Document) -> MarqueeResult<()> {
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    fn read(&self) -> MarqueeResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> MarqueeResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> MarqueeResult<Option<Document>> {
        Self::bump(&self.counters.finds);
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> MarqueeResult<Vec<Document>> {
        Self::bump(&self.counters.scans);
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &Filter,
        mut document: Document,
    ) -> MarqueeResult<()> {
        Self::bump(&self.counters.writes);
        filter.stamp(&mut document);

        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|doc| filter.matches(doc)) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        collection: &str,
        filter: &Filter,
        mut document: Document,
    ) -> MarqueeResult<bool> {
        filter.stamp(&mut document);

        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|doc| filter.matches(doc)) {
            return Ok(false);
        }
        docs.push(document);
        Self::bump(&self.counters.writes);
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> MarqueeResult<bool> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match docs.iter().position(|doc| filter.matches(doc)) {
            Some(index) => {
                docs.remove(index);
                Self::bump(&self.counters.writes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> MarqueeResult<u64> {
        Self::bump(&self.counters.counts);
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64))
    }

    async fn increment(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        delta: i64,
    ) -> MarqueeResult<Option<i64>> {
        let mut collections = self.write()?;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)))
        else {
            return Ok(None);
        };

        let Value::Object(map) = doc else {
            return Err(StorageError::UpdateFailed {
                collection: collection.to_string(),
                reason: "document is not an object".to_string(),
            }
            .into());
        };

        let current = match map.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| StorageError::UpdateFailed {
                collection: collection.to_string(),
                reason: format!("field {} is not an integer", field),
            })?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StorageError::UpdateFailed {
                collection: collection.to_string(),
                reason: format!("field {} would overflow", field),
            })?;
        map.insert(field.to_string(), Value::from(next));
        Self::bump(&self.counters.writes);
        Ok(Some(next))
    }

    async fn set_field(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        value: Value,
    ) -> MarqueeResult<bool> {
        let mut collections = self.write()?;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)))
        else {
            return Ok(false);
        };

        match doc {
            Value::Object(map) => {
                map.insert(field.to_string(), value);
                Self::bump(&self.counters.writes);
                Ok(true)
            }
            _ => Err(StorageError::UpdateFailed {
                collection: collection.to_string(),
                reason: "document is not an object".to_string(),
            }
            .into()),
        }
    }
}
