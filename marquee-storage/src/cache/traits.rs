//! Cache statistics and the payload marker trait.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Payloads the client revalidation cache can hold.
///
/// A payload may carry an in-band error marker (an upstream that answers
/// 200 with `{"error": ...}`). Such payloads count as failed fetches and
/// are never written to the local store.
pub trait CachePayload: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn is_error(&self) -> bool {
        false
    }
}

impl CachePayload for Value {
    fn is_error(&self) -> bool {
        self.get("error").is_some_and(|flag| !flag.is_null() && flag != &Value::Bool(false))
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads that found nothing usable and went to the source.
    pub misses: u64,
    /// Reads answered with an expired entry while a refresh ran.
    pub stale_served: u64,
    /// Successful writes of fresh data.
    pub refreshes: u64,
    /// Source calls that failed.
    pub failures: u64,
}

impl CacheStats {
    /// Fraction of reads answered from cache (stale answers included), 0.0 to 1.0.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_served;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
