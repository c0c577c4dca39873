//! Origin cache manager.
//!
//! Fronts the rate-limited catalog origin with one persisted [`CacheEntry`]
//! per (entity kind, external id). Entry lifetime comes from [`TtlPolicy`]
//! applied to the payload's own reference date.
//!
//! A hit never contacts the origin. A miss (absent or expired entry) makes
//! exactly one synchronous origin call. Origin failures are surfaced as-is;
//! an expired entry is never served.
//!
//! Concurrent misses for the same id may both fetch and both upsert. The
//! upsert is idempotent, so the last write wins and the entry converges.

use std::sync::Arc;

use marquee_core::{
    CacheEntry, CatalogEntity, Clock, ExternalId, MarqueeError, MarqueeResult, OriginClient,
};
use serde_json::Value;

use super::freshness::CacheRead;
use super::traits::{CacheStats, StatsRecorder};
use super::ttl::TtlPolicy;
use crate::document::{decode, encode, DocumentStore, Filter};

/// Collection holding cached payloads for one entity kind.
pub fn collection_name(entity: CatalogEntity) -> String {
    format!("origin_cache_{}", entity.as_str())
}

fn entry_filter(external_id: &ExternalId) -> Filter {
    Filter::new().eq("external_id", external_id)
}

/// Persisted read-through cache in front of an [`OriginClient`].
///
/// # Type Parameters
///
/// - `S`: document store holding the cache entries
/// - `O`: origin client used on miss
/// - `C`: clock for every age computation
pub struct OriginCache<S, O, C>
where
    S: DocumentStore,
    O: OriginClient,
    C: Clock,
{
    store: Arc<S>,
    origin: Arc<O>,
    clock: Arc<C>,
    policy: TtlPolicy,
    stats: StatsRecorder,
}

impl<S, O, C> OriginCache<S, O, C>
where
    S: DocumentStore,
    O: OriginClient,
    C: Clock,
{
    pub fn new(store: Arc<S>, origin: Arc<O>, clock: Arc<C>, policy: TtlPolicy) -> Self {
        Self {
            store,
            origin,
            clock,
            policy,
            stats: StatsRecorder::default(),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Payload for `external_id`, from cache when fresh, else from the origin.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingRequired` when no origin credential is configured
    /// - the origin's error when a fetch was needed and failed
    pub async fn get(
        &self,
        entity: CatalogEntity,
        external_id: &ExternalId,
    ) -> MarqueeResult<Value> {
        self.read(entity, external_id).await.map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), also reporting when the payload was cached
    /// and whether the origin was contacted.
    pub async fn read(
        &self,
        entity: CatalogEntity,
        external_id: &ExternalId,
    ) -> MarqueeResult<CacheRead<Value>> {
        if !self.origin.has_credential() {
            return Err(MarqueeError::missing_credential());
        }

        let collection = collection_name(entity);
        let filter = entry_filter(external_id);

        if let Some(entry) = self.lookup(&collection, &filter).await {
            let now = self.clock.now();
            let ttl = self.policy.ttl(entity.reference_date(&entry.payload), now);
            if entry.age(now) < ttl {
                self.stats.hit();
                tracing::debug!(
                    entity = %entity,
                    external_id = %external_id,
                    age_secs = entry.age(now).as_secs(),
                    ttl_secs = ttl.as_secs(),
                    "Origin cache hit"
                );
                return Ok(CacheRead::from_cache(entry.payload, entry.cached_at));
            }
            tracing::debug!(entity = %entity, external_id = %external_id, "Origin cache entry expired");
        }

        self.stats.miss();
        let payload = match self.origin.fetch(&entity.path(external_id)).await {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failure();
                tracing::warn!(
                    entity = %entity,
                    external_id = %external_id,
                    error = %e,
                    "Origin fetch failed"
                );
                return Err(e);
            }
        };

        let fetched_at = self.clock.now();
        let entry = CacheEntry::new(external_id.clone(), payload, fetched_at);
        match encode(&collection, &entry) {
            Ok(document) => match self.store.upsert(&collection, &filter, document).await {
                Ok(()) => self.stats.refresh(),
                Err(e) => tracing::warn!(
                    collection = %collection,
                    external_id = %external_id,
                    error = %e,
                    "Failed to persist origin cache entry"
                ),
            },
            Err(e) => tracing::warn!(collection = %collection, error = %e, "Failed to encode origin cache entry"),
        }

        Ok(CacheRead::from_source(entry.payload, fetched_at))
    }

    /// Cached entry, treating lookup errors and undecodable documents as a miss.
    async fn lookup(&self, collection: &str, filter: &Filter) -> Option<CacheEntry> {
        let document = match self.store.find_one(collection, filter).await {
            Ok(document) => document?,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Origin cache lookup failed");
                return None;
            }
        };

        match decode::<CacheEntry>(collection, document) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Discarding unreadable origin cache entry");
                None
            }
        }
    }
}
