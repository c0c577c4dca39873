//! Client revalidation cache.
//!
//! A caller-local cache in front of an arbitrary fetch function, with
//! stale-while-revalidate and bounded retry with linear backoff.
//!
//! # Read path
//!
//! 1. Fresh, non-error record: returned without calling the fetcher.
//! 2. Expired record with stale-while-revalidate on: the stale value is
//!    returned at once and a detached task calls the fetcher once, writing
//!    the result if it is error-free. The task has no handle and reports
//!    nothing back. It is best-effort and may be dropped on shutdown.
//! 3. Otherwise: the fetcher is called up to `retries` times, waiting
//!    `retry_delay * attempt` between attempts. The first error-free result
//!    is written and returned.
//!
//! The local store never receives an error-flagged payload. Concurrent
//! callers for one key are not deduplicated; each may refresh or retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use marquee_core::{ClientCacheDefaults, Clock, FetchError, LocalCacheRecord, MarqueeResult};

use super::local_store::LocalStore;
use super::traits::{CachePayload, CacheStats, StatsRecorder};

/// Per-call options for [`ClientCache::fetch_cached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum synchronous attempts. Zero is treated as one.
    pub retries: u32,
    /// Base delay; attempt `n` is followed by a wait of `retry_delay * n`.
    pub retry_delay: Duration,
    /// Skip the cached record and fetch synchronously.
    pub force_refresh: bool,
    /// Serve expired records while refreshing in the background.
    pub stale_while_revalidate: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&ClientCacheDefaults::default())
    }
}

impl From<&ClientCacheDefaults> for FetchOptions {
    fn from(defaults: &ClientCacheDefaults) -> Self {
        Self {
            retries: defaults.retries,
            retry_delay: defaults.retry_delay,
            force_refresh: false,
            stale_while_revalidate: defaults.stale_while_revalidate,
        }
    }
}

impl FetchOptions {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

/// Stale-while-revalidate cache over a [`LocalStore`].
pub struct ClientCache<L, C>
where
    L: LocalStore + 'static,
    C: Clock + 'static,
{
    store: Arc<L>,
    clock: Arc<C>,
    stats: Arc<StatsRecorder>,
}

impl<L, C> Clone for ClientCache<L, C>
where
    L: LocalStore + 'static,
    C: Clock + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<L, C> ClientCache<L, C>
where
    L: LocalStore + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<L>, clock: Arc<C>) -> Self {
        Self {
            store,
            clock,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Value for `key`, from the local store or from `fetcher`.
    ///
    /// Fails only when every attempt failed and no earlier value for `key`
    /// is stored; an expired value is returned in preference to an error.
    pub async fn fetch_cached<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Duration,
        options: FetchOptions,
    ) -> MarqueeResult<T>
    where
        T: CachePayload,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MarqueeResult<T>> + Send + 'static,
    {
        let cached = self.load::<T>(key).await;

        if let Some((value, record)) = &cached {
            if !options.force_refresh {
                if !record.is_expired(self.clock.now(), ttl) {
                    self.stats.hit();
                    tracing::debug!(key = %key, "Client cache hit");
                    return Ok(value.clone());
                }
                if options.stale_while_revalidate {
                    self.stats.stale();
                    tracing::debug!(key = %key, "Serving stale value, refreshing in background");
                    self.spawn_refresh(key.to_string(), fetcher);
                    return Ok(value.clone());
                }
            }
        }

        self.stats.miss();
        let attempts = options.attempts();
        let mut last = FetchError::Transient {
            key: key.to_string(),
            reason: "no attempt made".to_string(),
        };

        for attempt in 1..=attempts {
            match fetcher().await {
                Ok(value) if !value.is_error() => {
                    store_value(self.store.as_ref(), self.clock.as_ref(), key, &value).await;
                    self.stats.refresh();
                    return Ok(value);
                }
                Ok(_) => {
                    last = FetchError::ErrorPayload {
                        key: key.to_string(),
                    };
                }
                Err(e) => {
                    last = FetchError::Transient {
                        key: key.to_string(),
                        reason: e.to_string(),
                    };
                }
            }

            self.stats.failure();
            tracing::debug!(key = %key, attempt, attempts, error = %last, "Fetch attempt failed");
            if attempt < attempts {
                tokio::time::sleep(options.retry_delay * attempt).await;
            }
        }

        if let Some((value, _)) = cached {
            tracing::warn!(key = %key, attempts, error = %last, "Fetch failed, serving stale value");
            return Ok(value);
        }

        tracing::warn!(key = %key, attempts, error = %last, "Fetch failed with nothing cached");
        Err(FetchError::Exhausted {
            key: key.to_string(),
            attempts,
            last: last.to_string(),
        }
        .into())
    }

    /// Stored, decodable, non-error value for `key`.
    async fn load<T: CachePayload>(&self, key: &str) -> Option<(T, LocalCacheRecord)> {
        let record = match self.store.get(key).await {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Local cache read failed");
                return None;
            }
        };

        match serde_json::from_value::<T>(record.payload.clone()) {
            Ok(value) if !value.is_error() => Some((value, record)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable local cache record");
                None
            }
        }
    }

    fn spawn_refresh<T, F, Fut>(&self, key: String, fetcher: F)
    where
        T: CachePayload,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MarqueeResult<T>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            match fetcher().await {
                Ok(value) if !value.is_error() => {
                    store_value(store.as_ref(), clock.as_ref(), &key, &value).await;
                    stats.refresh();
                    tracing::debug!(key = %key, "Background refresh stored");
                }
                Ok(_) => {
                    stats.failure();
                    tracing::debug!(key = %key, "Background refresh returned an error payload");
                }
                Err(e) => {
                    stats.failure();
                    tracing::debug!(key = %key, error = %e, "Background refresh failed");
                }
            }
        });
    }
}

/// Write a fetched value. Failures are logged; the caller still gets the value.
async fn store_value<L, C, T>(store: &L, clock: &C, key: &str, value: &T)
where
    L: LocalStore + ?Sized,
    C: Clock + ?Sized,
    T: CachePayload,
{
    let payload = match serde_json::to_value(value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to encode fetched value");
            return;
        }
    };

    let record = LocalCacheRecord::new(key, payload, clock.now());
    if let Err(e) = store.put(&record).await {
        tracing::warn!(key = %key, error = %e, "Failed to write local cache record");
    }
}
