//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use marquee_core::{HealthCheck, HealthReport, MarqueeResult, SystemClock};
use marquee_origin::HttpOriginClient;
use marquee_storage::{
    ClientCache, DocumentStore, FetchOptions, LmdbLocalStore, LocalStore, OriginCache,
    StatsCache, StatsSchema, ToggleCounter, ToggleSpec, TtlPolicy,
};

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::identity::Identity;
use crate::rate_limit::RateLimitState;

pub type ApiOriginCache<S> = OriginCache<S, HttpOriginClient, SystemClock>;

/// Client cache over the durable LMDB store.
pub type ApiClientCache = ClientCache<LmdbLocalStore, SystemClock>;

pub type ApiStatsCache<S> = StatsCache<S, SystemClock>;

pub type ApiToggleCounter<S> = ToggleCounter<S, SystemClock>;

/// One maintainer per toggle kind, all writing through the same store.
pub struct Toggles<S: DocumentStore> {
    pub post_likes: ApiToggleCounter<S>,
    pub comment_likes: ApiToggleCounter<S>,
    pub review_likes: ApiToggleCounter<S>,
    pub community_members: ApiToggleCounter<S>,
}

impl<S: DocumentStore> Toggles<S> {
    fn new(store: &Arc<S>, clock: &Arc<SystemClock>) -> Self {
        let counter = |spec: ToggleSpec| ToggleCounter::new(Arc::clone(store), Arc::clone(clock), spec);
        Self {
            post_likes: counter(ToggleSpec::POST_LIKES),
            comment_likes: counter(ToggleSpec::COMMENT_LIKES),
            review_likes: counter(ToggleSpec::REVIEW_LIKES),
            community_members: counter(ToggleSpec::COMMUNITY_MEMBERS),
        }
    }

    /// Every maintainer, for sweeps such as counter reconciliation.
    pub fn all(&self) -> [&ApiToggleCounter<S>; 4] {
        [
            &self.post_likes,
            &self.comment_likes,
            &self.review_likes,
            &self.community_members,
        ]
    }
}

/// Application-wide state shared across request handlers.
///
/// Built once at startup; every component is explicit state owned here,
/// including the rate limiter windows.
pub struct AppState<S: DocumentStore> {
    pub config: Arc<ApiConfig>,
    pub documents: Arc<S>,
    pub origin: Arc<HttpOriginClient>,
    pub origin_cache: Arc<ApiOriginCache<S>>,
    pub client_cache: ApiClientCache,
    pub review_stats: Arc<ApiStatsCache<S>>,
    pub toggles: Arc<Toggles<S>>,
    pub rate_limits: RateLimitState,
    pub start_time: Instant,
}

impl<S: DocumentStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            documents: Arc::clone(&self.documents),
            origin: Arc::clone(&self.origin),
            origin_cache: Arc::clone(&self.origin_cache),
            client_cache: self.client_cache.clone(),
            review_stats: Arc::clone(&self.review_stats),
            toggles: Arc::clone(&self.toggles),
            rate_limits: self.rate_limits.clone(),
            start_time: self.start_time,
        }
    }
}

impl<S: DocumentStore> AppState<S> {
    /// Validate the configuration and build every component.
    ///
    /// A missing origin credential is not an error here; origin-backed
    /// reads fail individually instead.
    pub fn new(config: ApiConfig, documents: Arc<S>) -> MarqueeResult<Self> {
        config.validate()?;

        let clock = Arc::new(SystemClock);
        let origin = Arc::new(HttpOriginClient::new(&config.origin)?);
        let origin_cache = OriginCache::new(
            Arc::clone(&documents),
            Arc::clone(&origin),
            Arc::clone(&clock),
            TtlPolicy::new(config.cache.ttl.clone()),
        );

        let local = LmdbLocalStore::open(&config.lmdb_path, config.lmdb_map_size_mb)?;
        let client_cache = ClientCache::new(Arc::new(local), Arc::clone(&clock));

        let review_stats = StatsCache::new(
            Arc::clone(&documents),
            Arc::clone(&clock),
            StatsSchema::reviews(),
        );
        let toggles = Toggles::new(&documents, &clock);

        if !config.origin.has_credential() {
            tracing::warn!("No origin API key configured; catalog reads will fail");
        }
        tracing::info!(
            origin = %origin.base_url(),
            lmdb_path = %config.lmdb_path.display(),
            rate_limit_enabled = config.rate_limit_enabled,
            "Application state initialized"
        );

        Ok(Self {
            rate_limits: RateLimitState::new(&config),
            config: Arc::new(config),
            documents,
            origin,
            origin_cache: Arc::new(origin_cache),
            client_cache,
            review_stats: Arc::new(review_stats),
            toggles: Arc::new(toggles),
            start_time: Instant::now(),
        })
    }

    /// Default fetch options for the client cache.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::from(&self.config.cache.client)
    }

    /// Admit one request from `identity` under its rate limit.
    pub fn admit(&self, identity: &Identity) -> ApiResult<()> {
        self.rate_limits.check(identity)?;
        Ok(())
    }

    /// Probe the origin and the local store.
    pub async fn health(&self) -> HealthReport {
        let origin = self.origin.health_check().await;

        let started = Instant::now();
        let local = match self.client_cache.store().len().await {
            Ok(entries) => HealthCheck::healthy("local_store")
                .with_metadata("entries", serde_json::Value::from(entries)),
            Err(e) => HealthCheck::unhealthy("local_store", e.to_string()),
        }
        .with_response_time(started.elapsed().as_millis() as i64);

        HealthReport::from_checks(vec![origin, local])
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
