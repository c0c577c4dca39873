//! Tests for the Client Revalidation Cache
//!
//! **Property: Stale-while-revalidate**
//!
//! An expired record SHALL be returned immediately while a background
//! refresh replaces it; later reads SHALL see the refreshed value.
//!
//! **Property: Retry exhaustion**
//!
//! With no cached record and a fetcher that always fails, the fetcher SHALL
//! be called exactly `retries` times and nothing SHALL be written.

use std::sync::Arc;
use std::time::Duration;

use marquee_core::LocalCacheRecord;
use marquee_storage::{
    ClientCache, FetchOptions, InMemoryLocalStore, LmdbLocalStore, LocalStore,
};
use marquee_test_utils::{
    error_payload_fetcher, failing_fetcher, flaky_fetcher, ok_fetcher, CallCounter, Clock,
    ManualClock, MarqueeError,
};
use serde_json::{json, Value};
use tempfile::TempDir;

const TTL: Duration = Duration::from_secs(300);

fn options() -> FetchOptions {
    FetchOptions::default().with_retry_delay(Duration::from_millis(2))
}

fn setup() -> (
    ClientCache<InMemoryLocalStore, ManualClock>,
    Arc<InMemoryLocalStore>,
    Arc<ManualClock>,
) {
    let store = Arc::new(InMemoryLocalStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    (
        ClientCache::new(Arc::clone(&store), Arc::clone(&clock)),
        store,
        clock,
    )
}

/// Poll until the stored payload for `key` equals `expected`.
async fn wait_for_payload<L: LocalStore>(store: &L, key: &str, expected: &Value) -> bool {
    for _ in 0..200 {
        if let Ok(Some(record)) = store.get(key).await {
            if &record.payload == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_stale_value_served_then_refreshed() {
    let (cache, store, clock) = setup();
    store
        .put(&LocalCacheRecord::new("trending", json!({"v": "old"}), clock.now()))
        .await
        .expect("seed");
    clock.advance(chrono::Duration::minutes(10));

    let counter = CallCounter::new();
    let stale: Value = cache
        .fetch_cached("trending", ok_fetcher(&counter, json!({"v": "new"})), TTL, options())
        .await
        .expect("stale read");
    assert_eq!(stale, json!({"v": "old"}));

    assert!(wait_for_payload(store.as_ref(), "trending", &json!({"v": "new"})).await);
    assert_eq!(counter.count(), 1);

    let untouched = CallCounter::new();
    let refreshed: Value = cache
        .fetch_cached("trending", ok_fetcher(&untouched, json!({"v": "newer"})), TTL, options())
        .await
        .expect("fresh read");
    assert_eq!(refreshed, json!({"v": "new"}));
    assert_eq!(untouched.count(), 0);
    assert_eq!(cache.stats().stale_served, 1);
}

#[tokio::test]
async fn test_failed_background_refresh_keeps_stale_record() {
    let (cache, store, clock) = setup();
    let seeded_at = clock.now();
    store
        .put(&LocalCacheRecord::new("k", json!("old"), seeded_at))
        .await
        .expect("seed");
    clock.advance(chrono::Duration::minutes(10));

    let counter = CallCounter::new();
    let value: Value = cache
        .fetch_cached("k", error_payload_fetcher(&counter), TTL, options())
        .await
        .expect("stale read");
    assert_eq!(value, json!("old"));

    for _ in 0..200 {
        if counter.count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let record = store.get("k").await.expect("get").expect("still cached");
    assert_eq!(record.payload, json!("old"));
    assert_eq!(record.timestamp, seeded_at);
}

#[tokio::test]
async fn test_retry_exhaustion_calls_fetcher_exactly_retries_times() {
    let (cache, store, _clock) = setup();
    let counter = CallCounter::new();

    let result: Result<Value, MarqueeError> = cache
        .fetch_cached("k", failing_fetcher(&counter), TTL, options().with_retries(3))
        .await;

    let err = result.expect_err("every attempt fails");
    assert!(err.to_string().contains("after 3 attempts"));
    assert_eq!(counter.count(), 3);
    assert!(store.get("k").await.expect("get").is_none());
    assert_eq!(store.len().await.expect("len"), 0);
}

#[tokio::test]
async fn test_error_payloads_exhaust_like_failures() {
    let (cache, store, _clock) = setup();
    let counter = CallCounter::new();

    let result: Result<Value, MarqueeError> = cache
        .fetch_cached("k", error_payload_fetcher(&counter), TTL, options().with_retries(2))
        .await;

    assert!(result.is_err());
    assert_eq!(counter.count(), 2);
    assert!(store.get("k").await.expect("get").is_none());
}

#[tokio::test]
async fn test_flaky_fetcher_succeeds_within_budget() {
    let (cache, store, _clock) = setup();
    let counter = CallCounter::new();

    let value: Value = cache
        .fetch_cached("k", flaky_fetcher(&counter, 2, json!([1, 2, 3])), TTL, options())
        .await
        .expect("third attempt succeeds");

    assert_eq!(value, json!([1, 2, 3]));
    assert_eq!(counter.count(), 3);
    assert_eq!(store.get("k").await.expect("get").expect("stored").payload, json!([1, 2, 3]));
}

#[tokio::test]
async fn test_linear_backoff_between_attempts() {
    let (cache, _store, _clock) = setup();
    let counter = CallCounter::new();
    let started = std::time::Instant::now();

    let _: Result<Value, MarqueeError> = cache
        .fetch_cached(
            "k",
            failing_fetcher(&counter),
            TTL,
            FetchOptions::default()
                .with_retries(3)
                .with_retry_delay(Duration::from_millis(20)),
        )
        .await;

    // 20ms after attempt 1, 40ms after attempt 2, none after the last.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_durable_store_survives_cache_rebuild() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let clock = Arc::new(ManualClock::starting_now());
    let counter = CallCounter::new();

    {
        let store = Arc::new(LmdbLocalStore::open(temp_dir.path(), 10).expect("open"));
        let cache = ClientCache::new(store, Arc::clone(&clock));
        let _: Value = cache
            .fetch_cached("genres", ok_fetcher(&counter, json!(["drama"])), TTL, options())
            .await
            .expect("initial fetch");
    }

    let store = Arc::new(LmdbLocalStore::open(temp_dir.path(), 10).expect("reopen"));
    let cache = ClientCache::new(store, clock);
    let value: Value = cache
        .fetch_cached("genres", ok_fetcher(&counter, json!(["comedy"])), TTL, options())
        .await
        .expect("cached read");

    assert_eq!(value, json!(["drama"]));
    assert_eq!(counter.count(), 1);
}
