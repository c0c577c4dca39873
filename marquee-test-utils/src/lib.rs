//! Marquee Test Utilities
//!
//! Shared test infrastructure for the marquee workspace:
//! - A scripted origin client that counts calls
//! - Counting fetchers for the client revalidation cache
//! - Document fixtures for reviews and toggle parents
//! - Proptest generators

use std::collections::{HashMap, HashSet};
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

// Re-export core types for convenience
pub use marquee_core::{
    ActorId, CatalogEntity, Clock, ExternalId, ManualClock, MarqueeError, MarqueeResult,
    OriginClient, OriginError, SubjectId, SubjectType, Timestamp,
};

// ============================================================================
// SCRIPTED ORIGIN
// ============================================================================

/// Origin client answering from a fixed table of payloads.
///
/// Unknown paths and paths marked failing answer `OriginError::Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedOriginClient {
    payloads: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, u32>>,
    without_credential: bool,
}

impl ScriptedOriginClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that reports no configured credential.
    pub fn without_credential() -> Self {
        Self {
            without_credential: true,
            ..Self::default()
        }
    }

    pub fn with_payload(self, path: impl Into<String>, payload: Value) -> Self {
        self.set_payload(path, payload);
        self
    }

    pub fn set_payload(&self, path: impl Into<String>, payload: Value) {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.insert(path.into(), payload);
        }
    }

    pub fn set_failing(&self, path: impl Into<String>, failing: bool) {
        if let Ok(mut set) = self.failing.lock() {
            let path = path.into();
            if failing {
                set.insert(path);
            } else {
                set.remove(&path);
            }
        }
    }

    /// Fetches made for `path`.
    pub fn calls_for(&self, path: &str) -> u32 {
        self.calls
            .lock()
            .map(|calls| calls.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Fetches made for any path.
    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl OriginClient for ScriptedOriginClient {
    fn has_credential(&self) -> bool {
        !self.without_credential
    }

    async fn fetch(&self, path: &str) -> MarqueeResult<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(path.to_string()).or_default() += 1;
        }

        let failing = self
            .failing
            .lock()
            .map(|set| set.contains(path))
            .unwrap_or(false);
        let payload = self
            .payloads
            .lock()
            .ok()
            .and_then(|payloads| payloads.get(path).cloned());

        match payload {
            Some(payload) if !failing => Ok(payload),
            _ => Err(OriginError::Unavailable {
                path: path.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into()),
        }
    }
}

// ============================================================================
// COUNTING FETCHERS
// ============================================================================

/// Shared invocation counter handed to fetchers.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

type ValueFuture = Ready<MarqueeResult<Value>>;

/// Fetcher that always succeeds with `payload`.
pub fn ok_fetcher(
    counter: &CallCounter,
    payload: Value,
) -> impl Fn() -> ValueFuture + Send + Sync + 'static {
    let counter = counter.clone();
    move || {
        counter.bump();
        ready(Ok(payload.clone()))
    }
}

/// Fetcher that always fails with a transport error.
pub fn failing_fetcher(counter: &CallCounter) -> impl Fn() -> ValueFuture + Send + Sync + 'static {
    let counter = counter.clone();
    move || {
        let attempt = counter.bump();
        ready(Err(OriginError::Unavailable {
            path: "fetcher".to_string(),
            reason: format!("attempt {} refused", attempt),
        }
        .into()))
    }
}

/// Fetcher that answers 200 with an in-band error body.
pub fn error_payload_fetcher(
    counter: &CallCounter,
) -> impl Fn() -> ValueFuture + Send + Sync + 'static {
    let counter = counter.clone();
    move || {
        counter.bump();
        ready(Ok(json!({"error": "upstream quota exceeded"})))
    }
}

/// Fetcher that fails `failures` times, then succeeds with `payload`.
pub fn flaky_fetcher(
    counter: &CallCounter,
    failures: u32,
    payload: Value,
) -> impl Fn() -> ValueFuture + Send + Sync + 'static {
    let counter = counter.clone();
    move || {
        let attempt = counter.bump();
        if attempt <= failures {
            ready(Err(OriginError::Unavailable {
                path: "fetcher".to_string(),
                reason: format!("attempt {} refused", attempt),
            }
            .into()))
        } else {
            ready(Ok(payload.clone()))
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_actor_id() -> impl Strategy<Value = ActorId> {
        any::<u128>().prop_map(|n| ActorId::new(Uuid::from_u128(n)))
    }

    pub fn arb_subject_id() -> impl Strategy<Value = SubjectId> {
        "[a-z0-9]{1,12}".prop_map(SubjectId::new)
    }

    pub fn arb_external_id() -> impl Strategy<Value = ExternalId> {
        (1u32..2_000_000).prop_map(|n| ExternalId::new(n.to_string()))
    }

    pub fn arb_subject_type() -> impl Strategy<Value = SubjectType> {
        prop_oneof![
            Just(SubjectType::Movie),
            Just(SubjectType::Show),
            Just(SubjectType::Season),
            Just(SubjectType::Episode),
        ]
    }

    /// A review document for `subject_id`; some fields fall outside the
    /// known label sets on purpose.
    pub fn arb_review(subject_id: SubjectId, subject_type: SubjectType) -> impl Strategy<Value = Value> {
        (
            0u8..=11,
            any::<bool>(),
            any::<bool>(),
            prop_oneof![
                Just("theater"),
                Just("streaming"),
                Just("physical"),
                Just("broadcast"),
                Just("airplane"),
            ],
        )
            .prop_map(move |(rating, recommended, spoilers, watched_on)| {
                fixtures::review_with(
                    &subject_id,
                    subject_type,
                    rating,
                    recommended,
                    spoilers,
                    watched_on,
                )
            })
    }

    /// Sequence of (actor index, turn on?) toggle calls over `actors` actors.
    pub fn arb_toggle_ops(actors: usize, max_len: usize) -> impl Strategy<Value = Vec<(usize, bool)>> {
        prop::collection::vec((0..actors, any::<bool>()), 0..max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Review fact with the given rating and recommendation.
    pub fn review(subject_id: &SubjectId, subject_type: SubjectType, rating: u8, recommended: bool) -> Value {
        review_with(subject_id, subject_type, rating, recommended, false, "streaming")
    }

    pub fn review_with(
        subject_id: &SubjectId,
        subject_type: SubjectType,
        rating: u8,
        recommended: bool,
        contains_spoilers: bool,
        watched_on: &str,
    ) -> Value {
        json!({
            "id": uuid::Uuid::now_v7().to_string(),
            "subject_id": subject_id,
            "subject_type": subject_type,
            "rating": rating,
            "recommended": recommended,
            "contains_spoilers": contains_spoilers,
            "watched_on": watched_on,
        })
    }

    /// Post document with a likes counter.
    pub fn post(id: &str, likes_count: i64) -> Value {
        json!({"id": id, "title": format!("post {}", id), "likes_count": likes_count})
    }

    /// Community document with a members counter.
    pub fn community(id: &str, members_count: i64) -> Value {
        json!({"id": id, "name": format!("community {}", id), "members_count": members_count})
    }

    /// `YYYY-MM-DD` for `days` before `now`.
    pub fn date_days_before(now: Timestamp, days: i64) -> String {
        (now - chrono::Duration::days(days)).format("%Y-%m-%d").to_string()
    }

    /// Movie payload as the origin returns it.
    pub fn movie_payload(id: &str, release_date: &str) -> Value {
        json!({
            "id": id,
            "title": format!("movie {}", id),
            "release_date": release_date,
            "vote_average": 7.4,
        })
    }

    /// Show payload as the origin returns it.
    pub fn show_payload(id: &str, first_air_date: &str) -> Value {
        json!({
            "id": id,
            "name": format!("show {}", id),
            "first_air_date": first_air_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counter_shared_between_clones() {
        let counter = CallCounter::new();
        let fetch = ok_fetcher(&counter, json!(1));
        let _ = fetch();
        let _ = fetch();
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_review_fixture_shape() {
        let review = fixtures::review(&SubjectId::new("603"), SubjectType::Movie, 9, true);
        assert_eq!(review["subject_id"], json!("603"));
        assert_eq!(review["subject_type"], json!("movie"));
        assert_eq!(review["rating"], json!(9));
    }
}
