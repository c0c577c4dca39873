//! Persisted record shapes owned by the cache layer.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{ActorId, ExternalId, SubjectId, SubjectType, Timestamp};

/// Elapsed time from `since` to `now`, clamped at zero.
pub fn age_between(since: Timestamp, now: Timestamp) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// One origin payload cached in the document store.
///
/// There is exactly one entry per (entity kind, external id); refreshes
/// overwrite it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub external_id: ExternalId,
    pub payload: Value,
    pub cached_at: Timestamp,
}

impl CacheEntry {
    pub fn new(external_id: ExternalId, payload: Value, cached_at: Timestamp) -> Self {
        Self {
            external_id,
            payload,
            cached_at,
        }
    }

    pub fn age(&self, now: Timestamp) -> Duration {
        age_between(self.cached_at, now)
    }
}

/// A payload kept in the caller-local store.
///
/// Only written after a successful, non-error fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCacheRecord {
    pub key: String,
    pub payload: Value,
    pub timestamp: Timestamp,
}

impl LocalCacheRecord {
    pub fn new(key: impl Into<String>, payload: Value, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            payload,
            timestamp,
        }
    }

    /// A record is expired once its age reaches the ttl.
    pub fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        age_between(self.timestamp, now) >= ttl
    }
}

/// Category -> label -> count.
pub type Breakdowns = BTreeMap<String, BTreeMap<String, u64>>;

/// Rollup of the fact records (reviews) attached to one subject.
///
/// `total_facts` must equal the authoritative fact count for the subject;
/// a snapshot whose total disagrees is stale and gets rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub subject_id: SubjectId,
    pub subject_type: SubjectType,
    pub total_facts: u64,
    pub breakdowns: Breakdowns,
}

impl StatsSnapshot {
    pub fn empty(subject_id: SubjectId, subject_type: SubjectType) -> Self {
        Self {
            subject_id,
            subject_type,
            total_facts: 0,
            breakdowns: Breakdowns::new(),
        }
    }

    /// Count recorded for `label` within `category` (0 when absent).
    pub fn count(&self, category: &str, label: &str) -> u64 {
        self.breakdowns
            .get(category)
            .and_then(|labels| labels.get(label))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the stored total agrees with the authoritative count.
    pub fn matches_count(&self, authoritative: u64) -> bool {
        self.total_facts == authoritative
    }
}

/// "Actor likes / joined subject."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRecord {
    pub subject_id: SubjectId,
    pub actor_id: ActorId,
    pub created_at: Timestamp,
}

impl ToggleRecord {
    pub fn new(subject_id: SubjectId, actor_id: ActorId, created_at: Timestamp) -> Self {
        Self {
            subject_id,
            actor_id,
            created_at,
        }
    }
}

/// State of one (subject, actor) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    On,
    Off,
}

/// Result of a toggle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub state: ToggleState,
    /// False when the call was an idempotent no-op.
    pub changed: bool,
}

/// A counter that disagreed with its records and was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    pub subject_id: SubjectId,
    pub stored: i64,
    pub actual: i64,
}

impl CounterDrift {
    pub fn delta(&self) -> i64 {
        self.actual - self.stored
    }
}
