//! Self-healing aggregate statistics cache.
//!
//! A [`StatsSnapshot`] rolls up the fact records (reviews) of one subject.
//! Every read compares the snapshot's `total_facts` with the authoritative
//! fact count. When they agree the snapshot is served as-is; when they
//! differ, or no snapshot exists, the facts are rescanned and the snapshot
//! rewritten. Snapshots are only ever replaced whole, never incremented.
//!
//! The read path never fails: storage errors are logged and the best data
//! at hand (stored snapshot, else an empty one) is returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use marquee_core::{
    Breakdowns, Clock, MarqueeResult, StatsSnapshot, SubjectId, SubjectType, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::freshness::CacheRead;
use crate::document::{decode, encode, Document, DocumentStore, Filter};

/// One categorical field of a fact record and its known labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    /// Breakdown key in the snapshot.
    pub name: String,
    /// Field read from each fact document.
    pub field: String,
    pub labels: Vec<String>,
}

impl CategorySpec {
    pub fn new<I, L>(name: impl Into<String>, field: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            name: name.into(),
            field: field.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Label for a fact field value, if it is one of the known labels.
    fn label_of(&self, value: &Value) -> Option<String> {
        let label = match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => return None,
        };
        self.labels.contains(&label).then_some(label)
    }
}

/// Where facts and snapshots live and which categories get tallied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSchema {
    pub facts_collection: String,
    pub snapshots_collection: String,
    pub categories: Vec<CategorySpec>,
}

impl StatsSchema {
    /// Review statistics: rating 1-10, recommendation, spoiler flag and
    /// where the subject was watched.
    pub fn reviews() -> Self {
        Self {
            facts_collection: "reviews".to_string(),
            snapshots_collection: "review_stats".to_string(),
            categories: vec![
                CategorySpec::new("rating", "rating", (1..=10).map(|n: u8| n.to_string())),
                CategorySpec::new("recommendation", "recommended", ["true", "false"]),
                CategorySpec::new("spoilers", "contains_spoilers", ["true", "false"]),
                CategorySpec::new(
                    "watched_on",
                    "watched_on",
                    ["theater", "streaming", "physical", "broadcast"],
                ),
            ],
        }
    }

    /// Breakdowns with every known label present at zero.
    fn empty_breakdowns(&self) -> Breakdowns {
        self.categories
            .iter()
            .map(|category| {
                let labels = category
                    .labels
                    .iter()
                    .map(|label| (label.clone(), 0))
                    .collect::<BTreeMap<_, _>>();
                (category.name.clone(), labels)
            })
            .collect()
    }

    /// Tally `facts` into a fresh snapshot. Values outside a category's
    /// label set are ignored.
    pub fn tally(
        &self,
        subject_id: &SubjectId,
        subject_type: SubjectType,
        facts: &[Document],
    ) -> StatsSnapshot {
        let mut breakdowns = self.empty_breakdowns();
        for fact in facts {
            for category in &self.categories {
                let Some(label) = fact.get(&category.field).and_then(|v| category.label_of(v))
                else {
                    continue;
                };
                if let Some(count) = breakdowns
                    .get_mut(&category.name)
                    .and_then(|labels| labels.get_mut(&label))
                {
                    *count += 1;
                }
            }
        }

        StatsSnapshot {
            subject_id: subject_id.clone(),
            subject_type,
            total_facts: facts.len() as u64,
            breakdowns,
        }
    }
}

/// Snapshot document as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    #[serde(flatten)]
    snapshot: StatsSnapshot,
    computed_at: Timestamp,
}

fn subject_filter(subject_id: &SubjectId, subject_type: SubjectType) -> Filter {
    Filter::new()
        .eq("subject_id", subject_id)
        .eq("subject_type", subject_type)
}

/// Drift-checked stats cache.
pub struct StatsCache<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    store: Arc<S>,
    clock: Arc<C>,
    schema: StatsSchema,
}

impl<S, C> StatsCache<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>, schema: StatsSchema) -> Self {
        Self {
            store,
            clock,
            schema,
        }
    }

    pub fn schema(&self) -> &StatsSchema {
        &self.schema
    }

    /// Current statistics for a subject. Never fails.
    pub async fn get_stats(&self, subject_id: &SubjectId, subject_type: SubjectType) -> StatsSnapshot {
        self.read_stats(subject_id, subject_type).await.into_value()
    }

    /// Like [`get_stats`](Self::get_stats); a cache hit means the stored
    /// snapshot passed the drift check.
    pub async fn read_stats(
        &self,
        subject_id: &SubjectId,
        subject_type: SubjectType,
    ) -> CacheRead<StatsSnapshot> {
        let filter = subject_filter(subject_id, subject_type);
        let stored = self.load_snapshot(&filter).await;

        match self
            .store
            .count_documents(&self.schema.facts_collection, &filter)
            .await
        {
            Ok(actual) => {
                if let Some(stored) = &stored {
                    if stored.snapshot.matches_count(actual) {
                        tracing::debug!(subject_id = %subject_id, total = actual, "Stats snapshot trusted");
                        return CacheRead::from_cache(stored.snapshot.clone(), stored.computed_at);
                    }
                    tracing::info!(
                        subject_id = %subject_id,
                        stored = stored.snapshot.total_facts,
                        actual,
                        "Stats drift detected"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Fact count failed, skipping drift check");
                if let Some(stored) = stored {
                    return CacheRead::from_cache(stored.snapshot, stored.computed_at);
                }
            }
        }

        match self.recompute(subject_id, subject_type, &filter).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Stats recompute failed");
                match stored {
                    Some(stored) => CacheRead::from_cache(stored.snapshot, stored.computed_at),
                    None => CacheRead::from_source(
                        StatsSnapshot {
                            breakdowns: self.schema.empty_breakdowns(),
                            ..StatsSnapshot::empty(subject_id.clone(), subject_type)
                        },
                        self.clock.now(),
                    ),
                }
            }
        }
    }

    /// Full rescan of the subject's facts, persisted via upsert.
    async fn recompute(
        &self,
        subject_id: &SubjectId,
        subject_type: SubjectType,
        filter: &Filter,
    ) -> MarqueeResult<CacheRead<StatsSnapshot>> {
        let facts = self
            .store
            .find_many(&self.schema.facts_collection, filter)
            .await?;
        let snapshot = self.schema.tally(subject_id, subject_type, &facts);
        let computed_at = self.clock.now();

        let collection = &self.schema.snapshots_collection;
        let stored = StoredSnapshot {
            snapshot,
            computed_at,
        };
        let persisted = match encode(collection, &stored) {
            Ok(document) => self.store.upsert(collection, filter, document).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            tracing::warn!(subject_id = %subject_id, error = %e, "Failed to persist stats snapshot");
        }

        tracing::info!(subject_id = %subject_id, total = stored.snapshot.total_facts, "Stats recomputed");
        Ok(CacheRead::from_source(stored.snapshot, computed_at))
    }

    async fn load_snapshot(&self, filter: &Filter) -> Option<StoredSnapshot> {
        let collection = &self.schema.snapshots_collection;
        let document = match self.store.find_one(collection, filter).await {
            Ok(document) => document?,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Stats snapshot read failed");
                return None;
            }
        };

        decode::<StoredSnapshot>(collection, document)
            .map_err(|e| {
                tracing::warn!(collection = %collection, error = %e, "Discarding unreadable stats snapshot");
            })
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDocumentStore;
    use marquee_core::ManualClock;
    use serde_json::json;

    fn review(subject: &str, rating: u8, recommended: bool) -> Document {
        json!({
            "subject_id": subject,
            "subject_type": "movie",
            "rating": rating,
            "recommended": recommended,
            "contains_spoilers": false,
            "watched_on": "theater",
        })
    }

    fn setup() -> (StatsCache<InMemoryDocumentStore, ManualClock>, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cache = StatsCache::new(
            Arc::clone(&store),
            Arc::new(ManualClock::starting_now()),
            StatsSchema::reviews(),
        );
        (cache, store)
    }

    #[test]
    fn test_tally_ignores_unknown_labels() {
        let schema = StatsSchema::reviews();
        let facts = vec![
            review("m1", 8, true),
            json!({"rating": 11, "recommended": "sure", "watched_on": "airplane"}),
            json!({"rating": 8.5}),
        ];

        let snapshot = schema.tally(&SubjectId::new("m1"), SubjectType::Movie, &facts);
        assert_eq!(snapshot.total_facts, 3);
        assert_eq!(snapshot.count("rating", "8"), 1);
        assert_eq!(snapshot.count("rating", "11"), 0);
        assert_eq!(snapshot.count("recommendation", "true"), 1);
        assert_eq!(snapshot.count("watched_on", "theater"), 1);
        assert_eq!(snapshot.breakdowns["rating"].len(), 10);
    }

    #[tokio::test]
    async fn test_first_read_computes_and_persists() {
        let (cache, store) = setup();
        for rating in [7, 8, 8] {
            store.insert_raw("reviews", review("m1", rating, true)).unwrap();
        }

        let read = cache.read_stats(&SubjectId::new("m1"), SubjectType::Movie).await;
        assert!(read.was_cache_miss());
        assert_eq!(read.value().total_facts, 3);
        assert_eq!(read.value().count("rating", "8"), 2);
        assert_eq!(store.len("review_stats").unwrap(), 1);

        let again = cache.read_stats(&SubjectId::new("m1"), SubjectType::Movie).await;
        assert!(again.was_cache_hit());
    }

    #[tokio::test]
    async fn test_subject_types_are_separate() {
        let (cache, store) = setup();
        store.insert_raw("reviews", review("42", 9, true)).unwrap();

        let show = cache.get_stats(&SubjectId::new("42"), SubjectType::Show).await;
        assert_eq!(show.total_facts, 0);
        let movie = cache.get_stats(&SubjectId::new("42"), SubjectType::Movie).await;
        assert_eq!(movie.total_facts, 1);
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_rebuilt() {
        let (cache, store) = setup();
        store.insert_raw("reviews", review("m1", 5, false)).unwrap();
        store
            .insert_raw(
                "review_stats",
                json!({"subject_id": "m1", "subject_type": "movie", "total_facts": "lots"}),
            )
            .unwrap();

        let snapshot = cache.get_stats(&SubjectId::new("m1"), SubjectType::Movie).await;
        assert_eq!(snapshot.total_facts, 1);
        assert_eq!(snapshot.count("recommendation", "false"), 1);
    }
}
