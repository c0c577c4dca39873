//! Idempotent toggles with a denormalized counter on the parent.
//!
//! A toggle is the presence or absence of one [`ToggleRecord`] per
//! (subject, actor) pair. Turning it on is an insert-if-absent; only a
//! newly created record bumps the parent's counter. Turning it off is a
//! delete; only an actual deletion decrements it. Repeating either call is
//! a no-op, so duplicate requests never double count.
//!
//! The record write and the counter write are two separate operations. A
//! crash between them leaves the counter off by one; [`ToggleCounter::reconcile`]
//! recounts the records and rewrites the counter. Toggles themselves never
//! reconcile, and the counter is never used to answer "is this on".

use std::collections::HashSet;
use std::sync::Arc;

use marquee_core::{
    ActorId, Clock, CounterDrift, MarqueeResult, StorageError, SubjectId, ToggleOutcome,
    ToggleRecord, ToggleState,
};
use serde_json::Value;

use crate::document::{decode, encode, DocumentStore, Filter};

/// Where one kind of toggle keeps its records and counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleSpec {
    pub records_collection: &'static str,
    pub parent_collection: &'static str,
    /// Field of the parent document holding the subject id.
    pub parent_key: &'static str,
    pub counter_field: &'static str,
}

impl ToggleSpec {
    pub const POST_LIKES: ToggleSpec = ToggleSpec {
        records_collection: "post_likes",
        parent_collection: "posts",
        parent_key: "id",
        counter_field: "likes_count",
    };

    pub const COMMENT_LIKES: ToggleSpec = ToggleSpec {
        records_collection: "comment_likes",
        parent_collection: "comments",
        parent_key: "id",
        counter_field: "likes_count",
    };

    pub const REVIEW_LIKES: ToggleSpec = ToggleSpec {
        records_collection: "review_likes",
        parent_collection: "reviews",
        parent_key: "id",
        counter_field: "likes_count",
    };

    pub const COMMUNITY_MEMBERS: ToggleSpec = ToggleSpec {
        records_collection: "community_members",
        parent_collection: "communities",
        parent_key: "id",
        counter_field: "members_count",
    };
}

fn pair_filter(subject_id: &SubjectId, actor_id: &ActorId) -> Filter {
    Filter::new()
        .eq("subject_id", subject_id)
        .eq("actor_id", actor_id)
}

/// Maintains toggle records and their parent counter.
pub struct ToggleCounter<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    store: Arc<S>,
    clock: Arc<C>,
    spec: ToggleSpec,
}

impl<S, C> ToggleCounter<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>, spec: ToggleSpec) -> Self {
        Self { store, clock, spec }
    }

    pub fn spec(&self) -> &ToggleSpec {
        &self.spec
    }

    /// Turn the toggle on. Already on is a successful no-op.
    pub async fn toggle_on(
        &self,
        subject_id: &SubjectId,
        actor_id: &ActorId,
    ) -> MarqueeResult<ToggleOutcome> {
        let collection = self.spec.records_collection;
        let record = ToggleRecord::new(subject_id.clone(), *actor_id, self.clock.now());
        let created = self
            .store
            .insert_if_absent(
                collection,
                &pair_filter(subject_id, actor_id),
                encode(collection, &record)?,
            )
            .await?;

        if created {
            self.adjust_counter(subject_id, 1).await;
        } else {
            tracing::debug!(subject_id = %subject_id, actor_id = %actor_id, "Toggle already on");
        }

        Ok(ToggleOutcome {
            state: ToggleState::On,
            changed: created,
        })
    }

    /// Turn the toggle off. Already off is a successful no-op.
    pub async fn toggle_off(
        &self,
        subject_id: &SubjectId,
        actor_id: &ActorId,
    ) -> MarqueeResult<ToggleOutcome> {
        let deleted = self
            .store
            .delete_one(self.spec.records_collection, &pair_filter(subject_id, actor_id))
            .await?;

        if deleted {
            self.adjust_counter(subject_id, -1).await;
        } else {
            tracing::debug!(subject_id = %subject_id, actor_id = %actor_id, "Toggle already off");
        }

        Ok(ToggleOutcome {
            state: ToggleState::Off,
            changed: deleted,
        })
    }

    pub async fn is_on(&self, subject_id: &SubjectId, actor_id: &ActorId) -> MarqueeResult<bool> {
        let found = self
            .store
            .find_one(self.spec.records_collection, &pair_filter(subject_id, actor_id))
            .await?;
        Ok(found.is_some())
    }

    /// The candidates the actor has toggled on, in candidate order.
    pub async fn toggled_among(
        &self,
        actor_id: &ActorId,
        candidates: &[SubjectId],
    ) -> MarqueeResult<Vec<SubjectId>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let collection = self.spec.records_collection;
        let documents = self
            .store
            .find_many(collection, &Filter::new().eq("actor_id", actor_id))
            .await?;

        let mut on = HashSet::with_capacity(documents.len());
        for document in documents {
            let record: ToggleRecord = decode(collection, document)?;
            on.insert(record.subject_id);
        }

        Ok(candidates
            .iter()
            .filter(|candidate| on.contains(*candidate))
            .cloned()
            .collect())
    }

    /// Stored counter value. A parent without the field counts as 0;
    /// `None` when the parent does not exist.
    pub async fn counter(&self, subject_id: &SubjectId) -> MarqueeResult<Option<i64>> {
        let parent = self
            .store
            .find_one(self.spec.parent_collection, &self.parent_filter(subject_id))
            .await?;
        Ok(parent.map(|doc| self.stored_count(&doc)))
    }

    /// Recount the records for `subject_id` and rewrite the counter if it
    /// drifted. Returns the drift that was corrected, if any.
    pub async fn reconcile(&self, subject_id: &SubjectId) -> MarqueeResult<Option<CounterDrift>> {
        let parent_filter = self.parent_filter(subject_id);
        let Some(parent) = self
            .store
            .find_one(self.spec.parent_collection, &parent_filter)
            .await?
        else {
            return Err(StorageError::NotFound {
                collection: self.spec.parent_collection.to_string(),
                filter: parent_filter.to_string(),
            }
            .into());
        };

        let stored = self.stored_count(&parent);
        let actual = self
            .store
            .count_documents(
                self.spec.records_collection,
                &Filter::new().eq("subject_id", subject_id),
            )
            .await? as i64;

        if stored == actual {
            return Ok(None);
        }

        self.store
            .set_field(
                self.spec.parent_collection,
                &parent_filter,
                self.spec.counter_field,
                Value::from(actual),
            )
            .await?;

        let drift = CounterDrift {
            subject_id: subject_id.clone(),
            stored,
            actual,
        };
        tracing::info!(
            subject_id = %subject_id,
            counter = self.spec.counter_field,
            stored,
            actual,
            "Counter drift corrected"
        );
        Ok(Some(drift))
    }

    fn parent_filter(&self, subject_id: &SubjectId) -> Filter {
        Filter::new().eq(self.spec.parent_key, subject_id)
    }

    fn stored_count(&self, parent: &Value) -> i64 {
        parent
            .get(self.spec.counter_field)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Apply `delta` to the parent counter. The toggle already happened, so
    /// failures here are logged and left for `reconcile`.
    async fn adjust_counter(&self, subject_id: &SubjectId, delta: i64) {
        let result = self
            .store
            .increment(
                self.spec.parent_collection,
                &self.parent_filter(subject_id),
                self.spec.counter_field,
                delta,
            )
            .await;

        match result {
            Ok(Some(value)) => tracing::debug!(
                subject_id = %subject_id,
                counter = self.spec.counter_field,
                value,
                "Counter adjusted"
            ),
            Ok(None) => tracing::warn!(
                subject_id = %subject_id,
                collection = self.spec.parent_collection,
                "Counter parent missing"
            ),
            Err(e) => tracing::warn!(
                subject_id = %subject_id,
                counter = self.spec.counter_field,
                error = %e,
                "Counter update failed"
            ),
        }
    }
}
