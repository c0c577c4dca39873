//! Async document store trait.
//!
//! The document store is the system of record for cached origin payloads,
//! stats snapshots, review facts, toggle records and the parent entities
//! carrying denormalized counters. Implementations must make each call
//! atomic on its own; nothing here spans more than one call.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use marquee_core::{ActorId, ExternalId, MarqueeResult, StorageError, SubjectId, SubjectType};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// A stored JSON document.
pub type Document = Value;

/// A value a [`Filter`] can compare a field against.
///
/// Every implementation maps to a JSON scalar, so building a filter never
/// fails.
pub trait FilterValue {
    fn to_filter_value(&self) -> Value;
}

impl<T: FilterValue + ?Sized> FilterValue for &T {
    fn to_filter_value(&self) -> Value {
        (**self).to_filter_value()
    }
}

impl FilterValue for str {
    fn to_filter_value(&self) -> Value {
        Value::from(self)
    }
}

impl FilterValue for String {
    fn to_filter_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl FilterValue for bool {
    fn to_filter_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FilterValue for i64 {
    fn to_filter_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FilterValue for u64 {
    fn to_filter_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FilterValue for ExternalId {
    fn to_filter_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl FilterValue for SubjectId {
    fn to_filter_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

// Same text as the transparent serde form of the uuid.
impl FilterValue for ActorId {
    fn to_filter_value(&self) -> Value {
        Value::from(self.to_string())
    }
}

impl FilterValue for SubjectType {
    fn to_filter_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

/// Field-equality filter.
///
/// A document matches when every listed field is present and equal.
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl FilterValue) -> Self {
        self.fields.insert(field.into(), value.to_filter_value());
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy the filter's fields into `document` so an upserted or inserted
    /// document always satisfies the filter it was written under.
    pub fn stamp(&self, document: &mut Document) {
        if let Value::Object(map) = document {
            for (field, value) in &self.fields {
                map.insert(field.clone(), value.clone());
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{?}"),
        }
    }
}

/// Async document store.
///
/// Every method is a single atomic operation against one collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter)
        -> MarqueeResult<Option<Document>>;

    /// Every document matching `filter`.
    async fn find_many(&self, collection: &str, filter: &Filter) -> MarqueeResult<Vec<Document>>;

    /// Replace the first document matching `filter`, or insert `document`
    /// when nothing matches. The filter fields are stamped onto the document.
    async fn upsert(&self, collection: &str, filter: &Filter, document: Document)
        -> MarqueeResult<()>;

    /// Insert `document` only if nothing matches `filter`.
    ///
    /// Returns `true` when the document was newly created. This is the
    /// uniqueness-constraint primitive: a duplicate is `Ok(false)`, never an error.
    async fn insert_if_absent(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> MarqueeResult<bool>;

    /// Delete the first document matching `filter`. Returns whether one was deleted.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> MarqueeResult<bool>;

    /// Number of documents matching `filter`.
    async fn count_documents(&self, collection: &str, filter: &Filter) -> MarqueeResult<u64>;

    /// Atomically add `delta` to an integer field of the first matching document.
    ///
    /// A missing field counts as 0. Returns the new value, or `None` when no
    /// document matched.
    async fn increment(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        delta: i64,
    ) -> MarqueeResult<Option<i64>>;

    /// Overwrite one field of the first matching document. Returns whether a
    /// document matched.
    async fn set_field(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        value: Value,
    ) -> MarqueeResult<bool>;
}

/// Serialize a record for storage in `collection`.
pub fn encode<T: Serialize>(collection: &str, record: &T) -> MarqueeResult<Document> {
    serde_json::to_value(record).map_err(|e| {
        StorageError::Serialization {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Deserialize a document read from `collection`.
pub fn decode<T: DeserializeOwned>(collection: &str, document: Document) -> MarqueeResult<T> {
    serde_json::from_value(document).map_err(|e| {
        StorageError::Serialization {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_fields() {
        let filter = Filter::new().eq("subject_id", "m1").eq("subject_type", "movie");

        assert!(filter.matches(&json!({"subject_id": "m1", "subject_type": "movie", "rating": 8})));
        assert!(!filter.matches(&json!({"subject_id": "m1", "subject_type": "show"})));
        assert!(!filter.matches(&json!({"subject_id": "m1"})));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&json!({"anything": true})));
    }

    #[test]
    fn test_stamp_copies_filter_fields() {
        let filter = Filter::new().eq("external_id", "603");
        let mut doc = json!({"payload": {"title": "The Matrix"}});
        filter.stamp(&mut doc);
        assert_eq!(doc["external_id"], json!("603"));
        assert!(filter.matches(&doc));
    }

    #[test]
    fn test_filter_values_match_stored_form() {
        let actor = ActorId::generate();
        let subject = SubjectId::new("m1");
        let doc = encode(
            "reviews",
            &json!({
                "subject_id": &subject,
                "subject_type": SubjectType::Movie,
                "actor_id": actor,
                "rating": 8,
            }),
        )
        .unwrap();

        let filter = Filter::new()
            .eq("subject_id", &subject)
            .eq("subject_type", SubjectType::Movie)
            .eq("actor_id", &actor)
            .eq("rating", 8i64);
        assert!(filter.matches(&doc));
        assert!(filter.fields().all(|(_, value)| !value.is_null()));
    }

    #[test]
    fn test_filter_never_matches_missing_field_as_null() {
        let filter = Filter::new().eq("external_id", &ExternalId::new("603"));
        assert!(!filter.matches(&json!({"external_id": null})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_filter_display_is_json() {
        let filter = Filter::new().eq("id", "p1");
        assert_eq!(filter.to_string(), "{\"id\":\"p1\"}");
    }

    #[test]
    fn test_decode_reports_collection() {
        let err = decode::<u64>("stats", json!("nope")).unwrap_err();
        assert!(err.to_string().contains("stats"));
    }
}
