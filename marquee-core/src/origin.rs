//! Origin client trait and catalog entity kinds.
//!
//! The origin is the rate-limited upstream catalog API. This module only
//! describes it; the HTTP implementation lives in `marquee-origin`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::identity::{ExternalId, Timestamp};
use crate::MarqueeResult;

/// Client for the upstream catalog.
///
/// Implementations must be thread-safe; a single client is shared by every
/// request context.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Whether an origin credential is configured.
    fn has_credential(&self) -> bool;

    /// Fetch the JSON document at `path` (relative to the origin base url).
    async fn fetch(&self, path: &str) -> MarqueeResult<Value>;
}

/// Kinds of catalog entities fronted by the origin cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogEntity {
    Movie,
    Show,
    Person,
    Collection,
}

impl CatalogEntity {
    pub fn all() -> [CatalogEntity; 4] {
        [Self::Movie, Self::Show, Self::Person, Self::Collection]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
            Self::Person => "person",
            Self::Collection => "collection",
        }
    }

    /// Origin path for one entity.
    pub fn path(&self, external_id: &ExternalId) -> String {
        let prefix = match self {
            Self::Movie => "movie",
            Self::Show => "tv",
            Self::Person => "person",
            Self::Collection => "collection",
        };
        format!("{}/{}", prefix, external_id)
    }

    /// Payload field carrying the date the content was published, if any.
    pub fn reference_date_field(&self) -> Option<&'static str> {
        match self {
            Self::Movie => Some("release_date"),
            Self::Show => Some("first_air_date"),
            Self::Person | Self::Collection => None,
        }
    }

    /// Extract the reference date from an origin payload.
    ///
    /// Missing, empty or unparsable dates yield `None`.
    pub fn reference_date(&self, payload: &Value) -> Option<Timestamp> {
        let field = self.reference_date_field()?;
        payload.get(field).and_then(Value::as_str).and_then(parse_reference_date)
    }
}

impl fmt::Display for CatalogEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `YYYY-MM-DD` or RFC 3339 into a UTC timestamp.
pub fn parse_reference_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_paths() {
        let id = ExternalId::new("603");
        assert_eq!(CatalogEntity::Movie.path(&id), "movie/603");
        assert_eq!(CatalogEntity::Show.path(&id), "tv/603");
        assert_eq!(CatalogEntity::Person.path(&id), "person/603");
    }

    #[test]
    fn test_reference_date_from_payload() {
        let payload = json!({"title": "The Matrix", "release_date": "1999-03-30"});
        let date = CatalogEntity::Movie.reference_date(&payload).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (1999, 3, 30));

        let show = json!({"first_air_date": "2011-04-17"});
        assert!(CatalogEntity::Show.reference_date(&show).is_some());
    }

    #[test]
    fn test_reference_date_absent_or_bad() {
        assert!(CatalogEntity::Movie.reference_date(&json!({})).is_none());
        assert!(CatalogEntity::Movie
            .reference_date(&json!({"release_date": ""}))
            .is_none());
        assert!(CatalogEntity::Movie
            .reference_date(&json!({"release_date": "soon"}))
            .is_none());
        assert!(CatalogEntity::Person
            .reference_date(&json!({"release_date": "1999-03-30"}))
            .is_none());
    }

    #[test]
    fn test_parse_rfc3339() {
        let parsed = parse_reference_date("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:30:00+00:00");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_calendar_dates_parse_to_midnight(
                year in 1900i32..2100,
                month in 1u32..=12,
                day in 1u32..=28,
            ) {
                let raw = format!("{:04}-{:02}-{:02}", year, month, day);
                let parsed = parse_reference_date(&raw).expect("valid date");
                prop_assert_eq!(parsed.year(), year);
                prop_assert_eq!(parsed.month(), month);
                prop_assert_eq!(parsed.day(), day);
                prop_assert_eq!(parsed.timestamp() % 86_400, 0);
            }

            #[test]
            fn prop_non_dates_are_absent(raw in "[a-z ]{0,12}") {
                prop_assert!(parse_reference_date(&raw).is_none());
            }
        }
    }
}
