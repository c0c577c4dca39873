//! Cache read results carrying freshness metadata.

use std::time::Duration;

use marquee_core::{age_between, Timestamp};

/// Result of a cache read.
///
/// Wraps the value together with when it was cached and whether the read
/// was served from cache, so callers can see how fresh the data is.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Timestamp,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A read served from cache.
    pub fn from_cache(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A read that had to go to the source (origin fetch or recompute).
    pub fn from_source(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns true if the data was cached at or after `timestamp`.
    pub fn is_fresh_as_of(&self, timestamp: Timestamp) -> bool {
        self.cached_at >= timestamp
    }

    /// How old the data is as seen from `now`.
    pub fn staleness(&self, now: Timestamp) -> Duration {
        age_between(self.cached_at, now)
    }

    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_cache_read_from_cache() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache("payload".to_string(), cached_at);

        assert!(read.was_cache_hit());
        assert!(!read.was_cache_miss());
        assert_eq!(read.value(), "payload");
        assert_eq!(read.cached_at(), cached_at);
    }

    #[test]
    fn test_cache_read_from_source() {
        let read = CacheRead::from_source(42i32, Utc::now());
        assert!(read.was_cache_miss());
        assert_eq!(read.into_value(), 42);
    }

    #[test]
    fn test_staleness_uses_supplied_now() {
        let now = Utc::now();
        let read = CacheRead::from_cache("v", now - chrono::Duration::seconds(90));
        assert_eq!(read.staleness(now), Duration::from_secs(90));
    }

    #[test]
    fn test_is_fresh_as_of() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache("v", cached_at);

        assert!(read.is_fresh_as_of(cached_at - chrono::Duration::seconds(10)));
        assert!(read.is_fresh_as_of(cached_at));
        assert!(!read.is_fresh_as_of(cached_at + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_map_keeps_metadata() {
        let read = CacheRead::from_cache(7u8, Utc::now());
        let mapped = read.map(|v| v.to_string());
        assert!(mapped.was_cache_hit());
        assert_eq!(mapped.into_value(), "7");
    }
}
