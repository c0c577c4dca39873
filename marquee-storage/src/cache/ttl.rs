//! Content-age TTL policy.
//!
//! Newer content still gets metadata corrections (ratings, runtimes, cast),
//! so it is revalidated far more often than old, settled content:
//!
//! | content age          | lifetime |
//! |----------------------|----------|
//! | unknown              | 7 days   |
//! | < 60 days            | 3 hours  |
//! | 60 days .. 365 days  | 3 days   |
//! | >= 365 days          | 7 days   |

use std::time::Duration;

use marquee_core::{age_between, Timestamp, TtlThresholds};

/// Step function from content age to cache lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlPolicy {
    thresholds: TtlThresholds,
}

impl TtlPolicy {
    pub fn new(thresholds: TtlThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TtlThresholds {
        &self.thresholds
    }

    /// Lifetime for content published at `reference_date`, seen from `now`.
    ///
    /// Reference dates in the future (announced, unreleased content) have
    /// age zero and get the shortest lifetime.
    pub fn ttl(&self, reference_date: Option<Timestamp>, now: Timestamp) -> Duration {
        match reference_date {
            None => self.thresholds.archival_ttl,
            Some(reference) => self.ttl_for_age(age_between(reference, now)),
        }
    }

    pub fn ttl_for_age(&self, age: Duration) -> Duration {
        if age < self.thresholds.recent_window {
            self.thresholds.recent_ttl
        } else if age < self.thresholds.mature_window {
            self.thresholds.mature_ttl
        } else {
            self.thresholds.archival_ttl
        }
    }

    /// Whether an entry cached at `cached_at` is still fresh at `now`.
    pub fn is_fresh(
        &self,
        reference_date: Option<Timestamp>,
        cached_at: Timestamp,
        now: Timestamp,
    ) -> bool {
        age_between(cached_at, now) < self.ttl(reference_date, now)
    }
}
