//! Per-identity request rate limiting
//!
//! One GCRA limiter per caller, created on first use. The state is an
//! explicit value owned by `AppState`; nothing here is global. `reset`
//! drops every window, so all callers start again with a full burst.
//!
//! Anonymous callers are keyed by address, so the map grows with every
//! new address. `sweep` drops limiters idle long enough to have refilled,
//! which bounds the map by the callers seen within one refill period.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::RateLimited;
use crate::identity::Identity;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Key for rate limiting; identical to the caller identity.
pub type RateLimitKey = Identity;

struct Tracked {
    limiter: Arc<DirectRateLimiter>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct RateLimitState {
    enabled: bool,
    anonymous_per_minute: u32,
    authenticated_per_minute: u32,
    burst: u32,
    limiters: Arc<DashMap<RateLimitKey, Tracked>>,
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            anonymous_per_minute: config.rate_limit_anonymous,
            authenticated_per_minute: config.rate_limit_authenticated,
            burst: config.rate_limit_burst,
            limiters: Arc::new(DashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Requests per minute allowed for this key.
    pub fn limit_for(&self, key: &RateLimitKey) -> u32 {
        match key {
            Identity::User(_) => self.authenticated_per_minute,
            Identity::Anonymous { .. } => self.anonymous_per_minute,
        }
    }

    /// Admit one request for `key` or report how long to wait.
    pub fn check(&self, key: &RateLimitKey) -> Result<(), RateLimited> {
        if !self.enabled {
            return Ok(());
        }

        let limiter = self.limiter_for(key);
        match limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until
                    .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
                // Minimum 1 second
                let retry_after = Duration::from_secs(wait.as_secs().max(1));
                tracing::debug!(key = %key, retry_after_secs = retry_after.as_secs(), "Rate limited");
                Err(RateLimited { retry_after })
            }
        }
    }

    /// Forget every caller's window.
    pub fn reset(&self) {
        self.limiters.clear();
        tracing::info!("Rate limit state reset");
    }

    /// Number of callers currently tracked.
    pub fn tracked(&self) -> usize {
        self.limiters.len()
    }

    /// Time for the slowest quota to refill a fully spent burst.
    ///
    /// A limiter idle this long is back at a full burst, so dropping it
    /// grants nothing a fresh limiter would not.
    pub fn refill_period(&self) -> Duration {
        let slowest = self
            .anonymous_per_minute
            .min(self.authenticated_per_minute)
            .max(1);
        let burst = self.burst.max(1);
        Duration::from_millis(60_000 * u64::from(burst) / u64::from(slowest))
    }

    /// Drop limiters unused for at least `idle`; returns how many.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let before = self.limiters.len();
        self.limiters
            .retain(|_, tracked| tracked.last_seen.elapsed() < idle);
        let evicted = before.saturating_sub(self.limiters.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.limiters.len(), "Evicted idle rate limiters");
        }
        evicted
    }

    /// Drop every limiter idle for a whole refill period.
    pub fn sweep(&self) -> usize {
        self.evict_idle(self.refill_period())
    }

    fn limiter_for(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        let mut tracked = self.limiters.entry(*key).or_insert_with(|| {
            let per_minute = NonZeroU32::new(self.limit_for(key)).unwrap_or(NonZeroU32::MIN);
            let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
            Tracked {
                limiter: Arc::new(RateLimiter::direct(
                    Quota::per_minute(per_minute).allow_burst(burst),
                )),
                last_seen: Instant::now(),
            }
        });
        tracked.last_seen = Instant::now();
        Arc::clone(&tracked.limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::ActorId;
    use std::net::{IpAddr, Ipv4Addr};

    fn state(burst: u32) -> RateLimitState {
        RateLimitState::new(&ApiConfig {
            rate_limit_anonymous: 1,
            rate_limit_authenticated: 1,
            rate_limit_burst: burst,
            ..ApiConfig::default()
        })
    }

    fn anon(last: u8) -> Identity {
        Identity::Anonymous {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
        }
    }

    #[test]
    fn test_burst_then_limited() {
        let limits = state(2);
        let key = anon(1);
        assert!(limits.check(&key).is_ok());
        assert!(limits.check(&key).is_ok());

        let limited = limits.check(&key).unwrap_err();
        assert!(limited.retry_after >= Duration::from_secs(1));
    }

    #[test]
    fn test_keys_are_independent() {
        let limits = state(1);
        assert!(limits.check(&anon(1)).is_ok());
        assert!(limits.check(&anon(1)).is_err());
        assert!(limits.check(&anon(2)).is_ok());
        assert!(limits.check(&Identity::User(ActorId::generate())).is_ok());
        assert_eq!(limits.tracked(), 3);
    }

    #[test]
    fn test_reset_restores_quota() {
        let limits = state(1);
        let key = Identity::User(ActorId::generate());
        assert!(limits.check(&key).is_ok());
        assert!(limits.check(&key).is_err());

        limits.reset();
        assert_eq!(limits.tracked(), 0);
        assert!(limits.check(&key).is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limits = RateLimitState::new(&ApiConfig {
            rate_limit_enabled: false,
            rate_limit_burst: 1,
            ..ApiConfig::default()
        });
        for _ in 0..20 {
            assert!(limits.check(&anon(9)).is_ok());
        }
        assert_eq!(limits.tracked(), 0);
    }

    #[test]
    fn test_limit_for_identity_kind() {
        let limits = RateLimitState::new(&ApiConfig::default());
        assert_eq!(limits.limit_for(&anon(1)), 100);
        assert_eq!(limits.limit_for(&Identity::User(ActorId::generate())), 1000);
    }

    #[test]
    fn test_idle_limiters_are_evicted() {
        let limits = state(1);
        for last in 1..=50 {
            assert!(limits.check(&anon(last)).is_ok());
        }
        assert_eq!(limits.tracked(), 50);

        assert_eq!(limits.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(limits.tracked(), 50);

        assert_eq!(limits.evict_idle(Duration::ZERO), 50);
        assert_eq!(limits.tracked(), 0);
        assert!(limits.check(&anon(1)).is_ok());
    }

    #[test]
    fn test_sweep_keeps_recent_callers() {
        let limits = state(2);
        let key = anon(7);
        assert!(limits.check(&key).is_ok());
        assert!(limits.check(&key).is_ok());
        assert!(limits.check(&key).is_err());

        assert_eq!(limits.sweep(), 0);
        assert_eq!(limits.tracked(), 1);
        assert!(limits.check(&key).is_err());
    }

    #[test]
    fn test_refill_period_uses_slowest_quota() {
        let limits = RateLimitState::new(&ApiConfig {
            rate_limit_anonymous: 30,
            rate_limit_authenticated: 600,
            rate_limit_burst: 15,
            ..ApiConfig::default()
        });
        assert_eq!(limits.refill_period(), Duration::from_secs(30));
        assert_eq!(state(2).refill_period(), Duration::from_secs(120));
    }

    #[test]
    fn test_clones_share_windows() {
        let limits = state(1);
        let shared = limits.clone();
        assert!(limits.check(&anon(3)).is_ok());
        assert!(shared.check(&anon(3)).is_err());
    }
}
