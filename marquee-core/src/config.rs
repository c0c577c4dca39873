//! Configuration types

use crate::{ConfigError, MarqueeError, MarqueeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Age-to-lifetime thresholds for origin payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlThresholds {
    /// Content younger than this is "recent".
    pub recent_window: Duration,
    /// Content younger than this (but not recent) is "mature".
    pub mature_window: Duration,
    pub recent_ttl: Duration,
    pub mature_ttl: Duration,
    /// Used for archival content and for content with no reference date.
    pub archival_ttl: Duration,
}

impl Default for TtlThresholds {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(60 * DAY),
            mature_window: Duration::from_secs(365 * DAY),
            recent_ttl: Duration::from_secs(3 * HOUR),
            mature_ttl: Duration::from_secs(3 * DAY),
            archival_ttl: Duration::from_secs(7 * DAY),
        }
    }
}

/// Defaults for the client revalidation cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCacheDefaults {
    pub retries: u32,
    pub retry_delay: Duration,
    pub stale_while_revalidate: bool,
}

impl Default for ClientCacheDefaults {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(1),
            stale_while_revalidate: true,
        }
    }
}

/// Cache layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub ttl: TtlThresholds,
    pub client: ClientCacheDefaults,
}

impl CacheConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - every TTL and window is positive
    /// - recent_window < mature_window
    /// - recent_ttl <= mature_ttl <= archival_ttl
    /// - client retries >= 1
    pub fn validate(&self) -> MarqueeResult<()> {
        let ttl = &self.ttl;
        for (field, value) in [
            ("ttl.recent_window", ttl.recent_window),
            ("ttl.mature_window", ttl.mature_window),
            ("ttl.recent_ttl", ttl.recent_ttl),
            ("ttl.mature_ttl", ttl.mature_ttl),
            ("ttl.archival_ttl", ttl.archival_ttl),
        ] {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if ttl.recent_window >= ttl.mature_window {
            return Err(invalid(
                "ttl.recent_window",
                format!("{:?}", ttl.recent_window),
                "recent_window must be shorter than mature_window",
            ));
        }

        // Newer content must never live longer than older content.
        if ttl.recent_ttl > ttl.mature_ttl || ttl.mature_ttl > ttl.archival_ttl {
            return Err(invalid(
                "ttl.mature_ttl",
                format!("{:?}", ttl.mature_ttl),
                "ttls must not decrease with content age",
            ));
        }

        if self.client.retries == 0 {
            return Err(invalid(
                "client.retries",
                self.client.retries.to_string(),
                "retries must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Connection settings for the catalog origin.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginConfig {
    pub base_url: String,
    /// Absent credentials make every origin-backed read fail with a config error.
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    /// Deadline handed to the HTTP client for each request.
    pub request_timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: None,
            requests_per_minute: 40,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for OriginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("requests_per_minute", &self.requests_per_minute)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl OriginConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }

    pub fn validate(&self) -> MarqueeResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid(
                "origin.base_url",
                self.base_url.clone(),
                "must be an http(s) url",
            ));
        }

        if self.requests_per_minute == 0 {
            return Err(invalid(
                "origin.requests_per_minute",
                "0".to_string(),
                "must be greater than 0",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid(
                "origin.request_timeout",
                format!("{:?}", self.request_timeout),
                "must be positive",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> MarqueeError {
    MarqueeError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_thresholds() {
        let ttl = TtlThresholds::default();
        assert_eq!(ttl.recent_ttl, Duration::from_secs(3 * 60 * 60));
        assert_eq!(ttl.mature_ttl, Duration::from_secs(3 * 24 * 60 * 60));
        assert_eq!(ttl.archival_ttl, Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = CacheConfig::default();
        config.ttl.recent_ttl = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl.recent_ttl"));
    }

    #[test]
    fn test_inverted_windows_rejected() {
        let mut config = CacheConfig::default();
        config.ttl.recent_window = config.ttl.mature_window;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_decreasing_ttls_rejected() {
        let mut config = CacheConfig::default();
        config.ttl.recent_ttl = Duration::from_secs(30 * 24 * 60 * 60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = CacheConfig::default();
        config.client.retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_credential_detection() {
        let mut origin = OriginConfig::default();
        assert!(!origin.has_credential());

        origin.api_key = Some("   ".to_string());
        assert!(!origin.has_credential());

        origin.api_key = Some("secret".to_string());
        assert!(origin.has_credential());
    }

    #[test]
    fn test_origin_validation() {
        assert!(OriginConfig::default().validate().is_ok());

        let bad_url = OriginConfig {
            base_url: "ftp://catalog".to_string(),
            ..OriginConfig::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_rpm = OriginConfig {
            requests_per_minute: 0,
            ..OriginConfig::default()
        };
        assert!(zero_rpm.validate().is_err());
    }

    #[test]
    fn test_origin_debug_redacts_key() {
        let config = OriginConfig {
            api_key: Some("sk-secret".to_string()),
            ..OriginConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }
}
