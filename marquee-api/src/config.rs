//! Process configuration loaded from `MARQUEE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use marquee_core::{CacheConfig, ConfigError, MarqueeResult, OriginConfig};

use crate::telemetry::TelemetryConfig;

/// Configuration for the marquee process.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub origin: OriginConfig,
    pub cache: CacheConfig,

    /// Directory holding the LMDB environment for the client cache.
    pub lmdb_path: PathBuf,
    pub lmdb_map_size_mb: usize,

    /// Whether per-identity rate limiting is enabled.
    pub rate_limit_enabled: bool,
    /// Requests per minute for anonymous callers (keyed by address).
    pub rate_limit_anonymous: u32,
    /// Requests per minute for signed-in users (keyed by actor).
    pub rate_limit_authenticated: u32,
    /// Burst size for rate limiting.
    pub rate_limit_burst: u32,

    pub telemetry: TelemetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            origin: OriginConfig::default(),
            cache: CacheConfig::default(),
            lmdb_path: PathBuf::from("./data/client-cache"),
            lmdb_map_size_mb: 256,
            rate_limit_enabled: true,
            rate_limit_anonymous: 100,
            rate_limit_authenticated: 1000,
            rate_limit_burst: 10,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `MARQUEE_ORIGIN_BASE_URL`, `MARQUEE_ORIGIN_API_KEY`
    /// - `MARQUEE_ORIGIN_RPM`: origin requests per minute (default: 40)
    /// - `MARQUEE_ORIGIN_TIMEOUT_SECS`: per-request deadline (default: 10)
    /// - `MARQUEE_CLIENT_RETRIES`, `MARQUEE_CLIENT_RETRY_DELAY_MS`,
    ///   `MARQUEE_CLIENT_STALE_WHILE_REVALIDATE`
    /// - `MARQUEE_LMDB_PATH`, `MARQUEE_LMDB_MAP_SIZE_MB`
    /// - `MARQUEE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `MARQUEE_RATE_LIMIT_ANONYMOUS`: requests per minute (default: 100)
    /// - `MARQUEE_RATE_LIMIT_AUTHENTICATED`: requests per minute (default: 1000)
    /// - `MARQUEE_RATE_LIMIT_BURST`: burst size (default: 10)
    /// - `MARQUEE_LOG_FORMAT` ("json" or "compact"), `MARQUEE_LOG_FILTER`
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |name: &str, default: bool| {
            lookup(name)
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
                .unwrap_or(default)
        };

        let origin = OriginConfig {
            base_url: lookup("MARQUEE_ORIGIN_BASE_URL").unwrap_or(defaults.origin.base_url),
            api_key: lookup("MARQUEE_ORIGIN_API_KEY").filter(|key| !key.trim().is_empty()),
            requests_per_minute: parsed("MARQUEE_ORIGIN_RPM")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.origin.requests_per_minute),
            request_timeout: parsed("MARQUEE_ORIGIN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.origin.request_timeout),
        };

        let mut cache = defaults.cache;
        if let Some(retries) = parsed("MARQUEE_CLIENT_RETRIES").and_then(|v| u32::try_from(v).ok()) {
            cache.client.retries = retries;
        }
        if let Some(delay_ms) = parsed("MARQUEE_CLIENT_RETRY_DELAY_MS") {
            cache.client.retry_delay = Duration::from_millis(delay_ms);
        }
        cache.client.stale_while_revalidate = flag(
            "MARQUEE_CLIENT_STALE_WHILE_REVALIDATE",
            cache.client.stale_while_revalidate,
        );

        let mut telemetry = defaults.telemetry;
        if let Some(format) = lookup("MARQUEE_LOG_FORMAT").and_then(|s| s.parse().ok()) {
            telemetry.format = format;
        }
        if let Some(filter) = lookup("MARQUEE_LOG_FILTER").filter(|f| !f.trim().is_empty()) {
            telemetry.filter = filter;
        }

        let rate = |name: &str, default: u32| {
            parsed(name)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };

        Self {
            origin,
            cache,
            lmdb_path: lookup("MARQUEE_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_map_size_mb: parsed("MARQUEE_LMDB_MAP_SIZE_MB")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.lmdb_map_size_mb),
            rate_limit_enabled: flag("MARQUEE_RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_anonymous: rate("MARQUEE_RATE_LIMIT_ANONYMOUS", defaults.rate_limit_anonymous),
            rate_limit_authenticated: rate(
                "MARQUEE_RATE_LIMIT_AUTHENTICATED",
                defaults.rate_limit_authenticated,
            ),
            rate_limit_burst: rate("MARQUEE_RATE_LIMIT_BURST", defaults.rate_limit_burst),
            telemetry,
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> MarqueeResult<()> {
        self.origin.validate()?;
        self.cache.validate()?;

        if self.lmdb_map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.rate_limit_enabled {
            for (field, value) in [
                ("rate_limit_anonymous", self.rate_limit_anonymous),
                ("rate_limit_authenticated", self.rate_limit_authenticated),
                ("rate_limit_burst", self.rate_limit_burst),
            ] {
                if value == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        value: "0".to_string(),
                        reason: "must be greater than 0 when rate limiting is enabled".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogFormat;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_anonymous, 100);
        assert_eq!(config.rate_limit_authenticated, 1000);
        assert_eq!(config.rate_limit_burst, 10);
        assert!(config.origin.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = ApiConfig::from_lookup(|_| None);
        assert_eq!(config.lmdb_map_size_mb, 256);
        assert_eq!(config.origin, OriginConfig::default());
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn test_reads_marquee_variables() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("MARQUEE_ORIGIN_API_KEY", "abc123"),
            ("MARQUEE_ORIGIN_RPM", "120"),
            ("MARQUEE_ORIGIN_TIMEOUT_SECS", "3"),
            ("MARQUEE_CLIENT_RETRIES", "5"),
            ("MARQUEE_CLIENT_RETRY_DELAY_MS", "250"),
            ("MARQUEE_CLIENT_STALE_WHILE_REVALIDATE", "false"),
            ("MARQUEE_LMDB_PATH", "/var/lib/marquee"),
            ("MARQUEE_RATE_LIMIT_ENABLED", "0"),
            ("MARQUEE_RATE_LIMIT_BURST", "4"),
            ("MARQUEE_LOG_FORMAT", "json"),
        ]));

        assert_eq!(config.origin.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.origin.requests_per_minute, 120);
        assert_eq!(config.origin.request_timeout, Duration::from_secs(3));
        assert_eq!(config.cache.client.retries, 5);
        assert_eq!(config.cache.client.retry_delay, Duration::from_millis(250));
        assert!(!config.cache.client.stale_while_revalidate);
        assert_eq!(config.lmdb_path, PathBuf::from("/var/lib/marquee"));
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.rate_limit_burst, 4);
        assert_eq!(config.telemetry.format, LogFormat::Json);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("MARQUEE_ORIGIN_RPM", "lots"),
            ("MARQUEE_ORIGIN_API_KEY", "   "),
            ("MARQUEE_LOG_FORMAT", "xml"),
        ]));
        assert_eq!(config.origin.requests_per_minute, 40);
        assert!(config.origin.api_key.is_none());
        assert_eq!(config.telemetry.format, LogFormat::Compact);
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let config = ApiConfig {
            rate_limit_burst: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let disabled = ApiConfig {
            rate_limit_enabled: false,
            ..config
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_validate_checks_cache_section() {
        let mut config = ApiConfig::default();
        config.cache.client.retries = 0;
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
