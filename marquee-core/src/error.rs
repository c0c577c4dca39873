//! Error types for marquee operations

use std::time::Duration;
use thiserror::Error;

/// Document and local storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Document not found in {collection}: {filter}")]
    NotFound { collection: String, filter: String },

    #[error("Insert failed in {collection}: {reason}")]
    InsertFailed { collection: String, reason: String },

    #[error("Update failed in {collection}: {reason}")]
    UpdateFailed { collection: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for {collection}: {reason}")]
    Serialization { collection: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised while talking to the catalog origin.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    /// The origin could not produce a payload and nothing usable is cached.
    #[error("Origin unavailable for {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Rate limited by origin, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    #[error("Invalid response from origin for {path}: {reason}")]
    InvalidResponse { path: String, reason: String },
}

/// Errors raised by the client revalidation cache fetch loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// A single attempt failed; the retry loop may try again.
    #[error("Transient fetch failure for {key}: {reason}")]
    Transient { key: String, reason: String },

    /// The fetcher answered with a payload flagged as an error.
    #[error("Fetcher returned an error payload for {key}")]
    ErrorPayload { key: String },

    /// Every attempt failed and no usable cache exists.
    #[error("Fetch for {key} failed after {attempts} attempts: {last}")]
    Exhausted {
        key: String,
        attempts: u32,
        last: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all marquee errors.
#[derive(Debug, Clone, Error)]
pub enum MarqueeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl MarqueeError {
    /// Missing origin credential; fatal to the calling request and never retried.
    pub fn missing_credential() -> Self {
        Self::Config(ConfigError::MissingRequired {
            field: "origin.api_key".to_string(),
        })
    }

    /// True when the origin could not supply data: unreachable, throttled
    /// or answering garbage. `retry_after` carries the throttling detail.
    pub fn is_origin_unavailable(&self) -> bool {
        matches!(self, Self::Origin(_))
    }

    /// True for configuration failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// How long the origin asked callers to back off, if it did.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Origin(OriginError::RateLimited { retry_after_ms }) => {
                Some(Duration::from_millis((*retry_after_ms).max(0) as u64))
            }
            _ => None,
        }
    }
}

/// Result type alias for marquee operations.
pub type MarqueeResult<T> = Result<T, MarqueeError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            collection: "posts".to_string(),
            filter: "{\"id\":\"p1\"}".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Document not found"));
        assert!(msg.contains("posts"));
        assert!(msg.contains("p1"));
    }

    #[test]
    fn test_origin_error_display_rate_limited() {
        let err = OriginError::RateLimited {
            retry_after_ms: 1500,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Rate limited"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn test_fetch_error_display_exhausted() {
        let err = FetchError::Exhausted {
            key: "trending:week".to_string(),
            attempts: 3,
            last: "connection reset".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("trending:week"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "origin.base_url".to_string(),
            value: "bad".to_string(),
            reason: "must be url".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("origin.base_url"));
        assert!(msg.contains("bad"));
        assert!(msg.contains("must be url"));
    }

    #[test]
    fn test_marquee_error_from_variants() {
        let storage = MarqueeError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, MarqueeError::Storage(_)));

        let origin = MarqueeError::from(OriginError::Unavailable {
            path: "movie/1".to_string(),
            reason: "timeout".to_string(),
        });
        assert!(origin.is_origin_unavailable());

        let fetch = MarqueeError::from(FetchError::ErrorPayload {
            key: "k".to_string(),
        });
        assert!(matches!(fetch, MarqueeError::Fetch(_)));

        assert!(MarqueeError::missing_credential().is_configuration());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = MarqueeError::from(OriginError::RateLimited {
            retry_after_ms: 2000,
        });
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));

        let negative = MarqueeError::from(OriginError::RateLimited {
            retry_after_ms: -5,
        });
        assert_eq!(negative.retry_after(), Some(Duration::ZERO));

        assert_eq!(MarqueeError::from(StorageError::LockPoisoned).retry_after(), None);
    }

    #[test]
    fn test_every_origin_failure_is_unavailable() {
        let throttled = MarqueeError::from(OriginError::RateLimited {
            retry_after_ms: 1000,
        });
        assert!(throttled.is_origin_unavailable());
        assert!(!throttled.is_configuration());

        let garbled = MarqueeError::from(OriginError::InvalidResponse {
            path: "movie/1".to_string(),
            reason: "expected value".to_string(),
        });
        assert!(garbled.is_origin_unavailable());

        assert!(!MarqueeError::missing_credential().is_origin_unavailable());
        assert!(!MarqueeError::from(StorageError::LockPoisoned).is_origin_unavailable());
    }
}
