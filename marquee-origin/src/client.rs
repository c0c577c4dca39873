//! Catalog origin HTTP client with rate limiting

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use marquee_core::{
    ConfigError, HealthCheck, MarqueeError, MarqueeResult, OriginClient, OriginConfig,
    OriginError,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

use crate::types::StatusBody;

/// Cheap endpoint used for health checks.
const HEALTH_PATH: &str = "configuration";

/// How the credential is presented to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStyle {
    /// `?api_key=...` (short v3 keys)
    QueryParam,
    /// `Authorization: Bearer ...` (JWT read access tokens)
    Bearer,
}

impl CredentialStyle {
    pub fn for_key(key: &str) -> Self {
        if key.starts_with("eyJ") {
            Self::Bearer
        } else {
            Self::QueryParam
        }
    }
}

/// Origin client with rate limiting.
///
/// Concurrency is bounded by a semaphore with one permit per allowed
/// request per minute, and consecutive requests are spaced at least
/// `60s / requests_per_minute` apart.
pub struct HttpOriginClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<Semaphore>,
    last_request: Mutex<Option<Instant>>,
    min_request_interval: Duration,
}

impl HttpOriginClient {
    /// Build a client from validated configuration.
    ///
    /// A missing API key is allowed here; every fetch then fails with a
    /// configuration error.
    pub fn new(config: &OriginConfig) -> MarqueeResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "origin".to_string(),
                value: config.base_url.clone(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        let rpm = config.requests_per_minute.max(1);
        let min_interval_ms = (60_000 / rpm as u64).max(10);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            rate_limiter: Arc::new(Semaphore::new(rpm as usize)),
            last_request: Mutex::new(None),
            min_request_interval: Duration::from_millis(min_interval_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn min_request_interval(&self) -> Duration {
        self.min_request_interval
    }

    /// Absolute url for an origin path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Probe the origin and report how it is doing.
    pub async fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        let result = self.fetch(HEALTH_PATH).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(_) => HealthCheck::healthy("origin").with_response_time(elapsed_ms),
            Err(MarqueeError::Origin(OriginError::RateLimited { retry_after_ms })) => {
                HealthCheck::degraded("origin", "rate limited")
                    .with_response_time(elapsed_ms)
                    .with_metadata("retry_after_ms", Value::from(retry_after_ms))
            }
            Err(e) => HealthCheck::unhealthy("origin", e.to_string()).with_response_time(elapsed_ms),
        }
    }

    /// Wait until the minimum interval since the previous request has passed.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn authorize(&self, request: RequestBuilder, key: &str) -> RequestBuilder {
        match CredentialStyle::for_key(key) {
            CredentialStyle::Bearer => request.bearer_auth(key),
            CredentialStyle::QueryParam => request.query(&[("api_key", key)]),
        }
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, path: &str) -> MarqueeResult<Value> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(MarqueeError::missing_credential());
        };

        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| unavailable(path, format!("Rate limiter error: {}", e)))?;
        self.pace().await;

        let request = self
            .client
            .get(self.url_for(path))
            .header("Accept", "application/json");
        let response = self
            .authorize(request, key)
            .send()
            .await
            .map_err(|e| unavailable(path, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);
        let body = response
            .text()
            .await
            .map_err(|e| unavailable(path, format!("Failed to read body: {}", e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(path = %path, retry_after_ms, "Origin rate limited");
            return Err(OriginError::RateLimited { retry_after_ms }.into());
        }

        if !status.is_success() {
            let detail = serde_json::from_str::<StatusBody>(&body)
                .map(|b| b.describe())
                .unwrap_or(body);
            tracing::warn!(path = %path, status = status.as_u16(), "Origin request failed");
            return Err(unavailable(path, format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|e| OriginError::InvalidResponse {
            path: path.to_string(),
            reason: format!("Failed to parse response: {}", e),
        })?;

        if let Ok(status_body) = StatusBody::deserialize(&payload) {
            if status_body.is_failure() {
                return Err(unavailable(path, status_body.describe()));
            }
        }

        tracing::debug!(path = %path, "Origin fetch ok");
        Ok(payload)
    }
}

fn unavailable(path: &str, reason: String) -> MarqueeError {
    OriginError::Unavailable {
        path: path.to_string(),
        reason,
    }
    .into()
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for HttpOriginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOriginClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("min_request_interval", &self.min_request_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn config(key: Option<&str>) -> OriginConfig {
        OriginConfig {
            api_key: key.map(str::to_string),
            ..OriginConfig::default()
        }
    }

    #[test]
    fn test_url_for_joins_cleanly() {
        let client = HttpOriginClient::new(&OriginConfig {
            base_url: "https://catalog.example/3/".to_string(),
            ..config(Some("k"))
        })
        .unwrap();
        assert_eq!(client.url_for("movie/603"), "https://catalog.example/3/movie/603");
        assert_eq!(client.url_for("/tv/1399"), "https://catalog.example/3/tv/1399");
    }

    #[test]
    fn test_min_interval_from_rpm() {
        let client = HttpOriginClient::new(&config(Some("k"))).unwrap();
        assert_eq!(client.min_request_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn test_blank_key_is_no_credential() {
        assert!(!HttpOriginClient::new(&config(Some("  "))).unwrap().has_credential());
        assert!(!HttpOriginClient::new(&config(None)).unwrap().has_credential());
        assert!(HttpOriginClient::new(&config(Some("abc"))).unwrap().has_credential());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HttpOriginClient::new(&OriginConfig {
            requests_per_minute: 0,
            ..config(Some("k"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_credential_style() {
        assert_eq!(CredentialStyle::for_key("0123abcd"), CredentialStyle::QueryParam);
        assert_eq!(CredentialStyle::for_key("eyJhbGciOiJIUzI1NiJ9.x.y"), CredentialStyle::Bearer);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after_ms(&headers), Some(2000));
        headers.insert("retry-after", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(500));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = HttpOriginClient::new(&config(Some("super-secret"))).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_fetch_without_credential_is_configuration_error() {
        let client = HttpOriginClient::new(&config(None)).unwrap();
        let err = client.fetch("movie/603").await.unwrap_err();
        assert!(err.is_configuration());
    }
}
