//! Marquee API - Process Wiring
//!
//! Everything a request-serving process needs around the cache layer:
//! configuration from the environment, tracing setup, caller identity,
//! per-identity rate limiting and the shared state holding the four
//! cache components.

pub mod config;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, RateLimited};
pub use identity::Identity;
pub use rate_limit::{RateLimitKey, RateLimitState};
pub use state::{
    ApiClientCache, ApiOriginCache, ApiStatsCache, ApiToggleCounter, AppState, Toggles,
};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, DEFAULT_FILTER};
