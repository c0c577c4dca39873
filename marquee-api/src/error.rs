//! Errors surfaced by the process layer.

use std::time::Duration;

use marquee_core::MarqueeError;
use thiserror::Error;

/// Caller exceeded its request quota.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limited, retry after {}s", retry_after.as_secs())]
pub struct RateLimited {
    /// Time until the next request would be admitted, at least one second.
    pub retry_after: Duration,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error(transparent)]
    Core(#[from] MarqueeError),
}

impl ApiError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::RateLimited(_) => 429,
            Self::Core(e) if e.is_origin_unavailable() => 503,
            Self::Core(_) => 500,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
