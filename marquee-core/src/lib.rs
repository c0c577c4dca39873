//! Marquee Core - Record Types
//!
//! Record shapes, identifiers, the clock abstraction, the error taxonomy and
//! configuration shared by every marquee crate. No I/O lives here.

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod origin;
pub mod records;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ClientCacheDefaults, OriginConfig, TtlThresholds};
pub use error::{
    ConfigError, FetchError, MarqueeError, MarqueeResult, OriginError, StorageError,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use identity::{new_entity_id, ActorId, ExternalId, SubjectId, SubjectType, Timestamp};
pub use origin::{parse_reference_date, CatalogEntity, OriginClient};
pub use records::{
    age_between, Breakdowns, CacheEntry, CounterDrift, LocalCacheRecord, StatsSnapshot,
    ToggleOutcome, ToggleRecord, ToggleState,
};
