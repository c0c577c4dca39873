//! Caching and consistency layer.
//!
//! Four independent components, none of which calls another:
//!
//! - [`OriginCache`]: persisted read-through cache in front of the catalog
//!   origin, with lifetimes from [`TtlPolicy`].
//! - [`ClientCache`]: caller-local stale-while-revalidate cache with
//!   bounded retry, over a [`LocalStore`].
//! - [`StatsCache`]: aggregate snapshots that rebuild themselves when their
//!   total drifts from the authoritative fact count.
//! - [`ToggleCounter`]: idempotent on/off records with a denormalized
//!   counter on the parent.
//!
//! Reads that can report provenance return [`CacheRead<T>`], which carries
//! when the value was cached and whether the source was contacted.

pub mod freshness;
pub mod lmdb_backend;
pub mod local_store;
pub mod origin;
pub mod revalidate;
pub mod stats;
pub mod toggle;
pub mod traits;
pub mod ttl;

pub use freshness::CacheRead;
pub use lmdb_backend::{LmdbLocalStore, LmdbStoreError};
pub use local_store::{InMemoryLocalStore, LocalStore};
pub use origin::{collection_name, OriginCache};
pub use revalidate::{ClientCache, FetchOptions};
pub use stats::{CategorySpec, StatsCache, StatsSchema};
pub use toggle::{ToggleCounter, ToggleSpec};
pub use traits::{CachePayload, CacheStats};
pub use ttl::TtlPolicy;
