//! Marquee Storage - Document Store and Cache Layer
//!
//! Defines the document store abstraction the cache layer writes through,
//! an in-memory implementation, and the caching/consistency components.

pub mod cache;
pub mod document;
pub mod memory;

pub use document::{decode, encode, Document, DocumentStore, Filter, FilterValue};
pub use memory::{InMemoryDocumentStore, StoreStats};

pub use cache::{
    CachePayload, CacheRead, CacheStats, CategorySpec, ClientCache, FetchOptions,
    InMemoryLocalStore, LmdbLocalStore, LmdbStoreError, LocalStore, OriginCache, StatsCache,
    StatsSchema, ToggleCounter, ToggleSpec, TtlPolicy,
};
