//! Caching layer for the server.
//!
//! Provides in-memory and Redis backends behind one trait, typed cache-aside
//! access with single-flight, and pattern-based invalidation per entity.

pub mod r#trait;
pub mod memory;
pub mod redis;
pub mod selector;
pub mod keys;
pub mod ttl;
pub mod service;
pub mod aside;
pub mod domain;
pub mod invalidation;

pub use r#trait::{BackendStatus, CacheBackend, CacheError, CacheResult, CacheStats, KeyTtl};
pub use memory::MemoryCache;
pub use redis::RedisCache;
pub use selector::{is_placeholder, select_backend, RedisEndpoint};
pub use keys::{ArtworkListQuery, ArtworkListType, CacheKeyBuilder, KeyGenerator};
pub use service::CacheService;
pub use invalidation::InvalidationRouter;
