//! Whole-response caching for JSON `GET` routes.

pub mod layer;
pub mod types;

pub use layer::{response_key, ResponseCacheLayer, ResponseCacheMiddleware};
pub use types::{skip_authenticated, CacheStatus, CachedResponse, SkipPredicate};
