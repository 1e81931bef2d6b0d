//! Middleware for the ArtHub API server.

pub mod response_cache;

pub use response_cache::{
    response_key, skip_authenticated, CacheStatus, CachedResponse, ResponseCacheLayer,
    ResponseCacheMiddleware,
};
