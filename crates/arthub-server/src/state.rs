//! Shared application state.

use crate::cache::CacheService;
use crate::config::ServerConfig;
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide cache facade.
    pub cache: CacheService,
    /// Loaded configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build state, selecting the cache backend from configuration.
    pub fn new(config: ServerConfig) -> Self {
        let cache = CacheService::from_config(&config.cache);
        Self::with_cache(config, cache)
    }

    /// Build state around an existing cache.
    pub fn with_cache(config: ServerConfig, cache: CacheService) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }
}
