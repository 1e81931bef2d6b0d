//! ArtHub API Server
//!
//! Caching layer and HTTP host for the ArtHub marketplace.
//!
//! # Architecture
//!
//! - **Cache backends**: in-memory and Redis behind [`cache::CacheBackend`],
//!   chosen once at startup
//! - **Cache service**: typed cache-aside access with single-flight misses
//! - **Invalidation**: per-entity pattern purges after mutations
//! - **Middleware**: whole-response caching for JSON `GET` routes
//!
//! # Features
//!
//! - `tracing` - Structured logging subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod middleware;
pub mod routes;
pub mod shutdown;
pub mod state;
#[cfg(feature = "tracing")]
pub mod telemetry;

pub use cache::{CacheService, InvalidationRouter};
pub use config::ServerConfig;
pub use state::AppState;

use axum::Router;
use middleware::{skip_authenticated, ResponseCacheLayer};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Server builder for constructing and running the API server.
pub struct Server {
    state: AppState,
    api: Router<AppState>,
}

impl Server {
    /// Create a server with no API routes mounted.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
            api: Router::new(),
        }
    }

    /// Create a server around an existing state.
    pub fn with_state(state: AppState) -> Self {
        Self {
            state,
            api: Router::new(),
        }
    }

    /// Mount API routes. They sit behind the response cache when enabled.
    pub fn with_api(mut self, api: Router<AppState>) -> Self {
        self.api = self.api.merge(api);
        self
    }

    /// Shared state, for handlers built outside the server.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let response_cache = &self.state.config.response_cache;
        let mut api = self.api.clone();

        if response_cache.enabled {
            api = api.layer(
                ResponseCacheLayer::from_config(self.state.cache.clone(), response_cache)
                    .skip_when(skip_authenticated),
            );
        }

        routes::health_router()
            .merge(api)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Run until a termination signal, then drain the cache.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let cache = self.state.cache.clone();

        if let Err(e) = cache.init().await {
            warn!(backend = cache.backend_name(), error = %e, "Cache backend unavailable at startup");
        }

        let served = self.serve().await;
        cache.close().await;
        info!("Cache closed");

        served
    }

    async fn serve(&self) -> Result<(), anyhow::Error> {
        let addr = self.addr();
        let listener = TcpListener::bind(addr).await?;

        info!(%addr, backend = self.state.cache.backend_name(), "Server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown::shutdown_signal())
            .await?;

        Ok(())
    }

    /// Get the server's socket address.
    pub fn addr(&self) -> SocketAddr {
        self.state.config.socket_addr()
    }
}
