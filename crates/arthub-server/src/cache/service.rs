//! Typed cache access for request handlers.
//!
//! `CacheService` is the boundary where backend failures stop: every error is
//! logged and turned into a safe default, so an unavailable cache only ever
//! costs latency. The one exception is the producer passed to
//! [`CacheService::cache_with_fallback`], whose errors reach the caller.

use super::aside::SingleFlight;
use super::invalidation::InvalidationRouter;
use super::keys::KeyGenerator;
use super::r#trait::{BackendStatus, CacheBackend, CacheError, CacheStats, KeyTtl};
use super::selector::select_backend;
use crate::config::CacheConfig;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Shared handle to the process cache. Cheap to clone.
#[derive(Clone)]
pub struct CacheService {
    pub(super) inner: Arc<CacheServiceInner>,
}

pub(super) struct CacheServiceInner {
    pub(super) backend: Arc<dyn CacheBackend>,
    pub(super) keys: KeyGenerator,
    pub(super) default_ttl: u64,
    pub(super) flights: SingleFlight,
    writes: TaskTracker,
    /// Set once by `close`; `settle` never reopens the write tracker after it.
    closed: Mutex<bool>,
    stats: StatsInner,
}

#[derive(Default)]
struct StatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>, keys: KeyGenerator, default_ttl: u64) -> Self {
        Self {
            inner: Arc::new(CacheServiceInner {
                backend,
                keys,
                default_ttl,
                flights: SingleFlight::default(),
                writes: TaskTracker::new(),
                closed: Mutex::new(false),
                stats: StatsInner::default(),
            }),
        }
    }

    /// Select the backend from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            select_backend(config),
            KeyGenerator::new(config.key_prefix.clone()),
            config.default_ttl_secs,
        )
    }

    /// Connect the backend and start its background work.
    pub async fn init(&self) -> Result<(), CacheError> {
        self.inner.backend.init().await
    }

    /// Wait for pending writes, then release the backend.
    pub async fn close(&self) {
        {
            let mut closed = self.inner.closed.lock();
            *closed = true;
            self.inner.writes.close();
        }
        self.inner.writes.wait().await;

        if let Err(e) = self.inner.backend.quit().await {
            warn!(backend = self.backend_name(), error = %e, "Cache backend did not close cleanly");
        }
    }

    /// Wait until every write issued so far has finished.
    pub async fn settle(&self) {
        self.inner.writes.close();
        self.inner.writes.wait().await;

        let closed = self.inner.closed.lock();
        if !*closed {
            self.inner.writes.reopen();
        }
    }

    /// Invalidation functions bound to this cache.
    pub fn invalidation(&self) -> InvalidationRouter {
        InvalidationRouter::new(self.clone())
    }

    pub fn default_ttl(&self) -> u64 {
        self.inner.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    pub fn status(&self) -> BackendStatus {
        self.inner.backend.status()
    }

    pub fn stats(&self) -> CacheStats {
        let stats = &self.inner.stats;
        CacheStats {
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Whether the backend answers.
    pub async fn ping(&self) -> bool {
        match self.inner.backend.ping().await {
            Ok(_) => true,
            Err(e) => self.swallow("ping", "-", e, false),
        }
    }

    /// Store a value under `key`. Returns `false` if it was not stored.
    pub async fn set_cache<T>(&self, key: &str, value: &T, ttl_secs: u64) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let full_key = self.full_key(key, None);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => return self.swallow("set", &full_key, e.into(), false),
        };

        match self.inner.backend.set(&full_key, payload, ttl_secs).await {
            Ok(()) => true,
            Err(e) => self.swallow("set", &full_key, e, false),
        }
    }

    /// Fetch the value under `key`. Errors and undecodable values read as a
    /// miss.
    pub async fn get_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.full_key(key, None);
        self.get_full(&full_key).await
    }

    /// Delete `key`. Returns the number of entries removed.
    pub async fn delete_cache(&self, key: &str) -> u64 {
        let full_key = self.full_key(key, None);
        match self.inner.backend.del(&[full_key.clone()]).await {
            Ok(deleted) => deleted,
            Err(e) => self.swallow("delete", &full_key, e, 0),
        }
    }

    /// Delete every key matching a glob pattern (`*` matches any run of
    /// characters). Returns the number of entries removed.
    pub async fn delete_cache_by_pattern(&self, pattern: &str) -> u64 {
        let full_pattern = self.full_key(pattern, None);

        let keys = match self.inner.backend.keys(&full_pattern).await {
            Ok(keys) => keys,
            Err(e) => return self.swallow("keys", &full_pattern, e, 0),
        };
        if keys.is_empty() {
            return 0;
        }

        match self.inner.backend.del(&keys).await {
            Ok(deleted) => {
                debug!(pattern = %full_pattern, deleted = deleted, "Cache delete pattern");
                deleted
            }
            Err(e) => self.swallow("delete pattern", &full_pattern, e, 0),
        }
    }

    pub async fn cache_exists(&self, key: &str) -> bool {
        let full_key = self.full_key(key, None);
        match self.inner.backend.exists(&full_key).await {
            Ok(exists) => exists,
            Err(e) => self.swallow("exists", &full_key, e, false),
        }
    }

    /// Remaining seconds, `-1` without expiry, `-2` when missing (or when the
    /// backend cannot be reached).
    pub async fn get_cache_ttl(&self, key: &str) -> i64 {
        let full_key = self.full_key(key, None);
        match self.inner.backend.ttl(&full_key).await {
            Ok(ttl) => ttl.as_seconds(),
            Err(e) => self.swallow("ttl", &full_key, e, KeyTtl::Missing.as_seconds()),
        }
    }

    /// Add `delta` to a counter. A new counter expires after `ttl_secs`; an
    /// existing one keeps its expiry. Returns `0` on failure.
    pub async fn increment_cache(&self, key: &str, delta: i64, ttl_secs: u64) -> i64 {
        let full_key = self.full_key(key, None);
        match self.inner.backend.incr_by(&full_key, delta, ttl_secs).await {
            Ok(value) => value,
            Err(e) => self.swallow("increment", &full_key, e, 0),
        }
    }

    /// Replace the expiry of an existing key.
    pub async fn expire_cache(&self, key: &str, ttl_secs: u64) -> bool {
        let full_key = self.full_key(key, None);
        match self.inner.backend.expire(&full_key, ttl_secs).await {
            Ok(updated) => updated,
            Err(e) => self.swallow("expire", &full_key, e, false),
        }
    }

    pub(crate) fn full_key(&self, base: &str, namespace: Option<&str>) -> String {
        self.inner.keys.build_key(base, namespace)
    }

    pub(crate) async fn get_full<T: DeserializeOwned>(&self, full_key: &str) -> Option<T> {
        let stats = &self.inner.stats;

        let payload = match self.inner.backend.get(full_key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full_key, "Cache miss");
                return None;
            }
            Err(e) => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                return self.swallow("get", full_key, e, None);
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => {
                stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full_key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                self.swallow("decode", full_key, e.into(), None)
            }
        }
    }

    /// Write in the background; the caller does not wait and never sees a
    /// failure.
    pub(crate) fn spawn_write(&self, full_key: String, payload: String, ttl_secs: u64) {
        let service = self.clone();
        self.inner.writes.spawn(async move {
            if let Err(e) = service.inner.backend.set(&full_key, payload, ttl_secs).await {
                service.swallow("background set", &full_key, e, ());
            }
        });
    }

    pub(crate) fn swallow<T>(&self, op: &'static str, key: &str, err: CacheError, fallback: T) -> T {
        self.inner.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            backend = self.backend_name(),
            op = op,
            key = %key,
            error = %err,
            "Cache operation failed"
        );
        fallback
    }
}
