//! Cache backend trait definition.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Cache operation result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid key pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Value at `{0}` is not an integer")]
    NotAnInteger(String),
    #[error("Cache backend is closed")]
    Closed,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Connection state of a backend.
///
/// Only the Redis backend ever leaves `Ready`; the memory backend reports
/// `Ready` until it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    Closed,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key expires after the given duration.
    Expires(Duration),
    /// Key exists and never expires.
    Persistent,
    /// Key does not exist.
    Missing,
}

impl KeyTtl {
    /// Redis-style integer form: remaining seconds, `-1` for no expiry,
    /// `-2` for a missing key.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Expires(remaining) => remaining.as_secs_f64().ceil() as i64,
            Self::Persistent => -1,
            Self::Missing => -2,
        }
    }

    /// Inverse of [`KeyTtl::as_seconds`].
    pub fn from_seconds(secs: i64) -> Self {
        match secs {
            -1 => Self::Persistent,
            s if s < 0 => Self::Missing,
            s => Self::Expires(Duration::from_secs(s as u64)),
        }
    }
}

/// Key-value store with TTL support.
///
/// Values are stored as already-serialized strings; typed access goes through
/// [`CacheService`](super::CacheService). A `ttl_secs` of `0` means the entry
/// never expires.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Current connection state.
    fn status(&self) -> BackendStatus;

    /// Acquire resources (connections, sweep tasks). Safe to call twice.
    async fn init(&self) -> CacheResult<()>;

    /// Store a value, replacing any prior value and expiry for the key.
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()>;

    /// Fetch a live value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    /// List live keys matching a glob pattern. May scan the whole keyspace.
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Check whether a live entry exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// Add `delta` to an integer value.
    ///
    /// A missing key starts from zero and gets `ttl_secs` applied; an existing
    /// key keeps its current expiry.
    async fn incr_by(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64>;

    /// Replace the expiry of an existing key. Returns `false` if the key is
    /// missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool>;

    /// Round-trip check.
    async fn ping(&self) -> CacheResult<String>;

    /// Release every resource held by the backend.
    async fn quit(&self) -> CacheResult<()>;
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
