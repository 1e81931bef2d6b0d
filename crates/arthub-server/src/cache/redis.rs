//! Redis cache implementation.

use super::r#trait::{BackendStatus, CacheBackend, CacheError, CacheResult, KeyTtl};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Minimum pause between a failed connect and the next attempt.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

const BACKING_OFF: &str = "reconnect backing off";

/// Increment that only applies the TTL when the key did not exist before.
const INCR_WITH_TTL: &str = r#"
local existed = redis.call('EXISTS', KEYS[1])
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
if existed == 0 and tonumber(ARGV[2]) > 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return value
"#;

/// Redis cache implementation.
///
/// Lifecycle changes are logged and reported through [`CacheBackend::status`];
/// they never cause a switch to another backend. While Redis is unreachable
/// every operation fails and the caller falls back to its safe default.
pub struct RedisCache {
    client: redis::Client,
    connect_timeout: Duration,
    manager: RwLock<Option<ConnectionManager>>,
    /// Held for the duration of a connect so callers share one attempt.
    connect_lock: tokio::sync::Mutex<()>,
    last_failure: Mutex<Option<Instant>>,
    status: RwLock<BackendStatus>,
    incr_script: redis::Script,
}

impl RedisCache {
    /// Create a Redis cache for the given endpoint. No connection is made until
    /// [`CacheBackend::init`] or the first operation.
    pub fn new<T: redis::IntoConnectionInfo>(endpoint: T, connect_timeout: Duration) -> redis::RedisResult<Self> {
        let client = redis::Client::open(endpoint)?;

        Ok(Self {
            client,
            connect_timeout,
            manager: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            last_failure: Mutex::new(None),
            status: RwLock::new(BackendStatus::Disconnected),
            incr_script: redis::Script::new(INCR_WITH_TTL),
        })
    }

    fn transition(&self, next: BackendStatus) {
        let previous = {
            let mut status = self.status.write();
            if *status == next || *status == BackendStatus::Closed {
                return;
            }
            std::mem::replace(&mut *status, next)
        };

        match next {
            BackendStatus::Ready => info!(from = %previous, "Redis connection ready"),
            BackendStatus::Connecting => info!(from = %previous, "Connecting to Redis"),
            BackendStatus::Reconnecting => warn!(from = %previous, "Redis connection lost, reconnecting"),
            BackendStatus::Disconnected => warn!(from = %previous, "Redis disconnected"),
            BackendStatus::Closed => info!(from = %previous, "Redis connection closed"),
        }
    }

    async fn connect(&self) -> CacheResult<ConnectionManager> {
        let result = self.try_connect().await;
        *self.last_failure.lock() = result.is_err().then(Instant::now);
        result
    }

    async fn try_connect(&self) -> CacheResult<ConnectionManager> {
        let attempt = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await;

        match attempt {
            Ok(Ok(manager)) => {
                *self.manager.write() = Some(manager.clone());
                self.transition(BackendStatus::Ready);
                Ok(manager)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Redis connection failed");
                self.transition(BackendStatus::Disconnected);
                Err(CacheError::Connection(e.to_string()))
            }
            Err(_) => {
                error!(timeout_ms = self.connect_timeout.as_millis() as u64, "Redis connection timed out");
                self.transition(BackendStatus::Disconnected);
                Err(CacheError::Connection("connect timed out".to_string()))
            }
        }
    }

    fn current(&self) -> Option<ConnectionManager> {
        self.manager.read().clone()
    }

    fn backing_off(&self) -> bool {
        self.last_failure
            .lock()
            .map_or(false, |failed| failed.elapsed() < RECONNECT_BACKOFF)
    }

    /// Get a Redis connection, reconnecting if none is established.
    ///
    /// Concurrent callers wait on one connect attempt. After a failure every
    /// caller fails fast until [`RECONNECT_BACKOFF`] has passed.
    async fn get_connection(&self) -> CacheResult<ConnectionManager> {
        if self.status() == BackendStatus::Closed {
            return Err(CacheError::Closed);
        }
        if let Some(manager) = self.current() {
            return Ok(manager);
        }
        if self.backing_off() {
            return Err(CacheError::Connection(BACKING_OFF.to_string()));
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(manager) = self.current() {
            return Ok(manager);
        }
        if self.backing_off() {
            return Err(CacheError::Connection(BACKING_OFF.to_string()));
        }
        if self.status() == BackendStatus::Closed {
            return Err(CacheError::Closed);
        }

        self.transition(BackendStatus::Reconnecting);
        self.connect().await
    }

    /// Map a command failure, tracking dropped connections.
    fn command_error(&self, err: redis::RedisError) -> CacheError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            self.transition(BackendStatus::Reconnecting);
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }

    fn command_ok(&self) {
        if self.status() == BackendStatus::Reconnecting {
            self.transition(BackendStatus::Ready);
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn status(&self) -> BackendStatus {
        *self.status.read()
    }

    async fn init(&self) -> CacheResult<()> {
        let _guard = self.connect_lock.lock().await;
        if self.current().is_some() {
            return Ok(());
        }
        self.transition(BackendStatus::Connecting);
        self.connect().await.map(|_| ())
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        debug!(key = key, ttl_secs = ttl_secs, "Redis cache set");
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.get_connection().await?;

        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        Ok(value)
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_connection().await?;

        let deleted: u64 = conn
            .del(keys)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.get_connection().await?;

        // SCAN instead of KEYS so large keyspaces do not block the server.
        let mut keys = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(pattern)
                .await
                .map_err(|e| self.command_error(e))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        self.command_ok();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;

        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut conn = self.get_connection().await?;

        let ttl: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        Ok(KeyTtl::from_seconds(ttl))
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64> {
        let mut conn = self.get_connection().await?;

        let value: i64 = self
            .incr_script
            .key(key)
            .arg(delta)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| match e.kind() {
                redis::ErrorKind::ResponseError | redis::ErrorKind::ExtensionError
                    if e.to_string().contains("not an integer") =>
                {
                    CacheError::NotAnInteger(key.to_string())
                }
                _ => self.command_error(e),
            })?;

        self.command_ok();
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;

        let updated: bool = if ttl_secs == 0 {
            // PERSIST reports 0 for keys without an expiry; treat those as updated.
            let persisted: bool = redis::cmd("PERSIST")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.command_error(e))?;
            if persisted {
                true
            } else {
                let exists: bool = conn
                    .exists(key)
                    .await
                    .map_err(|e| self.command_error(e))?;
                exists
            }
        } else {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.command_error(e))?
        };

        self.command_ok();
        Ok(updated)
    }

    async fn ping(&self) -> CacheResult<String> {
        let mut conn = self.get_connection().await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;

        self.command_ok();
        Ok(pong)
    }

    async fn quit(&self) -> CacheResult<()> {
        self.transition(BackendStatus::Closed);
        // Dropping the last manager handle closes the multiplexed connection.
        self.manager.write().take();
        Ok(())
    }
}
