//! In-memory cache implementation.
//!
//! Entries carry their own deadline. Reads check it and drop stale entries on
//! the spot, and a background sweep removes whatever expired without being
//! read again.

use super::r#trait::{BackendStatus, CacheBackend, CacheError, CacheResult, KeyTtl};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// In-memory cache entry.
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: deadline(ttl_secs),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs))
}

/// Compile a Redis-style glob (`*`, `?`, `[...]`).
pub(crate) fn compile_pattern(pattern: &str) -> CacheResult<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

fn sweep_expired(entries: &DashMap<String, CacheEntry>) -> usize {
    let now = Instant::now();
    let mut removed = 0;
    entries.retain(|_, entry| {
        let live = entry.is_live(now);
        if !live {
            removed += 1;
        }
        live
    });
    removed
}

/// In-memory cache implementation.
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MemoryCache {
    /// Create an empty cache. The sweep task starts on [`CacheBackend::init`].
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            sweep_interval,
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.entries)
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Start a background task to clean up expired entries.
    fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let entries: Weak<DashMap<String, CacheEntry>> = Arc::downgrade(&self.entries);
        let period = self.sweep_interval.max(Duration::from_millis(1));
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let removed = sweep_expired(&entries);
                if removed > 0 {
                    debug!(removed = removed, "Swept expired cache entries");
                }
            }
        }));
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn status(&self) -> BackendStatus {
        if self.closed.load(Ordering::Acquire) {
            BackendStatus::Closed
        } else {
            BackendStatus::Ready
        }
    }

    async fn init(&self) -> CacheResult<()> {
        self.ensure_open()?;
        self.start_sweeper();
        Ok(())
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        self.ensure_open()?;
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_secs));
        debug!(key = key, ttl_secs = ttl_secs, "Cache set");
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ensure_open()?;
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Expired; a concurrent overwrite must survive.
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        debug!(key = key, "Cache entry expired on read");
        Ok(None)
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        self.ensure_open()?;
        let now = Instant::now();

        let mut deleted = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if entry.is_live(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.ensure_open()?;
        let matcher = compile_pattern(pattern)?;
        let now = Instant::now();

        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().is_live(now) && matcher.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .map_or(false, |entry| entry.is_live(now)))
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(match entry.expires_at {
                Some(at) => KeyTtl::Expires(at.saturating_duration_since(now)),
                None => KeyTtl::Persistent,
            }),
            _ => Ok(KeyTtl::Missing),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let current: i64 = occupied
                    .get()
                    .value
                    .parse()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::Backend(format!("increment overflow at `{key}`")))?;
                occupied.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Occupied(mut expired) => {
                expired.insert(CacheEntry::new(delta.to_string(), ttl_secs));
                Ok(delta)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(delta.to_string(), ttl_secs));
                Ok(delta)
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = deadline(ttl_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> CacheResult<String> {
        self.ensure_open()?;
        Ok("PONG".to_string())
    }

    async fn quit(&self) -> CacheResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_sweeper();
        self.entries.clear();
        debug!("Memory cache closed");
        Ok(())
    }
}
