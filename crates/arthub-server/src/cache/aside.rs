//! Cache-aside reads with single-flight deduplication.
//!
//! The first caller to miss on a key becomes the leader and runs its
//! producer. Callers that miss on the same key while the leader is running
//! wait for its result instead of running their own producer. If the leader
//! fails or is cancelled, each waiting caller falls back to its own producer.

use super::service::CacheService;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

type Outcome = Option<Arc<Value>>;

struct Flight {
    id: u64,
    result: watch::Receiver<Outcome>,
}

/// In-flight producer calls, keyed by full cache key.
#[derive(Default)]
pub(crate) struct SingleFlight {
    flights: DashMap<String, Flight>,
    next_id: AtomicU64,
}

enum Role<'a> {
    Leader(FlightGuard<'a>),
    Follower(watch::Receiver<Outcome>),
}

impl SingleFlight {
    fn join(&self, key: &str) -> Role<'_> {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(flight) => Role::Follower(flight.get().result.clone()),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                slot.insert(Flight { id, result: rx });
                Role::Leader(FlightGuard {
                    flights: &self.flights,
                    key: key.to_string(),
                    id,
                    tx,
                })
            }
        }
    }

    /// Number of producer calls currently running.
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}

/// Leader's registration. Dropping it without publishing releases the
/// followers to run their own producers.
struct FlightGuard<'a> {
    flights: &'a DashMap<String, Flight>,
    key: String,
    id: u64,
    tx: watch::Sender<Outcome>,
}

impl FlightGuard<'_> {
    fn publish(self, value: Arc<Value>) {
        let _ = self.tx.send(Some(value));
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let id = self.id;
        self.flights.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

async fn leader_result(mut result: watch::Receiver<Outcome>) -> Outcome {
    match result.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    }
}

impl CacheService {
    /// Return the cached value for `key`, or run `produce`, return its value
    /// and cache it in the background.
    ///
    /// Producer errors are returned unchanged and nothing is cached. A `null`
    /// result (for example `None`) is returned but not cached.
    pub async fn cache_with_fallback<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let full_key = self.full_key(key, None);
        self.resolve(&full_key, ttl_secs, produce).await
    }

    /// Cache-aside on an already qualified key.
    pub(crate) async fn resolve<T, E, F, Fut>(
        &self,
        full_key: &str,
        ttl_secs: u64,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_full::<T>(full_key).await {
            return Ok(hit);
        }

        let guard = match self.inner.flights.join(full_key) {
            Role::Leader(guard) => guard,
            Role::Follower(result) => {
                if let Some(value) = leader_result(result).await {
                    match serde_json::from_value::<T>(Value::clone(&value)) {
                        Ok(shared) => {
                            debug!(key = %full_key, "Joined in-flight computation");
                            return Ok(shared);
                        }
                        Err(e) => {
                            warn!(key = %full_key, error = %e, "In-flight result has an unexpected shape");
                        }
                    }
                }
                return self.produce_and_store(full_key, ttl_secs, produce, None).await;
            }
        };

        self.produce_and_store(full_key, ttl_secs, produce, Some(guard))
            .await
    }

    async fn produce_and_store<T, E, F, Fut>(
        &self,
        full_key: &str,
        ttl_secs: u64,
        produce: F,
        guard: Option<FlightGuard<'_>>,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = produce().await?;

        match serde_json::to_value(&value) {
            Ok(Value::Null) => {
                debug!(key = %full_key, "Producer returned no value, not caching");
                if let Some(guard) = guard {
                    guard.publish(Arc::new(Value::Null));
                }
            }
            Ok(json) => {
                self.spawn_write(full_key.to_string(), json.to_string(), ttl_secs);
                if let Some(guard) = guard {
                    guard.publish(Arc::new(json));
                }
            }
            Err(e) => {
                self.swallow("encode", full_key, e.into(), ());
            }
        }

        Ok(value)
    }

    /// Number of producer calls currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }
}
