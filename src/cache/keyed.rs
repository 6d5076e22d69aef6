//! Keyed request deduplication and caching.
//!
//! # Responsibilities
//! - Collapse concurrent requests for the same key onto one producer call
//! - Serve time-bounded cached results without invoking the producer
//! - Evict expired entries and enforce a size bound, oldest first
//!
//! # Design Decisions
//! - The in-flight registry and the result store are separate structures:
//!   eviction only ever touches the store, a flight's registration is
//!   removed by the flight itself when it settles
//! - A started flight is spawned as a task and runs to completion even if
//!   every waiter is dropped, so its result still lands in the cache
//! - Failures fan out identically to every waiter; they are only cached
//!   when `cache_failures` is set

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::{Duration, Instant};

use crate::observability::metrics;

type SharedFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Tuning for a [`KeyedRequestCache`].
#[derive(Debug, Clone)]
pub struct KeyedCacheConfig {
    /// How long a settled result stays valid. Zero disables the store;
    /// calls still deduplicate against in-flight producers.
    pub ttl: Duration,

    /// Maximum stored entries; oldest evicted first. Zero = unbounded.
    pub max_entries: usize,

    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,

    /// Whether failed producer runs are stored for the TTL.
    pub cache_failures: bool,
}

impl Default for KeyedCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 1024,
            sweep_interval: Duration::from_secs(60),
            cache_failures: false,
        }
    }
}

struct CacheEntry<T, E> {
    outcome: Result<T, E>,
    created_at: Instant,
}

struct Inner<T, E> {
    store: DashMap<String, CacheEntry<T, E>>,
    in_flight: DashMap<String, SharedFlight<T, E>>,
    config: KeyedCacheConfig,
}

impl<T, E> Inner<T, E>
where
    T: Clone,
    E: Clone,
{
    /// A valid stored outcome, or None. Expired entries are inert; the
    /// sweeper removes them later.
    fn lookup(&self, key: &str) -> Option<Result<T, E>> {
        if self.config.ttl.is_zero() {
            return None;
        }
        let entry = self.store.get(key)?;
        if entry.created_at.elapsed() < self.config.ttl {
            Some(entry.outcome.clone())
        } else {
            None
        }
    }

    /// Called by the flight task once the producer settled. The store
    /// insert happens before the registration is removed, so no caller can
    /// observe a key with neither a flight nor a fresh entry mid-settle.
    fn settle(&self, key: &str, outcome: &Result<T, E>) {
        let cacheable = outcome.is_ok() || self.config.cache_failures;
        if cacheable && !self.config.ttl.is_zero() {
            self.store.insert(
                key.to_string(),
                CacheEntry {
                    outcome: outcome.clone(),
                    created_at: Instant::now(),
                },
            );
            self.enforce_capacity();
            metrics::record_cache_size(self.store.len());
        }
        self.in_flight.remove(key);
    }

    /// Drop the oldest entries until the store fits `max_entries`.
    fn enforce_capacity(&self) {
        let max = self.config.max_entries;
        if max == 0 {
            return;
        }
        let excess = self.store.len().saturating_sub(max);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(String, Instant)> = self
            .store
            .iter()
            .map(|r| (r.key().clone(), r.value().created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);
        for (key, _) in by_age.into_iter().take(excess) {
            self.store.remove(&key);
        }
    }

    fn sweep(&self) {
        let ttl = self.config.ttl;
        self.store
            .retain(|_, entry| entry.created_at.elapsed() < ttl);
        self.enforce_capacity();
        metrics::record_cache_size(self.store.len());
    }
}

/// Aborts the sweeper when the last cache handle is dropped.
struct SweeperGuard(tokio::task::JoinHandle<()>);

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A deduplicating, TTL-bounded result cache keyed by string.
///
/// `resolve` guarantees that N concurrent calls for the same key invoke the
/// producer exactly once and all observe the same outcome. Handles are cheap
/// to clone and share one store.
///
/// Must be constructed within a Tokio runtime (the sweeper is spawned at
/// construction and aborted when the last handle drops).
#[derive(Clone)]
pub struct KeyedRequestCache<T, E> {
    inner: Arc<Inner<T, E>>,
    _sweeper: Arc<SweeperGuard>,
}

impl<T, E> KeyedRequestCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(config: KeyedCacheConfig) -> Self {
        let inner = Arc::new(Inner {
            store: DashMap::new(),
            in_flight: DashMap::new(),
            config,
        });

        let sweep_target = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_target.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep_target.sweep();
            }
        });

        Self {
            inner,
            _sweeper: Arc::new(SweeperGuard(sweeper)),
        }
    }

    /// Return the cached value for `key`, join an in-flight producer for it,
    /// or become the leader and run `compute`.
    ///
    /// The producer starts on first poll of the leader's call and then runs
    /// to completion on its own task; dropping waiters does not cancel it.
    /// Every waiter of one flight observes the same `Result`.
    pub async fn resolve<F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(outcome) = self.inner.lookup(key) {
            metrics::record_cache_request("hit");
            return outcome;
        }

        let flight = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                metrics::record_cache_request("joined");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                // A flight may have settled between the store check and
                // winning this slot; its result is fresher than re-running.
                if let Some(outcome) = self.inner.lookup(key) {
                    metrics::record_cache_request("hit");
                    return outcome;
                }
                metrics::record_cache_request("miss");

                let inner = Arc::clone(&self.inner);
                let flight_key = key.to_string();
                let producer = compute();
                let flight: SharedFlight<T, E> = async move {
                    let task = tokio::spawn(async move {
                        let outcome = producer.await;
                        inner.settle(&flight_key, &outcome);
                        outcome
                    });
                    match task.await {
                        Ok(outcome) => outcome,
                        // The task is never aborted, so a join error is a
                        // producer panic; surface it to the waiters.
                        Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
                    }
                }
                .boxed()
                .shared();

                slot.insert(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Number of stored entries (including expired-but-unswept ones).
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Number of currently registered in-flight producers.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.len()
    }
}
