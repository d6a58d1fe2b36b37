//! The self-loading cache.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::flight::{Claim, FlightGuard, FlightResult, Flights};
use crate::loader::{Loaded, Loader};
use crate::stats::{CacheStats, Counters};
use crate::sweeper::{Sweep, Sweeper};

// =============================================================================
// Configuration
// =============================================================================

/// Runtime settings for a [`LoadingCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How often expired entries are purged in the background.
    /// `Duration::ZERO` disables the sweeper; expiry is then only lazy.
    pub sweep_interval: Duration,

    /// Upper bound for a single loader call. `None` waits indefinitely.
    pub load_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            load_timeout: Some(Duration::from_secs(5)),
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// State shared between callers, load tasks and the sweeper.
struct Shared<K, V, L>
where
    K: Send + Sync,
    L: Loader<K, V>,
{
    entries: DashMap<K, CacheEntry<V>>,
    flights: Flights<K, V, L::Error>,
    loader: L,
    load_timeout: Option<Duration>,
    counters: Counters,
    closed: AtomicBool,
}

impl<K, V, L> Shared<K, V, L>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
{
    /// Returns the live value for `key`, evicting the entry if it has expired.
    fn lookup(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired_at(now) {
                return Some(entry.value.clone());
            }
        }

        // The shard guard above is released; a reload may have replaced the
        // entry in between, so only remove it if it is still expired.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            self.counters.evicted(1);
            tracing::debug!(key = ?key, "Evicted expired cache entry");
        }
        None
    }

    /// Runs the loader for `key` and publishes the outcome to every waiter.
    async fn run_load(
        self: Arc<Self>,
        key: K,
        tx: watch::Sender<Option<FlightResult<V, L::Error>>>,
    ) {
        let guard = FlightGuard::new(&self.flights, &key, tx);
        self.counters.load();

        let started = Instant::now();
        let result = match self.call_loader(&key).await {
            Ok(Loaded { value, ttl }) => {
                if !self.closed.load(Ordering::Acquire) {
                    self.entries
                        .insert(key.clone(), CacheEntry::new(value.clone(), ttl));
                }
                tracing::debug!(
                    key = ?key,
                    ttl_ms = ttl.as_millis() as u64,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cache entry loaded"
                );
                Ok(value)
            }
            Err(e) => {
                self.counters.failed_load();
                tracing::warn!(key = ?key, error = %e, "Cache load failed");
                Err(e)
            }
        };

        guard.resolve(result);
    }

    async fn call_loader(&self, key: &K) -> Result<Loaded<V>, CacheError<L::Error>> {
        let load = self.loader.load(key);
        let outcome = match self.load_timeout {
            Some(limit) => tokio::time::timeout(limit, load)
                .await
                .map_err(|_| CacheError::Timeout(limit))?,
            None => load.await,
        };
        outcome.map_err(|e| CacheError::Load(Arc::new(e)))
    }
}

impl<K, V, L> Sweep for Shared<K, V, L>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
{
    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        self.counters.evicted(removed);
        removed
    }
}

// =============================================================================
// Loading Cache
// =============================================================================

/// A cache that fills itself through a [`Loader`].
///
/// The cache owns its background sweeper. Call [`close`](Self::close) during
/// shutdown to stop the sweeper and release the stored entries; dropping the
/// cache without closing it still signals the sweeper to stop.
///
/// Construction spawns the sweeper, so it must happen inside a Tokio runtime.
///
/// # Example
///
/// ```ignore
/// let cache = LoadingCache::new(MyLoader::new(), CacheConfig::default());
/// let value = cache.get(&key).await?;
/// cache.close().await;
/// ```
pub struct LoadingCache<K, V, L>
where
    K: Send + Sync,
    L: Loader<K, V>,
{
    shared: Arc<Shared<K, V, L>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<K, V, L> LoadingCache<K, V, L>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Loader<K, V>,
{
    /// Creates a cache backed by `loader` and starts its sweeper.
    pub fn new(loader: L, config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            entries: DashMap::new(),
            flights: Flights::new(),
            loader,
            load_timeout: config.load_timeout,
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        });

        let sweeper = if config.sweep_interval.is_zero() {
            None
        } else {
            Some(Sweeper::spawn(
                Arc::downgrade(&shared),
                config.sweep_interval,
            ))
        };

        Self {
            shared,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Returns the value for `key`, loading it if no live entry exists.
    ///
    /// Concurrent calls for a key without a live entry share a single loader
    /// invocation and all receive its outcome.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Load`] if the loader failed
    /// - [`CacheError::Timeout`] if the loader exceeded the load timeout
    /// - [`CacheError::Aborted`] if the load task ended without a result
    /// - [`CacheError::Closed`] after [`close`](Self::close)
    pub async fn get(&self, key: &K) -> Result<V, CacheError<L::Error>> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        if let Some(value) = self.shared.lookup(key) {
            self.shared.counters.hit();
            return Ok(value);
        }
        self.shared.counters.miss();

        match self.shared.flights.claim(key, || self.shared.lookup(key)) {
            Claim::Ready(value) => Ok(value),
            Claim::Follow(slot) => {
                tracing::trace!(key = ?key, "Joining in-flight load");
                Flights::<K, V, L::Error>::wait(slot).await
            }
            Claim::Lead(tx) => {
                // The load runs on its own task so that it completes and wakes
                // the other waiters even if this caller is cancelled.
                let slot = tx.subscribe();
                tokio::spawn(Arc::clone(&self.shared).run_load(key.clone(), tx));
                Flights::<K, V, L::Error>::wait(slot).await
            }
        }
    }

    /// Stops the sweeper and releases all entries.
    ///
    /// Only the first call has an effect. Loads already in flight still
    /// deliver their result to their waiters but no longer populate the cache.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        let released = self.shared.entries.len();
        self.shared.entries.clear();
        tracing::debug!(released, "Cache closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Number of keys with a load in progress.
    pub fn in_flight(&self) -> usize {
        self.shared.flights.in_flight()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.shared.counters.snapshot(self.shared.entries.len())
    }
}

impl<K, V, L> Drop for LoadingCache<K, V, L>
where
    K: Send + Sync,
    L: Loader<K, V>,
{
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.signal();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
