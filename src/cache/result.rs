//! Per-query result cache with single-flight loading.
//!
//! Storage, TTL, idle expiry and capacity are moka's. The single-flight
//! layer sits in front: concurrent `get`s for one key share a single loader
//! run, waiters block until the leader publishes, and loader errors are
//! propagated to every waiter without being cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache as MokaCache;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use super::key::Fingerprint;
use super::rows::RowSnapshot;
use crate::driver::{CancelToken, DriverError};

/// How long a waiter sleeps between cancellation checks while an in-flight
/// load runs.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Result-cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time to live after a load.
    pub ttl: Duration,
    /// Idle timeout; entries untouched this long are dropped.
    pub idle: Duration,
    /// Per-query entry capacity.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            idle: Duration::from_secs(600),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Read overrides from the environment:
    /// `REMORA_CACHE_TTL_SECS`, `REMORA_CACHE_IDLE_SECS`,
    /// `REMORA_CACHE_CAPACITY`. Unset or unparsable variables keep the
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("REMORA_CACHE_TTL_SECS") {
            config.ttl = Duration::from_secs(secs);
            config.idle = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("REMORA_CACHE_IDLE_SECS") {
            config.idle = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("REMORA_CACHE_CAPACITY") {
            config.max_entries = n;
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Counters for one cache, snapshotted by [`ResultCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Normalized query this cache serves.
    pub query: String,
    /// Reads served from the store, including waiters that joined an
    /// in-flight load.
    pub hits: u64,
    /// Reads that ran (or joined a failed) loader.
    pub misses: u64,
    /// Loader executions.
    pub loads: u64,
    /// Targeted invalidations.
    pub forgets: u64,
    /// Full purges.
    pub purges: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    /// Entries currently resident.
    pub entry_count: u64,
}

enum FlightState {
    Pending,
    Done(Result<RowSnapshot, DriverError>),
}

struct Flight {
    state: Mutex<FlightState>,
    cv: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            cv: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<RowSnapshot, DriverError>) {
        let mut state = self.state.lock();
        *state = FlightState::Done(result);
        self.cv.notify_all();
    }
}

/// Keyed map from argument fingerprint to cached row snapshot.
pub struct ResultCache {
    query: String,
    store: MokaCache<Fingerprint, RowSnapshot>,
    flights: DashMap<Fingerprint, Arc<Flight>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    forgets: AtomicU64,
    purges: AtomicU64,
}

impl ResultCache {
    pub fn new(query: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            query: query.into(),
            store: MokaCache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl)
                .time_to_idle(config.idle)
                .build(),
            flights: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            forgets: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        }
    }

    /// Normalized query this cache serves.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fetch the snapshot for `key`, running `loader` at most once across
    /// all concurrent callers with the same key.
    ///
    /// A caller whose token cancels while an in-flight load runs detaches
    /// with [`DriverError::Cancelled`]; the load itself continues for the
    /// remaining waiters.
    pub fn get<F>(
        &self,
        key: Fingerprint,
        ctx: &CancelToken,
        loader: F,
    ) -> Result<RowSnapshot, DriverError>
    where
        F: FnOnce() -> Result<RowSnapshot, DriverError>,
    {
        if let Some(snap) = self.store.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snap);
        }

        use dashmap::mapref::entry::Entry;
        let lead = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => Err(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::new());
                entry.insert(Arc::clone(&flight));
                Ok(flight)
            }
        };

        match lead {
            Ok(flight) => self.lead(key, flight, loader),
            Err(flight) => self.join(flight, ctx),
        }
    }

    fn lead<F>(
        &self,
        key: Fingerprint,
        flight: Arc<Flight>,
        loader: F,
    ) -> Result<RowSnapshot, DriverError>
    where
        F: FnOnce() -> Result<RowSnapshot, DriverError>,
    {
        // Another leader may have completed a load between our store miss
        // and the flight registration.
        if let Some(snap) = self.store.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            flight.publish(Ok(snap.clone()));
            self.flights.remove(&key);
            return Ok(snap);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.loads.fetch_add(1, Ordering::Relaxed);

        let result = loader();
        if let Ok(snap) = &result {
            self.store.insert(key.clone(), snap.clone());
        }
        flight.publish(result.clone());
        self.flights.remove(&key);
        result
    }

    fn join(&self, flight: Arc<Flight>, ctx: &CancelToken) -> Result<RowSnapshot, DriverError> {
        let mut state = flight.state.lock();
        loop {
            match &*state {
                FlightState::Done(result) => {
                    match result {
                        Ok(_) => self.hits.fetch_add(1, Ordering::Relaxed),
                        Err(_) => self.misses.fetch_add(1, Ordering::Relaxed),
                    };
                    return result.clone();
                }
                FlightState::Pending => {
                    ctx.check()?;
                    flight.cv.wait_for(&mut state, WAIT_SLICE);
                }
            }
        }
    }

    /// Drop the entry for one fingerprint. Idempotent.
    pub fn forget(&self, key: &Fingerprint) {
        self.store.invalidate(key);
        self.forgets.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every entry.
    pub fn purge(&self) {
        self.store.invalidate_all();
        self.purges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.store.contains_key(key)
    }

    pub fn entry_count(&self) -> u64 {
        self.store.run_pending_tasks();
        self.store.entry_count()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            query: self.query.clone(),
            hits,
            misses,
            loads: self.loads.load(Ordering::Relaxed),
            forgets: self.forgets.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.entry_count(),
        }
    }
}
