//! Short-TTL memoization for computed availability.
//!
//! Availability answers go stale the moment external state changes, so the
//! cache keeps entries for a short TTL, sweeps expired entries on a fixed
//! interval in the background, evicts the oldest entry past a configured
//! maximum size, and supports pattern invalidation so a booking write can
//! drop every entry it may have raced with before returning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::get_metrics;

struct Entry<T> {
    value: T,
    inserted_at: Instant,
    expires_at: Instant,
}

struct CacheInner<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    default_ttl: Duration,
    max_entries: usize,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Drop for CacheInner<T> {
    fn drop(&mut self) {
        // Stop the sweep task so tests and shutdowns don't leak timers.
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A TTL cache with background sweeping and pattern invalidation.
///
/// Cloning is cheap and shares the underlying store.
pub struct TtlCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    /// Create a cache and start its background sweep.
    pub fn new(max_entries: usize, default_ttl: Duration, sweep_interval: Duration) -> Self {
        let inner = Arc::new(CacheInner {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        });

        let handle = tokio::spawn(sweep_loop(Arc::downgrade(&inner), sweep_interval));
        *inner.sweeper.lock() = Some(handle);

        Self { inner }
    }

    /// Create a disabled cache: every get misses, every set is a no-op.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                default_ttl: Duration::from_secs(0),
                max_entries: 1,
                enabled: false,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Look up a key, treating expired entries as misses.
    pub async fn get(&self, key: &str) -> Option<T> {
        if !self.inner.enabled {
            return None;
        }

        let metrics = get_metrics();
        let now = Instant::now();

        {
            let entries = self.inner.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > now {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    metrics.cache_hits_total.inc();
                    return Some(entry.value.clone());
                }
            }
        }

        // Expired entries are dropped eagerly rather than waiting for the
        // sweep, so the map does not serve as a graveyard between sweeps.
        let mut entries = self.inner.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= now {
                entries.remove(key);
            }
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        metrics.cache_misses_total.inc();
        None
    }

    /// Store a value under the default TTL.
    pub async fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.inner.default_ttl).await;
    }

    /// Store a value with an explicit TTL.
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        if !self.inner.enabled {
            return;
        }

        let now = Instant::now();
        let mut entries = self.inner.entries.write().await;
        entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );

        // Oldest-entry eviction once the store exceeds its configured size.
        while entries.len() > self.inner.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                    get_metrics().cache_evictions_total.inc();
                }
                None => break,
            }
        }
    }

    /// Remove a single key.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.inner.entries.write().await.remove(key).is_some()
    }

    /// Remove every key matching the pattern; returns how many went.
    pub async fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {} cache entries matching {}", removed, pattern);
        }
        removed
    }

    /// Remove everything.
    pub async fn clear(&self) {
        self.inner.entries.write().await.clear();
    }

    /// Number of live entries (including not-yet-swept expired ones).
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Hit/miss/eviction counters and current size.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.entries.read().await.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }

    /// Stop the background sweep. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
            debug!("Stopped cache sweep task");
        }
    }
}

async fn sweep_loop<T: Send + Sync + 'static>(
    inner: Weak<CacheInner<T>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let now = Instant::now();
        let mut entries = inner.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
    }
}
