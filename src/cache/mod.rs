//! Expiring read cache for gateway lookups
//!
//! Handles:
//! - Passive expiry on read, plus one periodic sweep task
//! - Prefix invalidation per account or pool scope
//! - Coalescing of concurrent fetches for the same key
//!
//! Values of any `Clone + Send + Sync` type can be stored; reading a key with
//! a different type than it was written with is a miss.

pub mod keys;

use crate::metrics;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// How a `get_or_fetch` call gets its answer
enum FetchPlan<T, E> {
    /// Await the shared fetch registered under this generation
    Join(u64, SharedFetch<T, E>),
    /// Run the producer alone, without touching the cache
    Bypass(BoxFuture<'static, Result<T, E>>),
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.created_at + self.ttl
    }
}

/// A fetch other callers can join; `future` holds a `SharedFetch<T, E>`
struct InFlight {
    generation: u64,
    future: Box<dyn Any + Send + Sync>,
}

/// Introspection snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Key/value cache with per-entry TTL
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, InFlight>,
    default_ttl: Duration,
    generation: AtomicU64,
}

impl TtlCache {
    /// Create a new cache
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            default_ttl,
            generation: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value, removing the entry if it has expired
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let value = entry.value.downcast_ref::<T>().cloned();
                if value.is_some() {
                    metrics::record_cache_hit();
                } else {
                    metrics::record_cache_miss();
                }
                return value;
            }
            Some(_) => true,
            None => false,
        };

        if expired && self.entries.remove_if(key, |_, e| !e.is_live(now)).is_some() {
            metrics::record_cache_eviction(1);
        }
        metrics::record_cache_miss();
        None
    }

    /// Store a value with an explicit TTL, replacing any previous entry
    pub fn set<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::new(value),
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Store a value with the default TTL
    pub fn set_default<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T) {
        self.set(key, value, self.default_ttl);
    }

    /// Remove a key. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.in_flight.remove(key);
        let now = Instant::now();
        self.entries
            .remove(key)
            .map(|(_, e)| e.is_live(now))
            .unwrap_or(false)
    }

    /// Whether a live entry exists
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|e| e.is_live(now))
            .unwrap_or(false);
        if !live {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        live
    }

    /// Drop every entry and detach every in-flight fetch
    pub fn clear(&self) {
        self.in_flight.clear();
        self.entries.clear();
    }

    /// Remove every key starting with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.in_flight.retain(|k, _| !k.starts_with(prefix));

        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let removed = doomed
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count();

        debug!("Invalidated {} cache entries under {}", removed, prefix);
        removed
    }

    /// Return the cached value or run `producer` to fill it.
    ///
    /// Concurrent callers for the same key share one producer run. A failed
    /// fetch reaches every waiter and is not cached. A fetch whose key is
    /// invalidated while it is running still answers its waiters but does not
    /// write its result back.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Duration,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        // The map guard must be gone before the first await
        let plan = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let existing = occupied.get();
                match existing.future.downcast_ref::<SharedFetch<T, E>>() {
                    Some(fetch) => {
                        debug!("Joining in-flight fetch for {}", key);
                        FetchPlan::Join(existing.generation, fetch.clone())
                    }
                    // Same key in flight with another value type
                    None => FetchPlan::Bypass(producer().boxed()),
                }
            }
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let fetch: SharedFetch<T, E> = producer().boxed().shared();
                vacant.insert(InFlight {
                    generation,
                    future: Box::new(fetch.clone()),
                });
                FetchPlan::Join(generation, fetch)
            }
        };

        let (generation, fetch) = match plan {
            FetchPlan::Join(generation, fetch) => (generation, fetch),
            FetchPlan::Bypass(uncached) => return uncached.await,
        };

        let result = fetch.await;

        // First waiter to retire the fetch writes the result back
        let owner = self
            .in_flight
            .remove_if(key, |_, f| f.generation == generation)
            .is_some();
        if owner {
            if let Ok(value) = &result {
                self.set(key, value.clone(), ttl);
            }
        }

        result
    }

    /// Remove all expired entries
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            metrics::record_cache_eviction(removed);
        }
        removed
    }

    /// Run [`TtlCache::sweep`] every `period` until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }

    /// Snapshot of live keys
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let cache = TtlCache::default();
        cache.set("k", 42u64, Duration::from_millis(50));
        assert_eq!(cache.get::<u64>("k"), Some(42));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get::<u64>("k"), None);
        // Expired entry was removed eagerly
        assert_eq!(cache.entries.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_and_resets_ttl() {
        let cache = TtlCache::default();
        cache.set("k", 1u64, Duration::from_millis(50));
        tokio::time::advance(Duration::from_millis(40)).await;
        cache.set("k", 2u64, Duration::from_millis(50));
        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(cache.get::<u64>("k"), Some(2));
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let cache = TtlCache::default();
        cache.set_default("k", "text".to_string());
        assert_eq!(cache.get::<u64>("k"), None);
        assert_eq!(cache.get::<String>("k").as_deref(), Some("text"));
    }

    #[test]
    fn test_invalidate_prefix_only_touches_prefix() {
        let cache = TtlCache::default();
        cache.set_default("balance:GA", 1i128);
        cache.set_default("balance:GB", 2i128);
        cache.set_default("reserves:CP", (3i128, 4i128));

        assert_eq!(cache.invalidate_prefix("balance:"), 2);
        assert!(!cache.has("balance:GA"));
        assert!(!cache.has("balance:GB"));
        assert_eq!(cache.get::<(i128, i128)>("reserves:CP"), Some((3, 4)));
    }

    #[test]
    fn test_delete_has_and_clear() {
        let cache = TtlCache::default();
        cache.set_default("a", 1u8);
        cache.set_default("b", 2u8);
        assert!(cache.has("a"));
        assert!(cache.delete("a"));
        assert!(!cache.has("a"));
        assert!(!cache.delete("a"));

        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert!(cache.stats().keys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = TtlCache::default();
        cache.set("short", 1u8, Duration::from_millis(10));
        cache.set("long", 2u8, Duration::from_secs(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().keys, vec!["long".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_periodically() {
        let cache = Arc::new(TtlCache::default());
        cache.set("short", 1u8, Duration::from_millis(10));
        let handle = cache.spawn_sweeper(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.entries.len(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_get_or_fetch_caches_success() {
        let cache = TtlCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Result<u64, String> = cache
                .get_or_fetch(
                    "k",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    },
                    Duration::from_secs(5),
                )
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_does_not_cache_failure() {
        let cache = TtlCache::default();
        let first: Result<u64, String> = cache
            .get_or_fetch("k", || async { Err("boom".to_string()) }, Duration::from_secs(5))
            .await;
        assert_eq!(first, Err("boom".to_string()));
        assert!(!cache.has("k"));

        let second: Result<u64, String> = cache
            .get_or_fetch("k", || async { Ok(1) }, Duration::from_secs(5))
            .await;
        assert_eq!(second, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_coalesced() {
        let cache = Arc::new(TtlCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch::<u64, String, _, _>(
                        "slow",
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(99)
                        },
                        Duration::from_secs(5),
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(99));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<u64>("slow"), Some(99));
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_fetch_is_not_written_back() {
        let cache = Arc::new(TtlCache::default());

        let fetch = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch::<u64, String, _, _>(
                        "acct:GA:native",
                        || async {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(1)
                        },
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate_prefix("acct:GA:");

        assert_eq!(fetch.await.unwrap(), Ok(1));
        assert!(!cache.has("acct:GA:native"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_other_type_runs_alone() {
        let cache = Arc::new(TtlCache::default());

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch::<u64, String, _, _>(
                        "k",
                        || async {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(5)
                        },
                        Duration::from_secs(5),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let other: Result<String, String> = cache
            .get_or_fetch("k", || async { Ok("text".to_string()) }, Duration::from_secs(5))
            .await;
        assert_eq!(other, Ok("text".to_string()));
        assert_eq!(cache.get::<String>("k"), None);

        assert_eq!(slow.await.unwrap(), Ok(5));
        assert_eq!(cache.get::<u64>("k"), Some(5));
    }
}
