use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub expires_at: Option<DateTime<Utc>>,
    expires_instant: Option<Instant>,
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_instant.is_some_and(|deadline| now >= deadline)
    }
}

/// Counters exposed by [`TtlCache::stats`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    clock: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> CacheState<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) -> Option<K> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.access_seq)
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        self.stats.evictions += 1;
        Some(victim)
    }
}

/// Capacity- and time-bounded cache with least-recently-used eviction
#[derive(Debug)]
pub struct TtlCache<K, V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache. A capacity of zero is treated as one.
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            default_ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                clock: 0,
                stats: CacheStats {
                    capacity,
                    ..Default::default()
                },
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Insert using the cache's default TTL
    pub async fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Insert with an explicit TTL (`None` never expires)
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut state = self.state.lock().await;
        let seq = state.tick();
        let now = Utc::now();
        let expires_instant = ttl.map(|ttl| Instant::now() + ttl);
        let expires_at = ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok().map(|d| now + d));

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            if let Some(evicted) = state.evict_lru() {
                debug!("Cache full ({}), evicted least recently used key {:?}", self.capacity, evicted);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                expires_at,
                expires_instant,
                access_seq: seq,
            },
        );
        state.stats.size = state.entries.len();
    }

    /// Read a value, refreshing its recency. Expired entries read as absent.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().await;
        let seq = state.tick();
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.entries.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            state.stats.size = state.entries.len();
            trace!("Cache entry {:?} expired on read", key);
            return None;
        }

        state.stats.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.access_seq = seq;
        entry.access_count += 1;
        entry.last_accessed = Utc::now();
        Some(entry.value.clone())
    }

    /// Snapshot of an entry and its bookkeeping, without touching recency
    pub async fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .cloned()
    }

    /// Presence check; does not refresh recency
    pub async fn has(&self, key: &K) -> bool {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    pub async fn delete(&self, key: &K) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.entries.remove(key).is_some();
        state.stats.size = state.entries.len();
        removed
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.stats.size = 0;
    }

    /// Number of stored entries, including expired ones not yet purged
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn keys(&self) -> Vec<K> {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        state.stats.expirations += removed as u64;
        state.stats.size = state.entries.len();
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }

    /// Memoize: return the cached value or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs, so two concurrent callers for the
    /// same key may both compute; the last write wins.
    pub async fn get_or_insert_with<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = compute().await?;
        self.set(key, value.clone()).await;
        Ok(value)
    }

    /// Periodically purge expired entries until the cache is dropped
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired().await;
                if removed > 0 {
                    debug!("Cache janitor purged {} expired entries", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache: TtlCache<String, String> = TtlCache::new(10, None);
        cache.set("k".to_string(), "v".to_string()).await;

        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
        assert!(cache.has(&"k".to_string()).await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache: TtlCache<String, String> = TtlCache::new(10, Some(Duration::from_millis(100)));
        cache.set("k".to_string(), "v".to_string()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"k".to_string()).await, None);
        assert!(!cache.has(&"k".to_string()).await);
        let stats = cache.stats().await;
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_prefers_least_recently_read() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(3, None);
        cache.set("a", 1).await;
        cache.set("b", 2).await;
        cache.set("c", 3).await;

        assert_eq!(cache.get(&"a").await, Some(1));
        cache.set("d", 4).await;

        assert!(!cache.has(&"b").await);
        assert!(cache.has(&"a").await);
        assert!(cache.has(&"c").await);
        assert!(cache.has(&"d").await);
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_eviction_ignores_expiry() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(2, None);
        cache.set_with_ttl("short", 1, Some(Duration::from_secs(1))).await;
        cache.set("long", 2).await;
        cache.get(&"short").await;

        cache.set("new", 3).await;

        assert!(cache.has(&"short").await);
        assert!(!cache.has(&"long").await);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(2, None);
        cache.set("a", 1).await;
        cache.set("b", 2).await;
        cache.set("a", 10).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"a").await, Some(10));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_one_entry() {
        let cache: TtlCache<u32, u32> = TtlCache::new(0, None);
        cache.set(1, 1).await;
        cache.set(2, 2).await;
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.has(&2).await);
    }

    #[tokio::test]
    async fn test_entry_bookkeeping() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Some(Duration::from_secs(60)));
        cache.set(7, 49).await;
        cache.get(&7).await;
        cache.get(&7).await;

        let entry = cache.entry(&7).await.unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.expires_at.is_some());
        assert!(entry.last_accessed >= entry.created_at);
    }

    #[tokio::test]
    async fn test_hit_rate_and_delete() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, None);
        cache.set(1, 1).await;
        cache.get(&1).await;
        cache.get(&2).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

        assert!(cache.delete(&1).await);
        assert!(!cache.delete(&1).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, None);
        cache.set_with_ttl(1, 1, Some(Duration::from_millis(20))).await;
        cache.set(2, 2).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.keys().await, vec![2]);
    }

    #[tokio::test]
    async fn test_get_or_insert_with_memoizes() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(4, None);
        let calls = std::sync::atomic::AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_insert_with("answer", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_janitor_purges_in_background() {
        let cache: Arc<TtlCache<u32, u32>> = Arc::new(TtlCache::new(4, Some(Duration::from_millis(10))));
        cache.set(1, 1).await;
        let handle = cache.spawn_janitor(Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.len().await, 0);
        handle.abort();
    }
}
