use crate::config::CacheConfig;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

/// Keyed lookup cache shared by clones of an analyzer.
///
/// Entries expire after `ttl` (if set) and the oldest entry is evicted once
/// `max_entries` is reached. Concurrent misses on the same key are coalesced:
/// the first caller runs the loader and every other caller awaits its value.
#[derive(Debug)]
pub struct LookupCache<V> {
    name: &'static str,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl<V: Clone + Send + Sync> LookupCache<V> {
    pub fn new(name: &'static str, ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(name: &'static str, config: &CacheConfig) -> Self {
        Self::new(name, config.ttl(), config.max_entries)
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        match self.ttl {
            Some(ttl) => entry.cached_at.elapsed() < ttl,
            None => true,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| self.is_fresh(entry));

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.cached_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    log::debug!("{} cache full, evicting {oldest}", self.name);
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Return the cached value for `key`, running `load` on a miss.
    ///
    /// Only one loader runs per key at a time; the value is stored before the
    /// in-flight slot is released so late arrivals hit the cache.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key).await {
            log::debug!("Using cached {} entry for: {key}", self.name);
            return value;
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        // A slot created after another caller finished must not reload.
        let value = cell
            .get_or_init(|| async move {
                match self.get(key).await {
                    Some(value) => value,
                    None => load().await,
                }
            })
            .await
            .clone();
        self.put(key.to_string(), value.clone()).await;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(key);
        }

        value
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_get_put() {
        let cache = LookupCache::new("test", None, 10);
        assert_eq!(cache.get("a").await, None);

        cache.put("a".to_string(), 1).await;
        assert_eq!(cache.get("a").await, Some(1));

        cache.put("a".to_string(), 2).await;
        assert_eq!(cache.get("a").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = LookupCache::new("test", Some(Duration::from_millis(20)), 10);
        cache.put("a".to_string(), 1).await;
        assert_eq!(cache.get("a").await, Some(1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn test_evicts_oldest_when_full() {
        let cache = LookupCache::new("test", None, 2);
        cache.put("a".to_string(), 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("b".to_string(), 2).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("c".to_string(), 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_get_or_load_only_loads_once() {
        let cache = LookupCache::new("test", None, 10);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .await;
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(LookupCache::new("test", None, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("shared", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "value".to_string()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }
}
