use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) < self.ttl
    }
}

/// Short-lived in-process cache with a TTL per entry.
///
/// Expiry is checked lazily on read: an expired entry is evicted by the `get`
/// that finds it, there is no background sweep. The lock is never held across
/// an await point, so the cache can be shared freely between tasks.
pub struct TtlCache<K, V> {
    inner: Arc<Mutex<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + std::fmt::Debug,
    V: Clone + Send,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // A poisoned map only means another task panicked mid-insert; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: K, value: V, ttl: Duration, now: Instant) {
        debug!("Cache PUT for key: {:?}", key);
        self.entries().insert(
            key,
            CacheEntry {
                value,
                written_at: now,
                ttl,
            },
        );
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Returns the value if `now - written_at < ttl`, otherwise evicts it.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                debug!("Cache HIT for key: {:?}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache entry expired for key: {:?}", key);
                entries.remove(key);
                None
            }
            None => {
                debug!("Cache MISS for key: {:?}", key);
                None
            }
        }
    }

    pub fn clear(&self) {
        self.entries().clear();
        debug!("Cache CLEAR");
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Send + std::fmt::Debug,
    V: Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_get_set() {
        let cache = TtlCache::<String, i32>::new();

        // Initially, cache is empty
        assert!(cache.get(&"key1".to_string()).is_none());

        cache.set("key1".to_string(), 123, Duration::from_secs(60));
        assert_eq!(cache.get(&"key1".to_string()), Some(123));

        // Get a non-existent key
        assert!(cache.get(&"key2".to_string()).is_none());
    }

    #[test]
    fn test_cache_ttl_boundary() {
        let cache = TtlCache::<String, i32>::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(30);

        cache.set_at("AAPL".to_string(), 7, ttl, t0);

        assert_eq!(cache.get_at(&"AAPL".to_string(), t0), Some(7));
        assert_eq!(
            cache.get_at(&"AAPL".to_string(), t0 + ttl - Duration::from_millis(1)),
            Some(7)
        );
        // Exactly at t0 + ttl the entry is a miss
        assert!(cache.get_at(&"AAPL".to_string(), t0 + ttl).is_none());
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = TtlCache::<String, i32>::new();
        let t0 = Instant::now();

        cache.set_at("a".to_string(), 1, Duration::from_secs(1), t0);
        cache.set_at("b".to_string(), 2, Duration::from_secs(100), t0);
        assert_eq!(cache.len(), 2);

        // Expired entries linger until read
        let later = t0 + Duration::from_secs(5);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at(&"a".to_string(), later).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&"b".to_string(), later), Some(2));
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let cache = TtlCache::<String, i32>::new();
        let t0 = Instant::now();

        cache.set_at("k".to_string(), 1, Duration::from_secs(10), t0);
        cache.set_at(
            "k".to_string(),
            2,
            Duration::from_secs(10),
            t0 + Duration::from_secs(8),
        );
        assert_eq!(
            cache.get_at(&"k".to_string(), t0 + Duration::from_secs(15)),
            Some(2)
        );
    }

    #[test]
    fn test_cache_clear() {
        let cache = TtlCache::<String, i32>::new();

        cache.set("key1".to_string(), 123, Duration::from_secs(60));
        cache.set("key2".to_string(), 456, Duration::from_secs(60));

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get(&"key1".to_string()).is_none());
        assert!(cache.get(&"key2".to_string()).is_none());
    }
}
