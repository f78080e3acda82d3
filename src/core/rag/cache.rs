//! Bounded, clearable LRU stores for pipeline intermediates.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default capacity for each pipeline cache.
pub const CACHE_CAPACITY: usize = 256;

/// A typed, mutex-guarded LRU store keyed by string.
pub struct LruStore<V> {
    inner: Mutex<LruCache<String, V>>,
}

impl<V: Clone> LruStore<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.inner.lock().put(key.into(), value);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let store: LruStore<u32> = LruStore::new(2);
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);
        assert!(store.get("a").is_none());
        assert_eq!(store.get("b"), Some(2));
        assert_eq!(store.get("c"), Some(3));
    }

    #[test]
    fn clear_empties_the_store() {
        let store: LruStore<u32> = LruStore::new(4);
        store.put("a", 1);
        store.clear();
        assert!(store.is_empty());
    }
}
