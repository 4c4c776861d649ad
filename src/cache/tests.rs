//! Cache Module Tests
//!
//! Validates the LRU store's byte accounting and eviction order, the
//! immutability guarantees of byte views, and the lazy concurrent wrapper.

#[cfg(test)]
mod tests {
    use crate::cache::lru::LruStore;
    use crate::cache::memory::MemoryCache;
    use crate::cache::view::ByteView;
    use std::sync::{Arc, Mutex};

    fn view(text: &str) -> ByteView {
        ByteView::new(text.as_bytes())
    }

    // ============================================================
    // BYTE VIEW TESTS
    // ============================================================

    #[test]
    fn test_byte_view_returns_copies() {
        let original = view("immutable");

        let mut copy = original.to_vec();
        copy[0] = b'X';

        assert_eq!(original.to_vec(), b"immutable");
        assert_eq!(original.to_string(), "immutable");
    }

    #[test]
    fn test_byte_view_len() {
        assert_eq!(view("1234").len(), 4);
        assert!(view("").is_empty());
    }

    // ============================================================
    // LRU STORE TESTS
    // ============================================================

    #[test]
    fn test_get_hit_and_miss() {
        let mut store = LruStore::new(0, None);
        store.add("key1", view("1234"));

        let hit = store.get("key1").expect("key1 should be cached");
        assert_eq!(hit.to_string(), "1234");
        assert!(store.get("key2").is_none());
    }

    #[test]
    fn test_eviction_at_byte_budget() {
        // Budget fits exactly key1+key2 with their values; adding k3 must
        // push out the least recently used entry.
        let budget = "key1key2value1value2".len();
        let mut store = LruStore::new(budget, None);

        store.add("key1", view("value1"));
        store.add("key2", view("value2"));
        store.add("k3", view("v3"));

        assert!(store.get("key1").is_none(), "key1 should have been evicted");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_promotes_entry() {
        let budget = "key1key2value1value2".len();
        let mut store = LruStore::new(budget, None);

        store.add("key1", view("value1"));
        store.add("key2", view("value2"));

        // Touch key1 so key2 becomes the eviction candidate.
        assert!(store.get("key1").is_some());
        store.add("k3", view("v3"));

        assert!(store.get("key1").is_some());
        assert!(store.get("key2").is_none());
    }

    #[test]
    fn test_eviction_callback_order() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let recorder = evicted.clone();
        let callback = Box::new(move |key: &str, _value: &ByteView| {
            recorder.lock().unwrap().push(key.to_string());
        });

        let mut store = LruStore::new(10, Some(callback));
        store.add("key1", view("123456"));
        store.add("k2", view("k2"));
        store.add("k3", view("k3"));
        store.add("k4", view("k4"));

        assert_eq!(*evicted.lock().unwrap(), vec!["key1", "k2"]);
    }

    #[test]
    fn test_byte_accounting_with_overwrites() {
        let mut store = LruStore::new(0, None);

        store.add("a", view("12345"));
        store.add("bb", view("1"));
        assert_eq!(store.used_bytes(), 1 + 5 + 2 + 1);

        // Overwrite shrinks the value; the key length stays counted once.
        store.add("a", view("1"));
        assert_eq!(store.used_bytes(), 1 + 1 + 2 + 1);

        store.remove_oldest();
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 1 + 1);
    }

    #[test]
    fn test_zero_budget_never_evicts() {
        let mut store = LruStore::new(0, None);
        assert!(store.is_empty());
        for i in 0..1000 {
            store.add(&format!("key_{}", i), view("some value"));
        }
        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn test_overwrite_can_trigger_eviction() {
        let mut store = LruStore::new(12, None);
        store.add("a", view("1"));
        store.add("b", view("1"));

        // Growing "b" past the budget must evict "a".
        store.add("b", view("1234567890"));

        assert!(store.get("a").is_none());
        assert_eq!(store.get("b").unwrap().to_string(), "1234567890");
        assert_eq!(store.used_bytes(), 11);
    }

    // ============================================================
    // CONCURRENT WRAPPER TESTS
    // ============================================================

    #[test]
    fn test_memory_cache_lazy_initialization() {
        let cache = MemoryCache::new(1024);

        assert!(cache.get("anything").is_none());
        assert_eq!(cache.len(), 0);

        cache.add("key", view("value"));
        assert_eq!(cache.get("key").unwrap().to_string(), "value");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_memory_cache_concurrent_access() {
        let cache = Arc::new(MemoryCache::new(0));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("w{}_k{}", worker, i);
                        cache.add(&key, ByteView::new(key.as_bytes()));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
