use linked_hash_map::LinkedHashMap;

use super::view::ByteView;

/// Callback invoked with the evicted key and value whenever an entry falls
/// off the cold end of the store.
pub type EvictCallback = Box<dyn FnMut(&str, &ByteView) + Send>;

/// A size-bounded least-recently-used store. Not thread safe; see
/// [`super::memory::MemoryCache`] for the concurrent wrapper.
///
/// Entries are kept in access order inside a [`LinkedHashMap`]: the back of
/// the map holds the most recently touched entry, the front holds the
/// eviction candidate. Every `get` and `add` promotes the entry to the back.
///
/// `max_bytes == 0` means unbounded: the store never evicts by size.
pub struct LruStore {
    max_bytes: usize,
    used_bytes: usize,
    entries: LinkedHashMap<String, ByteView>,
    on_evict: Option<EvictCallback>,
}

impl LruStore {
    pub fn new(max_bytes: usize, on_evict: Option<EvictCallback>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            entries: LinkedHashMap::new(),
            on_evict,
        }
    }

    /// Looks up `key`, promoting the entry to most-recently-used on a hit.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        self.entries.get_refresh(key).map(|value| value.clone())
    }

    /// Inserts or overwrites `key`, then evicts cold entries until the store
    /// fits its byte budget again.
    ///
    /// An overwrite adjusts the accounting by the difference in value length;
    /// the key's own length was already counted at first insertion.
    pub fn add(&mut self, key: &str, value: ByteView) {
        if let Some(existing) = self.entries.get_refresh(key) {
            self.used_bytes = self.used_bytes + value.len() - existing.len();
            *existing = value;
        } else {
            self.used_bytes += key.len() + value.len();
            self.entries.insert(key.to_string(), value);
        }

        while self.max_bytes > 0 && self.used_bytes > self.max_bytes {
            self.remove_oldest();
        }
    }

    /// Evicts the least-recently-used entry, updating the accounting and
    /// firing the eviction callback if one is registered.
    pub fn remove_oldest(&mut self) {
        if let Some((key, value)) = self.entries.pop_front() {
            self.used_bytes -= key.len() + value.len();
            if let Some(callback) = self.on_evict.as_mut() {
                callback(&key, &value);
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently accounted for: the sum of `len(key) + value.len()`
    /// over all live entries.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}
