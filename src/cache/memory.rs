use parking_lot::Mutex;

use super::lru::LruStore;
use super::view::ByteView;

/// Thread-safe wrapper around [`LruStore`].
///
/// A single exclusive lock covers both `add` and `get`: a get mutates the
/// recency order, so a shared lock would race. The inner store is created
/// on the first `add`; a `get` before that returns a miss without
/// allocating anything.
pub struct MemoryCache {
    max_bytes: usize,
    inner: Mutex<Option<LruStore>>,
}

impl MemoryCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(None),
        }
    }

    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.inner.lock();
        inner
            .get_or_insert_with(|| LruStore::new(self.max_bytes, None))
            .add(key, value);
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.inner.lock();
        inner.as_mut()?.get(key)
    }

    /// Number of live entries, zero before the first write.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.as_ref().map(LruStore::len).unwrap_or(0)
    }
}
