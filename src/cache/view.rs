use std::fmt;
use std::sync::Arc;

/// An immutable view over a cached byte value.
///
/// The interior buffer is shared between the store and every reader and is
/// never mutated after insertion. [`ByteView::to_vec`] hands out a copy, so
/// callers cannot alter what later reads observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteView {
    bytes: Arc<[u8]>,
}

impl ByteView {
    /// Copies `bytes` into a new view. The copy decouples the cache from
    /// whatever buffer the origin handed us.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    /// Length in bytes, as counted by the store's byte accounting.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a copy of the value. Mutating the returned vector has no
    /// effect on the cached bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}
