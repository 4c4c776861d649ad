use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ring::{HashRing, DEFAULT_REPLICAS};
use super::PeerClient;

/// Builds the transport client for a freshly discovered peer address.
pub type ClientFactory = Box<dyn Fn(&str) -> Arc<dyn PeerClient> + Send + Sync>;

/// Selects the owning node for a key and hands out the matching transport
/// client.
///
/// The ring, the client table and the peer table (coordination-store key to
/// address) are mutated atomically under one lock, so a caller can never
/// observe a ring entry whose client is missing.
pub struct PeerRouter {
    self_addr: String,
    make_client: ClientFactory,
    inner: Mutex<RouterInner>,
}

struct RouterInner {
    ring: HashRing,
    clients: HashMap<String, Arc<dyn PeerClient>>,
    peers: HashMap<String, String>,
}

impl PeerRouter {
    pub fn new(self_addr: impl Into<String>, make_client: ClientFactory) -> Arc<Self> {
        Arc::new(Self {
            self_addr: self_addr.into(),
            make_client,
            inner: Mutex::new(RouterInner {
                ring: HashRing::new(DEFAULT_REPLICAS),
                clients: HashMap::new(),
                peers: HashMap::new(),
            }),
        })
    }

    /// Picks the owner for `key`. Returns `None` when the ring is empty or
    /// this node owns the key itself, in which case the caller loads locally.
    pub fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let inner = self.inner.lock();
        let addr = inner.ring.get(key)?;
        if addr == self.self_addr {
            return None;
        }
        tracing::debug!("picked peer {addr} for key {key:?}");
        inner.clients.get(addr).cloned()
    }

    /// Tracks `addr` under the coordination-store key `node_key`, inserting
    /// it into the ring and creating its transport client. A re-registration
    /// of a known key with a new address atomically replaces the old one.
    ///
    /// Returns `true` when `node_key` was not tracked before, so the caller
    /// can subscribe a watch for that individual key.
    pub fn add(&self, node_key: &str, addr: &str) -> bool {
        let mut inner = self.inner.lock();
        let newly_tracked = !inner.peers.contains_key(node_key);

        if let Some(old_addr) = inner.peers.insert(node_key.to_string(), addr.to_string()) {
            if old_addr != addr {
                inner.ring.remove(&old_addr);
                inner.clients.remove(&old_addr);
            }
        }

        inner.ring.add([addr]);
        let client = (self.make_client)(addr);
        inner.clients.insert(addr.to_string(), client);
        newly_tracked
    }

    /// Drops the peer registered under `node_key` from the peer table, the
    /// ring and the client table. Returns the address it was serving on.
    pub fn remove(&self, node_key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        let addr = inner.peers.remove(node_key)?;
        inner.ring.remove(&addr);
        inner.clients.remove(&addr);
        Some(addr)
    }

    /// Applies a new replica factor, rebuilding the ring (see
    /// [`HashRing::set_replicas`]).
    pub fn set_replicas(&self, replicas: usize) {
        let mut inner = self.inner.lock();
        inner.ring.set_replicas(replicas);
    }

    pub fn replicas(&self) -> usize {
        self.inner.lock().ring.replicas()
    }

    /// The distinct addresses currently on the ring, sorted.
    pub fn addresses(&self) -> Vec<String> {
        self.inner.lock().ring.real_keys()
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }
}
