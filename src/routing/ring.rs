//! Consistent-Hash Ring
//!
//! Maps keys to real node identifiers through virtual points on a hash ring.
//!
//! ## Mechanism
//! - **Virtual nodes**: For each real key, `replicas` virtual hashes are
//!   produced from `"{index}{key}"`, spreading the node pseudo-randomly
//!   around the ring to balance load.
//! - **Ownership**: A key is owned by the real node behind the first virtual
//!   hash at or after `hash(key)`, wrapping to the smallest hash when the key
//!   hashes past the end of the ring.
//!
//! The ring is not internally locked; [`super::picker::PeerRouter`] provides
//! external mutual exclusion.

use std::collections::{BTreeSet, HashMap};

/// Replica count used when the coordination store has no override configured.
pub const DEFAULT_REPLICAS: usize = 50;

/// Hash function mapping bytes to a ring position. Injected for testability;
/// production uses CRC-32 (IEEE).
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Virtual hashes, sorted ascending.
    keys: Vec<u32>,
    /// Virtual hash to real key. With CRC-32 a collision between two real
    /// keys is last-writer-wins; at realistic cluster sizes (a few hundred
    /// virtual points in a 32-bit space) this is tolerable.
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a ring hashing with CRC-32 (IEEE) over the UTF-8 bytes.
    pub fn new(replicas: usize) -> Self {
        Self::with_hash(replicas, Box::new(crc32fast::hash))
    }

    /// Creates a ring with an injected hash function.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            keys: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Adds real keys to the ring, projecting each as `replicas` virtual
    /// points.
    pub fn add<I>(&mut self, real_keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for key in real_keys {
            let key = key.as_ref();
            for index in 0..self.replicas {
                let hash = (self.hash)(format!("{index}{key}").as_bytes());
                self.keys.push(hash);
                self.nodes.insert(hash, key.to_string());
            }
        }
        self.keys.sort_unstable();
    }

    /// Removes a real key and all its virtual points. A no-op when the key
    /// is not on the ring.
    pub fn remove(&mut self, real_key: &str) {
        self.nodes.retain(|_, node| node != real_key);
        self.keys.retain(|hash| self.nodes.contains_key(hash));
    }

    /// Selects the real node owning `key`, or `None` on an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.keys.partition_point(|&point| point < hash) % self.keys.len();
        self.nodes.get(&self.keys[index]).map(String::as_str)
    }

    /// Changes the replica count and rebuilds the ring from the current set
    /// of real keys, so existing and future entries share one factor.
    /// Values below 1 are ignored.
    pub fn set_replicas(&mut self, replicas: usize) {
        if replicas == 0 || replicas == self.replicas {
            return;
        }
        self.replicas = replicas;

        let real_keys: BTreeSet<String> = self.nodes.values().cloned().collect();
        self.keys.clear();
        self.nodes.clear();
        self.add(real_keys);
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The distinct real keys currently on the ring, sorted.
    pub fn real_keys(&self) -> Vec<String> {
        let unique: BTreeSet<&String> = self.nodes.values().collect();
        unique.into_iter().cloned().collect()
    }
}
