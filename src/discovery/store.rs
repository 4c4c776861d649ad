//! Coordination Store Contract
//!
//! The slice of a strongly consistent key-value store this crate depends on:
//! leases with keepalive, prefix reads, lease-bound writes, and watches.
//! Production uses the etcd binding ([`super::etcd::EtcdStore`]); tests use
//! the in-process implementation ([`super::mem::MemStore`]).

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Key prefix under which cluster members register, as
/// `/gee_cache/nodes/<index>` mapping to the node's `host:port` address.
pub const CLUSTER_PREFIX: &str = "/gee_cache/nodes/";

/// Configuration key holding the consistent-hash replica count.
pub const REPLICAS_KEY: &str = "/gee_cache/consistent_hash_replicas_num";

/// Lease handle issued by [`CoordinationStore::grant`].
pub type LeaseId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A single key change observed through a watch. Delete events carry an
/// empty value.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Grants a lease with the given TTL in seconds.
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId>;

    /// Refreshes `lease` until `cancel` fires, draining and discarding the
    /// provider's keepalive responses so its buffer never overflows.
    /// Returns an error when the lease can no longer be kept alive.
    async fn keep_alive(
        &self,
        lease: LeaseId,
        ttl_secs: i64,
        cancel: watch::Receiver<bool>,
    ) -> Result<()>;

    /// Revokes `lease`, deleting every key bound to it.
    async fn revoke(&self, lease: LeaseId) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Writes `key`, optionally bound to a lease so it expires with it.
    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Streams future changes to `key` (or to every key under it when
    /// `prefix` is set). The channel closes when the watch dies.
    async fn watch(&self, key: &str, prefix: bool) -> Result<mpsc::Receiver<WatchEvent>>;
}
