use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tokio::sync::watch;

use super::store::{CoordinationStore, LeaseId, CLUSTER_PREFIX};

/// Extracts the node index from a cluster key of the form
/// `/gee_cache/nodes/<index>`. Any other shape is a configuration error and
/// the offending key is named in the error.
pub fn parse_node_index(key: &str) -> Result<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(&format!("^{}([1-9][0-9]*)$", regex::escape(CLUSTER_PREFIX)))
            .expect("cluster key pattern compiles")
    });

    let captures = pattern.captures(key).ok_or_else(|| {
        anyhow!("malformed cluster key {key:?}: expected {CLUSTER_PREFIX}<positive integer>")
    })?;
    captures[1]
        .parse()
        .with_context(|| format!("cluster key {key:?} carries an out-of-range index"))
}

/// The smallest positive integer missing from `taken`. Filling gaps keeps
/// the ring positions of surviving nodes stable after a failure.
fn next_free_index(taken: &BTreeSet<u32>) -> u32 {
    let mut candidate = 1;
    for index in taken {
        if *index == candidate {
            candidate += 1;
        } else {
            break;
        }
    }
    candidate
}

/// This node's presence in the coordination store: an address registered
/// under `/gee_cache/nodes/<index>`, bound to a lease that a background
/// task keeps alive until deregistration.
pub struct Registration {
    store: Arc<dyn CoordinationStore>,
    addr: String,
    current_key: String,
    lease: LeaseId,
    keepalive_cancel: watch::Sender<bool>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("addr", &self.addr)
            .field("current_key", &self.current_key)
            .field("lease", &self.lease)
            .finish()
    }
}

impl Registration {
    /// Grants a lease, starts the keepalive task, claims the smallest free
    /// node index and writes this node's address under it.
    pub async fn register(
        store: Arc<dyn CoordinationStore>,
        addr: &str,
        ttl_secs: i64,
    ) -> Result<Self> {
        let lease = store.grant(ttl_secs).await?;

        let (keepalive_cancel, cancel) = watch::channel(false);
        {
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(err) = store.keep_alive(lease, ttl_secs, cancel).await {
                    tracing::warn!("keepalive for lease {lease:x} stopped: {err:#}");
                }
            });
        }

        let nodes = store.get_prefix(CLUSTER_PREFIX).await?;
        let mut taken = BTreeSet::new();
        for (key, _) in &nodes {
            taken.insert(parse_node_index(key)?);
        }

        let index = next_free_index(&taken);
        let current_key = format!("{CLUSTER_PREFIX}{index}");
        store.put(&current_key, addr, Some(lease)).await?;
        tracing::info!("registered {current_key} -> {addr} under lease {lease:x}");

        Ok(Self {
            store,
            addr: addr.to_string(),
            current_key,
            lease,
            keepalive_cancel,
        })
    }

    pub fn current_key(&self) -> &str {
        &self.current_key
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Graceful exit: stops the keepalive, revokes the lease and removes
    /// this node's key so peers drop it immediately instead of waiting for
    /// the lease to run out.
    pub async fn deregister(&self) -> Result<()> {
        let _ = self.keepalive_cancel.send(true);
        self.store.revoke(self.lease).await?;
        self.store.delete(&self.current_key).await?;
        tracing::info!("deregistered {}", self.current_key);
        Ok(())
    }
}
