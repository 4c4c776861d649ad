use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};

use super::store::{CoordinationStore, EventKind, LeaseId, WatchEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// In-process coordination store with real lease expiry.
///
/// Implements the same contract as the etcd binding, including the part that
/// matters for failure handling: keys bound to a lease vanish (and produce
/// DELETE events) once the lease deadline passes without a keepalive.
/// Intended for tests and single-node experiments.
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
    events: broadcast::Sender<WatchEvent>,
}

struct MemInner {
    entries: HashMap<String, StoredEntry>,
    leases: HashMap<LeaseId, LeaseState>,
    next_lease: LeaseId,
}

struct StoredEntry {
    value: String,
    lease: Option<LeaseId>,
}

struct LeaseState {
    ttl: Duration,
    deadline: Instant,
}

impl MemStore {
    /// Creates the store and spawns its lease sweeper. The sweeper stops
    /// once the last reference to the store is dropped.
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Arc::new(Self {
            inner: Arc::new(Mutex::new(MemInner {
                entries: HashMap::new(),
                leases: HashMap::new(),
                next_lease: 1,
            })),
            events,
        });

        let sweeper = Arc::downgrade(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let Some(store) = sweeper.upgrade() else { return };
                store.expire_leases();
            }
        });

        store
    }

    fn expire_leases(&self) {
        let now = Instant::now();
        let mut dropped_keys = Vec::new();
        {
            let mut inner = self.inner.lock();
            let expired: Vec<LeaseId> = inner
                .leases
                .iter()
                .filter(|(_, state)| state.deadline <= now)
                .map(|(id, _)| *id)
                .collect();

            for lease in expired {
                inner.leases.remove(&lease);
                dropped_keys.extend(Self::drop_leased_entries(&mut inner, lease));
            }
        }

        for key in dropped_keys {
            tracing::debug!("lease expired, dropping {key}");
            let _ = self.events.send(WatchEvent {
                kind: EventKind::Delete,
                key,
                value: String::new(),
            });
        }
    }

    fn drop_leased_entries(inner: &mut MemInner, lease: LeaseId) -> Vec<String> {
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.lease == Some(lease))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.entries.remove(key);
        }
        keys
    }
}

#[async_trait]
impl CoordinationStore for MemStore {
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId> {
        let ttl = Duration::from_secs(ttl_secs.max(1) as u64);
        let mut inner = self.inner.lock();
        let lease = inner.next_lease;
        inner.next_lease += 1;
        inner.leases.insert(
            lease,
            LeaseState {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(lease)
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        ttl_secs: i64,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let period = Duration::from_millis(((ttl_secs * 1000) / 3).max(50) as u64);
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.changed() => return Ok(()),
                _ = ticker.tick() => {
                    let mut inner = self.inner.lock();
                    match inner.leases.get_mut(&lease) {
                        Some(state) => state.deadline = Instant::now() + state.ttl,
                        None => bail!("lease {lease} is gone"),
                    }
                }
            }
        }
    }

    async fn revoke(&self, lease: LeaseId) -> Result<()> {
        let dropped_keys = {
            let mut inner = self.inner.lock();
            inner.leases.remove(&lease);
            Self::drop_leased_entries(&mut inner, lease)
        };

        for key in dropped_keys {
            let _ = self.events.send(WatchEvent {
                kind: EventKind::Delete,
                key,
                value: String::new(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock();
        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(lease) = lease {
                if !inner.leases.contains_key(&lease) {
                    bail!("lease {lease} is gone");
                }
            }
            inner.entries.insert(
                key.to_string(),
                StoredEntry {
                    value: value.to_string(),
                    lease,
                },
            );
        }

        let _ = self.events.send(WatchEvent {
            kind: EventKind::Put,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed = {
            let mut inner = self.inner.lock();
            inner.entries.remove(key).is_some()
        };

        if removed {
            let _ = self.events.send(WatchEvent {
                kind: EventKind::Delete,
                key: key.to_string(),
                value: String::new(),
            });
        }
        Ok(())
    }

    async fn watch(&self, key: &str, prefix: bool) -> Result<mpsc::Receiver<WatchEvent>> {
        let mut feed = self.events.subscribe();
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let key = key.to_string();

        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        let matches = if prefix {
                            event.key.starts_with(&key)
                        } else {
                            event.key == key
                        };
                        if matches && sender.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("memory store watch lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(receiver)
    }
}
