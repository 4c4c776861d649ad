//! Membership Controller
//!
//! Registers this node in the coordination store and mirrors the cluster's
//! registrations into the peer router.
//!
//! ## Startup Sequence
//! 1. Grant a lease and start its keepalive (see [`Registration`]).
//! 2. Read the replica-count configuration so the ring is built with the
//!    configured factor from the start.
//! 3. Claim the smallest free node index and write this node's address.
//! 4. Seed the router with every registration currently in the store; a
//!    malformed key at this stage aborts startup.
//! 5. Watch the cluster prefix, each individual node key, and the
//!    replica-count key; feed every event into the router.
//!
//! Lease expiry is the only liveness signal: a node that goes dark simply
//! stops refreshing and every peer sees its key deleted.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::routing::picker::PeerRouter;
use crate::routing::ring::DEFAULT_REPLICAS;

use super::register::{parse_node_index, Registration};
use super::store::{CoordinationStore, EventKind, WatchEvent, CLUSTER_PREFIX, REPLICAS_KEY};

/// Lifecycle of this node's registration, observable for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    NotRegistered,
    Registering,
    Live,
    Draining,
    Gone,
}

#[derive(Debug, Clone, Copy)]
enum WatchTarget {
    Cluster,
    Replicas,
}

pub struct MembershipController {
    store: Arc<dyn CoordinationStore>,
    router: Arc<PeerRouter>,
    registration: Registration,
    state: Mutex<RegistrationState>,
    watch_cancel: watch::Sender<bool>,
}

impl std::fmt::Debug for MembershipController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipController")
            .field("registration", &self.registration)
            .field("state", &self.state)
            .finish()
    }
}

impl MembershipController {
    /// Runs the full startup sequence and returns the live controller.
    pub async fn start(
        store: Arc<dyn CoordinationStore>,
        router: Arc<PeerRouter>,
        addr: &str,
        ttl_secs: i64,
    ) -> Result<Arc<Self>> {
        let registration = Registration::register(store.clone(), addr, ttl_secs).await?;

        // Apply the configured replica factor before any node lands on the
        // ring, so the initial topology is already built with it.
        if let Some(value) = store.get(REPLICAS_KEY).await? {
            match value.trim().parse::<usize>() {
                Ok(replicas) if replicas > 0 => router.set_replicas(replicas),
                _ => tracing::warn!("ignoring invalid replica count {value:?}"),
            }
        }

        let (watch_cancel, _) = watch::channel(false);
        let controller = Arc::new(Self {
            store,
            router,
            registration,
            state: Mutex::new(RegistrationState::Live),
            watch_cancel,
        });

        // Seed from the current cluster state, our own key included.
        let nodes = controller.store.get_prefix(CLUSTER_PREFIX).await?;
        for (key, node_addr) in nodes {
            parse_node_index(&key)?;
            controller.track_peer(&key, &node_addr);
        }

        let cluster_events = controller.store.watch(CLUSTER_PREFIX, true).await?;
        controller.run_event_loop(cluster_events, WatchTarget::Cluster);

        let replicas_events = controller.store.watch(REPLICAS_KEY, false).await?;
        controller.run_event_loop(replicas_events, WatchTarget::Replicas);

        Ok(controller)
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.lock()
    }

    /// This node's key in the coordination store.
    pub fn current_key(&self) -> &str {
        self.registration.current_key()
    }

    /// Graceful shutdown: stop the watch loops, cancel the keepalive,
    /// revoke the lease and delete this node's key.
    pub async fn shutdown(&self) -> Result<()> {
        *self.state.lock() = RegistrationState::Draining;
        let _ = self.watch_cancel.send(true);
        let result = self.registration.deregister().await;
        *self.state.lock() = RegistrationState::Gone;
        result
    }

    fn track_peer(self: &Arc<Self>, key: &str, addr: &str) {
        let newly_tracked = self.router.add(key, addr);
        tracing::info!("cluster node {key} -> {addr}");
        if newly_tracked {
            self.spawn_key_watch(key.to_string());
        }
    }

    /// Watches one node key so an address change or removal is seen even if
    /// the prefix watch misses it.
    fn spawn_key_watch(self: &Arc<Self>, key: String) {
        let controller = self.clone();
        tokio::spawn(async move {
            match controller.store.watch(&key, false).await {
                Ok(events) => controller.run_event_loop(events, WatchTarget::Cluster),
                Err(err) => tracing::error!("failed to watch {key}: {err:#}"),
            }
        });
    }

    fn run_event_loop(self: &Arc<Self>, mut events: mpsc::Receiver<WatchEvent>, target: WatchTarget) {
        let controller = self.clone();
        let mut cancel = self.watch_cancel.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.changed() => return,
                    event = events.recv() => match event {
                        Some(event) => controller.apply_event(target, event),
                        None => {
                            controller.mark_lost(target);
                            return;
                        }
                    },
                }
            }
        });
    }

    fn apply_event(self: &Arc<Self>, target: WatchTarget, event: WatchEvent) {
        match target {
            WatchTarget::Cluster => match event.kind {
                EventKind::Put => match parse_node_index(&event.key) {
                    Ok(_) => self.track_peer(&event.key, &event.value),
                    Err(err) => tracing::error!("skipping watch event: {err:#}"),
                },
                EventKind::Delete => {
                    if let Some(addr) = self.router.remove(&event.key) {
                        tracing::info!("cluster node {} left ({addr})", event.key);
                    }
                }
            },
            WatchTarget::Replicas => match event.kind {
                EventKind::Put => match event.value.trim().parse::<usize>() {
                    Ok(replicas) if replicas > 0 => {
                        tracing::info!("replica count set to {replicas}");
                        self.router.set_replicas(replicas);
                    }
                    _ => tracing::warn!("ignoring invalid replica count {:?}", event.value),
                },
                EventKind::Delete => {
                    tracing::info!("replica count reset to default {DEFAULT_REPLICAS}");
                    self.router.set_replicas(DEFAULT_REPLICAS);
                }
            },
        }
    }

    /// A watch channel died while we were live: the coordination store is
    /// unreachable. Surface it and mark the node as gone; the caller decides
    /// whether to restart.
    fn mark_lost(&self, target: WatchTarget) {
        let mut state = self.state.lock();
        if *state != RegistrationState::Live {
            return;
        }
        *state = RegistrationState::Gone;
        tracing::error!("{target:?} watch terminated unexpectedly, membership is gone");
    }
}
