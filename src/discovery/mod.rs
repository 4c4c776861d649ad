//! Cluster Discovery Module
//!
//! Turns lease-based registrations in an external coordination store into
//! consistent-hash ring updates.
//!
//! ## Core Mechanisms
//! - **Lease liveness**: Each node registers its address under a lease with a
//!   short TTL and keeps it alive in the background. A node that loses
//!   connectivity for longer than the TTL silently disappears from the store,
//!   and every peer observes the deletion through its watch.
//! - **Index assignment**: Node keys are `/gee_cache/nodes/<index>`. A new
//!   node claims the smallest free index, refilling gaps left by failed
//!   nodes so ring positions stay stable across restarts.
//! - **Watch-driven topology**: The controller watches the cluster prefix
//!   and the replica-count configuration key, feeding every change into the
//!   peer router.

pub mod controller;
pub mod etcd;
pub mod mem;
pub mod register;
pub mod store;


pub use controller::{MembershipController, RegistrationState};
pub use store::{CoordinationStore, EventKind, LeaseId, WatchEvent, CLUSTER_PREFIX, REPLICAS_KEY};
