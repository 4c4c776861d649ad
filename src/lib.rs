//! Distributed In-Memory Cache Cluster Library
//!
//! This library crate defines the core modules that make up the cache cluster.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of six loosely coupled subsystems:
//!
//! - **`cache`**: The single-node storage layer. A size-bounded LRU store of
//!   immutable byte values behind a thread-safe, lazily initialized wrapper.
//! - **`flight`**: Request coalescing. Guarantees at most one in-flight origin
//!   call per key no matter how many callers ask concurrently.
//! - **`routing`**: Key ownership. A consistent-hash ring with virtual nodes
//!   plus the peer router that maps keys to transport clients.
//! - **`namespace`**: The user-facing cache scope ("group"). Binds an origin
//!   callback to its own local store, single-flight loader and peer router.
//! - **`discovery`**: Cluster coordination. Lease-based registration in an
//!   external coordination store, watch-driven ring maintenance.
//! - **`transport`**: The HTTP contract between peers and the local client API.

pub mod cache;
pub mod discovery;
pub mod flight;
pub mod namespace;
pub mod routing;
pub mod transport;
