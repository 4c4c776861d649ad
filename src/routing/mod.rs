//! Key Routing Module
//!
//! Decides which cluster node owns a key.
//!
//! ## Core Concepts
//! - **Consistent hashing**: Each real node is projected onto the ring as
//!   `replicas` virtual points. A key belongs to the first virtual point at or
//!   after its own hash, wrapping around the ring. Adding or removing a node
//!   only moves the keys adjacent to its virtual points.
//! - **Peer router**: Owns the ring, the transport clients, and the mapping
//!   from coordination-store keys to addresses, all mutated atomically under
//!   a single lock so no reader ever sees a ring entry without its client.

pub mod picker;
pub mod ring;


use crate::transport::protocol::FetchRequest;
use anyhow::Result;
use async_trait::async_trait;

/// Transport contract between the peer router and a key's owner.
///
/// Implementations must be callable concurrently; the router hands the same
/// client to every request targeting that peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetches the cached (or origin-loaded) value for the request's
    /// namespace and key from the remote owner.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>>;
}
