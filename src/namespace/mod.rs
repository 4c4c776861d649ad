//! Namespace Module
//!
//! A namespace ("group") is a named cache scope binding a user-supplied
//! origin callback to its own local store, single-flight loader, and peer
//! router. Namespaces are registered in a process-wide registry so the peer
//! transport can resolve them by name.
//!
//! ## Read Path
//! `Group::get` serves from the local store when possible. On a miss, the
//! peer router picks the key's owner: a remote owner is asked over the
//! transport, and on transport failure (or when this node owns the key) the
//! origin callback runs locally under single-flight, with the result cached.

pub mod group;


pub use group::{origin_fn, Group, Origin};
