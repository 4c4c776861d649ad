//! Peer Transport Module
//!
//! HTTP plumbing between cluster nodes, plus the optional user-facing API.
//!
//! ## Wire Contract
//! A peer asks the owner of a key with
//! `GET http://<address>/_geecache/<namespace>/<key>` (both components
//! URL-escaped). The owner answers `200` with an `application/octet-stream`
//! body holding the length-prefixed binary encoding of [`protocol::FetchResponse`].
//! Any non-success status surfaces to the caller as an error embedding the
//! remote status.

pub mod client;
pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use client::{client_factory, HttpPeerClient};
