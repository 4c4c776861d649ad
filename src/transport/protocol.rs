//! Transport Wire Protocol
//!
//! The request/response pair exchanged between a peer router and a key's
//! owner. The request travels inside the URL path; the response body is the
//! bincode encoding of [`FetchResponse`], which length-prefixes the value
//! bytes so both sides agree on framing.

use serde::{Deserialize, Serialize};

/// Path prefix of the peer endpoint. Kept distinct from any user-facing
/// routes so a host can serve both from one listener.
pub const PEER_BASE_PATH: &str = "/_geecache/";

/// A lookup addressed to the owner of `key` within `namespace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub namespace: String,
    pub key: String,
}

/// The owner's answer: the raw cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub value: Vec<u8>,
}
