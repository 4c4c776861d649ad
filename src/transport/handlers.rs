//! Transport HTTP Handlers
//!
//! Axum endpoints exposing this node to the cluster and to local clients.
//! - The peer endpoint resolves the namespace, runs the full read path
//!   (cache, single-flight, origin) and streams the value back in the wire
//!   encoding.
//! - The user API returns raw bytes for ad-hoc reads, plus a stats endpoint
//!   with cache and host metrics.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::namespace::Group;
use crate::routing::picker::PeerRouter;

use super::protocol::{FetchResponse, PEER_BASE_PATH};

/// Routes for the cluster-facing peer endpoint.
pub fn peer_routes() -> Router {
    Router::new().route(
        &format!("{PEER_BASE_PATH}{{namespace}}/{{key}}"),
        get(handle_peer_fetch),
    )
}

/// Routes for the user-facing API server.
pub fn api_routes(group: Arc<Group>, router: Arc<PeerRouter>) -> Router {
    Router::new()
        .route("/api", get(handle_api_get))
        .route("/health/stats", get(handle_stats))
        .layer(Extension(group))
        .layer(Extension(router))
}

async fn handle_peer_fetch(Path((namespace, key)): Path<(String, String)>) -> Response {
    let Some(group) = Group::lookup(&namespace) else {
        return (
            StatusCode::NOT_FOUND,
            format!("no such namespace: {namespace}"),
        )
            .into_response();
    };

    match group.get(&key).await {
        Ok(view) => {
            let payload = FetchResponse {
                value: view.to_vec(),
            };
            match bincode::serialize(&payload) {
                Ok(body) => (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    body,
                )
                    .into_response(),
                Err(err) => {
                    tracing::error!("failed to encode response for {key:?}: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
                }
            }
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response(),
    }
}

#[derive(Deserialize)]
struct ApiQuery {
    key: String,
}

async fn handle_api_get(
    Extension(group): Extension<Arc<Group>>,
    Query(query): Query<ApiQuery>,
) -> Response {
    match group.get(&query.key).await {
        Ok(view) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            view.to_vec(),
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response(),
    }
}

#[derive(Serialize)]
struct NodeStats {
    addr: String,
    namespace: String,
    peers: Vec<String>,
    replicas: usize,
    cached_entries: usize,
    peer_fallthrough_total: u64,
    cpu_usage: f32,
    mem_used_mb: u64,
    mem_total_mb: u64,
}

async fn handle_stats(
    Extension(group): Extension<Arc<Group>>,
    Extension(router): Extension<Arc<PeerRouter>>,
) -> Json<NodeStats> {
    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();
    let cpu_usage = sys.global_cpu_info().cpu_usage();
    // sysinfo returns bytes for memory values.
    let mem_total_mb = sys.total_memory() / (1024 * 1024);
    let mem_used_mb = sys.used_memory() / (1024 * 1024);

    Json(NodeStats {
        addr: router.self_addr().to_string(),
        namespace: group.name().to_string(),
        peers: router.addresses(),
        replicas: router.replicas(),
        cached_entries: group.cached_entries(),
        peer_fallthrough_total: group.fallthrough_total(),
        cpu_usage,
        mem_used_mb,
        mem_total_mb,
    })
}
