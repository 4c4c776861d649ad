use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use geecache::discovery::etcd::EtcdStore;
use geecache::discovery::{CoordinationStore, MembershipController};
use geecache::namespace::{origin_fn, Group, Origin};
use geecache::routing::picker::PeerRouter;
use geecache::transport;

/// Address other nodes can reach this host on.
const HOST_IP: &str = "127.0.0.1";
/// Seconds a node may stay silent before its registration expires.
const LEASE_TTL_SECS: i64 = 3;
/// Dial timeout for the coordination store.
const ETCD_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port: Option<String> = None;
    let mut api_port: Option<String> = None;
    let mut etcd_addr = "http://127.0.0.1:2379".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-port" | "--port" => {
                port = args.get(i + 1).cloned();
                i += 2;
            }
            "-api" | "--api" => {
                api_port = args.get(i + 1).cloned();
                i += 2;
            }
            "-etcd" | "--etcd" => {
                if let Some(value) = args.get(i + 1) {
                    etcd_addr = value.clone();
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let Some(port) = port else {
        eprintln!("Usage: {} -port <p> [-api <p>] [-etcd <url>]", args[0]);
        eprintln!("Example: {} -port 8001", args[0]);
        eprintln!("Example: {} -port 8002 -api 9999 -etcd http://127.0.0.1:2379", args[0]);
        std::process::exit(1);
    };

    let addr = format!("{HOST_IP}:{port}");
    tracing::info!("starting cache node on {addr}");

    // 1. Coordination store; unreachable etcd is fatal at startup.
    let store: Arc<dyn CoordinationStore> = Arc::new(
        EtcdStore::connect(&[etcd_addr.clone()], ETCD_DIAL_TIMEOUT).await?,
    );

    // 2. Router + membership: register self, seed the ring, start watches.
    let router = PeerRouter::new(addr.clone(), transport::client_factory());
    let controller =
        MembershipController::start(store, router.clone(), &addr, LEASE_TTL_SECS).await?;
    tracing::info!("registered as {}", controller.current_key());

    // 3. The demo namespace with its slow-db origin.
    let group = Group::new("scores", 2 << 10, scores_db())?;
    group.register_router(router.clone());

    // 4. Optional user API.
    if let Some(api_port) = api_port {
        let api_addr = format!("{HOST_IP}:{api_port}");
        let app = transport::handlers::api_routes(group.clone(), router.clone());
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        tracing::info!("api server listening on {api_addr}");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!("api server failed: {err}");
            }
        });
    }

    // 5. Cluster-facing peer endpoint.
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("cache server listening on {addr}");
    tracing::info!("press Ctrl+C to shut down");

    axum::serve(listener, transport::handlers::peer_routes())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Leave the cluster cleanly so peers drop us without waiting out the
    // lease.
    controller.shutdown().await?;

    Ok(())
}

/// The original demo data source: a fixed in-memory table standing in for a
/// slow backing database.
fn scores_db() -> Arc<dyn Origin> {
    let db: HashMap<&'static str, &'static str> = HashMap::from([
        ("Tom", "630"),
        ("Jack", "589"),
        ("Sam", "567"),
        ("Tang", "999"),
        ("Lbj", "23"),
        ("Liu", "55"),
    ]);

    Arc::new(origin_fn(move |key: String| {
        let value = db.get(key.as_str()).map(|v| v.as_bytes().to_vec());
        async move {
            tracing::info!("[slow db] search key {key}");
            match value {
                Some(bytes) => Ok(bytes),
                None => Err(anyhow::anyhow!("{key} not exist")),
            }
        }
    }))
}
