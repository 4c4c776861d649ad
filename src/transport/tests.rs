//! Transport Module Tests
//!
//! Drives the HTTP client against a real peer endpoint bound to an
//! ephemeral port, covering the success path, error statuses, and keys
//! that need URL escaping.

#[cfg(test)]
mod tests {
    use crate::namespace::{origin_fn, Group};
    use crate::routing::PeerClient;
    use crate::transport::handlers::peer_routes;
    use crate::transport::protocol::FetchRequest;
    use crate::transport::HttpPeerClient;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn unique_name(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }

    async fn serve_peer_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, peer_routes()).await.unwrap();
        });
        addr
    }

    fn scores_group(name: &str) -> Arc<Group> {
        let db = HashMap::from([("Tom", "630"), ("weird key/slash", "ok")]);
        let origin = origin_fn(move |key: String| {
            let value = db.get(key.as_str()).map(|v| v.as_bytes().to_vec());
            async move {
                match value {
                    Some(bytes) => Ok(bytes),
                    None => Err(anyhow::anyhow!("{key} not exist")),
                }
            }
        });
        Group::new(name, 2 << 10, Arc::new(origin)).unwrap()
    }

    #[tokio::test]
    async fn test_peer_fetch_round_trip() {
        let name = unique_name("transport");
        let _group = scores_group(&name);
        let addr = serve_peer_endpoint().await;

        let client = HttpPeerClient::new(&addr);
        let request = FetchRequest {
            namespace: name,
            key: "Tom".to_string(),
        };
        let bytes = client.fetch(&request).await.unwrap();
        assert_eq!(bytes, b"630");
    }

    #[tokio::test]
    async fn test_peer_fetch_escapes_path_components() {
        let name = unique_name("transport");
        let _group = scores_group(&name);
        let addr = serve_peer_endpoint().await;

        let client = HttpPeerClient::new(&addr);
        let request = FetchRequest {
            namespace: name,
            key: "weird key/slash".to_string(),
        };
        let bytes = client.fetch(&request).await.unwrap();
        assert_eq!(bytes, b"ok");
    }

    #[tokio::test]
    async fn test_unknown_namespace_surfaces_remote_status() {
        let addr = serve_peer_endpoint().await;

        let client = HttpPeerClient::new(&addr);
        let request = FetchRequest {
            namespace: unique_name("missing"),
            key: "Tom".to_string(),
        };
        let err = client.fetch(&request).await.unwrap_err();
        assert!(err.to_string().contains("404"), "got: {err:#}");
    }

    #[tokio::test]
    async fn test_origin_error_surfaces_remote_status() {
        let name = unique_name("transport");
        let _group = scores_group(&name);
        let addr = serve_peer_endpoint().await;

        let client = HttpPeerClient::new(&addr);
        let request = FetchRequest {
            namespace: name,
            key: "nobody".to_string(),
        };
        let err = client.fetch(&request).await.unwrap_err();
        assert!(err.to_string().contains("500"), "got: {err:#}");
    }
}
