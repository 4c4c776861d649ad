use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::routing::picker::ClientFactory;
use crate::routing::PeerClient;

use super::protocol::{FetchRequest, FetchResponse, PEER_BASE_PATH};

const FETCH_TIMEOUT: Duration = Duration::from_millis(500);
const FETCH_ATTEMPTS: usize = 2;

/// HTTP client bound to one peer's address. Safe to call concurrently; the
/// underlying `reqwest::Client` pools connections internally.
pub struct HttpPeerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(addr: &str) -> Self {
        Self::with_client(addr, reqwest::Client::new())
    }

    fn with_client(addr: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: format!("http://{addr}{PEER_BASE_PATH}"),
            http,
        }
    }

    async fn get_with_retry(
        &self,
        url: &str,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self.http.get(url).timeout(timeout).send().await;

            match response {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(err));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("retry attempts exhausted"))
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(&request.namespace),
            urlencoding::encode(&request.key),
        );

        let response = self
            .get_with_retry(&url, FETCH_TIMEOUT, FETCH_ATTEMPTS)
            .await?;

        if !response.status().is_success() {
            bail!(
                "peer returned {} for {}/{}",
                response.status(),
                request.namespace,
                request.key
            );
        }

        let body = response.bytes().await?;
        let decoded: FetchResponse = bincode::deserialize(&body)?;
        Ok(decoded.value)
    }
}

/// Client factory for the peer router: one shared connection pool, one
/// `HttpPeerClient` per peer address.
pub fn client_factory() -> ClientFactory {
    let http = reqwest::Client::new();
    Box::new(move |addr| Arc::new(HttpPeerClient::with_client(addr, http.clone())))
}
