use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, PutOptions, WatchOptions};
use tokio::sync::{mpsc, watch};

use super::store::{CoordinationStore, EventKind, LeaseId, WatchEvent};

const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Coordination store backed by etcd.
///
/// The client is cheap to clone; every operation works on its own clone so
/// the store can be shared behind an `Arc` without interior locking.
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connects to the given endpoints with a bounded dial timeout.
    pub async fn connect(endpoints: &[String], dial_timeout: Duration) -> Result<Self> {
        let options = ConnectOptions::new().with_connect_timeout(dial_timeout);
        let client = Client::connect(endpoints, Some(options)).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId> {
        let mut client = self.client.clone();
        let lease = client.lease_grant(ttl_secs, None).await?;
        Ok(lease.id())
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        ttl_secs: i64,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let (mut keeper, mut responses) = client.lease_keep_alive(lease).await?;

        // Refresh at a third of the TTL, like the reference etcd clients do.
        let period = Duration::from_secs((ttl_secs / 3).max(1) as u64);
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.changed() => return Ok(()),
                _ = ticker.tick() => keeper.keep_alive().await?,
                message = responses.message() => match message? {
                    // Responses are drained and discarded; an unread channel
                    // makes the client library spam warnings.
                    Some(_) => {}
                    None => anyhow::bail!("lease keepalive stream closed"),
                },
            }
        }
    }

    async fn revoke(&self, lease: LeaseId) -> Result<()> {
        let mut client = self.client.clone();
        client.lease_revoke(lease).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut client = self.client.clone();
        let response = client.get(key, None).await?;
        let value = response
            .kvs()
            .first()
            .map(|kv| kv.value_str())
            .transpose()?
            .map(String::from);
        Ok(value)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let mut entries = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            entries.push((kv.key_str()?.to_string(), kv.value_str()?.to_string()));
        }
        Ok(entries)
    }

    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>) -> Result<()> {
        let mut client = self.client.clone();
        let options = lease.map(|id| PutOptions::new().with_lease(id));
        client.put(key, value, options).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn watch(&self, key: &str, prefix: bool) -> Result<mpsc::Receiver<WatchEvent>> {
        let mut client = self.client.clone();
        let options = prefix.then(|| WatchOptions::new().with_prefix());
        let (watcher, mut stream) = client.watch(key, options).await?;

        let (sender, receiver) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let key = key.to_string();
        tokio::spawn(async move {
            // The watcher handle must stay alive for the stream to keep
            // delivering events.
            let _watcher = watcher;
            loop {
                match stream.message().await {
                    Ok(Some(response)) => {
                        for event in response.events() {
                            let Some(kv) = event.kv() else { continue };
                            let (Ok(event_key), Ok(value)) = (kv.key_str(), kv.value_str())
                            else {
                                continue;
                            };
                            let kind = match event.event_type() {
                                EventType::Put => EventKind::Put,
                                EventType::Delete => EventKind::Delete,
                            };
                            let event = WatchEvent {
                                kind,
                                key: event_key.to_string(),
                                value: value.to_string(),
                            };
                            if sender.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        tracing::error!("etcd watch on {key:?} failed: {err}");
                        return;
                    }
                }
            }
        });

        Ok(receiver)
    }
}
