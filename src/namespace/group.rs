use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::memory::MemoryCache;
use crate::cache::view::ByteView;
use crate::flight::Flight;
use crate::routing::picker::PeerRouter;
use crate::transport::protocol::FetchRequest;

/// Produces the authoritative value for a key on a cache miss.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Adapts a plain async closure into an [`Origin`].
pub struct FnOrigin<F>(F);

#[async_trait]
impl<F, Fut> Origin for FnOrigin<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        (self.0)(key.to_string()).await
    }
}

/// Wraps `f` so it can serve as a namespace's origin callback.
pub fn origin_fn<F, Fut>(f: F) -> FnOrigin<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    FnOrigin(f)
}

/// Process-wide registry. Writers register under an exclusive shard lock,
/// readers look up under a shared one.
static GROUPS: OnceLock<DashMap<String, Arc<Group>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Arc<Group>> {
    GROUPS.get_or_init(DashMap::new)
}

/// A named cache scope.
pub struct Group {
    name: String,
    origin: Arc<dyn Origin>,
    main_cache: MemoryCache,
    router: OnceLock<Arc<PeerRouter>>,
    loader: Flight<ByteView>,
    fallthrough_total: AtomicU64,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("name", &self.name).finish()
    }
}

impl Group {
    /// Creates the namespace and registers it under `name`. `max_bytes` is
    /// the local store's byte budget (0 means unbounded). Fails when the
    /// name is already taken: namespaces live for the whole process, so a
    /// duplicate registration is a wiring mistake.
    pub fn new(name: &str, max_bytes: usize, origin: Arc<dyn Origin>) -> Result<Arc<Self>> {
        let group = Arc::new(Self {
            name: name.to_string(),
            origin,
            main_cache: MemoryCache::new(max_bytes),
            router: OnceLock::new(),
            loader: Flight::new(),
            fallthrough_total: AtomicU64::new(0),
        });

        match registry().entry(name.to_string()) {
            Entry::Occupied(_) => bail!("namespace {name:?} is already registered"),
            Entry::Vacant(slot) => {
                slot.insert(group.clone());
            }
        }
        Ok(group)
    }

    /// Resolves a namespace by name.
    pub fn lookup(name: &str) -> Option<Arc<Group>> {
        registry().get(name).map(|entry| entry.value().clone())
    }

    /// Attaches the peer router. Without one, every miss loads locally.
    pub fn register_router(&self, router: Arc<PeerRouter>) {
        if self.router.set(router).is_err() {
            tracing::warn!("peer router already attached to namespace {}", self.name);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of values currently held in the local store.
    pub fn cached_entries(&self) -> usize {
        self.main_cache.len()
    }

    /// How often a peer load failed and this node served the key itself.
    pub fn fallthrough_total(&self) -> u64 {
        self.fallthrough_total.load(Ordering::Relaxed)
    }

    /// Looks up `key`, consulting the local store first and loading through
    /// the cluster on a miss.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            bail!("key is required");
        }

        if let Some(view) = self.main_cache.get(key) {
            tracing::debug!("cache hit for {key:?} in namespace {}", self.name);
            return Ok(view);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        if let Some(peer) = self.router.get().and_then(|router| router.pick_peer(key)) {
            let request = FetchRequest {
                namespace: self.name.clone(),
                key: key.to_string(),
            };
            match peer.fetch(&request).await {
                Ok(bytes) => return Ok(ByteView::new(&bytes)),
                Err(err) => {
                    // A transient peer failure must not become a client
                    // error while this node can still serve the key.
                    self.fallthrough_total.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "peer load for {key:?} failed, falling through to local load: {err:#}"
                    );
                }
            }
        }

        self.load_locally(key).await
    }

    async fn load_locally(&self, key: &str) -> Result<ByteView> {
        let outcome = self
            .loader
            .run(key, || async {
                let bytes = self.origin.fetch(key).await?;
                let view = ByteView::new(&bytes);
                self.main_cache.add(key, view.clone());
                Ok(view)
            })
            .await;

        outcome.map_err(|err| anyhow::anyhow!("{err:#}"))
    }
}
