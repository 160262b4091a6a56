//! Reference-counted client pool: shares `N` connections per endpoint
//! across consumers, building or repairing the shared list under a
//! single lock per endpoint and parking late arrivals on a `Notify`
//! while the list is being (re)built.

pub mod lazy;
pub mod refcounted;

pub use lazy::LazyConnectClient;
pub use refcounted::RefCountedClient;

use crate::error::ExchangeError;
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

enum Entry {
    /// Another caller is building or repairing this endpoint's list;
    /// everyone else waits on `notify` instead of racing to rebuild.
    Pending,
    Ready(Vec<Arc<RefCountedClient>>),
}

struct PoolInner {
    entries: RwLock<HashMap<String, Entry>>,
    notify: Notify,
}

/// Process-wide, per-endpoint pool of shared `RefCountedClient`s.
#[derive(Clone)]
pub struct ClientPool {
    inner: Arc<PoolInner>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                entries: RwLock::new(HashMap::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Get the list of clients to use for `url`. If `url.connections() > 0`
    /// this consumer gets its own dedicated (non-shared, non-pooled)
    /// clients; otherwise it shares `url.share_connections()` clients
    /// per endpoint with every other consumer of the same endpoint.
    pub async fn get(&self, url: EndpointUrl, handler: Arc<dyn Handler>) -> Result<Vec<Arc<RefCountedClient>>, ExchangeError> {
        if url.connections() > 0 {
            return build_list(&url, handler, url.connections()).await;
        }

        let key = url.endpoint_key();
        let share = url.share_connections().max(1);

        loop {
            {
                let entries = self.inner.entries.read().await;
                if let Some(Entry::Ready(list)) = entries.get(&key) {
                    if all_healthy(list).await {
                        for client in list {
                            client.acquire().await;
                        }
                        return Ok(list.clone());
                    }
                }
            }

            // Either missing or needs repair: try to become the builder.
            let became_builder = {
                let mut entries = self.inner.entries.write().await;
                match entries.get(&key) {
                    Some(Entry::Pending) => false,
                    _ => {
                        entries.insert(key.clone(), Entry::Pending);
                        true
                    }
                }
            };

            if !became_builder {
                self.inner.notify.notified().await;
                continue;
            }

            let previous = {
                let mut entries = self.inner.entries.write().await;
                match entries.remove(&key) {
                    Some(Entry::Ready(list)) => Some(list),
                    _ => None,
                }
            };

            let built = match previous {
                None => build_list(&url, handler.clone(), share).await,
                Some(previous) => repair_list(&url, handler.clone(), previous, share).await,
            };

            let mut entries = self.inner.entries.write().await;
            match &built {
                Ok(list) => {
                    entries.insert(key.clone(), Entry::Ready(list.clone()));
                }
                Err(_) => {
                    entries.remove(&key);
                }
            }
            drop(entries);
            self.inner.notify.notify_waiters();

            return built;
        }
    }

    /// Release one reference on every client in `list`, closing each
    /// one for real once its refcount reaches zero.
    pub async fn release(&self, list: &[Arc<RefCountedClient>], timeout: Duration) {
        for client in list {
            client.release(timeout).await;
        }
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}

async fn all_healthy(list: &[Arc<RefCountedClient>]) -> bool {
    for client in list {
        if !client.is_healthy().await {
            return false;
        }
    }
    true
}

async fn build_list(
    url: &EndpointUrl,
    handler: Arc<dyn Handler>,
    n: u32,
) -> Result<Vec<Arc<RefCountedClient>>, ExchangeError> {
    let mut list = Vec::with_capacity(n as usize);
    for _ in 0..n {
        list.push(RefCountedClient::connect(url.clone(), handler.clone()).await?);
    }
    Ok(list)
}

/// Replace dead entries in `previous`, keep and `acquire()` the ones
/// still healthy, so survivors don't pay for a fresh connect.
async fn repair_list(
    url: &EndpointUrl,
    handler: Arc<dyn Handler>,
    previous: Vec<Arc<RefCountedClient>>,
    n: u32,
) -> Result<Vec<Arc<RefCountedClient>>, ExchangeError> {
    let mut list = Vec::with_capacity(n as usize);
    for i in 0..n as usize {
        match previous.get(i) {
            Some(client) if client.is_healthy().await => {
                client.acquire().await;
                list.push(client.clone());
            }
            _ => {
                debug!(endpoint = %url.endpoint_key(), slot = i, "repairing dead pool slot");
                list.push(RefCountedClient::connect(url.clone(), handler.clone()).await?);
            }
        }
    }
    Ok(list)
}
