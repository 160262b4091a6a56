//! `RefCountedClient`: the unit the shared pool hands out. Several
//! consumers referring the same endpoint share one `ExchangeClient`;
//! the wrapper only really closes it once the last referrer releases.

use super::lazy::LazyConnectClient;
use crate::error::ExchangeError;
use crate::exchange::{AsyncResult, ExchangeClient};
use crate::message::Invocation;
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

enum RefState {
    Active { client: Arc<ExchangeClient>, refcount: u32 },
    /// Refcount hit zero and the real client was closed. The slot now
    /// holds an already-closed `LazyConnectClient` stub rather than a
    /// bare flag, so any later use still goes through the normal
    /// client-call surface and fails there instead of at a special case.
    Closed(Arc<LazyConnectClient>),
}

pub struct RefCountedClient {
    endpoint: String,
    state: Mutex<RefState>,
}

impl RefCountedClient {
    pub async fn connect(url: EndpointUrl, handler: Arc<dyn Handler>) -> Result<Arc<Self>, ExchangeError> {
        let endpoint = url.endpoint_key();
        let client = ExchangeClient::connect(url, handler).await?;
        Ok(Arc::new(Self {
            endpoint,
            state: Mutex::new(RefState::Active { client, refcount: 1 }),
        }))
    }

    /// True if the wrapped client is live and not closed - what the
    /// pool's getter checks before deciding to reuse the existing list
    /// versus repairing it.
    pub async fn is_healthy(&self) -> bool {
        match &*self.state.lock().await {
            RefState::Active { client, .. } => client.is_connected().await,
            RefState::Closed(_) => false,
        }
    }

    /// Increment the refcount for one more consumer. No-op error if
    /// already closed - the caller must treat this as "unhealthy" and
    /// ask the pool to repair the list instead.
    pub async fn acquire(&self) -> bool {
        match &mut *self.state.lock().await {
            RefState::Active { refcount, .. } => {
                *refcount += 1;
                true
            }
            RefState::Closed(_) => false,
        }
    }

    /// `if --refcount > 0: noop; else actually close`. The refcount
    /// never drops below zero: once it hits zero the state moves to
    /// `Closed` and stays there, with a closed `LazyConnectClient` stub
    /// standing in for the real client.
    pub async fn release(&self, timeout: Duration) {
        let mut guard = self.state.lock().await;
        match &mut *guard {
            RefState::Active { refcount, .. } if *refcount > 1 => {
                *refcount -= 1;
            }
            RefState::Active { client, .. } => {
                let client = client.clone();
                *guard = RefState::Closed(LazyConnectClient::closed());
                drop(guard);
                debug!(endpoint = %self.endpoint, "refcount reached zero, closing shared client");
                client.close(timeout).await;
            }
            RefState::Closed(_) => {
                debug!(endpoint = %self.endpoint, "release on already-closed refcounted client, ignoring");
            }
        }
    }

    pub async fn refcount(&self) -> u32 {
        match &*self.state.lock().await {
            RefState::Active { refcount, .. } => *refcount,
            RefState::Closed(_) => 0,
        }
    }

    pub async fn request(&self, invocation: Invocation, timeout: Option<Duration>) -> Result<AsyncResult, ExchangeError> {
        match &*self.state.lock().await {
            RefState::Active { client, .. } => client.request(invocation, timeout).await,
            RefState::Closed(stub) => stub.request(invocation, timeout).await,
        }
    }

    pub async fn send_one_way(&self, invocation: Invocation) -> Result<(), ExchangeError> {
        match &*self.state.lock().await {
            RefState::Active { client, .. } => client.send_one_way(invocation).await,
            RefState::Closed(stub) => stub.send_one_way(invocation).await,
        }
    }
}
