//! `LazyConnectClient`: defers the transport connect until the first
//! `send`/`request`, guarded by a lock so concurrent callers on the
//! same lazy client serialize behind the one connect attempt.

use crate::error::ExchangeError;
use crate::exchange::{AsyncResult, ExchangeClient};
use crate::message::Invocation;
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

enum LazyState {
    Unconnected { url: EndpointUrl, handler: Arc<dyn Handler> },
    Connected(Arc<ExchangeClient>),
    /// Never connects - `ensure_connected` always fails. What a
    /// refcounted client installs at its own slot once it has actually
    /// closed, so later use still reads like "a lazy client nobody has
    /// dialed yet" without ever dialing.
    Closed,
}

/// A client that looks identical to `ExchangeClient` from the caller's
/// side but postpones the real connect until it is actually needed.
pub struct LazyConnectClient {
    state: Mutex<LazyState>,
}

impl LazyConnectClient {
    pub fn new(url: EndpointUrl, handler: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LazyState::Unconnected { url, handler }),
        })
    }

    /// Build a stub that is already closed: every `request`/
    /// `send_one_way` fails with `ChannelInactive` without attempting a
    /// connect.
    pub fn closed() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(LazyState::Closed) })
    }

    async fn ensure_connected(&self) -> Result<Arc<ExchangeClient>, ExchangeError> {
        let mut guard = self.state.lock().await;
        match &*guard {
            LazyState::Connected(client) => Ok(client.clone()),
            LazyState::Closed => Err(ExchangeError::ChannelInactive { request_id: uuid::Uuid::nil() }),
            LazyState::Unconnected { url, handler } => {
                debug!(endpoint = %url.endpoint_key(), "lazy client connecting on first use");
                let client = ExchangeClient::connect(url.clone(), handler.clone()).await?;
                *guard = LazyState::Connected(client.clone());
                Ok(client)
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, LazyState::Connected(_))
    }

    pub async fn request(&self, invocation: Invocation, timeout: Option<Duration>) -> Result<AsyncResult, ExchangeError> {
        let client = self.ensure_connected().await?;
        client.request(invocation, timeout).await
    }

    pub async fn send_one_way(&self, invocation: Invocation) -> Result<(), ExchangeError> {
        let client = self.ensure_connected().await?;
        client.send_one_way(invocation).await
    }

    pub async fn close(&self, timeout: Duration) {
        let mut guard = self.state.lock().await;
        if let LazyState::Connected(client) = &*guard {
            client.close(timeout).await;
        }
        if let LazyState::Unconnected { url, .. } = &*guard {
            debug!(endpoint = %url.endpoint_key(), "closing lazy client that never connected");
        }
        *guard = LazyState::Closed;
    }
}
