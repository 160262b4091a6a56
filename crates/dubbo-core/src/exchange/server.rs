//! `ExchangeServer`: a bound `TransportServer` with the exchange
//! layer's bookkeeping (heartbeats, event acks, registry cleanup)
//! wired into its handler chain.

use super::handler::ExchangeLayer;
use super::registry::PendingRegistry;
use crate::error::ExchangeError;
use crate::message::Request;
use crate::transport::{Handler, TransportServer};
use crate::url::EndpointUrl;
use std::sync::Arc;
use std::time::Duration;

pub struct ExchangeServer {
    transport: Arc<TransportServer>,
    exchange_layer: Arc<ExchangeLayer>,
}

impl ExchangeServer {
    pub async fn bind(url: EndpointUrl, app_handler: Arc<dyn Handler>) -> Result<Arc<Self>, ExchangeError> {
        let registry = PendingRegistry::new();
        let heartbeat = Duration::from_millis(url.heartbeat_ms());
        let exchange_layer = ExchangeLayer::new(registry, heartbeat, app_handler);
        let transport = TransportServer::bind(url, exchange_layer.clone()).await?;
        Ok(Arc::new(Self { transport, exchange_layer }))
    }

    pub fn registry(&self) -> &PendingRegistry {
        self.exchange_layer.registry()
    }

    pub async fn connected_count(&self) -> usize {
        self.transport.connected_count().await
    }

    pub async fn reset(&self, accepts: u32) {
        self.transport.reset(accepts).await;
    }

    pub async fn broadcast(&self, request: Request) {
        self.transport.send(request).await;
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    /// Drain-then-force close: broadcasts a readonly event, waits up to
    /// `timeout` for channels to disconnect on their own, then forces
    /// the rest closed. A single operation, not two sequential calls.
    pub async fn close_graceful(&self, timeout: Duration) {
        self.transport.close_graceful(Some(timeout)).await;
    }
}
