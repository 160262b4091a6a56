//! `ExchangeClient`: a connected `TransportClient` with `request()`/`send()`
//! correlation layered on top, and the heartbeat/readonly handling every
//! connection gets via `ExchangeLayer`.

use super::channel::ExchangeChannel;
use super::handler::ExchangeLayer;
use super::registry::{AsyncResult, PendingRegistry};
use crate::error::ExchangeError;
use crate::message::Invocation;
use crate::transport::{Handler, TransportClient};
use crate::url::EndpointUrl;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct ExchangeClient {
    transport: Arc<TransportClient>,
    exchange_layer: Arc<ExchangeLayer>,
    default_timeout: Duration,
}

impl ExchangeClient {
    pub async fn connect(url: EndpointUrl, app_handler: Arc<dyn Handler>) -> Result<Arc<Self>, ExchangeError> {
        let registry = PendingRegistry::new();
        let heartbeat = Duration::from_millis(url.heartbeat_ms());
        let default_timeout = Duration::from_millis(url.timeout_ms());
        let exchange_layer = ExchangeLayer::new(registry, heartbeat, app_handler);
        let transport = TransportClient::connect(url, exchange_layer.clone()).await?;
        Ok(Arc::new(Self { transport, exchange_layer, default_timeout }))
    }

    /// As `connect`, but wired directly over an already-established
    /// stream - no dial, no reconnect watchdog. `url` still supplies
    /// `heartbeat`/`timeout`/`payload` the way it would for a real dial.
    /// Exists for tests driving the exchange layer over an in-process
    /// `tokio::io::duplex` pipe instead of a real socket.
    pub async fn from_stream(
        stream: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
        remote_addr: SocketAddr,
        url: EndpointUrl,
        app_handler: Arc<dyn Handler>,
    ) -> Arc<Self> {
        let registry = PendingRegistry::new();
        let heartbeat = Duration::from_millis(url.heartbeat_ms());
        let default_timeout = Duration::from_millis(url.timeout_ms());
        let exchange_layer = ExchangeLayer::new(registry, heartbeat, app_handler);
        let transport =
            TransportClient::from_stream(stream, remote_addr, url.payload_bytes(), exchange_layer.clone()).await;
        Arc::new(Self { transport, exchange_layer, default_timeout })
    }

    pub fn registry(&self) -> &PendingRegistry {
        self.exchange_layer.registry()
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    async fn exchange_channel(&self) -> Result<ExchangeChannel, ExchangeError> {
        match self.transport.channel().await {
            Some(channel) => Ok(self.exchange_layer.exchange_channel(channel)),
            None => Err(ExchangeError::ChannelInactive { request_id: uuid::Uuid::nil() }),
        }
    }

    /// `request(payload, timeout?) -> future`, using the endpoint's
    /// configured timeout when the caller doesn't override it.
    pub async fn request(&self, invocation: Invocation, timeout: Option<Duration>) -> Result<AsyncResult, ExchangeError> {
        let exchange = self.exchange_channel().await?;
        exchange.request(invocation, timeout.unwrap_or(self.default_timeout))
    }

    pub async fn send_one_way(&self, invocation: Invocation) -> Result<(), ExchangeError> {
        let exchange = self.exchange_channel().await?;
        exchange.send_one_way(invocation)
    }

    pub async fn close(&self, timeout: Duration) {
        if let Ok(exchange) = self.exchange_channel().await {
            exchange.close(timeout).await;
        }
        self.transport.close_graceful(timeout).await;
    }
}
