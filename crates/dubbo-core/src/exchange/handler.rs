//! `ExchangeLayer`: the `transport::Handler` every server and client
//! installs. It owns the parts of request handling that are the
//! exchange layer's job regardless of what sits above it - response
//! correlation, heartbeat/readonly event handling, and registry
//! cleanup on disconnect - and forwards everything else to an inner
//! application handler (typically the protocol dispatcher).

use super::channel::ExchangeChannel;
use super::heartbeat;
use super::registry::PendingRegistry;
use crate::codec::Frame;
use crate::error::ExchangeError;
use crate::message::Response;
use crate::transport::{Channel, ChannelRole, Handler};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Wraps an application `Handler` with exchange-layer bookkeeping.
pub struct ExchangeLayer {
    registry: PendingRegistry,
    heartbeat: Duration,
    inner: Arc<dyn Handler>,
    watchers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl ExchangeLayer {
    pub fn new(registry: PendingRegistry, heartbeat: Duration, inner: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            heartbeat,
            inner,
            watchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    pub fn exchange_channel(&self, channel: Channel) -> ExchangeChannel {
        ExchangeChannel::new(channel, self.registry.clone())
    }
}

#[async_trait]
impl Handler for ExchangeLayer {
    async fn connected(&self, channel: Channel) {
        let exchange = self.exchange_channel(channel.clone());
        let role = channel.role();
        let handle = heartbeat::spawn(exchange, role, self.heartbeat);
        self.watchers.lock().await.insert(channel.id(), handle);
        self.inner.connected(channel).await;
    }

    async fn disconnected(&self, channel: Channel) {
        if let Some(handle) = self.watchers.lock().await.remove(&channel.id()) {
            handle.abort();
        }
        self.registry.close_channel(&channel);
        self.inner.disconnected(channel).await;
    }

    async fn received(&self, channel: Channel, frame: Frame) {
        match frame {
            Frame::Response(response) => {
                self.registry.received(response);
            }
            Frame::Request(request) if request.event => {
                debug!(channel = %channel.id(), two_way = request.two_way, "event request received");
                if request.two_way {
                    let ack = Response::event_ack(request.id);
                    if let Err(e) = channel.send(Frame::Response(ack)) {
                        debug!(channel = %channel.id(), error = %e, "failed to ack event request");
                    }
                }
                // Readonly and one-way heartbeat events carry no reply
                // and never reach the invocation dispatcher.
            }
            Frame::Request(request) => {
                self.inner.received(channel, Frame::Request(request)).await;
            }
        }
    }

    async fn caught(&self, channel: Channel, error: ExchangeError) {
        self.inner.caught(channel, error).await;
    }
}
