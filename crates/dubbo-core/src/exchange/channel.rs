//! `ExchangeChannel`: the message-oriented wrapper a consumer holds -
//! `send` for one-way traffic, `request` for a correlated call that
//! resolves to a `Response`.

use super::registry::{AsyncResult, PendingRegistry};
use crate::codec::Frame;
use crate::error::ExchangeError;
use crate::message::{Invocation, Request};
use crate::transport::Channel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Wraps one transport `Channel` with request/response correlation.
/// Shares a `PendingRegistry` with every other `ExchangeChannel` in the
/// process, since request ids are globally unique UUIDs rather than
/// per-connection sequence numbers.
#[derive(Clone)]
pub struct ExchangeChannel {
    channel: Channel,
    registry: PendingRegistry,
    closed: std::sync::Arc<AtomicBool>,
}

impl ExchangeChannel {
    pub fn new(channel: Channel, registry: PendingRegistry) -> Self {
        Self {
            channel,
            registry,
            closed: std::sync::Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn transport_channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.channel.is_closed()
    }

    /// Build a two-way request from `invocation`, register it, and send
    /// it. On a send failure the pending entry is cancelled so the
    /// caller's future resolves immediately rather than waiting out the
    /// full timeout for a request that never left this process.
    pub fn request(&self, invocation: Invocation, timeout: Duration) -> Result<AsyncResult, ExchangeError> {
        if self.is_closed() {
            return Err(ExchangeError::ChannelInactive { request_id: uuid::Uuid::nil() });
        }

        let request = Request::invocation(invocation);
        let id = request.id;
        let future = self.registry.new_call(self.channel.clone(), &request, timeout);

        match self.channel.send(Frame::Request(request)) {
            Ok(()) => {
                self.registry.sent(id);
                Ok(future)
            }
            Err(e) => {
                self.registry.cancel(id);
                Err(e)
            }
        }
    }

    /// Fire-and-forget send. No `PendingCall` is created and the future
    /// this would have returned simply doesn't exist - matches the
    /// invariant that `two-way=false` requests never time out.
    pub fn send_one_way(&self, invocation: Invocation) -> Result<(), ExchangeError> {
        let request = Request::one_way(invocation);
        self.channel.send(Frame::Request(request))
    }

    pub fn send_frame(&self, frame: Frame) -> Result<(), ExchangeError> {
        self.channel.send(frame)
    }

    /// Send a heartbeat event request and register it with the
    /// registry exactly like an ordinary call, so a missed heartbeat
    /// reply is just another timeout.
    pub fn send_heartbeat(&self, timeout: Duration) -> Result<AsyncResult, ExchangeError> {
        let request = Request::heartbeat();
        let id = request.id;
        let future = self.registry.new_call(self.channel.clone(), &request, timeout);
        match self.channel.send(Frame::Request(request)) {
            Ok(()) => {
                self.registry.sent(id);
                Ok(future)
            }
            Err(e) => {
                self.registry.cancel(id);
                Err(e)
            }
        }
    }

    /// Graceful close: stop accepting new requests, wait up to `timeout`
    /// for in-flight calls on this channel to drain, then close the
    /// underlying transport connection. The transport close itself
    /// triggers `PendingRegistry::close_channel` via the handler chain,
    /// so any stragglers still get a terminal `CHANNEL_INACTIVE`.
    pub async fn close(&self, timeout: Duration) {
        self.closed.store(true, Ordering::Release);
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline && self.registry.pending_count_for(&self.channel) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.registry.pending_count_for(&self.channel) > 0 {
            debug!(
                channel = %self.channel.id(),
                remaining = self.registry.pending_count_for(&self.channel),
                "graceful close timed out with calls still pending"
            );
        }
        self.channel.close();
        self.registry.close_channel(&self.channel);
    }
}
