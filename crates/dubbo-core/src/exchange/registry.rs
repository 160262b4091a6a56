//! The pending-call registry: a process-wide `id -> waiting call` map,
//! with a background sweep that synthesizes a timeout response when a
//! call's deadline passes before a real one arrives.
//!
//! Grounded on the same reactor shape as a DEALER client tracking
//! in-flight requests by id in a `HashMap` with an interval sweep for
//! expired entries - completion here runs through a `oneshot` channel
//! instead of being driven inline by the reactor loop, since the
//! registry is shared across every channel a process owns rather than
//! owned by one socket's reactor task.

use crate::error::ExchangeError;
use crate::message::{Invocation, Request, Response, Status};
use crate::timer::{ticker, TICK};
use crate::transport::Channel;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

struct PendingCall {
    channel: Channel,
    request_summary: String,
    deadline: Instant,
    start: Instant,
    sent_at: Option<Instant>,
    completion: Option<oneshot::Sender<Response>>,
}

struct RegistryInner {
    calls: Mutex<HashMap<Uuid, PendingCall>>,
}

/// Shared handle to the pending-call map. Cheap to clone; every
/// `ExchangeChannel` built on the same process holds one.
#[derive(Clone)]
pub struct PendingRegistry {
    inner: Arc<RegistryInner>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        let inner = Arc::new(RegistryInner {
            calls: Mutex::new(HashMap::new()),
        });
        spawn_sweep(inner.clone());
        Self { inner }
    }

    /// Register a fresh two-way call and return the future its caller
    /// awaits. `request.two_way` must be true - one-way requests never
    /// get an entry here and so never time out.
    pub fn new_call(&self, channel: Channel, request: &Request, timeout: Duration) -> AsyncResult {
        debug_assert!(request.two_way, "only two-way requests get a PendingCall");
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let call = PendingCall {
            channel,
            request_summary: summarize(request),
            deadline: now + timeout,
            start: now,
            sent_at: None,
            completion: Some(tx),
        };
        self.inner.calls.lock().unwrap().insert(request.id, call);
        AsyncResult::pending(rx, request.invocation_ref().cloned())
    }

    /// Record that `request` left the send buffer - used to distinguish
    /// a client-side timeout (never sent) from a server-side one (sent,
    /// no reply came back in time).
    pub fn sent(&self, id: Uuid) {
        if let Some(call) = self.inner.calls.lock().unwrap().get_mut(&id) {
            call.sent_at = Some(Instant::now());
        }
    }

    /// Deliver a real response. Drops silently (with a warning) if the
    /// id isn't pending - it already timed out, or it was never ours.
    pub fn received(&self, response: Response) {
        let call = self.inner.calls.lock().unwrap().remove(&response.id);
        match call {
            Some(mut call) => {
                if let Some(tx) = call.completion.take() {
                    let _ = tx.send(response);
                }
            }
            None => {
                warn!(id = %response.id, "response for unknown or already-completed request, dropping");
            }
        }
    }

    /// Complete every call routed through `channel` with a synthetic
    /// `CHANNEL_INACTIVE` response - the transport-level close fanout.
    pub fn close_channel(&self, channel: &Channel) {
        let mut calls = self.inner.calls.lock().unwrap();
        let ids: Vec<Uuid> = calls
            .iter()
            .filter(|(_, call)| call.channel.id() == channel.id())
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(mut call) = calls.remove(&id) {
                if let Some(tx) = call.completion.take() {
                    let _ = tx.send(Response::channel_inactive(id));
                }
            }
        }
    }

    /// Cancel a single in-flight call with `CLIENT_ERROR` - the
    /// `AsyncResult::cancel()` path.
    pub fn cancel(&self, id: Uuid) {
        if let Some(mut call) = self.inner.calls.lock().unwrap().remove(&id) {
            if let Some(tx) = call.completion.take() {
                let _ = tx.send(Response::error(id, Status::ClientError, "cancelled by caller"));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    /// Calls still outstanding on one particular channel - what a
    /// graceful `ExchangeChannel::close` polls while draining.
    pub fn pending_count_for(&self, channel: &Channel) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .values()
            .filter(|call| call.channel.id() == channel.id())
            .count()
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.inner.calls.lock().unwrap().contains_key(&id)
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_sweep(inner: Arc<RegistryInner>) {
    tokio::spawn(async move {
        let mut tick = ticker(TICK);
        loop {
            tick.tick().await;
            let now = Instant::now();
            let expired: Vec<(Uuid, PendingCall)> = {
                let mut calls = inner.calls.lock().unwrap();
                let expired_ids: Vec<Uuid> = calls
                    .iter()
                    .filter(|(_, call)| now >= call.deadline)
                    .map(|(id, _)| *id)
                    .collect();
                expired_ids
                    .into_iter()
                    .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                    .collect()
            };

            for (id, mut call) in expired {
                let elapsed = call.start.elapsed();
                let (status, side) = match call.sent_at {
                    Some(_) => (Status::ServerTimeout, "server"),
                    None => (Status::ClientTimeout, "client"),
                };
                warn!(
                    id = %id,
                    side,
                    elapsed_ms = elapsed.as_millis() as u64,
                    request = %call.request_summary,
                    "call timed out"
                );
                if let Some(tx) = call.completion.take() {
                    let message = format!(
                        "{side} timeout after {}ms: {}",
                        elapsed.as_millis(),
                        call.request_summary
                    );
                    let _ = tx.send(Response::error(id, status, message));
                }
            }
        }
    });
}

fn summarize(request: &Request) -> String {
    match request.invocation_ref() {
        Some(inv) => format!("{}({} args)", inv.method, inv.arguments.len()),
        None if request.is_heartbeat() => "heartbeat".to_string(),
        None if request.is_readonly() => "readonly".to_string(),
        None => "event".to_string(),
    }
}

/// The consumer-side completion handle for one outstanding two-way
/// request. Resolves to `Ok(Response)` for every terminal outcome -
/// real reply, synthesized timeout, or channel-inactive - since those
/// all flow through the same `Response` shape; resolves to `Err` only
/// if the registry's internal channel is dropped without any send,
/// which does not happen in normal operation.
pub struct AsyncResult {
    rx: oneshot::Receiver<Response>,
    invocation: Option<Invocation>,
}

impl AsyncResult {
    fn pending(rx: oneshot::Receiver<Response>, invocation: Option<Invocation>) -> Self {
        Self { rx, invocation }
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        self.invocation.as_ref()
    }

    /// Block the awaiting task until a terminal response arrives.
    pub async fn get(self) -> Result<Response, ExchangeError> {
        self.rx
            .await
            .map_err(|_| ExchangeError::Remoting {
                addr: "registry".to_string(),
                message: "pending call dropped without completion".to_string(),
            })
    }

    /// As `get`, but gives up after `timeout` even if the registry's own
    /// sweep hasn't fired yet - a belt-and-braces bound for callers that
    /// can't wait for the ~30ms sweep granularity.
    pub async fn get_timeout(self, timeout: Duration) -> Result<Response, ExchangeError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ExchangeError::Remoting {
                addr: "registry".to_string(),
                message: "pending call dropped without completion".to_string(),
            }),
            Err(_) => Err(ExchangeError::Timeout {
                side: crate::error::TimeoutSide::Client,
                request_id: Uuid::nil(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Future for AsyncResult {
    type Output = Result<Response, ExchangeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(Ok(response)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ExchangeError::Remoting {
                addr: "registry".to_string(),
                message: "pending call dropped without completion".to_string(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelRole;
    use tokio::sync::mpsc;

    fn test_channel() -> Channel {
        let (tx, _rx) = mpsc::unbounded_channel();
        Channel::new(ChannelRole::Client, "127.0.0.1:1".parse().unwrap(), tx)
    }

    #[tokio::test]
    async fn received_completes_matching_call() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let req = Request::invocation(Invocation::new("echo"));
        let id = req.id;
        let fut = registry.new_call(channel, &req, Duration::from_secs(5));

        registry.received(Response::ok(id, serde_json::json!("hi")));
        let resp = fut.get().await.unwrap();
        assert_eq!(resp.id, id);
        assert!(resp.status.is_ok());
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_response_is_dropped() {
        let registry = PendingRegistry::new();
        registry.received(Response::ok(Uuid::new_v4(), serde_json::json!(null)));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_sweep_completes_with_client_timeout_when_never_sent() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let req = Request::invocation(Invocation::new("slow"));
        let fut = registry.new_call(channel, &req, Duration::from_millis(10));

        let resp = fut.get().await.unwrap();
        assert_eq!(resp.status, Status::ClientTimeout);
    }

    #[tokio::test]
    async fn timeout_sweep_completes_with_server_timeout_when_sent() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let req = Request::invocation(Invocation::new("slow"));
        let id = req.id;
        let fut = registry.new_call(channel, &req, Duration::from_millis(10));
        registry.sent(id);

        let resp = fut.get().await.unwrap();
        assert_eq!(resp.status, Status::ServerTimeout);
    }

    #[tokio::test]
    async fn close_channel_completes_all_calls_on_it_with_channel_inactive() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let req1 = Request::invocation(Invocation::new("a"));
        let req2 = Request::invocation(Invocation::new("b"));
        let fut1 = registry.new_call(channel.clone(), &req1, Duration::from_secs(5));
        let fut2 = registry.new_call(channel.clone(), &req2, Duration::from_secs(5));

        registry.close_channel(&channel);

        let r1 = fut1.get().await.unwrap();
        let r2 = fut2.get().await.unwrap();
        assert_eq!(r1.status, Status::ChannelInactive);
        assert_eq!(r2.status, Status::ChannelInactive);
    }

    #[tokio::test]
    async fn cancel_completes_with_client_error() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let req = Request::invocation(Invocation::new("echo"));
        let id = req.id;
        let fut = registry.new_call(channel, &req, Duration::from_secs(5));

        registry.cancel(id);
        let resp = fut.get().await.unwrap();
        assert_eq!(resp.status, Status::ClientError);
    }
}
