//! `DubboServerHandler`: the `transport::Handler` a server-side
//! `ExchangeServer` forwards ordinary (non-event) requests to. Resolves
//! the invocation's service-key against the exporter registry and
//! replies on the same channel.

use super::exporter::ExporterRegistry;
use crate::codec::Frame;
use crate::error::ExchangeError;
use crate::message::{Invocation, Request, Response, Status};
use crate::transport::{Channel, Handler};
use crate::url::build_service_key;
use async_trait::async_trait;
use tracing::warn;

/// Synthesizes a one-way invocation for `url`'s `onconnect`/`ondisconnect`
/// hook, if configured, and a local port for service-key resolution.
pub struct DubboServerHandler {
    registry: ExporterRegistry,
    local_port: u16,
    on_connect_method: Option<String>,
    on_disconnect_method: Option<String>,
}

impl DubboServerHandler {
    pub fn new(registry: ExporterRegistry, local_port: u16) -> Self {
        Self {
            registry,
            local_port,
            on_connect_method: None,
            on_disconnect_method: None,
        }
    }

    pub fn with_on_connect(mut self, method: impl Into<String>) -> Self {
        self.on_connect_method = Some(method.into());
        self
    }

    pub fn with_on_disconnect(mut self, method: impl Into<String>) -> Self {
        self.on_disconnect_method = Some(method.into());
        self
    }

    /// Resolve `invocation` to its exporter and invoke it, returning the
    /// reply the caller should send back (or nothing, for a one-way
    /// invocation reaching this path - callers of `reply` only do so
    /// for two-way calls).
    pub async fn reply(&self, channel: &Channel, invocation: Invocation) -> Response {
        let port = if invocation.attachment("stub-event") == Some("true") {
            channel.remote_addr().port()
        } else {
            self.local_port
        };

        let mut invocation = invocation;
        if let Some(callback_id) = invocation.attachment("callback-service-id").map(str::to_string) {
            let path = invocation.attachment("path").unwrap_or("").to_string();
            invocation = invocation
                .with_attachment("path", format!("{path}.{callback_id}"))
                .with_attachment("is-callback-invoke", "true");
        }

        let key = build_service_key(invocation.attachment("group"), invocation.attachment("path").unwrap_or(""), invocation.attachment("version"), port);

        match self.registry.lookup(&key).await {
            Some(invoker) => invoker.invoke(invocation).await,
            None => {
                warn!(service_key = %key, "no exporter for service key");
                Response::error(
                    uuid::Uuid::new_v4(),
                    Status::ServiceNotFound,
                    format!("service not found: {key}"),
                )
            }
        }
    }

    async fn dispatch_event(&self, channel: &Channel, method: &str) {
        let invocation = Invocation::new(method);
        let _ = self.reply(channel, invocation).await;
    }
}

#[async_trait]
impl Handler for DubboServerHandler {
    async fn connected(&self, channel: Channel) {
        if let Some(method) = &self.on_connect_method {
            self.dispatch_event(&channel, method).await;
        }
    }

    async fn disconnected(&self, channel: Channel) {
        if let Some(method) = &self.on_disconnect_method {
            self.dispatch_event(&channel, method).await;
        }
    }

    async fn received(&self, channel: Channel, frame: Frame) {
        let request = match frame {
            Frame::Request(request) => request,
            Frame::Response(response) => {
                warn!(id = %response.id, "dispatcher received a response frame, dropping");
                return;
            }
        };

        let invocation = match request.invocation_ref() {
            Some(inv) => inv.clone(),
            None => {
                warn!(id = %request.id, "non-invocation request reached dispatcher, dropping");
                return;
            }
        };

        let response = self.reply(&channel, invocation).await;
        if request.two_way {
            if let Err(e) = channel.send(Frame::Response(with_id(response, request.id))) {
                warn!(id = %request.id, error = %e, "failed to send reply");
            }
        }
    }

    async fn caught(&self, channel: Channel, error: ExchangeError) {
        warn!(channel = %channel.id(), error = %error, "transport error reached dispatcher");
    }
}

/// `reply` builds a fresh response id since `Invoker::invoke` doesn't
/// see the originating request; stamp the real id back on before
/// sending so the consumer's `PendingRegistry` can correlate it.
fn with_id(mut response: Response, id: uuid::Uuid) -> Response {
    response.id = id;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::exporter::Invoker;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct EchoInvoker;

    #[async_trait]
    impl Invoker for EchoInvoker {
        async fn invoke(&self, invocation: Invocation) -> Response {
            Response::ok(uuid::Uuid::new_v4(), serde_json::json!(invocation.method))
        }
    }

    fn test_channel() -> (Channel, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Channel::new(crate::transport::ChannelRole::Server, "127.0.0.1:9".parse().unwrap(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn resolves_exported_service_and_replies() {
        let registry = ExporterRegistry::new();
        registry.export("com.acme.Echo:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap();
        let handler = DubboServerHandler::new(registry, 20880);
        let (channel, mut rx) = test_channel();

        let invocation = Invocation::new("echo").with_attachment("path", "com.acme.Echo");
        let request = Request::invocation(invocation);
        let id = request.id;
        handler.received(channel, Frame::Request(request)).await;

        match rx.recv().await.unwrap() {
            Frame::Response(resp) => {
                assert_eq!(resp.id, id);
                assert!(resp.status.is_ok());
            }
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn missing_service_returns_service_not_found() {
        let registry = ExporterRegistry::new();
        let handler = DubboServerHandler::new(registry, 20880);
        let (channel, mut rx) = test_channel();

        let invocation = Invocation::new("echo").with_attachment("path", "com.acme.Missing");
        let request = Request::invocation(invocation);
        handler.received(channel, Frame::Request(request)).await;

        match rx.recv().await.unwrap() {
            Frame::Response(resp) => assert_eq!(resp.status, Status::ServiceNotFound),
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn one_way_invocation_gets_no_reply() {
        let registry = ExporterRegistry::new();
        registry.export("com.acme.Echo:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap();
        let handler = DubboServerHandler::new(registry, 20880);
        let (channel, mut rx) = test_channel();

        let invocation = Invocation::new("echo").with_attachment("path", "com.acme.Echo");
        let request = Request::one_way(invocation);
        handler.received(channel, Frame::Request(request)).await;

        assert!(rx.try_recv().is_err());
    }
}
