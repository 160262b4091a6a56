//! The protocol layer: maps exported services to invokers on the
//! server side, and a pool of shared client connections to a
//! round-robin invoker on the consumer side.

pub mod async_result;
pub mod context;
pub mod dispatcher;
pub mod exporter;
pub mod invoker;

pub use async_result::{AsyncRpcResult, InvokeMode, RpcOutcome};
pub use context::Context;
pub use dispatcher::DubboServerHandler;
pub use exporter::{Exporter, ExporterRegistry, Invoker};
pub use invoker::DubboInvoker;

use crate::error::ExchangeError;
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// `DubboProtocol`: the `export`/`refer`/`destroy` surface an
/// application embeds. Holds an `Arc<Context>` rather than reaching
/// for process-wide state, so tests (and multiple protocol instances
/// in one process) stay isolated from each other.
pub struct DubboProtocol {
    context: Arc<Context>,
    referred: Mutex<Vec<Arc<DubboInvoker>>>,
}

impl DubboProtocol {
    pub fn new() -> Self {
        Self {
            context: Context::new(),
            referred: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context(context: Arc<Context>) -> Self {
        Self { context, referred: Mutex::new(Vec::new()) }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Export `invoker` at `url`'s service-key, binding a listening
    /// server for `url`'s `host:port` if one isn't already up.
    pub async fn export(&self, invoker: Arc<dyn Invoker>, url: EndpointUrl) -> Result<Exporter, ExchangeError> {
        let service_key = url.service_key();
        let exporter = self.context.exporters().export(service_key, invoker).await?;

        let mut handler = DubboServerHandler::new(self.context.exporters().clone(), url.port());
        if let Some(method) = url.param("onconnect") {
            handler = handler.with_on_connect(method.to_string());
        }
        if let Some(method) = url.param("ondisconnect") {
            handler = handler.with_on_disconnect(method.to_string());
        }
        self.context.server_for(&url, Arc::new(handler)).await?;
        Ok(exporter)
    }

    /// Refer a remote service, obtaining (or sharing) connections to
    /// `url` and wrapping them as a round-robin invoker.
    pub async fn refer(
        &self,
        service_type: impl Into<String>,
        url: EndpointUrl,
        handler: Arc<dyn Handler>,
    ) -> Result<Arc<DubboInvoker>, ExchangeError> {
        let invoker = DubboInvoker::refer(self.context.pool().clone(), service_type, url, handler).await?;
        self.referred.lock().await.push(invoker.clone());
        Ok(invoker)
    }

    /// Close every bound server and release every referred client,
    /// then drop the exporter/server bookkeeping.
    pub async fn destroy(&self, shutdown_timeout: Duration) {
        for invoker in self.referred.lock().await.drain(..) {
            invoker.destroy(shutdown_timeout).await;
        }
        self.context.destroy(shutdown_timeout).await;
    }
}

impl Default for DubboProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Frame;
    use crate::message::{Invocation, Response};
    use crate::transport::Channel;
    use async_trait::async_trait;
    use tokio::net::TcpListener;

    struct EchoInvoker;

    #[async_trait]
    impl Invoker for EchoInvoker {
        async fn invoke(&self, invocation: Invocation) -> Response {
            Response::ok(uuid::Uuid::new_v4(), serde_json::json!(invocation.method))
        }
    }

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn connected(&self, _channel: Channel) {}
        async fn disconnected(&self, _channel: Channel) {}
        async fn received(&self, _channel: Channel, _frame: Frame) {}
    }

    #[tokio::test]
    async fn export_then_refer_round_trips_a_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let protocol = DubboProtocol::new();
        let server_url = EndpointUrl::new(addr.ip().to_string(), addr.port())
            .with_param("path", "com.acme.Echo");
        protocol.export(Arc::new(EchoInvoker), server_url).await.unwrap();

        let client_url = EndpointUrl::new(addr.ip().to_string(), addr.port()).with_param("timeout", "2000");
        let invoker = protocol.refer("com.acme.Echo", client_url, Arc::new(NoopHandler)).await.unwrap();

        let result = invoker.invoke("echo", vec![]).await.unwrap();
        let value = result.get().await.unwrap();
        assert_eq!(value, serde_json::json!("echo"));

        protocol.destroy(Duration::from_millis(100)).await;
    }
}
