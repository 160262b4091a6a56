//! Consumer-side invoker: wraps the client list `ClientPool::get`
//! returns for one endpoint and round-robins invocations across it.

use super::async_result::{AsyncRpcResult, InvokeMode};
use crate::error::ExchangeError;
use crate::message::Invocation;
use crate::pool::{ClientPool, LazyConnectClient, RefCountedClient};
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The clients an invoker dispatches across. `lazy=true` on the
/// referred URL skips the shared pool entirely and defers the connect
/// to first use instead of dialing `share-connections` eager clients.
enum InvokerClients {
    Pooled { pool: ClientPool, clients: Vec<Arc<RefCountedClient>> },
    Lazy(Arc<LazyConnectClient>),
}

/// Picks a client `count % len` on each call - plain round-robin
/// dispatch rather than anything load-aware. Round-robin only applies
/// to the pooled case; a lazy invoker has exactly one client.
pub struct DubboInvoker {
    service_type: String,
    clients: InvokerClients,
    counter: AtomicUsize,
    timeout: Option<Duration>,
}

impl DubboInvoker {
    pub async fn refer(
        pool: ClientPool,
        service_type: impl Into<String>,
        url: EndpointUrl,
        handler: Arc<dyn Handler>,
    ) -> Result<Arc<Self>, ExchangeError> {
        let timeout = Some(Duration::from_millis(url.timeout_ms()));
        let clients = if url.lazy() {
            InvokerClients::Lazy(LazyConnectClient::new(url, handler))
        } else {
            let clients = pool.get(url, handler).await?;
            InvokerClients::Pooled { pool, clients }
        };
        Ok(Arc::new(Self {
            service_type: service_type.into(),
            clients,
            counter: AtomicUsize::new(0),
            timeout,
        }))
    }

    pub async fn request(&self, invocation: Invocation) -> Result<crate::exchange::AsyncResult, ExchangeError> {
        match &self.clients {
            InvokerClients::Pooled { clients, .. } => {
                let i = self.counter.fetch_add(1, Ordering::Relaxed) % clients.len();
                clients[i].request(invocation, self.timeout).await
            }
            InvokerClients::Lazy(client) => client.request(invocation, self.timeout).await,
        }
    }

    pub async fn send_one_way(&self, invocation: Invocation) -> Result<(), ExchangeError> {
        match &self.clients {
            InvokerClients::Pooled { clients, .. } => {
                let i = self.counter.fetch_add(1, Ordering::Relaxed) % clients.len();
                clients[i].send_one_way(invocation).await
            }
            InvokerClients::Lazy(client) => client.send_one_way(invocation).await,
        }
    }

    pub async fn invoke(&self, method: impl Into<String>, arguments: Vec<serde_json::Value>) -> Result<AsyncRpcResult, ExchangeError> {
        let invocation = Invocation::new(method)
            .with_arguments(arguments)
            .with_attachment("path", self.service_type.clone());
        let future = self.request(invocation.clone()).await?;
        Ok(AsyncRpcResult::new(future, invocation, InvokeMode::Future))
    }

    pub async fn invoke_one_way(&self, method: impl Into<String>, arguments: Vec<serde_json::Value>) -> Result<(), ExchangeError> {
        let invocation = Invocation::new(method)
            .with_arguments(arguments)
            .with_attachment("path", self.service_type.clone());
        self.send_one_way(invocation).await
    }

    /// Release this invoker's hold on its endpoint's connections -
    /// idempotent via refcount, same as any other `release`. A lazy
    /// invoker just closes its one stub, connected or not.
    pub async fn destroy(&self, shutdown_timeout: Duration) {
        match &self.clients {
            InvokerClients::Pooled { pool, clients } => pool.release(clients, shutdown_timeout).await,
            InvokerClients::Lazy(client) => client.close(shutdown_timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Frame;
    use crate::transport::Channel;
    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn connected(&self, _channel: Channel) {}
        async fn disconnected(&self, _channel: Channel) {}
        async fn received(&self, _channel: Channel, _frame: Frame) {}
    }

    #[tokio::test]
    async fn invoke_round_robins_and_completes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, crate::codec::DubboCodec::new(0));
                    while let Some(Ok(Frame::Request(req))) = framed.next().await {
                        let resp = crate::message::Response::ok(req.id, serde_json::json!("pong"));
                        if framed.send(Frame::Response(resp)).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        let url = EndpointUrl::new(addr.ip().to_string(), addr.port())
            .with_param("timeout", "2000")
            .with_param("share-connections", "1");
        let pool = ClientPool::new();
        let invoker = DubboInvoker::refer(pool, "com.acme.Echo", url, Arc::new(NoopHandler)).await.unwrap();

        let result = invoker.invoke("echo", vec![serde_json::json!("hi")]).await.unwrap();
        let value = result.get().await.unwrap();
        assert_eq!(value, serde_json::json!("pong"));
    }

    #[tokio::test]
    async fn lazy_refer_does_not_connect_until_first_invoke() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, crate::codec::DubboCodec::new(0));
                    while let Some(Ok(Frame::Request(req))) = framed.next().await {
                        let resp = crate::message::Response::ok(req.id, serde_json::json!("pong"));
                        if framed.send(Frame::Response(resp)).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        let url = EndpointUrl::new(addr.ip().to_string(), addr.port())
            .with_param("timeout", "2000")
            .with_param("lazy", "true");
        let pool = ClientPool::new();
        let invoker = DubboInvoker::refer(pool, "com.acme.Echo", url, Arc::new(NoopHandler)).await.unwrap();

        match &invoker.clients {
            InvokerClients::Lazy(client) => assert!(!client.is_connected().await),
            InvokerClients::Pooled { .. } => panic!("expected a lazy invoker"),
        }

        let result = invoker.invoke("echo", vec![]).await.unwrap();
        let value = result.get().await.unwrap();
        assert_eq!(value, serde_json::json!("pong"));

        match &invoker.clients {
            InvokerClients::Lazy(client) => assert!(client.is_connected().await),
            InvokerClients::Pooled { .. } => panic!("expected a lazy invoker"),
        }
    }
}
