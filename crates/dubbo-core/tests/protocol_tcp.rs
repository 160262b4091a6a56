//! Pool and server-lifecycle scenarios that need a real bound socket -
//! `ClientPool`/`DubboProtocol` dial `TransportClient::connect`/bind
//! `TransportServer` directly, so these run over TCP loopback rather
//! than an in-process duplex pipe.

use async_trait::async_trait;
use dubbo_core::codec::Frame;
use dubbo_core::message::{Invocation, Response};
use dubbo_core::protocol::{DubboProtocol, Invoker};
use dubbo_core::transport::{Channel, Handler, TransportClient, TransportServer};
use dubbo_core::url::EndpointUrl;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn connected(&self, _channel: Channel) {}
    async fn disconnected(&self, _channel: Channel) {}
    async fn received(&self, _channel: Channel, _frame: Frame) {}
}

struct EchoInvoker;

#[async_trait]
impl Invoker for EchoInvoker {
    async fn invoke(&self, invocation: Invocation) -> Response {
        Response::ok(uuid::Uuid::new_v4(), serde_json::json!(invocation.method))
    }
}

async fn reserve_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[tokio::test]
async fn three_consumers_share_two_connections_and_keep_working_after_one_releases() {
    let addr = reserve_addr().await;
    let protocol = DubboProtocol::new();
    let server_url = EndpointUrl::new(addr.ip().to_string(), addr.port()).with_param("path", "com.acme.Echo");
    protocol.export(Arc::new(EchoInvoker), server_url).await.unwrap();

    let client_url = EndpointUrl::new(addr.ip().to_string(), addr.port())
        .with_param("timeout", "2000")
        .with_param("share-connections", "2");

    let a = protocol.refer("com.acme.Echo", client_url.clone(), Arc::new(NoopHandler)).await.unwrap();
    let b = protocol.refer("com.acme.Echo", client_url.clone(), Arc::new(NoopHandler)).await.unwrap();
    let c = protocol.refer("com.acme.Echo", client_url, Arc::new(NoopHandler)).await.unwrap();

    for invoker in [&a, &b, &c] {
        let value = invoker.invoke("echo", vec![]).await.unwrap().get().await.unwrap();
        assert_eq!(value, serde_json::json!("echo"));
    }

    c.destroy(Duration::from_millis(100)).await;

    // The two surviving consumers still share live connections.
    let value = a.invoke("echo", vec![]).await.unwrap().get().await.unwrap();
    assert_eq!(value, serde_json::json!("echo"));
    let value = b.invoke("echo", vec![]).await.unwrap().get().await.unwrap();
    assert_eq!(value, serde_json::json!("echo"));

    a.destroy(Duration::from_millis(100)).await;
    b.destroy(Duration::from_millis(100)).await;
}

/// Captures every frame a raw transport client receives, so the test
/// can observe the readonly broadcast directly instead of going
/// through the exchange layer's own event handling.
struct CapturingHandler {
    frames: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl Handler for CapturingHandler {
    async fn connected(&self, _channel: Channel) {}
    async fn disconnected(&self, _channel: Channel) {}
    async fn received(&self, _channel: Channel, frame: Frame) {
        let _ = self.frames.send(frame);
    }
}

#[tokio::test]
async fn graceful_shutdown_broadcasts_readonly_and_drops_its_channel_bookkeeping() {
    let addr = reserve_addr().await;
    let server_url = EndpointUrl::new(addr.ip().to_string(), addr.port());
    let server = TransportServer::bind(server_url, Arc::new(NoopHandler)).await.unwrap();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let client_url = EndpointUrl::new(addr.ip().to_string(), addr.port());
    let client = TransportClient::connect(client_url, Arc::new(CapturingHandler { frames: frame_tx })).await.unwrap();

    // Let the accept loop register the connection before shutdown.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(server.connected_count().await, 1);

    server.close_graceful(Some(Duration::from_millis(100))).await;

    let frame = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
        .await
        .expect("readonly event should arrive")
        .unwrap();
    match frame {
        Frame::Request(req) => assert!(req.is_readonly()),
        _ => panic!("expected a readonly request"),
    }

    assert_eq!(server.connected_count().await, 0);
    client.close().await;
}
