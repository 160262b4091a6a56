//! End-to-end exchange-layer scenarios driven over an in-process
//! `tokio::io::duplex` pipe instead of a real socket - each test wires
//! up a client-side `ExchangeClient` and a server-side `ExchangeLayer`
//! on the two ends of one pipe, the same way a real client/server pair
//! would be wired over TCP.

use async_trait::async_trait;
use dubbo_core::codec::Frame;
use dubbo_core::exchange::{ExchangeClient, ExchangeLayer, PendingRegistry};
use dubbo_core::message::{Invocation, Response, Status};
use dubbo_core::transport::{self, Channel, Handler};
use dubbo_core::url::EndpointUrl;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DUPLEX_BUFFER: usize = 64 * 1024;
const PEER_ADDR: &str = "127.0.0.1:20880";

struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn connected(&self, _channel: Channel) {}
    async fn disconnected(&self, _channel: Channel) {}
    async fn received(&self, _channel: Channel, _frame: Frame) {}
}

/// Replies `"pong"` to every invocation it receives, mirroring what
/// `DubboServerHandler::reply` would do for an exported echo service
/// without pulling in the full exporter registry.
struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    async fn connected(&self, _channel: Channel) {}
    async fn disconnected(&self, _channel: Channel) {}
    async fn received(&self, channel: Channel, frame: Frame) {
        if let Frame::Request(request) = frame {
            if request.two_way {
                let response = Response::ok(request.id, serde_json::json!("pong"));
                let _ = channel.send(Frame::Response(response));
            }
        }
    }
}

/// Wire a client over one end of a `tokio::io::duplex` pipe and a
/// server-side `ExchangeLayer` over the other, mirroring `ExchangeClient::connect`
/// / `ExchangeServer::bind` without a listening socket.
async fn connect_duplex(url: EndpointUrl, server_app_handler: Arc<dyn Handler>) -> Arc<ExchangeClient> {
    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_BUFFER);
    let addr: std::net::SocketAddr = PEER_ADDR.parse().unwrap();

    let server_heartbeat = Duration::from_millis(url.heartbeat_ms());
    let server_layer = ExchangeLayer::new(PendingRegistry::new(), server_heartbeat, server_app_handler);
    let server_payload = url.payload_bytes();
    tokio::spawn(async move {
        transport::server::serve_stream(server_stream, addr, server_layer, server_payload).await;
    });

    ExchangeClient::from_stream(client_stream, addr, url, Arc::new(NoopHandler)).await
}

#[tokio::test]
async fn happy_path_request_completes_within_timeout() {
    let url = EndpointUrl::new("127.0.0.1", 20880).with_param("timeout", "1000");
    let client = connect_duplex(url, Arc::new(PongHandler)).await;

    let response = client.request(Invocation::new("echo"), None).await.unwrap().get().await.unwrap();
    assert!(response.status.is_ok());
    assert_eq!(response.result, Some(serde_json::json!("pong")));
    assert_eq!(client.registry().pending_count(), 0);
}

#[tokio::test]
async fn timeout_fires_server_timeout_once_the_request_left_the_channel() {
    // The request reaches the channel's outbound queue before the sweep
    // ever runs, so by the time the deadline fires the registry already
    // recorded `sent` - this is the SERVER_TIMEOUT branch of scenario 2,
    // not CLIENT_TIMEOUT, which only fires for a request that never left
    // the process (e.g. a send failure on an already-dead channel).
    let url = EndpointUrl::new("127.0.0.1", 20880).with_param("timeout", "50");
    let client = connect_duplex(url, Arc::new(NoopHandler)).await;

    let response = client.request(Invocation::new("slow"), None).await.unwrap().get().await.unwrap();
    assert_eq!(response.status, Status::ServerTimeout);
    assert_eq!(client.registry().pending_count(), 0);
}

#[tokio::test]
async fn close_completes_outstanding_calls_with_channel_inactive() {
    let url = EndpointUrl::new("127.0.0.1", 20880).with_param("timeout", "5000");
    let client = connect_duplex(url, Arc::new(NoopHandler)).await;

    let futures: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.request(Invocation::new("slow"), None).await.unwrap().get().await.unwrap() })
        })
        .collect();

    // Give every request a chance to register before the pipe closes.
    tokio::time::sleep(Duration::from_millis(30)).await;
    client.close(Duration::from_millis(100)).await;

    for handle in futures {
        let response = handle.await.unwrap();
        assert_eq!(response.status, Status::ChannelInactive);
    }
    assert_eq!(client.registry().pending_count(), 0);
}

#[tokio::test]
async fn idle_connection_sends_heartbeat_and_stays_open() {
    let url = EndpointUrl::new("127.0.0.1", 20880).with_param("heartbeat", "30").with_param("timeout", "1000");
    let client = connect_duplex(url, Arc::new(PongHandler)).await;

    // heartbeat/3 = 10ms period; wait well past one full heartbeat
    // interval so the watcher fires at least once and gets acked
    // without the server-side missed-deadline check (3x heartbeat)
    // ever tripping.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(client.is_connected().await);

    // A connection the heartbeat watcher let die silently would fail
    // this call instead of completing it.
    let response = client.request(Invocation::new("echo"), None).await.unwrap().get().await.unwrap();
    assert!(response.status.is_ok());
}

#[tokio::test]
async fn heartbeat_is_acked_and_not_forwarded_to_app_handler() {
    struct CountingHandler {
        received: AtomicUsize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn connected(&self, _channel: Channel) {}
        async fn disconnected(&self, _channel: Channel) {}
        async fn received(&self, _channel: Channel, _frame: Frame) {
            self.received.fetch_add(1, Ordering::SeqCst);
        }
    }

    let counting = Arc::new(CountingHandler { received: AtomicUsize::new(0) });
    let url = EndpointUrl::new("127.0.0.1", 20880).with_param("heartbeat", "30").with_param("timeout", "1000");
    let client = connect_duplex(url, counting.clone()).await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(client.is_connected().await);
    assert_eq!(counting.received.load(Ordering::SeqCst), 0);
}
