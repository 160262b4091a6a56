//! Outbound transport connection: connects once, hands decoded frames to
//! a `Handler`, and keeps a background task nudging the socket back up
//! when it drops.

use super::channel::{Channel, ChannelRole};
use super::Handler;
use crate::codec::{DubboCodec, Frame};
use crate::error::ExchangeError;
use crate::url::EndpointUrl;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Minimum spacing between reconnect attempts, regardless of what the
/// URL requests - a misbehaving peer should never turn this into a
/// busy loop.
const MIN_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive reconnect failures before attempts drop from `warn` to
/// `debug`, so a long outage doesn't spam the log forever.
const RECONNECT_WARN_WINDOW: u32 = 5;

struct ClientInner {
    url: EndpointUrl,
    handler: Arc<dyn Handler>,
    max_payload: u32,
    channel: RwLock<Option<Channel>>,
    closed: AtomicBool,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

/// A single outbound connection, reconnected automatically while live.
pub struct TransportClient {
    inner: Arc<ClientInner>,
}

impl TransportClient {
    /// Connect to `url.host:url.port` and spawn the background reconnect
    /// watchdog. The watchdog is a no-op while the connection is healthy;
    /// it only fires once the channel reports closed.
    pub async fn connect(url: EndpointUrl, handler: Arc<dyn Handler>) -> Result<Arc<Self>, ExchangeError> {
        let max_payload = url.payload_bytes();
        let inner = Arc::new(ClientInner {
            url,
            handler,
            max_payload,
            channel: RwLock::new(None),
            closed: AtomicBool::new(false),
            reconnect_task: Mutex::new(None),
        });

        establish(&inner).await?;

        let watchdog_inner = inner.clone();
        let task = tokio::spawn(async move {
            reconnect_loop(watchdog_inner).await;
        });
        *inner.reconnect_task.lock().await = Some(task);

        Ok(Arc::new(Self { inner }))
    }

    /// Build directly over an already-established duplex stream rather
    /// than dialing `host:port` - no reconnect watchdog is spawned,
    /// since there is nothing to redial once a `tokio::io::duplex` pipe
    /// closes. Exists for tests that drive the exchange layer over an
    /// in-process pipe instead of a real socket.
    pub async fn from_stream(
        stream: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
        remote_addr: SocketAddr,
        max_payload: u32,
        handler: Arc<dyn Handler>,
    ) -> Arc<Self> {
        let inner = Arc::new(ClientInner {
            url: EndpointUrl::new(remote_addr.ip().to_string(), remote_addr.port()),
            handler,
            max_payload,
            channel: RwLock::new(None),
            closed: AtomicBool::new(false),
            reconnect_task: Mutex::new(None),
        });
        wire_up(&inner, stream, remote_addr).await;
        Arc::new(Self { inner })
    }

    pub async fn is_connected(&self) -> bool {
        match &*self.inner.channel.read().await {
            Some(c) => !c.is_closed(),
            None => false,
        }
    }

    pub async fn channel(&self) -> Option<Channel> {
        self.inner.channel.read().await.clone()
    }

    /// Send a frame on the current channel. Fails with `ChannelInactive`
    /// if the connection is currently down; the reconnect watchdog will
    /// bring it back but does not retry in-flight sends itself.
    pub async fn send(&self, frame: Frame) -> Result<(), ExchangeError> {
        let id = frame.id();
        match &*self.inner.channel.read().await {
            Some(c) if !c.is_closed() => c.send(frame),
            _ => Err(ExchangeError::ChannelInactive { request_id: id }),
        }
    }

    /// Force an immediate reconnect attempt regardless of the watchdog's
    /// own timer - used after a readonly event tells us the current
    /// channel is no longer accepting new calls.
    pub async fn reconnect(&self) -> Result<(), ExchangeError> {
        establish(&self.inner).await
    }

    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(task) = self.inner.reconnect_task.lock().await.take() {
            task.abort();
        }
        if let Some(channel) = self.inner.channel.write().await.take() {
            channel.close();
        }
    }

    /// Graceful close: same as `close()`, timeout is only meaningful on
    /// the server side where in-flight calls must drain; a client-side
    /// close simply stops immediately after closing its one channel.
    pub async fn close_graceful(&self, _timeout: Duration) {
        self.close().await;
    }
}

async fn establish(inner: &Arc<ClientInner>) -> Result<(), ExchangeError> {
    let addr = inner.url.socket_addr().map_err(|e| ExchangeError::Remoting {
        addr: format!("{}:{}", inner.url.host, inner.url.port),
        message: e.to_string(),
    })?;

    let socket = TcpStream::connect(addr).await.map_err(|e| ExchangeError::Remoting {
        addr: addr.to_string(),
        message: e.to_string(),
    })?;
    info!(%addr, "transport client connected");

    wire_up(inner, socket, addr).await;
    Ok(())
}

/// Frame a stream, spawn its read/write loop, and install it as the
/// client's current channel. Shared by a real TCP dial and
/// `from_stream`'s in-process pipe.
async fn wire_up(
    inner: &Arc<ClientInner>,
    socket: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
    addr: SocketAddr,
) {
    let framed = Framed::new(socket, DubboCodec::new(inner.max_payload));
    let (mut sink, mut stream) = framed.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();

    let channel = Channel::new(ChannelRole::Client, addr, out_tx);
    *inner.channel.write().await = Some(channel.clone());
    inner.handler.connected(channel.clone()).await;

    let conn_inner = inner.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                outgoing = out_rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            if let Err(e) = sink.send(frame).await {
                                warn!(error = %e, "client write failed");
                                break;
                            }
                            channel.mark_write().await;
                        }
                        None => break,
                    }
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(frame)) => {
                            channel.mark_read().await;
                            conn_inner.handler.received(channel.clone(), frame).await;
                        }
                        Some(Err(e)) => {
                            conn_inner.handler.caught(channel.clone(), e).await;
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        channel.close();
        conn_inner.handler.disconnected(channel).await;
    });
}

async fn reconnect_loop(inner: Arc<ClientInner>) {
    let interval = inner
        .url
        .param("reconnect")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(MIN_RECONNECT_INTERVAL)
        .max(MIN_RECONNECT_INTERVAL);

    let mut consecutive_failures: u32 = 0;
    loop {
        tokio::time::sleep(interval).await;

        if inner.closed.load(Ordering::Acquire) {
            break;
        }

        let alive = match &*inner.channel.read().await {
            Some(c) => !c.is_closed(),
            None => false,
        };
        if alive {
            consecutive_failures = 0;
            continue;
        }

        match establish(&inner).await {
            Ok(()) => {
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures <= RECONNECT_WARN_WINDOW {
                    warn!(error = %e, attempt = consecutive_failures, "reconnect failed");
                } else {
                    debug!(error = %e, attempt = consecutive_failures, "reconnect still failing");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Request;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    struct RecordingHandler {
        connected: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Handler for RecordingHandler {
        async fn connected(&self, _channel: Channel) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        async fn disconnected(&self, _channel: Channel) {}
        async fn received(&self, _channel: Channel, _frame: Frame) {}
    }

    #[tokio::test]
    async fn connect_establishes_channel_and_notifies_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let handler = Arc::new(RecordingHandler { connected: AtomicUsize::new(0) });
        let url = EndpointUrl::new(addr.ip().to_string(), addr.port());
        let client = TransportClient::connect(url, handler.clone()).await.unwrap();

        assert!(client.is_connected().await);
        assert_eq!(handler.connected.load(Ordering::SeqCst), 1);
        client.close().await;
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn send_on_closed_client_is_channel_inactive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let handler = Arc::new(RecordingHandler { connected: AtomicUsize::new(0) });
        let url = EndpointUrl::new(addr.ip().to_string(), addr.port());
        let client = TransportClient::connect(url, handler).await.unwrap();
        client.close().await;

        let req = Request::one_way(crate::message::Invocation::new("echo"));
        let err = client.send(Frame::Request(req)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::ChannelInactive { .. }));
    }
}
