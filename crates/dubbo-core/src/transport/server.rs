//! Listening transport server: accepts connections, enforces the
//! connection-count limit, and hands decoded frames to a `Handler`.

use super::channel::{Channel, ChannelRole};
use super::Handler;
use crate::codec::{DubboCodec, Frame};
use crate::error::ExchangeError;
use crate::message::Request;
use crate::url::EndpointUrl;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A server with `accepts=0` (unlimited connections) still gets a bounded
/// worker pool rather than a literally unbounded one - this is the cap
/// that stands in for "unlimited" in that case.
const UNBOUNDED_WORKER_PERMITS: u32 = 10_000;

fn worker_permits(accepts: u32) -> u32 {
    if accepts == 0 {
        UNBOUNDED_WORKER_PERMITS
    } else {
        accepts
    }
}

struct ServerInner {
    url: RwLock<EndpointUrl>,
    channels: RwLock<HashMap<Uuid, Channel>>,
    handler: Arc<dyn Handler>,
    closing: AtomicBool,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    /// Bounded application worker pool executing handler callbacks -
    /// distinct from the connection-count gate in `accept_loop`, sized
    /// from the same `accepts` URL parameter.
    workers: Arc<Semaphore>,
    worker_capacity: AtomicU32,
}

/// A bound listening socket plus its accepted channels.
pub struct TransportServer {
    inner: Arc<ServerInner>,
}

impl TransportServer {
    /// Bind to `url.host:url.port` (or all interfaces if `url.anyhost()`)
    /// and spawn the accept loop. Each accepted connection becomes a
    /// `Channel` with `ChannelRole::Server`, bounded by `url.accepts()`.
    pub async fn bind(url: EndpointUrl, handler: Arc<dyn Handler>) -> Result<Arc<Self>, ExchangeError> {
        let bind_host = if url.anyhost() { "0.0.0.0" } else { url.host.as_str() };
        let addr = format!("{}:{}", bind_host, url.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| ExchangeError::Remoting {
            addr: addr.clone(),
            message: e.to_string(),
        })?;
        info!(%addr, "transport server bound");

        let capacity = worker_permits(url.accepts());
        let inner = Arc::new(ServerInner {
            url: RwLock::new(url),
            channels: RwLock::new(HashMap::new()),
            handler,
            closing: AtomicBool::new(false),
            accept_task: Mutex::new(None),
            workers: Arc::new(Semaphore::new(capacity as usize)),
            worker_capacity: AtomicU32::new(capacity),
        });

        let accept_inner = inner.clone();
        let task = tokio::spawn(async move {
            accept_loop(accept_inner, listener).await;
        });
        *inner.accept_task.lock().await = Some(task);

        Ok(Arc::new(Self { inner }))
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    /// Broadcast a request to every active channel - used for the
    /// readonly shutdown notification.
    pub async fn send(&self, request: Request) {
        let channels = self.inner.channels.read().await;
        for channel in channels.values() {
            if let Err(e) = channel.send(Frame::Request(request.clone())) {
                warn!(channel = %channel.id(), error = %e, "broadcast send failed");
            }
        }
    }

    /// Update the accept limit and worker-pool sizing on a live server
    /// without rebinding.
    pub async fn reset(&self, accepts: u32) {
        {
            let mut url = self.inner.url.write().await;
            *url = std::mem::replace(&mut *url, EndpointUrl::new("", 0)).with_param("accepts", accepts.to_string());
        }

        let new_capacity = worker_permits(accepts);
        let old_capacity = self.inner.worker_capacity.swap(new_capacity, Ordering::AcqRel);
        match new_capacity.cmp(&old_capacity) {
            std::cmp::Ordering::Greater => {
                self.inner.workers.add_permits((new_capacity - old_capacity) as usize);
            }
            std::cmp::Ordering::Less => {
                self.inner.workers.forget_permits((old_capacity - new_capacity) as usize);
            }
            std::cmp::Ordering::Equal => {}
        }
    }

    /// Force-close immediately: stop accepting, close every channel.
    pub async fn close(&self) {
        self.close_graceful(None).await;
    }

    /// Drain-then-force close: stop accepting, best-effort broadcast a
    /// readonly event, wait up to `timeout` for channels to disconnect on
    /// their own, then force-close whatever remains. A single operation
    /// rather than two separately callable close methods, since
    /// "graceful, then force after timeout" is the only sequencing that
    /// makes sense.
    pub async fn close_graceful(&self, timeout: Option<Duration>) {
        self.inner.closing.store(true, Ordering::Release);
        if let Some(task) = self.inner.accept_task.lock().await.take() {
            task.abort();
        }

        if let Some(timeout) = timeout {
            let readonly_sent = self.inner.url.read().await.channel_readonly_sent();
            if readonly_sent {
                self.send(Request::readonly()).await;
            }
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline && !self.inner.channels.read().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        let mut channels = self.inner.channels.write().await;
        for (_, channel) in channels.drain() {
            channel.close();
        }
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        if inner.closing.load(Ordering::Acquire) {
            break;
        }

        let accepts = inner.url.read().await.accepts();
        let current = inner.channels.read().await.len() as u32;
        if accepts > 0 && current >= accepts {
            warn!(%addr, accepts, "rejecting connection over accept limit");
            drop(socket);
            continue;
        }

        let max_payload = inner.url.read().await.payload_bytes();
        let inner_for_conn = inner.clone();
        tokio::spawn(async move {
            handle_connection(inner_for_conn, socket, addr, max_payload).await;
        });
    }
}

/// Drive one already-connected stream through the same per-connection
/// loop a bound `TransportServer`'s accept loop hands off to, without a
/// listening socket or a live server's accept-count/worker-pool
/// bookkeeping. Exists for tests that drive the exchange layer over an
/// in-process `tokio::io::duplex` pipe instead of a real socket; the
/// caller should `tokio::spawn` this since it runs until the stream
/// closes.
pub async fn serve_stream(
    stream: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    max_payload: u32,
) {
    let inner = Arc::new(ServerInner {
        url: RwLock::new(EndpointUrl::new(addr.ip().to_string(), addr.port())),
        channels: RwLock::new(HashMap::new()),
        handler,
        closing: AtomicBool::new(false),
        accept_task: Mutex::new(None),
        workers: Arc::new(Semaphore::new(UNBOUNDED_WORKER_PERMITS as usize)),
        worker_capacity: AtomicU32::new(UNBOUNDED_WORKER_PERMITS),
    });
    handle_connection(inner, stream, addr, max_payload).await;
}

async fn handle_connection(
    inner: Arc<ServerInner>,
    socket: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
    addr: SocketAddr,
    max_payload: u32,
) {
    let framed = Framed::new(socket, DubboCodec::new(max_payload));
    let (mut sink, mut stream) = framed.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();

    let channel = Channel::new(ChannelRole::Server, addr, out_tx);
    inner.channels.write().await.insert(channel.id(), channel.clone());
    inner.handler.connected(channel.clone()).await;

    loop {
        tokio::select! {
            biased;

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            warn!(channel = %channel.id(), error = %e, "write failed");
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
                        let permit = inner.workers.clone().acquire_owned().await.expect("worker semaphore never closed");
                        let handler = inner.handler.clone();
                        let callback_channel = channel.clone();
                        tokio::spawn(async move {
                            handler.received(callback_channel, frame).await;
                            drop(permit);
                        });
                    }
                    Some(Err(e)) => {
                        inner.handler.caught(channel.clone(), e).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    channel.close();
    inner.channels.write().await.remove(&channel.id());
    inner.handler.disconnected(channel).await;
    debug!(%addr, "connection closed");
}
