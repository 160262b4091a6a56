//! The transport-level handle callers use to send frames and inspect
//! liveness, independent of whether the underlying socket is owned by
//! a server's accept loop or a client's connect call.

use crate::codec::Frame;
use crate::error::ExchangeError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Which side of the connection a `Channel` represents.
///
/// Stamped once at construction (by whichever of `TransportServer::connected`
/// or `TransportClient::connect` created the channel) rather than inferred
/// by comparing the channel's URL against the remote socket address -
/// that comparison is brittle on multi-homed hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Client,
    Server,
}

struct ChannelInner {
    id: Uuid,
    role: ChannelRole,
    remote_addr: SocketAddr,
    out_tx: mpsc::UnboundedSender<Frame>,
    last_read: RwLock<Instant>,
    last_write: RwLock<Instant>,
    closed: AtomicBool,
}

/// A cheaply-cloneable handle to one transport connection.
#[derive(Clone)]
pub struct Channel(Arc<ChannelInner>);

impl Channel {
    pub(crate) fn new(role: ChannelRole, remote_addr: SocketAddr, out_tx: mpsc::UnboundedSender<Frame>) -> Self {
        let now = Instant::now();
        Self(Arc::new(ChannelInner {
            id: Uuid::new_v4(),
            role,
            remote_addr,
            out_tx,
            last_read: RwLock::new(now),
            last_write: RwLock::new(now),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> ChannelRole {
        self.0.role
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.0.remote_addr
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
    }

    /// Queue a frame for the connection's writer task. Returns a
    /// `ChannelInactive` error if the connection has already closed.
    pub fn send(&self, frame: Frame) -> Result<(), ExchangeError> {
        if self.is_closed() {
            return Err(ExchangeError::ChannelInactive { request_id: frame.id() });
        }
        self.0
            .out_tx
            .send(frame)
            .map_err(|e| ExchangeError::Remoting {
                addr: self.0.remote_addr.to_string(),
                message: format!("writer task gone: {e}"),
            })
    }

    pub(crate) async fn mark_read(&self) {
        *self.0.last_read.write().await = Instant::now();
    }

    pub(crate) async fn mark_write(&self) {
        *self.0.last_write.write().await = Instant::now();
    }

    pub async fn idle_read_for(&self) -> Duration {
        self.0.last_read.read().await.elapsed()
    }

    pub async fn idle_write_for(&self) -> Duration {
        self.0.last_write.read().await.elapsed()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.0.id)
            .field("role", &self.0.role)
            .field("remote_addr", &self.0.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
