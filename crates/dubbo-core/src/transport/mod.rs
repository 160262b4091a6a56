//! Transport: owns listening sockets and outbound connections, decodes
//! frames off the wire, and hands them to a `Handler`.

pub mod channel;
pub mod client;
pub mod server;

pub use channel::{Channel, ChannelRole};
pub use client::TransportClient;
pub use server::TransportServer;

use crate::codec::Frame;
use crate::error::ExchangeError;
use async_trait::async_trait;

/// Callback surface a transport drives. Implemented by the exchange
/// layer so transport stays ignorant of request/response correlation.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn connected(&self, channel: Channel);
    async fn disconnected(&self, channel: Channel);
    async fn received(&self, channel: Channel, frame: Frame);
    async fn caught(&self, channel: Channel, error: ExchangeError) {
        let _ = (channel, error);
    }
}
