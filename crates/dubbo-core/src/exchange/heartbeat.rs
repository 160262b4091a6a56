//! Per-connection heartbeat watcher: a periodic task at `heartbeat/3`
//! that keeps a client's idle connection alive and lets a server
//! notice a peer that stopped replying.

use super::channel::ExchangeChannel;
use crate::timer::ticker;
use crate::transport::ChannelRole;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn the watcher for one channel. Returns a handle the caller can
/// abort when the channel closes for other reasons; the watcher also
/// exits on its own once it observes `channel.is_closed()`.
pub fn spawn(exchange: ExchangeChannel, role: ChannelRole, heartbeat: Duration) -> JoinHandle<()> {
    let period = heartbeat / 3;
    tokio::spawn(async move {
        let mut tick = ticker(period);
        loop {
            tick.tick().await;
            if exchange.transport_channel().is_closed() {
                break;
            }

            match role {
                ChannelRole::Client => {
                    let idle = exchange.transport_channel().idle_write_for().await;
                    if idle >= heartbeat {
                        debug!(channel = %exchange.transport_channel().id(), idle_ms = idle.as_millis() as u64, "sending heartbeat");
                        if let Err(e) = exchange.send_heartbeat(heartbeat) {
                            warn!(channel = %exchange.transport_channel().id(), error = %e, "heartbeat send failed");
                            break;
                        }
                    }
                }
                ChannelRole::Server => {
                    let idle = exchange.transport_channel().idle_read_for().await;
                    if idle >= heartbeat * 3 {
                        warn!(
                            channel = %exchange.transport_channel().id(),
                            idle_ms = idle.as_millis() as u64,
                            "peer missed heartbeat deadline, closing"
                        );
                        exchange.transport_channel().close();
                        break;
                    }
                }
            }
        }
    })
}
