//! Exchange: correlates outbound requests to inbound responses over a
//! transport connection, enforces per-request timeouts, runs the
//! heartbeat watcher, and provides graceful close.

pub mod channel;
pub mod client;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod server;

pub use channel::ExchangeChannel;
pub use client::ExchangeClient;
pub use handler::ExchangeLayer;
pub use registry::{AsyncResult, PendingRegistry};
pub use server::ExchangeServer;
