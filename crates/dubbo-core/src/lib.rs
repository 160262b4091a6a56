//! dubbo-core - a Dubbo-style RPC exchange core: transport, exchange,
//! and protocol layers over Tokio.
//!
//! - [`transport`]: connection lifecycle (`TransportClient`/`TransportServer`)
//!   and the wire codec.
//! - [`exchange`]: request/response correlation, heartbeats, graceful close.
//! - [`protocol`]: service-key dispatch, exporters, and the consumer-side
//!   invoker built on [`pool`]'s reference-counted client pool.

pub mod codec;
pub mod error;
pub mod exchange;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod timer;
pub mod transport;
pub mod url;

pub use error::{ExchangeError, Result, TimeoutSide};
pub use exchange::{AsyncResult, ExchangeChannel, ExchangeClient, ExchangeServer, PendingRegistry};
pub use message::{Body, EventKind, Invocation, Request, Response, Status};
pub use pool::{ClientPool, LazyConnectClient, RefCountedClient};
pub use protocol::{AsyncRpcResult, Context, DubboInvoker, DubboProtocol, DubboServerHandler, Exporter, ExporterRegistry, Invoker};
pub use transport::{Channel, ChannelRole, Handler, TransportClient, TransportServer};
pub use url::EndpointUrl;
