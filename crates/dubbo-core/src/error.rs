//! Typed errors for the exchange core.
//!
//! Every failure mode the transport, exchange, and protocol layers can
//! raise collapses into a single enum so call sites match on one type
//! instead of threading per-module error types through `anyhow::Context`.

use crate::message::Status;
use thiserror::Error;

/// A single error type spanning transport, exchange, and protocol failures.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Bind, connect, send, or decode failure at the transport layer.
    #[error("remoting error on {addr}: {message}")]
    Remoting { addr: String, message: String },

    /// A request or its reply did not complete within its deadline.
    #[error("{side} timeout after {elapsed_ms}ms (request {request_id})")]
    Timeout {
        side: TimeoutSide,
        request_id: uuid::Uuid,
        elapsed_ms: u64,
    },

    /// Encoded or decoded body exceeded the configured payload limit.
    #[error("payload of {actual} bytes exceeds limit of {limit} bytes")]
    PayloadLimitExceeded { actual: usize, limit: usize },

    /// The channel closed while calls were still outstanding on it.
    #[error("channel inactive (request {request_id})")]
    ChannelInactive { request_id: uuid::Uuid },

    /// The codec failed to encode or decode a message body.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An application-level error returned in a response payload. Never
    /// triggers retry or mock fallback at this layer.
    #[error("biz error: {0}")]
    Biz(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSide {
    Client,
    Server,
}

impl std::fmt::Display for TimeoutSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutSide::Client => write!(f, "client"),
            TimeoutSide::Server => write!(f, "server"),
        }
    }
}

impl ExchangeError {
    /// Map this error onto the `Response::status` it should synthesize,
    /// per the response status taxonomy.
    pub fn as_status(&self) -> Status {
        match self {
            ExchangeError::Remoting { .. } => Status::ClientError,
            ExchangeError::Timeout { side: TimeoutSide::Client, .. } => Status::ClientTimeout,
            ExchangeError::Timeout { side: TimeoutSide::Server, .. } => Status::ServerTimeout,
            ExchangeError::PayloadLimitExceeded { .. } => Status::BadRequest,
            ExchangeError::ChannelInactive { .. } => Status::ChannelInactive,
            ExchangeError::Serialization(_) => Status::BadResponse,
            ExchangeError::Biz(_) => Status::ServiceError,
            ExchangeError::Io(_) => Status::ClientError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
