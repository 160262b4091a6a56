//! Request/Response/Invocation: the in-memory data model exchanged
//! between the transport and exchange layers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Response status, mirrors the dubbo wire taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Ok = 20,
    ClientTimeout = 30,
    ServerTimeout = 31,
    ClientError = 40,
    ServerError = 50,
    BadRequest = 41,
    BadResponse = 51,
    ServiceNotFound = 42,
    ServiceError = 52,
    ChannelInactive = 43,
}

impl Status {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            20 => Status::Ok,
            30 => Status::ClientTimeout,
            31 => Status::ServerTimeout,
            40 => Status::ClientError,
            50 => Status::ServerError,
            41 => Status::BadRequest,
            51 => Status::BadResponse,
            42 => Status::ServiceNotFound,
            52 => Status::ServiceError,
            43 => Status::ChannelInactive,
            _ => return None,
        })
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// An invocation: the payload of a two-way request that targets an
/// exported service method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub method: String,
    pub parameter_types: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
    #[serde(default)]
    pub attachments: HashMap<String, String>,
}

impl Invocation {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            parameter_types: Vec::new(),
            arguments: Vec::new(),
            attachments: HashMap::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn is_callback_invoke(&self) -> bool {
        self.attachment("is-callback-invoke").map(|v| v == "true").unwrap_or(false)
    }
}

/// The body of a request. Event requests (heartbeat, readonly) carry no
/// invocation; ordinary two-way requests carry exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Body {
    Invocation(Invocation),
    Event(EventKind),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Heartbeat,
    Readonly,
}

/// An outbound or inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub version: String,
    pub two_way: bool,
    pub event: bool,
    pub broken: bool,
    pub data: Body,
}

impl Request {
    /// A two-way invocation request - the common case of an RPC call.
    pub fn invocation(invocation: Invocation) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: "2.0.2".to_string(),
            two_way: true,
            event: false,
            broken: false,
            data: Body::Invocation(invocation),
        }
    }

    /// A fire-and-forget invocation; no `PendingCall` is ever created for it.
    pub fn one_way(invocation: Invocation) -> Self {
        let mut req = Self::invocation(invocation);
        req.two_way = false;
        req
    }

    /// A heartbeat event request. Always two-way so the idle timer can
    /// observe a reply and reset itself.
    pub fn heartbeat() -> Self {
        Self {
            id: Uuid::new_v4(),
            version: "2.0.2".to_string(),
            two_way: true,
            event: true,
            broken: false,
            data: Body::Event(EventKind::Heartbeat),
        }
    }

    /// A one-way readonly notification broadcast on graceful server shutdown.
    pub fn readonly() -> Self {
        Self {
            id: Uuid::new_v4(),
            version: "2.0.2".to_string(),
            two_way: false,
            event: true,
            broken: false,
            data: Body::Event(EventKind::Readonly),
        }
    }

    pub fn invocation_ref(&self) -> Option<&Invocation> {
        match &self.data {
            Body::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self.data, Body::Event(EventKind::Heartbeat))
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self.data, Body::Event(EventKind::Readonly))
    }
}

/// A response correlated to a request by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub status: Status,
    pub error_message: String,
    pub result: Option<serde_json::Value>,
}

impl Response {
    pub fn ok(id: Uuid, result: serde_json::Value) -> Self {
        Self {
            id,
            status: Status::Ok,
            error_message: String::new(),
            result: Some(result),
        }
    }

    pub fn error(id: Uuid, status: Status, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            error_message: message.into(),
            result: None,
        }
    }

    /// Synthesize the response a heartbeat event gets on the peer's side.
    pub fn event_ack(id: Uuid) -> Self {
        Self {
            id,
            status: Status::Ok,
            error_message: String::new(),
            result: None,
        }
    }

    pub fn channel_inactive(id: Uuid) -> Self {
        Self::error(id, Status::ChannelInactive, "channel inactive")
    }

    /// Collapse a terminal response into the `Result` an invoker's
    /// caller actually wants: the deserialized result on `OK`, or a
    /// typed error for every other status. This is the single
    /// completion path every outcome - real reply, synthesized timeout,
    /// channel-inactive - funnels through.
    pub fn into_result(self) -> crate::error::Result<serde_json::Value> {
        use crate::error::{ExchangeError, TimeoutSide};
        match self.status {
            Status::Ok => Ok(self.result.unwrap_or(serde_json::Value::Null)),
            Status::ClientTimeout => Err(ExchangeError::Timeout {
                side: TimeoutSide::Client,
                request_id: self.id,
                elapsed_ms: 0,
            }),
            Status::ServerTimeout => Err(ExchangeError::Timeout {
                side: TimeoutSide::Server,
                request_id: self.id,
                elapsed_ms: 0,
            }),
            Status::ChannelInactive => Err(ExchangeError::ChannelInactive { request_id: self.id }),
            Status::BadRequest | Status::BadResponse => Err(ExchangeError::Serialization(self.error_message)),
            Status::ServiceError => Err(ExchangeError::Biz(self.error_message)),
            Status::ServiceNotFound | Status::ClientError | Status::ServerError => {
                Err(ExchangeError::Remoting { addr: self.id.to_string(), message: self.error_message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_roundtrips_through_u8() {
        for status in [
            Status::Ok,
            Status::ClientTimeout,
            Status::ServerTimeout,
            Status::ClientError,
            Status::ServerError,
            Status::BadRequest,
            Status::BadResponse,
            Status::ServiceNotFound,
            Status::ServiceError,
            Status::ChannelInactive,
        ] {
            assert_eq!(Status::from_u8(status.to_u8()), Some(status));
        }
    }

    #[test]
    fn one_way_request_is_not_two_way() {
        let req = Request::one_way(Invocation::new("echo"));
        assert!(!req.two_way);
        assert!(!req.event);
    }

    #[test]
    fn heartbeat_request_is_two_way_event() {
        let req = Request::heartbeat();
        assert!(req.two_way);
        assert!(req.event);
        assert!(req.is_heartbeat());
    }

    #[test]
    fn readonly_request_is_one_way_event() {
        let req = Request::readonly();
        assert!(!req.two_way);
        assert!(req.event);
        assert!(req.is_readonly());
    }

    #[test]
    fn invocation_attachment_roundtrip() {
        let inv = Invocation::new("echo").with_attachment("is-callback-invoke", "true");
        assert!(inv.is_callback_invoke());
    }
}
