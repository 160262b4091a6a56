//! Frame codec: length-prefixed dubbo-style framing over a raw byte
//! stream, expressed as a `tokio_util::codec` pair.
//!
//! Wire layout (24-byte header):
//!
//! ```text
//! offset  size  field
//! 0       2     magic       b"DB"
//! 2       1     flags       bit0 response, bit1 two-way, bit2 event
//! 3       1     status      Status::to_u8(), 0 for requests
//! 4       16    request id  UUID bytes
//! 20      4     body length big-endian u32
//! 24      N     body        serialized Request/Response body
//! ```
//!
//! `Decoder::decode` returning `Ok(None)` is this codec's NEED_MORE: the
//! buffer doesn't yet hold a full frame and the caller should read more
//! bytes and call again.

use crate::error::ExchangeError;
use crate::message::{Body, Request, Response, Status};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

const MAGIC: [u8; 2] = *b"DB";
const HEADER_LEN: usize = 24;

const FLAG_RESPONSE: u8 = 0b001;
const FLAG_TWO_WAY: u8 = 0b010;
const FLAG_EVENT: u8 = 0b100;

/// The response body actually carried on the wire. `status`/`id` already
/// live in the header; this wraps the two fields `Decoder`/`Encoder`
/// would otherwise have to smuggle through separately - `error_message`
/// was dropped on the wire before this wrapper existed, and every typed
/// error in `Response::into_result` reads from exactly that field.
#[derive(Serialize, Deserialize)]
struct ResponseBody {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
}

/// A decoded frame: either a request or a response. The codec is
/// direction-agnostic - both transport client and server decode the
/// same wire format.
#[derive(Debug, Clone)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    pub fn id(&self) -> Uuid {
        match self {
            Frame::Request(r) => r.id,
            Frame::Response(r) => r.id,
        }
    }
}

/// A length-prefixed dubbo frame codec enforcing a configurable payload
/// limit. `max_payload = 0` means unlimited, matching `EndpointUrl::payload_bytes`.
pub struct DubboCodec {
    max_payload: u32,
}

impl DubboCodec {
    pub fn new(max_payload: u32) -> Self {
        Self { max_payload }
    }
}

impl Decoder for DubboCodec {
    type Item = Frame;
    type Error = ExchangeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[0..2] != MAGIC {
            return Err(ExchangeError::Serialization(format!(
                "bad magic: {:?}",
                &src[0..2]
            )));
        }

        let body_len = u32::from_be_bytes([src[20], src[21], src[22], src[23]]);
        if self.max_payload > 0 && body_len > self.max_payload {
            return Err(ExchangeError::PayloadLimitExceeded {
                actual: body_len as usize,
                limit: self.max_payload as usize,
            });
        }

        let total_len = HEADER_LEN + body_len as usize;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let flags = src[2];
        let status_byte = src[3];
        let id = Uuid::from_slice(&src[4..20]).map_err(|e| ExchangeError::Serialization(e.to_string()))?;

        let _header = src.split_to(HEADER_LEN);
        let body = src.split_to(body_len as usize);

        let is_response = flags & FLAG_RESPONSE != 0;
        if is_response {
            let status = Status::from_u8(status_byte)
                .ok_or_else(|| ExchangeError::Serialization(format!("bad status byte {status_byte}")))?;
            let ResponseBody { error_message, result } = if body.is_empty() {
                ResponseBody { error_message: String::new(), result: None }
            } else {
                serde_json::from_slice(&body).map_err(|e| ExchangeError::Serialization(e.to_string()))?
            };
            Ok(Some(Frame::Response(Response {
                id,
                status,
                error_message,
                result,
            })))
        } else {
            let data = if flags & FLAG_EVENT != 0 {
                if body.is_empty() {
                    Body::Empty
                } else {
                    serde_json::from_slice(&body).map_err(|e| ExchangeError::Serialization(e.to_string()))?
                }
            } else if body.is_empty() {
                Body::Empty
            } else {
                Body::Invocation(
                    serde_json::from_slice(&body).map_err(|e| ExchangeError::Serialization(e.to_string()))?,
                )
            };
            Ok(Some(Frame::Request(Request {
                id,
                version: "2.0.2".to_string(),
                two_way: flags & FLAG_TWO_WAY != 0,
                event: flags & FLAG_EVENT != 0,
                broken: false,
                data,
            })))
        }
    }
}

impl Encoder<Frame> for DubboCodec {
    type Error = ExchangeError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (flags, status_byte, id, body) = match &item {
            Frame::Request(req) => {
                let mut flags = 0u8;
                if req.two_way {
                    flags |= FLAG_TWO_WAY;
                }
                if req.event {
                    flags |= FLAG_EVENT;
                }
                let body = match &req.data {
                    Body::Empty => Vec::new(),
                    Body::Invocation(inv) => {
                        serde_json::to_vec(inv).map_err(|e| ExchangeError::Serialization(e.to_string()))?
                    }
                    Body::Event(kind) => {
                        serde_json::to_vec(kind).map_err(|e| ExchangeError::Serialization(e.to_string()))?
                    }
                };
                (flags, 0u8, req.id, body)
            }
            Frame::Response(resp) => {
                let wire = ResponseBody {
                    error_message: resp.error_message.clone(),
                    result: resp.result.clone(),
                };
                let body = if wire.error_message.is_empty() && wire.result.is_none() {
                    Vec::new()
                } else {
                    serde_json::to_vec(&wire).map_err(|e| ExchangeError::Serialization(e.to_string()))?
                };
                (FLAG_RESPONSE, resp.status.to_u8(), resp.id, body)
            }
        };

        if self.max_payload > 0 && body.len() as u32 > self.max_payload {
            return Err(ExchangeError::PayloadLimitExceeded {
                actual: body.len(),
                limit: self.max_payload as usize,
            });
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.put_slice(&MAGIC);
        dst.put_u8(flags);
        dst.put_u8(status_byte);
        dst.put_slice(id.as_bytes());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
