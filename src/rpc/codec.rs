// msgpack-rpc frame codec
//
// Every frame is one msgpack array, with no length prefix:
// Request:      [0, msgid, method, params]
// Response:     [1, msgid, error, result]
// Notification: [2, method, params]

use std::io::{Cursor, ErrorKind};

use bytes::{Buf, BytesMut};
use rmpv::Value;
use tokio_util::codec::{Decoder, Encoder};

/// Frame type tags
const TYPE_REQUEST: u64 = 0;
const TYPE_RESPONSE: u64 = 1;
const TYPE_NOTIFICATION: u64 = 2;

/// Error types for simulator RPC
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] rmpv::encode::Error),

    #[error("Failed to decode frame: {0}")]
    Decode(#[from] rmpv::decode::Error),

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Remote call {method} failed: {message}")]
    Remote { method: String, message: String },

    #[error("Unexpected result from {method}: {source}")]
    Convert {
        method: String,
        #[source]
        source: rmpv::ext::Error,
    },

    #[error("Connection closed before {method} completed")]
    Disconnected { method: String },
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// A decoded msgpack-rpc frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        msgid: u32,
        method: String,
        params: Vec<Value>,
    },
    Response {
        msgid: u32,
        /// `Err` carries the remote error object verbatim
        result: std::result::Result<Value, Value>,
    },
    Notification {
        method: String,
        params: Vec<Value>,
    },
}

impl Message {
    /// Build the wire array for this frame
    pub fn into_value(self) -> Value {
        match self {
            Message::Request {
                msgid,
                method,
                params,
            } => Value::Array(vec![
                Value::from(TYPE_REQUEST),
                Value::from(msgid),
                Value::from(method),
                Value::Array(params),
            ]),
            Message::Response { msgid, result } => {
                let (error, result) = match result {
                    Ok(value) => (Value::Nil, value),
                    Err(error) => (error, Value::Nil),
                };
                Value::Array(vec![
                    Value::from(TYPE_RESPONSE),
                    Value::from(msgid),
                    error,
                    result,
                ])
            }
            Message::Notification { method, params } => Value::Array(vec![
                Value::from(TYPE_NOTIFICATION),
                Value::from(method),
                Value::Array(params),
            ]),
        }
    }

    /// Parse a wire array into a frame
    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Array(fields) => fields,
            other => return Err(invalid(format!("expected array, got {}", other))),
        };
        let kind = fields
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("missing frame type".to_string()))?;

        match (kind, fields.len()) {
            (TYPE_REQUEST, 4) => {
                let params = take_params(fields.pop())?;
                let method = take_method(fields.pop())?;
                let msgid = take_msgid(&fields[1])?;
                Ok(Message::Request {
                    msgid,
                    method,
                    params,
                })
            }
            (TYPE_RESPONSE, 4) => {
                let result = fields.pop().unwrap_or(Value::Nil);
                let error = fields.pop().unwrap_or(Value::Nil);
                let msgid = take_msgid(&fields[1])?;
                let result = if error.is_nil() { Ok(result) } else { Err(error) };
                Ok(Message::Response { msgid, result })
            }
            (TYPE_NOTIFICATION, 3) => {
                let params = take_params(fields.pop())?;
                let method = take_method(fields.pop())?;
                Ok(Message::Notification { method, params })
            }
            (kind, len) => Err(invalid(format!(
                "unsupported frame type {} with {} fields",
                kind, len
            ))),
        }
    }
}

fn invalid(reason: String) -> RpcError {
    RpcError::InvalidFrame { reason }
}

fn take_msgid(value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| invalid(format!("invalid msgid {}", value)))
}

fn take_method(value: Option<Value>) -> Result<String> {
    match value {
        Some(Value::String(method)) => method
            .into_str()
            .ok_or_else(|| invalid("method name is not UTF-8".to_string())),
        other => Err(invalid(format!("invalid method {:?}", other))),
    }
}

fn take_params(value: Option<Value>) -> Result<Vec<Value>> {
    match value {
        Some(Value::Array(params)) => Ok(params),
        other => Err(invalid(format!("invalid params {:?}", other))),
    }
}

/// True when the decoder ran out of bytes mid-value
fn is_incomplete(error: &rmpv::decode::Error) -> bool {
    match error {
        rmpv::decode::Error::InvalidMarkerRead(e) | rmpv::decode::Error::InvalidDataRead(e) => {
            e.kind() == ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// Codec for use with `FramedRead` / `FramedWrite`
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackRpcCodec;

impl Decoder for MsgpackRpcCodec {
    type Item = Message;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let value = match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => value,
            Err(e) if is_incomplete(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let consumed = cursor.position() as usize;
        src.advance(consumed);

        Message::from_value(value).map(Some)
    }
}

impl Encoder<Message> for MsgpackRpcCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &item.into_value())?;
        dst.extend_from_slice(&buf);
        Ok(())
    }
}
