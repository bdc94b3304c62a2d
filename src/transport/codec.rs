//! Socket.IO v5 over Engine.IO v4 text framing
//!
//! Only the text packets needed by a websocket-only client are handled:
//! Engine.IO open/close/ping/pong/message/upgrade/noop, and Socket.IO
//! connect/disconnect/event/ack/connect_error. Binary attachments are
//! rejected.
//!
//! A Socket.IO event on the default namespace looks like
//! `42["cursor_receiver",{"position":{"x":0.5,"y":0.5}}]`: `4` is the
//! Engine.IO message type, `2` the Socket.IO event type.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CodecError;

pub const ENGINE_IO_VERSION: u8 = 4;
pub const DEFAULT_NAMESPACE: &str = "/";

/// Payload of the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let data = chars.as_str();

        let packet = match kind {
            '0' => EnginePacket::Open(serde_json::from_str(data)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(data.to_string()),
            '3' => EnginePacket::Pong(data.to_string()),
            '4' => EnginePacket::Message(data.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(CodecError::UnknownType {
                    layer: "engine.io",
                    kind: other,
                })
            }
        };
        Ok(packet)
    }

    /// Encode a client-side packet. The open packet is server-only.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Decode the Socket.IO packet carried in an Engine.IO message.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        if matches!(kind, '5' | '6') {
            return Err(CodecError::Binary);
        }
        let mut rest = chars.as_str();

        let mut namespace = DEFAULT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    namespace = rest[..comma].to_string();
                    rest = &rest[comma + 1..];
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        rest = &rest[digits..];

        let payload: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        let packet = match kind {
            '0' => SocketPacket::Connect {
                namespace,
                data: payload,
            },
            '1' => SocketPacket::Disconnect { namespace },
            '2' => {
                let mut args = match payload {
                    Some(Value::Array(items)) => items,
                    _ => return Err(CodecError::MissingEventName),
                };
                if args.is_empty() {
                    return Err(CodecError::MissingEventName);
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    _ => return Err(CodecError::MissingEventName),
                };
                SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    args,
                }
            }
            '3' => SocketPacket::Ack {
                namespace,
                id: id.unwrap_or_default(),
                args: match payload {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                },
            },
            '4' => SocketPacket::ConnectError {
                namespace,
                data: payload,
            },
            other => {
                return Err(CodecError::UnknownType {
                    layer: "socket.io",
                    kind: other,
                })
            }
        };
        Ok(packet)
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        let (kind, namespace) = match self {
            SocketPacket::Connect { namespace, .. } => ('0', namespace),
            SocketPacket::Disconnect { namespace } => ('1', namespace),
            SocketPacket::Event { namespace, .. } => ('2', namespace),
            SocketPacket::Ack { namespace, .. } => ('3', namespace),
            SocketPacket::ConnectError { namespace, .. } => ('4', namespace),
        };
        out.push(kind);

        let has_body = match self {
            SocketPacket::Connect { data, .. } | SocketPacket::ConnectError { data, .. } => {
                data.is_some()
            }
            SocketPacket::Disconnect { .. } => false,
            SocketPacket::Event { .. } | SocketPacket::Ack { .. } => true,
        };
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            if has_body || matches!(self, SocketPacket::Event { id: Some(_), .. } | SocketPacket::Ack { .. }) {
                out.push(',');
            }
        }

        match self {
            SocketPacket::Connect { data, .. } | SocketPacket::ConnectError { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            SocketPacket::Disconnect { .. } => {}
            SocketPacket::Event { id, name, args, .. } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
            }
            SocketPacket::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
        }
        out
    }

    /// Wrap in an Engine.IO message frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

/// Frame that joins `namespace`.
pub fn connect_frame(namespace: &str) -> String {
    SocketPacket::Connect {
        namespace: namespace.to_string(),
        data: None,
    }
    .to_frame()
}

/// Frame that emits `name` with a single payload argument.
pub fn event_frame(namespace: &str, name: &str, payload: Value) -> String {
    SocketPacket::Event {
        namespace: namespace.to_string(),
        id: None,
        name: name.to_string(),
        args: vec![payload],
    }
    .to_frame()
}

/// Build the websocket URL for an Engine.IO server.
///
/// `http`/`https` map to `ws`/`wss`. The base URL must not carry a path;
/// namespaces are configured separately.
///
/// # Example
/// ```
/// use remote_pointer::transport::codec::engine_io_endpoint;
///
/// let url = engine_io_endpoint("https://relay.example.com", "/socket.io/").unwrap();
/// assert_eq!(url, "wss://relay.example.com/socket.io/?EIO=4&transport=websocket");
/// ```
pub fn engine_io_endpoint(base: &str, path: &str) -> Result<String> {
    let base = base.trim().trim_end_matches('/');
    let (scheme, authority) = match base.split_once("://") {
        Some(("http", rest)) | Some(("ws", rest)) => ("ws", rest),
        Some(("https", rest)) | Some(("wss", rest)) => ("wss", rest),
        Some((other, _)) => bail!("Unsupported relay URL scheme '{}'", other),
        None => bail!("Relay URL '{}' has no scheme", base),
    };
    if authority.is_empty() {
        bail!("Relay URL '{}' has no host", base);
    }
    if authority.contains('/') || authority.contains('?') {
        bail!(
            "Relay URL '{}' must not contain a path or query (set relay.path / relay.namespace instead)",
            base
        );
    }

    let path = path.trim_matches('/');
    let path = if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", path)
    };

    Ok(format!(
        "{}://{}{}?EIO={}&transport=websocket",
        scheme, authority, path, ENGINE_IO_VERSION
    ))
}
