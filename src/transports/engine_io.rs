//! Engine.IO v4 / Socket.IO v5 packet codec for the default namespace.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type digit
//! followed by its payload. Engine.IO `message` packets (`4`) carry a
//! Socket.IO packet, again prefixed with a type digit:
//!
//! | Frame          | Meaning                                   |
//! |----------------|-------------------------------------------|
//! | `0{...}`       | Engine.IO open handshake                  |
//! | `1`            | Engine.IO close                           |
//! | `2` / `3`      | ping / pong                               |
//! | `40` / `40{}`  | Socket.IO namespace connect (+ ack)       |
//! | `41`           | Socket.IO namespace disconnect            |
//! | `42[...]`      | Socket.IO event array                     |
//! | `44{...}`      | Socket.IO connect error                   |

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LobbyError, Result};

/// Client frame that joins the default namespace.
pub const CONNECT: &str = "40";
/// Client frame that leaves the default namespace.
pub const DISCONNECT: &str = "41";
/// Client answer to a server ping.
pub const PONG: &str = "3";

/// Handshake data from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// A decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A decoded Socket.IO packet (default namespace only).
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect acknowledgement, with the server's payload (`{"sid": ...}`).
    Connect(Option<Value>),
    Disconnect,
    /// Event array text, ready for [`ServerEvent::decode`](crate::protocol::ServerEvent::decode).
    Event(String),
    ConnectError(Value),
    /// Acks and binary packets, which the lobby does not use.
    Unsupported(char),
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns [`LobbyError::Protocol`] for unknown packet types or payloads that
/// do not match their type.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| LobbyError::Protocol("empty Engine.IO frame".into()))?;
    let rest = chars.as_str();

    let packet = match kind {
        '0' => Packet::Open(serde_json::from_str(rest)?),
        '1' => Packet::Close,
        '2' => Packet::Ping,
        '3' => Packet::Pong,
        '4' => Packet::Message(decode_socket_packet(rest)?),
        '5' => Packet::Upgrade,
        '6' => Packet::Noop,
        other => {
            return Err(LobbyError::Protocol(format!(
                "unknown Engine.IO packet type {other:?}"
            )))
        }
    };
    Ok(packet)
}

fn decode_socket_packet(body: &str) -> Result<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| LobbyError::Protocol("empty Socket.IO packet".into()))?;
    let rest = chars.as_str();

    if rest.starts_with('/') {
        return Err(LobbyError::Protocol(format!(
            "packet for a non-default namespace: {body}"
        )));
    }

    let packet = match kind {
        '0' if rest.is_empty() => SocketPacket::Connect(None),
        '0' => SocketPacket::Connect(Some(serde_json::from_str(rest)?)),
        '1' => SocketPacket::Disconnect,
        // An ack id may sit between the type and the array.
        '2' => SocketPacket::Event(
            rest.trim_start_matches(|c: char| c.is_ascii_digit())
                .to_string(),
        ),
        '4' => SocketPacket::ConnectError(serde_json::from_str(rest).unwrap_or(Value::Null)),
        '3' | '5' | '6' => SocketPacket::Unsupported(kind),
        other => {
            return Err(LobbyError::Protocol(format!(
                "unknown Socket.IO packet type {other:?}"
            )))
        }
    };
    Ok(packet)
}

/// Wrap an event array in an Engine.IO message / Socket.IO event frame.
pub fn encode_event(event_array: &str) -> String {
    format!("42{event_array}")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let packet = decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let Packet::Open(open) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(open.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(open.ping_interval, 25000);
        assert_eq!(open.max_payload, Some(1_000_000));
    }

    #[test]
    fn decodes_control_packets() {
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("1").unwrap(), Packet::Close);
        assert_eq!(
            decode("41").unwrap(),
            Packet::Message(SocketPacket::Disconnect)
        );
        assert_eq!(
            decode("40").unwrap(),
            Packet::Message(SocketPacket::Connect(None))
        );
    }

    #[test]
    fn connect_ack_carries_the_session_id() {
        let Packet::Message(SocketPacket::Connect(Some(data))) =
            decode(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).unwrap()
        else {
            panic!("expected connect ack");
        };
        assert_eq!(data["sid"], "wZX3oN0bSVIhsaknAAAI");
    }

    #[test]
    fn event_frames_yield_the_bare_array() {
        assert_eq!(
            decode(r#"42["tables-updated",[]]"#).unwrap(),
            Packet::Message(SocketPacket::Event(r#"["tables-updated",[]]"#.into()))
        );
        assert_eq!(
            decode(r#"4213["tables-updated",[]]"#).unwrap(),
            Packet::Message(SocketPacket::Event(r#"["tables-updated",[]]"#.into()))
        );
    }

    #[test]
    fn encode_prefixes_the_event_array() {
        assert_eq!(
            encode_event(r#"["fetch-lobby-info",null]"#),
            r#"42["fetch-lobby-info",null]"#
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("4").is_err());
        assert!(decode(r#"42/admin,["x"]"#).is_err());
        assert!(decode("0not-json").is_err());
    }
}
