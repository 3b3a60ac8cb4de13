//! Socket.IO-over-WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] speaks just enough Engine.IO v4 to reach the
//! lobby's default namespace: it waits for the open packet, joins the
//! namespace, answers server pings, and hands bare event arrays to the
//! caller. Both `ws://`/`wss://` and `http://`/`https://` endpoints are
//! accepted; the latter are mapped to their WebSocket schemes and the
//! Socket.IO path is appended.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::{LobbyConfig, TransportKind};
use crate::error::LobbyError;
use crate::transport::{Connector, Transport};
use crate::transports::engine_io::{self, Packet, SocketPacket};

/// Default Socket.IO mount path on the lobby server.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Build the Engine.IO WebSocket URL for a lobby endpoint.
///
/// # Errors
///
/// Returns [`LobbyError::Config`] if `endpoint` is not an absolute URL with an
/// `http`, `https`, `ws` or `wss` scheme.
pub fn socket_url(endpoint: &str, path: &str) -> Result<Url, LobbyError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| LobbyError::Config(format!("invalid lobby endpoint {endpoint:?}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LobbyError::Config(format!(
                "unsupported scheme {other:?} in lobby endpoint"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| LobbyError::Config(format!("cannot use scheme {scheme} for {endpoint}")))?;
    url.set_path(path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// A [`Transport`] backed by a Socket.IO session over a WebSocket.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) does not lose event frames when cancelled. A pong
/// interrupted by cancellation is not retried; the server treats that like any
/// missed pong and ends the session, which the channel then reconnects.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    session_id: Option<String>,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a lobby endpoint and complete the Socket.IO handshake.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] for an unusable endpoint,
    /// [`LobbyError::Io`] if the WebSocket cannot be established (the I/O
    /// [`ErrorKind`](std::io::ErrorKind) is preserved when there is one) and
    /// [`LobbyError::Protocol`] if the server does not complete the handshake.
    pub async fn connect(endpoint: &str) -> Result<Self, LobbyError> {
        Self::connect_with_path(endpoint, DEFAULT_SOCKET_PATH).await
    }

    /// Like [`connect`](Self::connect) with a custom Socket.IO mount path.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with_path(endpoint: &str, path: &str) -> Result<Self, LobbyError> {
        let url = socket_url(endpoint, path)?;
        debug!(url = %url, "connecting to lobby WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| {
                let kind = match &e {
                    tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                    _ => std::io::ErrorKind::Other,
                };
                LobbyError::Io(std::io::Error::new(kind, e))
            })?;

        let mut transport = Self::from_stream(stream);
        transport.handshake().await?;

        info!(
            url = %url,
            session_id = transport.session_id.as_deref().unwrap_or("-"),
            "Socket.IO session established"
        );
        Ok(transport)
    }

    /// Connect with a deadline covering both the WebSocket and the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Timeout`] if the deadline elapses, or any error
    /// that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        endpoint: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Self, LobbyError> {
        tokio::time::timeout(timeout, Self::connect_with_path(endpoint, path))
            .await
            .map_err(|_| LobbyError::Timeout)?
    }

    /// Wrap an already-established WebSocket stream. The caller is
    /// responsible for having completed the Socket.IO handshake.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            session_id: None,
            closed: false,
        }
    }

    /// The Socket.IO session id the server assigned, once connected.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn handshake(&mut self) -> Result<(), LobbyError> {
        match self.next_packet().await? {
            Packet::Open(open) => {
                trace!(
                    engine_sid = %open.sid,
                    ping_interval = open.ping_interval,
                    "Engine.IO open"
                );
            }
            other => {
                return Err(LobbyError::Protocol(format!(
                    "expected Engine.IO open packet, got {other:?}"
                )))
            }
        }

        self.send_raw(engine_io::CONNECT.to_string()).await?;

        loop {
            match self.next_packet().await? {
                Packet::Message(SocketPacket::Connect(data)) => {
                    self.session_id = data
                        .as_ref()
                        .and_then(|data| data.get("sid"))
                        .and_then(|sid| sid.as_str())
                        .map(str::to_string);
                    return Ok(());
                }
                Packet::Message(SocketPacket::ConnectError(data)) => {
                    return Err(LobbyError::Protocol(format!(
                        "namespace connect rejected: {data}"
                    )));
                }
                Packet::Ping => self.send_raw(engine_io::PONG.to_string()).await?,
                Packet::Close | Packet::Message(SocketPacket::Disconnect) => {
                    return Err(LobbyError::TransportClosed);
                }
                other => trace!("ignoring {other:?} during handshake"),
            }
        }
    }

    /// Read until the next Engine.IO packet, for the handshake.
    async fn next_packet(&mut self) -> Result<Packet, LobbyError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return engine_io::decode(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return Err(LobbyError::TransportClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(LobbyError::TransportReceive(e.to_string())),
            }
        }
    }

    async fn send_raw(&mut self, frame: String) -> Result<(), LobbyError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::TransportClosed);
        }
        self.send_raw(engine_io::encode_event(&frame)).await
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(LobbyError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            let text = match msg {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Binary(_) => {
                    warn!("received unexpected binary WebSocket frame, skipping");
                    continue;
                }
                // tungstenite answers WebSocket-level pings itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            match engine_io::decode(text.as_str()) {
                Ok(Packet::Message(SocketPacket::Event(event))) => return Some(Ok(event)),
                Ok(Packet::Ping) => {
                    if let Err(e) = self.send_raw(engine_io::PONG.to_string()).await {
                        return Some(Err(e));
                    }
                }
                Ok(Packet::Close | Packet::Message(SocketPacket::Disconnect)) => {
                    debug!("server ended the Socket.IO session");
                    return None;
                }
                Ok(other) => trace!("ignoring {other:?}"),
                Err(e) => warn!(
                    "failed to decode Engine.IO frame: {e}, raw: {}",
                    text.as_str()
                ),
            }
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.send_raw(engine_io::DISCONNECT.to_string()).await {
            debug!("failed to leave namespace before closing: {e}");
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that dials the lobby with [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    path: String,
    timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            path: DEFAULT_SOCKET_PATH.to_string(),
            timeout: LobbyConfig::default().connect_timeout,
        }
    }
}

impl WebSocketConnector {
    /// Build a connector for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] if `config.transports` does not allow
    /// WebSocket or the endpoint is not a usable URL.
    pub fn from_config(config: &LobbyConfig) -> Result<Self, LobbyError> {
        if !config.transports.contains(&TransportKind::WebSocket) {
            return Err(LobbyError::Config(
                "the built-in connector requires the WebSocket transport".into(),
            ));
        }
        if config.transports.first() != Some(&TransportKind::WebSocket) && !config.upgrade {
            return Err(LobbyError::Config(
                "WebSocket is not the first transport and upgrades are disabled".into(),
            ));
        }
        socket_url(config.resolved_endpoint(), DEFAULT_SOCKET_PATH)?;
        Ok(Self {
            timeout: config.connect_timeout,
            ..Self::default()
        })
    }

    /// Use a non-default Socket.IO mount path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LobbyError> {
        let transport =
            WebSocketTransport::connect_with_timeout(endpoint, &self.path, self.timeout).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn http_endpoints_map_to_websocket_urls() {
        let url = socket_url("http://localhost:7777", DEFAULT_SOCKET_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:7777/socket.io/?EIO=4&transport=websocket"
        );

        let url = socket_url("https://poker.example.com/lobby?x=1", DEFAULT_SOCKET_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://poker.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn unusable_endpoints_are_config_errors() {
        assert!(matches!(
            socket_url("", DEFAULT_SOCKET_PATH),
            Err(LobbyError::Config(_))
        ));
        assert!(matches!(
            socket_url("ftp://example.com", DEFAULT_SOCKET_PATH),
            Err(LobbyError::Config(_))
        ));
    }

    #[test]
    fn connector_requires_websocket_transport() {
        let config = LobbyConfig::default().with_transports(vec![TransportKind::LongPolling], true);
        assert!(matches!(
            WebSocketConnector::from_config(&config),
            Err(LobbyError::Config(_))
        ));

        let config = LobbyConfig::default().with_transports(
            vec![TransportKind::LongPolling, TransportKind::WebSocket],
            false,
        );
        assert!(WebSocketConnector::from_config(&config).is_err());

        let config = LobbyConfig::default().with_transports(
            vec![TransportKind::LongPolling, TransportKind::WebSocket],
            true,
        );
        assert!(WebSocketConnector::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn connect_failure_is_reported_not_panicked() {
        let connector = WebSocketConnector::default().with_path("/socket.io/");
        // Port 9 (discard) is closed on test machines; any error is acceptable.
        let result = connector.connect("http://127.0.0.1:9").await;
        assert!(result.is_err());
    }
}
