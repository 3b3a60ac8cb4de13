//! Transport abstraction for the lobby's realtime channel.
//!
//! The [`Transport`] trait is a bidirectional text frame channel carrying
//! Socket.IO event arrays (`["tables-updated", [...]]`). Framing below that
//! level (Engine.IO packet prefixes, ping/pong) is the transport's business.
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, the lobby channel reconnects on its own after a
//! failure, so it needs a way to build fresh transports. That is the job of
//! [`Connector`]: each call to [`connect`](Connector::connect) returns a new,
//! fully handshaken transport or the error that prevented it.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lobby_link::error::LobbyError;
//! use lobby_link::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), LobbyError> {
//!         // Write the event array to the wire
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
//!         // Return None when the server closed the session cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LobbyError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LobbyError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LobbyError;

/// A bidirectional text frame transport for the lobby's realtime channel.
///
/// Each call to [`send`](Transport::send) transmits one complete Socket.IO
/// event array. Each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// channel task uses it inside `tokio::select!`. Channel-based
/// implementations (e.g., wrapping `mpsc::UnboundedReceiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send an event array to the server.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, frame: String) -> Result<(), LobbyError>;

    /// Receive the next event array from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete event array was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the server ended the session cleanly
    async fn recv(&mut self) -> Option<Result<String, LobbyError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), LobbyError>;
}

/// Opens new [`Transport`]s on demand.
///
/// The realtime channel calls this once per connection attempt, including
/// every automatic retry after a failure.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connected, handshaken transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Any error is reported to the manager as a connect error and drives it
    /// into polling mode.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LobbyError>;
}

