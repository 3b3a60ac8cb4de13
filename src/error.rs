//! Error types for the lobby client.
//!
//! Most of these never reach the caller of [`ConnectionManager`](crate::ConnectionManager):
//! transport and fetch failures are absorbed by the session driver and turned
//! into mode changes or log lines. They surface directly only from the
//! collaborator traits and from configuration helpers.

use thiserror::Error;

/// Errors that can occur inside the lobby client and its collaborators.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// The server sent a frame that does not follow the Socket.IO / Engine.IO framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP table fetch used by the polling fallback failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The configuration cannot be used as given.
    #[error("configuration error: {0}")]
    Config(String),

    /// The manager's session driver is no longer running.
    #[error("connection manager has shut down")]
    ManagerClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for lobby client operations.
pub type Result<T> = std::result::Result<T, LobbyError>;
