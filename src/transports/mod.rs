//! Built-in collaborators for the [`ConnectionManager`](crate::ConnectionManager).
//!
//! Enable the corresponding Cargo feature to pull one in:
//!
//! | Feature               | Provides                                             |
//! |-----------------------|------------------------------------------------------|
//! | `transport-websocket` | [`WebSocketTransport`], [`WebSocketConnector`]        |
//! | `http-polling`        | [`HttpTableFetcher`]                                 |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), lobby_link::LobbyError> {
//! use lobby_link::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("http://localhost:7777").await?;
//! ws.send(r#"["fetch-lobby-info",null]"#.to_string()).await?;
//!
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod engine_io;
#[cfg(feature = "http-polling")]
pub mod http;
#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "http-polling")]
pub use http::HttpTableFetcher;
#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
