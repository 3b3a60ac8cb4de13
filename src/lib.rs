//! # Lobby Link
//!
//! Resilient client for a multiplayer poker lobby service.
//!
//! A [`ConnectionManager`] keeps a live [`LobbySnapshot`] (tables and players)
//! using the lobby's Socket.IO realtime channel whenever it is reachable, and
//! falls back to periodic HTTP polling of the table list while it is not.
//!
//! ## Features
//!
//! - **Realtime first** — the poll timer is cancelled the moment the channel reconnects
//! - **No leaks** — at most one channel and one poll timer exist at any time
//! - **Stale-safe** — late callbacks from replaced channels and timers are ignored
//! - **Transport-agnostic** — implement [`Connector`] and [`TableFetcher`] for any backend
//! - **Built-ins** — `transport-websocket` (Socket.IO over WebSocket) and
//!   `http-polling` (reqwest) features, both on by default
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lobby_link::{ConnectionManager, LobbyConfig, LobbyEvent};
//!
//! let (manager, mut events) = ConnectionManager::with_defaults(LobbyConfig::from_env()?)?;
//! manager.start(None)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let LobbyEvent::ModeChanged(mode) = event {
//!         println!("now {mode}");
//!     }
//! }
//! ```

mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod poller;
pub mod protocol;
pub mod snapshot;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use config::{LobbyConfig, ReconnectPolicy, TransportKind};
pub use error::LobbyError;
pub use event::LobbyEvent;
pub use manager::ConnectionManager;
pub use poller::TableFetcher;
pub use protocol::{ClientEvent, PlayerSummary, ServerEvent, TableId, TableSummary};
pub use snapshot::{ConnectionMode, LobbySnapshot};
pub use transport::{Connector, Transport};

#[cfg(feature = "http-polling")]
pub use transports::HttpTableFetcher;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
