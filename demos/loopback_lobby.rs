//! # Loopback Lobby Example
//!
//! Shows how to plug custom collaborators into [`ConnectionManager`]: a
//! [`Connector`] whose connections are in-process channels, and a
//! [`TableFetcher`] that serves a fixed table list. The first connection
//! attempt is refused, so the manager polls; the second succeeds, and the
//! fake server answers `fetch-lobby-info` with a full snapshot.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_lobby
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lobby_link::protocol::{ClientEvent, LobbyInfo, ServerEvent};
use lobby_link::{
    ConnectionManager, ConnectionMode, Connector, LobbyConfig, LobbyError, LobbyEvent,
    PlayerSummary, ReconnectPolicy, TableFetcher, TableSummary, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport and the connector that hands it out
// ─────────────────────────────────────────────────────────────────────

/// Client half of an in-process connection.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), LobbyError> {
        self.tx
            .send(frame)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    /// `None` once the fake server drops its sender.
    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        Ok(())
    }
}

/// Refuses the first attempt, then serves every connection from a fake
/// lobby task.
#[derive(Default)]
struct LoopbackConnector {
    attempts: AtomicUsize,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LobbyError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(LobbyError::TransportReceive(format!(
                "{endpoint} is still starting up"
            )));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_lobby(server_rx, server_tx));
        Ok(Box::new(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: The fake server and a fixed table list for polling
// ─────────────────────────────────────────────────────────────────────

fn tables() -> Vec<TableSummary> {
    vec![
        TableSummary {
            max_players: 6,
            small_blind: 1.0,
            big_blind: 2.0,
            ..TableSummary::new(1, "Sydney")
        },
        TableSummary {
            max_players: 9,
            small_blind: 5.0,
            big_blind: 10.0,
            ..TableSummary::new(2, "Monte Carlo")
        },
    ]
}

async fn fake_lobby(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) -> Result<(), LobbyError> {
    while let Some(frame) = rx.recv().await {
        tracing::info!("Server received: {frame}");
        match ClientEvent::decode(&frame)? {
            Some(ClientEvent::FetchLobbyInfo { token }) => {
                let players = match token {
                    Some(_) => vec![PlayerSummary::new("p1", "Ann")],
                    None => vec![],
                };
                let reply = ServerEvent::LobbyInfoReceived(LobbyInfo {
                    tables: tables(),
                    players,
                    socket_id: Some("loopback-1".into()),
                });
                if tx.send(reply.encode()?).is_err() {
                    break;
                }
            }
            Some(ClientEvent::DisconnectNotice) => break,
            None => {}
        }
    }
    Ok(())
}

struct FixedFetcher;

#[async_trait]
impl TableFetcher for FixedFetcher {
    async fn fetch_tables(&self) -> Result<Vec<TableSummary>, LobbyError> {
        Ok(tables())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Run the manager against them
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = LobbyConfig::new("http://loopback.invalid")
        .with_poll_interval(Duration::from_millis(200))
        .with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(500),
            ..ReconnectPolicy::default()
        });
    let (mut manager, mut event_rx) =
        ConnectionManager::new(config, LoopbackConnector::default(), FixedFetcher);
    manager.start(Some("demo-token".into()))?;

    let mut seen_polling = false;
    while let Some(event) = event_rx.recv().await {
        match event {
            LobbyEvent::ModeChanged(mode) => {
                tracing::info!("Mode: {mode}");
                seen_polling |= mode == ConnectionMode::Polling;
            }
            LobbyEvent::SnapshotChanged(Some(snapshot)) => {
                tracing::info!(
                    "Snapshot: {} table(s), {} player(s), session {:?}",
                    snapshot.tables.len(),
                    snapshot.players.len(),
                    snapshot.session_id
                );
                if seen_polling && !snapshot.players.is_empty() {
                    break;
                }
            }
            LobbyEvent::SnapshotChanged(None) => {}
        }
    }

    manager.shutdown().await;
    tracing::info!("Done. Fell back to polling and recovered to realtime.");
    Ok(())
}
