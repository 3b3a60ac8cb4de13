//! # Lobby Watch Example
//!
//! Watches a lobby server and logs every table and player change:
//!
//! 1. Load configuration from the environment
//! 2. Start the manager anonymously (or with `LOBBY_TOKEN`)
//! 3. Log mode changes as the client moves between realtime and polling
//! 4. Shut down gracefully on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a lobby server on localhost:7777, then:
//! cargo run --example lobby_watch
//!
//! # Point at another server and poll faster while it is unreachable:
//! LOBBY_SERVER_URI=https://poker.example.com LOBBY_POLL_INTERVAL_MS=1000 \
//!     cargo run --example lobby_watch
//! ```

use lobby_link::{ConnectionManager, LobbyConfig, LobbyEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=lobby_link=debug` for the manager's state transitions.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = LobbyConfig::from_env()?;
    tracing::info!("Watching lobby at {}", config.resolved_endpoint());

    let (mut manager, mut event_rx) = ConnectionManager::with_defaults(config)?;
    manager.start(std::env::var("LOBBY_TOKEN").ok())?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    LobbyEvent::ModeChanged(mode) => {
                        tracing::info!("Connection mode: {mode}");
                    }
                    LobbyEvent::SnapshotChanged(Some(snapshot)) => {
                        tracing::info!(
                            "{} table(s), {} player(s) online",
                            snapshot.tables.len(),
                            snapshot.players.len()
                        );
                        for table in &snapshot.tables {
                            tracing::info!(
                                "  #{} {}: {}/{} seated, blinds {}/{}",
                                table.id,
                                table.name,
                                table.current_number_of_players,
                                table.max_players,
                                table.small_blind,
                                table.big_blind
                            );
                        }
                    }
                    LobbyEvent::SnapshotChanged(None) => {
                        tracing::info!("Snapshot cleared");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    manager.shutdown().await;
    tracing::info!("Manager shut down. Goodbye!");
    Ok(())
}
