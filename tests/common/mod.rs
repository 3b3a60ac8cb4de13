#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for lobby-link integration tests.
//!
//! Provides a scriptable [`MockConnector`] (each connection attempt waits for
//! the test to accept or refuse it), a [`MockFetcher`] with a scripted queue
//! of poll results, and helpers for building server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lobby_link::protocol::{LobbyInfo, ServerEvent};
use lobby_link::{
    Connector, LobbyError, LobbyEvent, PlayerSummary, TableFetcher, TableSummary, Transport,
};
use tokio::sync::{mpsc, Mutex};

/// How long helpers wait for something to happen before failing the test.
pub const WAIT: Duration = Duration::from_secs(5);

// ── MockConnector ───────────────────────────────────────────────────

enum Outcome {
    Refuse(String),
    Accept(MockTransport),
}

/// A connector whose attempts block until the test decides their outcome
/// through the paired [`ConnectorControl`].
pub struct MockConnector {
    outcomes: Arc<Mutex<mpsc::UnboundedReceiver<Outcome>>>,
    attempts: Arc<AtomicUsize>,
}

/// Test-side control for a [`MockConnector`].
pub struct ConnectorControl {
    outcomes: mpsc::UnboundedSender<Outcome>,
    attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> (Self, ConnectorControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = Self {
            outcomes: Arc::new(Mutex::new(rx)),
            attempts: Arc::clone(&attempts),
        };
        (
            connector,
            ConnectorControl {
                outcomes: tx,
                attempts,
            },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>, LobbyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().await;
        match outcomes.recv().await {
            Some(Outcome::Accept(transport)) => Ok(Box::new(transport)),
            Some(Outcome::Refuse(reason)) => Err(LobbyError::TransportReceive(reason)),
            None => std::future::pending().await,
        }
    }
}

impl ConnectorControl {
    /// Fail the next connection attempt.
    pub fn refuse(&self, reason: &str) {
        self.outcomes
            .send(Outcome::Refuse(reason.to_string()))
            .unwrap();
    }

    /// Let the next connection attempt succeed and return the server side.
    pub fn accept(&self) -> MockServer {
        let (transport, server) = MockTransport::pair();
        self.outcomes.send(Outcome::Accept(transport)).unwrap();
        server
    }

    /// How many connection attempts have started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// Client side of an in-memory connection. `None` from the server side means
/// the server closed the connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Option<String>>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Server side of an in-memory connection.
pub struct MockServer {
    outgoing: mpsc::UnboundedSender<Option<String>>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    fn pair() -> (Self, MockServer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                incoming: out_rx,
                sent: sent_tx,
                closed: Arc::clone(&closed),
            },
            MockServer {
                outgoing: out_tx,
                sent: sent_rx,
                closed,
            },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), LobbyError> {
        self.sent.send(frame).map_err(|_| LobbyError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        match self.incoming.recv().await {
            Some(Some(frame)) => Some(Ok(frame)),
            Some(None) => None,
            // Server handle dropped; stay quiet until the client closes.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MockServer {
    /// Deliver a frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.outgoing.send(Some(frame.into()));
    }

    /// Drop the connection from the server side.
    pub fn push_close(&self) {
        let _ = self.outgoing.send(None);
    }

    /// The next frame the client sent.
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side dropped")
    }

    /// A frame the client already sent, if any.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── MockFetcher ─────────────────────────────────────────────────────

/// A table fetcher that replays a scripted queue of results and fails once
/// the queue is empty.
#[derive(Clone, Default)]
pub struct MockFetcher {
    script: Arc<StdMutex<VecDeque<Result<Vec<TableSummary>, LobbyError>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, tables: Vec<TableSummary>) {
        self.script.lock().unwrap().push_back(Ok(tables));
    }

    pub fn push_err(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(LobbyError::Fetch(reason.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableFetcher for MockFetcher {
    async fn fetch_tables(&self) -> Result<Vec<TableSummary>, LobbyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LobbyError::Fetch("503 Service Unavailable".into())))
    }
}

// ── Frame helpers ───────────────────────────────────────────────────

pub fn table(id: u64, name: &str) -> TableSummary {
    TableSummary {
        max_players: 6,
        small_blind: 1.0,
        big_blind: 2.0,
        limit: 200.0,
        ..TableSummary::new(id, name)
    }
}

pub fn player(id: &str, name: &str) -> PlayerSummary {
    PlayerSummary {
        bankroll: 1000.0,
        ..PlayerSummary::new(id, name)
    }
}

/// A `lobby-info-received` event array.
pub fn lobby_info_frame(
    tables: Vec<TableSummary>,
    players: Vec<PlayerSummary>,
    socket_id: Option<&str>,
) -> String {
    ServerEvent::LobbyInfoReceived(LobbyInfo {
        tables,
        players,
        socket_id: socket_id.map(Into::into),
    })
    .encode()
    .expect("lobby_info_frame serialization")
}

/// A `tables-updated` event array.
pub fn tables_frame(tables: Vec<TableSummary>) -> String {
    ServerEvent::TablesUpdated(tables)
        .encode()
        .expect("tables_frame serialization")
}

/// A `players-updated` event array.
pub fn players_frame(players: Vec<PlayerSummary>) -> String {
    ServerEvent::PlayersUpdated(players)
        .encode()
        .expect("players_frame serialization")
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive events until one matches `predicate`, returning it.
pub async fn wait_for(
    events: &mut mpsc::Receiver<LobbyEvent>,
    mut predicate: impl FnMut(&LobbyEvent) -> bool,
) -> LobbyEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Receive events until the mode changes to `mode`.
pub async fn wait_for_mode(events: &mut mpsc::Receiver<LobbyEvent>, mode: lobby_link::ConnectionMode) {
    wait_for(events, |event| *event == LobbyEvent::ModeChanged(mode)).await;
}
