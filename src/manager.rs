//! Connection manager for the lobby service.
//!
//! [`ConnectionManager`] is a thin handle around a background session driver.
//! The driver owns the session state and runs a small state machine over two
//! transports:
//!
//! - the **realtime channel** (push), which the driver prefers whenever it is
//!   connected, and
//! - the **poll timer** (pull), which fetches the table list every
//!   `poll_interval` while the channel is down.
//!
//! The channel keeps retrying on its own while the timer runs. The moment it
//! reconnects, the timer is cancelled in the same step that flips the mode
//! back to [`ConnectionMode::Realtime`]. Every channel and timer is tagged with
//! a generation number, so signals from instances the driver has already
//! replaced or stopped are discarded.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = LobbyConfig::from_env()?;
//! let (manager, mut events) = ConnectionManager::with_defaults(config)?;
//! manager.start(None)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LobbyEvent::ModeChanged(mode) => println!("mode: {mode}"),
//!         LobbyEvent::SnapshotChanged(Some(snapshot)) => println!("{} tables", snapshot.tables.len()),
//!         LobbyEvent::SnapshotChanged(None) => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelHandle, ChannelSignal};
use crate::config::LobbyConfig;
use crate::error::{LobbyError, Result};
use crate::event::LobbyEvent;
use crate::poller::{PollHandle, TableFetcher};
use crate::protocol::{ClientEvent, ServerEvent, TableSummary};
use crate::snapshot::{ConnectionMode, LobbySnapshot};
use crate::transport::Connector;

// ── Internal messages ───────────────────────────────────────────────

/// Reports from the channel and poll tasks, tagged with their generation.
#[derive(Debug)]
pub(crate) enum Signal {
    Channel {
        generation: u64,
        signal: ChannelSignal,
    },
    Poll {
        generation: u64,
        result: Result<Vec<TableSummary>>,
    },
}

/// Requests from the handle to the driver.
#[derive(Debug)]
enum Command {
    Start { auth_token: Option<String> },
    SetAuthToken { auth_token: Option<String> },
    Stop { done: oneshot::Sender<()> },
}

// ── Shared state ────────────────────────────────────────────────────

/// What the handle can read without a round trip to the driver.
struct SharedState {
    mode: AtomicU8,
    snapshot: Mutex<Option<Arc<LobbySnapshot>>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            mode: AtomicU8::new(ConnectionMode::Disconnected.as_u8()),
            snapshot: Mutex::new(None),
        }
    }

    fn mode(&self) -> ConnectionMode {
        ConnectionMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set_mode(&self, mode: ConnectionMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    fn snapshot(&self) -> Option<Arc<LobbySnapshot>> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_snapshot(&self, snapshot: Option<Arc<LobbySnapshot>>) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

// ── Manager handle ──────────────────────────────────────────────────

/// Keeps a best-effort live view of the lobby over a realtime channel, falling
/// back to HTTP polling while the channel is unavailable.
///
/// Created via [`ConnectionManager::new`], which spawns the session driver on
/// the current tokio runtime and returns this handle together with an event
/// receiver. Commands are queued to the driver and return immediately;
/// [`stop`](Self::stop) waits until teardown has finished.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ConnectionManager {
    /// Spawn the session driver and return a handle plus event receiver.
    ///
    /// Nothing connects until [`start`](Self::start) is called.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(
        config: LobbyConfig,
        connector: impl Connector,
        fetcher: impl TableFetcher,
    ) -> (Self, mpsc::Receiver<LobbyEvent>) {
        Self::from_parts(config, Arc::new(connector), Arc::new(fetcher))
    }

    /// Like [`new`](Self::new), for collaborators that are already shared.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn from_parts(
        config: LobbyConfig,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn TableFetcher>,
    ) -> (Self, mpsc::Receiver<LobbyEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state = Arc::new(SharedState::new());
        let shutdown_timeout = config.shutdown_timeout;

        let driver = Driver::new(
            config,
            connector,
            fetcher,
            signal_tx,
            event_tx,
            Arc::clone(&state),
        );
        let task = tokio::spawn(run(driver, cmd_rx, signal_rx, shutdown_rx));

        let manager = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (manager, event_rx)
    }

    /// Build a manager with the WebSocket connector and HTTP table fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] if the configuration cannot be used by
    /// either collaborator.
    #[cfg(all(feature = "transport-websocket", feature = "http-polling"))]
    pub fn with_defaults(config: LobbyConfig) -> Result<(Self, mpsc::Receiver<LobbyEvent>)> {
        let connector = crate::transports::WebSocketConnector::from_config(&config)?;
        let fetcher = crate::transports::HttpTableFetcher::from_config(&config)?;
        Ok(Self::new(config, connector, fetcher))
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Open the realtime channel (if not already open) and request a lobby
    /// snapshot for `auth_token` (`None` = anonymous).
    ///
    /// Idempotent: a second call only updates the token and re-requests.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::ManagerClosed`] after [`shutdown`](Self::shutdown).
    pub fn start(&self, auth_token: Option<String>) -> Result<()> {
        self.send(Command::Start { auth_token })
    }

    /// Switch the viewer identity without restarting the transport.
    ///
    /// Signing out (`None`) clears player data from the snapshot right away;
    /// the server's answer to the new request fills it back in.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::ManagerClosed`] after [`shutdown`](Self::shutdown).
    pub fn set_auth_token(&self, auth_token: Option<String>) -> Result<()> {
        self.send(Command::SetAuthToken { auth_token })
    }

    /// Close the channel, cancel polling and clear the session.
    ///
    /// When this returns no further poll fetch will start and signals from
    /// the closed channel are ignored. Safe to call any number of times.
    pub async fn stop(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop { done }).is_err() {
            debug!("ConnectionManager: stop on a shut-down manager");
            return;
        }
        let _ = done_rx.await;
    }

    /// Stop the session and end the driver task.
    ///
    /// After this, [`start`](Self::start) and
    /// [`set_auth_token`](Self::set_auth_token) return
    /// [`LobbyError::ManagerClosed`] and the event receiver yields `None`.
    pub async fn shutdown(&mut self) {
        debug!("ConnectionManager: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session driver aborted: {join_err}");
                    }
                }
            }
        }

        self.state.set_mode(ConnectionMode::Disconnected);
        self.state.set_snapshot(None);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The latest lobby snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<LobbySnapshot>> {
        self.state.snapshot()
    }

    /// The transport currently authoritative for the snapshot.
    pub fn mode(&self) -> ConnectionMode {
        self.state.mode()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| LobbyError::ManagerClosed)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("mode", &self.mode())
            .field("has_snapshot", &self.snapshot().is_some())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor context for a graceful stop here. Aborting drops the
        // driver, which drops its channel handle (ending that task) and its
        // poll handle (aborting the timer).
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session driver ──────────────────────────────────────────────────

/// The mutable connection state, owned exclusively by the driver.
#[derive(Debug, Default)]
struct Session {
    mode: ConnectionMode,
    snapshot: Option<Arc<LobbySnapshot>>,
    auth_token: Option<String>,
    poll: Option<PollHandle>,
    channel: Option<ChannelHandle>,
}

struct Driver {
    session: Session,
    config: LobbyConfig,
    connector: Arc<dyn Connector>,
    fetcher: Arc<dyn TableFetcher>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    event_tx: mpsc::Sender<LobbyEvent>,
    state: Arc<SharedState>,
    generation: u64,
    /// Events produced by the current step, delivered by [`Driver::flush`].
    outbox: Vec<LobbyEvent>,
    /// Latest mode not yet delivered because the event channel was full.
    pending_mode: Option<ConnectionMode>,
}

async fn run(
    mut driver: Driver,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut signal_rx: mpsc::UnboundedReceiver<Signal>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session driver started");
    let event_tx = driver.event_tx.clone();

    loop {
        let mode_pending = driver.pending_mode.is_some();

        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Start { auth_token }) => driver.start(auth_token),
                Some(Command::SetAuthToken { auth_token }) => driver.set_auth_token(auth_token),
                Some(Command::Stop { done }) => {
                    driver.stop().await;
                    driver.flush();
                    let _ = done.send(());
                }
                None => {
                    driver.stop().await;
                    driver.flush();
                    break;
                }
            },

            Some(signal) = signal_rx.recv() => driver.handle_signal(signal),

            // The consumer made room; hand over the mode it missed.
            permit = event_tx.reserve(), if mode_pending => {
                if let (Ok(permit), Some(mode)) = (permit, driver.pending_mode.take()) {
                    permit.send(LobbyEvent::ModeChanged(mode));
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                driver.stop().await;
                driver.flush();
                break;
            }
        }

        driver.flush();
    }

    debug!("session driver exited");
}

impl Driver {
    fn new(
        config: LobbyConfig,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn TableFetcher>,
        signal_tx: mpsc::UnboundedSender<Signal>,
        event_tx: mpsc::Sender<LobbyEvent>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            session: Session::default(),
            config,
            connector,
            fetcher,
            signal_tx,
            event_tx,
            state,
            generation: 0,
            outbox: Vec::new(),
            pending_mode: None,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    // ── Commands ────────────────────────────────────────────────────

    fn start(&mut self, auth_token: Option<String>) {
        self.session.auth_token = auth_token;

        if self.session.channel.is_none() {
            let generation = self.next_generation();
            let endpoint = self.config.resolved_endpoint().to_string();
            info!(generation, endpoint = %endpoint, "opening realtime channel");
            self.session.channel = Some(ChannelHandle::open(
                Arc::clone(&self.connector),
                endpoint,
                self.config.reconnect.clone(),
                generation,
                self.signal_tx.clone(),
            ));
            // Optimistic; a connect error moves us to polling. A channel
            // reopened while polling stays in polling until it connects.
            if self.session.poll.is_none() {
                self.set_mode(ConnectionMode::Realtime);
            }
        }

        self.request_lobby_info();
    }

    fn set_auth_token(&mut self, auth_token: Option<String>) {
        let signed_out = auth_token.is_none();
        self.session.auth_token = auth_token;

        if signed_out && self.session.snapshot.is_some() {
            self.update_snapshot(LobbySnapshot::clear_viewer_data);
        }

        if self.session.channel.is_some() {
            self.request_lobby_info();
        } else {
            debug!("session not started; token stored for the next start");
        }
    }

    async fn stop(&mut self) {
        if let Some(channel) = self.session.channel.take() {
            info!(
                generation = channel.generation(),
                connected = channel.is_connected(),
                "closing realtime channel"
            );
            channel.close();
        }

        if let Some(poll) = self.session.poll.take() {
            poll.shutdown().await;
        }

        self.session.auth_token = None;
        if self.session.snapshot.take().is_some() {
            self.state.set_snapshot(None);
            self.outbox.push(LobbyEvent::SnapshotChanged(None));
        }
        self.set_mode(ConnectionMode::Disconnected);
    }

    /// Ask the server for a full snapshot now, or on the next connect.
    fn request_lobby_info(&self) {
        let Some(channel) = &self.session.channel else {
            return;
        };
        if channel.is_connected() {
            debug!(
                generation = channel.generation(),
                anonymous = self.session.auth_token.is_none(),
                "requesting lobby info"
            );
            channel.emit(ClientEvent::FetchLobbyInfo {
                token: self.session.auth_token.clone(),
            });
        } else {
            trace!(
                generation = channel.generation(),
                "channel not connected; lobby info requested on connect"
            );
        }
    }

    // ── Signals ─────────────────────────────────────────────────────

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Channel { generation, signal } => self.handle_channel(generation, signal),
            Signal::Poll { generation, result } => self.handle_poll(generation, result),
        }
    }

    fn handle_channel(&mut self, generation: u64, signal: ChannelSignal) {
        let Some(channel) = self
            .session
            .channel
            .as_mut()
            .filter(|channel| channel.generation() == generation)
        else {
            trace!(generation, "discarding signal from a superseded channel");
            return;
        };

        match signal {
            ChannelSignal::Connected => {
                let reconnect = channel.mark_connected();
                if let Some(poll) = self.session.poll.take() {
                    info!(
                        generation,
                        poll_generation = poll.generation(),
                        "realtime channel available; polling stopped"
                    );
                    drop(poll);
                }
                self.set_mode(ConnectionMode::Realtime);
                if reconnect {
                    info!(generation, "realtime channel reconnected; resyncing lobby");
                }
                self.request_lobby_info();
            }
            ChannelSignal::ConnectError(reason) => {
                channel.mark_disconnected();
                warn!(generation, %reason, "realtime channel unavailable");
                self.enter_polling();
            }
            ChannelSignal::Disconnected(reason) => {
                channel.mark_disconnected();
                warn!(
                    generation,
                    reason = reason.as_deref().unwrap_or("closed by server"),
                    "realtime channel lost"
                );
                self.enter_polling();
            }
            ChannelSignal::Event(event) => self.apply_server_event(event),
            ChannelSignal::Closed => {
                warn!(generation, "realtime channel stopped retrying; polling until restarted");
                self.session.channel = None;
                self.enter_polling();
            }
        }
    }

    fn apply_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::LobbyInfoReceived(info) => {
                debug!(
                    tables = info.tables.len(),
                    players = info.players.len(),
                    "lobby info received"
                );
                self.update_snapshot(|snapshot| snapshot.apply_lobby_info(info));
            }
            ServerEvent::PlayersUpdated(players) => {
                debug!(players = players.len(), "players updated");
                self.update_snapshot(|snapshot| snapshot.players = players);
            }
            ServerEvent::TablesUpdated(tables) => {
                debug!(tables = tables.len(), "tables updated");
                self.update_snapshot(|snapshot| snapshot.tables = tables);
            }
        }
    }

    fn enter_polling(&mut self) {
        if self.session.poll.is_none() {
            let generation = self.next_generation();
            let interval = self.config.effective_poll_interval();
            info!(generation, ?interval, "falling back to polling");
            self.session.poll = Some(PollHandle::spawn(
                Arc::clone(&self.fetcher),
                interval,
                generation,
                self.signal_tx.clone(),
            ));
        }
        self.set_mode(ConnectionMode::Polling);

        let has_session_id = self
            .session
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.session_id.is_some());
        if has_session_id {
            self.update_snapshot(|snapshot| snapshot.session_id = None);
        }
    }

    fn handle_poll(&mut self, generation: u64, result: Result<Vec<TableSummary>>) {
        if self.session.poll.as_ref().map(PollHandle::generation) != Some(generation) {
            trace!(generation, "discarding result from a cancelled poll timer");
            return;
        }

        match result {
            Ok(tables) => {
                trace!(generation, tables = tables.len(), "poll succeeded");
                self.update_snapshot(|snapshot| snapshot.tables = tables);
            }
            Err(e) => {
                warn!(generation, "lobby poll failed, keeping previous snapshot: {e}");
            }
        }
    }

    // ── State updates ───────────────────────────────────────────────

    fn set_mode(&mut self, mode: ConnectionMode) {
        if self.session.mode == mode {
            return;
        }
        debug!(from = %self.session.mode, to = %mode, "connection mode changed");
        self.session.mode = mode;
        self.state.set_mode(mode);
        self.outbox.push(LobbyEvent::ModeChanged(mode));
    }

    /// Build the next snapshot from the current one and publish it whole.
    fn update_snapshot(&mut self, update: impl FnOnce(&mut LobbySnapshot)) {
        let mut next = self.session.snapshot.as_deref().cloned().unwrap_or_default();
        update(&mut next);
        if self.session.snapshot.as_deref() == Some(&next) {
            return;
        }

        let next = Arc::new(next);
        self.session.snapshot = Some(Arc::clone(&next));
        self.state.set_snapshot(Some(Arc::clone(&next)));
        self.outbox.push(LobbyEvent::SnapshotChanged(Some(next)));
    }

    /// Deliver the events queued by the last step without waiting on the
    /// consumer.
    ///
    /// Snapshot events are dropped when the consumer falls behind. Mode
    /// changes that do not fit are coalesced into `pending_mode` and handed
    /// over by the run loop once there is room, so the consumer always ends
    /// up seeing the latest mode. [`ConnectionManager::snapshot`] and
    /// [`ConnectionManager::mode`] are current either way.
    fn flush(&mut self) {
        for event in std::mem::take(&mut self.outbox) {
            match event {
                LobbyEvent::ModeChanged(mode) => {
                    if self.pending_mode.is_some() {
                        self.pending_mode = Some(mode);
                        continue;
                    }
                    match self.event_tx.try_send(event) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!(%mode, "event channel full, deferring mode event");
                            self.pending_mode = Some(mode);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            trace!("event receiver dropped");
                        }
                    }
                }
                LobbyEvent::SnapshotChanged(_) => match self.event_tx.try_send(event) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("event channel full, dropping snapshot event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        trace!("event receiver dropped");
                    }
                },
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{LobbyInfo, PlayerSummary};
    use crate::transport::Transport;
    use async_trait::async_trait;

    // ── Mock collaborators ──────────────────────────────────────────

    /// A connector whose attempts never finish; tests drive the channel by
    /// injecting signals directly.
    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>> {
            std::future::pending().await
        }
    }

    /// A fetcher whose requests never finish.
    struct StalledFetcher;

    #[async_trait]
    impl TableFetcher for StalledFetcher {
        async fn fetch_tables(&self) -> Result<Vec<TableSummary>> {
            std::future::pending().await
        }
    }

    fn driver() -> (Driver, mpsc::Receiver<LobbyEvent>) {
        let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(64);
        let driver = Driver::new(
            LobbyConfig::default(),
            Arc::new(StalledConnector),
            Arc::new(StalledFetcher),
            signal_tx,
            event_tx,
            Arc::new(SharedState::new()),
        );
        (driver, event_rx)
    }

    fn channel_signal(driver: &mut Driver, generation: u64, signal: ChannelSignal) {
        driver.handle_signal(Signal::Channel { generation, signal });
    }

    fn current_channel(driver: &Driver) -> u64 {
        driver.session.channel.as_ref().unwrap().generation()
    }

    fn lobby_info() -> ServerEvent {
        ServerEvent::LobbyInfoReceived(LobbyInfo {
            tables: vec![TableSummary::new(1, "T1")],
            players: vec![PlayerSummary::new("p1", "Ann")],
            socket_id: Some("sid-1".into()),
        })
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_is_optimistically_realtime_and_idempotent() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let first = current_channel(&driver);
        assert_eq!(driver.session.mode, ConnectionMode::Realtime);

        driver.start(Some("tok".into()));
        assert_eq!(current_channel(&driver), first);
        assert_eq!(driver.session.auth_token.as_deref(), Some("tok"));
        assert_eq!(
            driver.outbox,
            vec![LobbyEvent::ModeChanged(ConnectionMode::Realtime)]
        );
    }

    #[tokio::test]
    async fn repeated_failures_keep_a_single_poll_timer() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);

        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        let poll = driver.session.poll.as_ref().unwrap().generation();

        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        channel_signal(&mut driver, generation, ChannelSignal::Disconnected(None));
        assert_eq!(driver.session.poll.as_ref().unwrap().generation(), poll);
        assert_eq!(driver.session.mode, ConnectionMode::Polling);
    }

    #[tokio::test]
    async fn connect_cancels_polling_in_the_same_step() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        assert!(driver.session.poll.is_some());

        channel_signal(&mut driver, generation, ChannelSignal::Connected);
        assert!(driver.session.poll.is_none());
        assert_eq!(driver.session.mode, ConnectionMode::Realtime);
        assert_eq!(driver.state.mode(), ConnectionMode::Realtime);
    }

    #[tokio::test]
    async fn results_from_a_cancelled_poll_are_discarded() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        let poll = driver.session.poll.as_ref().unwrap().generation();
        channel_signal(&mut driver, generation, ChannelSignal::Connected);

        driver.handle_signal(Signal::Poll {
            generation: poll,
            result: Ok(vec![TableSummary::new(9, "late")]),
        });
        assert!(driver.session.snapshot.is_none());
    }

    #[tokio::test]
    async fn signals_from_a_stopped_channel_are_ignored() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let old = current_channel(&driver);
        channel_signal(&mut driver, old, ChannelSignal::Connected);

        driver.stop().await;
        driver.start(None);
        let new = current_channel(&driver);
        assert_ne!(old, new);

        channel_signal(&mut driver, old, ChannelSignal::Event(lobby_info()));
        channel_signal(&mut driver, old, ChannelSignal::Disconnected(None));
        assert!(driver.session.snapshot.is_none());
        assert!(driver.session.poll.is_none());
        assert_eq!(driver.session.mode, ConnectionMode::Realtime);
    }

    #[tokio::test]
    async fn failed_polls_keep_the_previous_snapshot() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        let poll = driver.session.poll.as_ref().unwrap().generation();

        driver.handle_signal(Signal::Poll {
            generation: poll,
            result: Ok(vec![TableSummary::new(1, "T1")]),
        });
        let before = driver.session.snapshot.clone().unwrap();

        driver.handle_signal(Signal::Poll {
            generation: poll,
            result: Err(LobbyError::Fetch("502".into())),
        });
        assert!(Arc::ptr_eq(&before, driver.session.snapshot.as_ref().unwrap()));
    }

    #[tokio::test]
    async fn polling_drops_the_realtime_session_id() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::Connected);
        channel_signal(&mut driver, generation, ChannelSignal::Event(lobby_info()));
        assert_eq!(
            driver.session.snapshot.as_ref().unwrap().session_id.as_deref(),
            Some("sid-1")
        );

        channel_signal(&mut driver, generation, ChannelSignal::Disconnected(None));
        let snapshot = driver.session.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.players.len(), 1);
    }

    #[tokio::test]
    async fn sign_out_clears_players_before_the_server_answers() {
        let (mut driver, _events) = driver();
        driver.start(Some("tok1".into()));
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::Connected);
        channel_signal(&mut driver, generation, ChannelSignal::Event(lobby_info()));

        driver.set_auth_token(None);
        let snapshot = driver.session.snapshot.as_ref().unwrap();
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.tables, vec![TableSummary::new(1, "T1")]);
        assert_eq!(driver.session.auth_token, None);
    }

    #[tokio::test]
    async fn identical_updates_emit_nothing() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::Connected);
        channel_signal(&mut driver, generation, ChannelSignal::Event(lobby_info()));
        driver.outbox.clear();

        channel_signal(&mut driver, generation, ChannelSignal::Event(lobby_info()));
        assert!(driver.outbox.is_empty());
    }

    #[tokio::test]
    async fn exhausted_channel_is_reopened_by_the_next_start() {
        let (mut driver, _events) = driver();
        driver.start(None);
        let first = current_channel(&driver);
        channel_signal(&mut driver, first, ChannelSignal::ConnectError("refused".into()));
        channel_signal(&mut driver, first, ChannelSignal::Closed);
        assert!(driver.session.channel.is_none());
        assert!(driver.session.poll.is_some());
        assert_eq!(driver.session.mode, ConnectionMode::Polling);

        driver.start(None);
        let second = current_channel(&driver);
        assert_ne!(first, second);
        assert!(driver.session.poll.is_some());
        assert_eq!(driver.session.mode, ConnectionMode::Polling);

        channel_signal(&mut driver, second, ChannelSignal::Connected);
        assert!(driver.session.poll.is_none());
        assert_eq!(driver.session.mode, ConnectionMode::Realtime);
    }

    #[tokio::test]
    async fn full_event_channel_coalesces_mode_changes() {
        let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
        let (event_tx, mut events) = mpsc::channel(1);
        let mut driver = Driver::new(
            LobbyConfig::default(),
            Arc::new(StalledConnector),
            Arc::new(StalledFetcher),
            signal_tx,
            event_tx,
            Arc::new(SharedState::new()),
        );

        driver.start(None);
        driver.flush();
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        driver.flush();
        channel_signal(&mut driver, generation, ChannelSignal::Connected);
        driver.flush();
        driver.stop().await;
        driver.flush();

        assert_eq!(driver.pending_mode, Some(ConnectionMode::Disconnected));
        assert_eq!(driver.state.mode(), ConnectionMode::Disconnected);
        assert_eq!(
            events.try_recv().unwrap(),
            LobbyEvent::ModeChanged(ConnectionMode::Realtime)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_twice_is_a_no_op() {
        let (mut driver, mut events) = driver();
        driver.start(None);
        let generation = current_channel(&driver);
        channel_signal(&mut driver, generation, ChannelSignal::ConnectError("refused".into()));
        driver.stop().await;
        driver.flush();
        while events.try_recv().is_ok() {}

        driver.stop().await;
        driver.flush();
        assert!(events.try_recv().is_err());
        assert_eq!(driver.session.mode, ConnectionMode::Disconnected);
        assert!(driver.session.channel.is_none());
        assert!(driver.session.poll.is_none());
    }
}
