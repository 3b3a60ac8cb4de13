//! Configuration for a [`ConnectionManager`](crate::ConnectionManager).
//!
//! # Example
//!
//! ```
//! use lobby_link::config::LobbyConfig;
//! use std::time::Duration;
//!
//! let config = LobbyConfig::new("https://poker.example.com")
//!     .with_poll_interval(Duration::from_secs(5))
//!     .with_event_channel_capacity(64);
//! assert_eq!(config.resolved_endpoint(), "https://poker.example.com");
//! ```

use std::time::Duration;

use crate::error::{LobbyError, Result};

/// Default interval between polling fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Address used when `endpoint` is empty (the client's own origin).
pub const DEFAULT_ORIGIN: &str = "http://localhost:7777";

/// Path of the HTTP table listing used by the polling fallback.
pub const DEFAULT_TABLES_ENDPOINT: &str = "/api/tables";

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Transports the realtime channel may use, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Socket.IO over a WebSocket.
    WebSocket,
    /// Engine.IO HTTP long-polling. Recognized but not implemented by the
    /// built-in connector; the manager's own HTTP poller is the fallback.
    LongPolling,
}

/// Automatic reconnection of the realtime channel.
///
/// The delay starts at `initial_delay` and doubles after every failed attempt
/// up to `max_delay`. A successful connection resets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether the channel retries at all after a connect error or disconnect.
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect; the manager keeps polling once the channel drops.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` if the policy
    /// says to stop.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max_delay))
    }
}

/// Configuration for a lobby connection.
///
/// All fields have defaults; [`LobbyConfig::default`] connects to
/// [`DEFAULT_ORIGIN`].
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Realtime service address. Empty means "same origin", i.e. [`origin`](Self::origin).
    pub endpoint: String,
    /// Fallback address used when `endpoint` is empty.
    pub origin: String,
    /// Table listing for the polling fallback, absolute or relative to the endpoint.
    pub tables_endpoint: String,
    /// Interval between polling fetches. Defaults to **3000 ms**; clamped to at least 1 ms.
    pub poll_interval: Duration,
    /// Allowed realtime transports, most preferred first. Defaults to WebSocket only.
    pub transports: Vec<TransportKind>,
    /// Whether the realtime channel may upgrade from its first transport to a
    /// later one. Defaults to `false`.
    pub upgrade: bool,
    pub reconnect: ReconnectPolicy,
    /// Timeout for one realtime connection attempt, handshake included.
    pub connect_timeout: Duration,
    /// Timeout for one polling request.
    pub request_timeout: Duration,
    /// Capacity of the bounded event channel. Defaults to **256**; clamped to at least 1.
    ///
    /// Snapshot events are dropped with a warning when the consumer falls
    /// behind; mode changes are coalesced to the latest mode and delivered
    /// once there is room. The manager never waits on the consumer.
    pub event_channel_capacity: usize,
    /// Time [`ConnectionManager::shutdown`](crate::ConnectionManager::shutdown)
    /// waits for the session driver before aborting it.
    pub shutdown_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            origin: DEFAULT_ORIGIN.to_string(),
            tables_endpoint: DEFAULT_TABLES_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            transports: vec![TransportKind::WebSocket],
            upgrade: false,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl LobbyConfig {
    /// Create a configuration for the given realtime endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from the environment.
    ///
    /// Reads `LOBBY_SERVER_URI` (empty or unset = same origin),
    /// `LOBBY_TABLES_ENDPOINT` and `LOBBY_POLL_INTERVAL_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] if `LOBBY_POLL_INTERVAL_MS` is not a number.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(std::env::var("LOBBY_SERVER_URI").unwrap_or_default());
        if let Ok(tables) = std::env::var("LOBBY_TABLES_ENDPOINT") {
            config.tables_endpoint = tables;
        }
        if let Ok(raw) = std::env::var("LOBBY_POLL_INTERVAL_MS") {
            let millis: u64 = raw.trim().parse().map_err(|e| {
                LobbyError::Config(format!("LOBBY_POLL_INTERVAL_MS={raw:?}: {e}"))
            })?;
            config = config.with_poll_interval(Duration::from_millis(millis));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    #[must_use]
    pub fn with_tables_endpoint(mut self, tables_endpoint: impl Into<String>) -> Self {
        self.tables_endpoint = tables_endpoint.into();
        self
    }

    /// Set the polling interval. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    #[must_use]
    pub fn with_transports(mut self, transports: Vec<TransportKind>, upgrade: bool) -> Self {
        self.transports = transports;
        self.upgrade = upgrade;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The realtime address actually dialled: `endpoint`, or `origin` when empty.
    pub fn resolved_endpoint(&self) -> &str {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            self.origin.trim()
        } else {
            endpoint
        }
    }

    /// Poll interval with the lower bound applied, for configs built by field assignment.
    pub(crate) fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}
