//! The lobby view held by the manager and the transport mode that feeds it.

use std::fmt;

use crate::protocol::{LobbyInfo, PlayerSummary, TableSummary};

/// Which transport is currently authoritative for updating the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionMode {
    /// The push channel is (or is optimistically assumed to be) delivering updates.
    Realtime,
    /// The push channel is down; tables are fetched periodically over HTTP.
    Polling,
    /// Nothing is running.
    #[default]
    Disconnected,
}

impl ConnectionMode {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Realtime => 0,
            Self::Polling => 1,
            Self::Disconnected => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Realtime,
            1 => Self::Polling,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Realtime => "realtime",
            Self::Polling => "polling",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Latest known lobby state.
///
/// Consumers receive snapshots behind an `Arc` and never see one change
/// underneath them: every update produces a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbySnapshot {
    pub tables: Vec<TableSummary>,
    pub players: Vec<PlayerSummary>,
    /// Realtime session id; only present while the snapshot is fed by the push channel.
    pub session_id: Option<String>,
}

impl LobbySnapshot {
    /// Replace everything with a full server snapshot.
    pub(crate) fn apply_lobby_info(&mut self, info: LobbyInfo) {
        self.tables = info.tables;
        self.players = info.players;
        self.session_id = info.socket_id;
    }

    /// Drop everything scoped to the signed-in viewer.
    pub(crate) fn clear_viewer_data(&mut self) {
        self.players.clear();
    }
}

impl From<LobbyInfo> for LobbySnapshot {
    fn from(info: LobbyInfo) -> Self {
        let mut snapshot = Self::default();
        snapshot.apply_lobby_info(info);
        snapshot
    }
}
