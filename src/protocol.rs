//! Wire types for the lobby service's realtime and HTTP interfaces.
//!
//! Application events travel as Socket.IO event arrays: a JSON array whose
//! first element is the event name and whose optional second element is the
//! payload, e.g. `["tables-updated", [{"id": 1, "name": "High rollers"}]]`.
//! Payload objects use camelCase keys. Fields this crate does not model are
//! kept in `extra` so that nothing the server sends is silently lost.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{LobbyError, Result};

// ── Event names ─────────────────────────────────────────────────────

/// Client → server: request a full lobby snapshot for a (possibly absent) token.
pub const FETCH_LOBBY_INFO: &str = "fetch-lobby-info";
/// Client → server: sent right before the client closes the channel.
pub const DISCONNECT_NOTICE: &str = "disconnect-notice";
/// Server → client: full lobby snapshot.
pub const LOBBY_INFO_RECEIVED: &str = "lobby-info-received";
/// Server → client: replacement player list.
pub const PLAYERS_UPDATED: &str = "players-updated";
/// Server → client: replacement table list.
pub const TABLES_UPDATED: &str = "tables-updated";

// ── Summaries ───────────────────────────────────────────────────────

/// Table identifier. Numeric on most deployments; document-store backends
/// send string ids instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableId {
    Number(u64),
    Text(String),
}

impl Default for TableId {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl From<u64> for TableId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<String> for TableId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<&str> for TableId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Lobby-level description of one poker table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableSummary {
    pub id: TableId,
    pub name: String,
    pub limit: f64,
    pub max_players: u32,
    pub current_number_of_players: u32,
    pub small_blind: f64,
    pub big_blind: f64,
    /// Fields the server sent that are not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TableSummary {
    /// Create a summary with the given numeric id and name and every other
    /// field defaulted.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: TableId::Number(id),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Lobby-level description of one connected player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: String,
    pub socket_id: String,
    pub name: String,
    pub bankroll: f64,
    /// Fields the server sent that are not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerSummary {
    /// Create a summary with the given id and name and every other field defaulted.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Payload of [`LOBBY_INFO_RECEIVED`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tables: Vec<TableSummary>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub players: Vec<PlayerSummary>,
    /// Realtime session id the server assigned to this connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

/// The server sends `null` rather than `[]` for lists it has not populated yet.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── Events ──────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Ask for a full lobby snapshot. `None` requests the anonymous view.
    FetchLobbyInfo { token: Option<String> },
    /// Tell the server the client is going away on purpose.
    DisconnectNotice,
}

impl ClientEvent {
    /// The Socket.IO event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchLobbyInfo { .. } => FETCH_LOBBY_INFO,
            Self::DisconnectNotice => DISCONNECT_NOTICE,
        }
    }

    /// Encode as a Socket.IO event array.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Serialization`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let frame = match self {
            Self::FetchLobbyInfo { token } => {
                serde_json::json!([self.name(), token])
            }
            Self::DisconnectNotice => serde_json::json!([self.name()]),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Decode a Socket.IO event array.
    ///
    /// Returns `Ok(None)` for well-formed events outside the lobby vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not an event array or a known event
    /// carries a malformed payload.
    pub fn decode(frame: &str) -> Result<Option<Self>> {
        let (name, data) = split_event(frame)?;
        let event = match name.as_str() {
            FETCH_LOBBY_INFO => Self::FetchLobbyInfo {
                token: serde_json::from_value(data)?,
            },
            DISCONNECT_NOTICE => Self::DisconnectNotice,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Full lobby snapshot, answering [`ClientEvent::FetchLobbyInfo`].
    LobbyInfoReceived(LobbyInfo),
    /// The player list changed.
    PlayersUpdated(Vec<PlayerSummary>),
    /// The table list changed.
    TablesUpdated(Vec<TableSummary>),
}

impl ServerEvent {
    /// The Socket.IO event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LobbyInfoReceived(_) => LOBBY_INFO_RECEIVED,
            Self::PlayersUpdated(_) => PLAYERS_UPDATED,
            Self::TablesUpdated(_) => TABLES_UPDATED,
        }
    }

    /// Encode as a Socket.IO event array.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Serialization`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let data = match self {
            Self::LobbyInfoReceived(info) => serde_json::to_value(info)?,
            Self::PlayersUpdated(players) => serde_json::to_value(players)?,
            Self::TablesUpdated(tables) => serde_json::to_value(tables)?,
        };
        Ok(serde_json::to_string(&serde_json::json!([self.name(), data]))?)
    }

    /// Decode a Socket.IO event array.
    ///
    /// Returns `Ok(None)` for well-formed events outside the lobby vocabulary;
    /// the lobby socket is shared with game traffic the manager does not track.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not an event array or a known event
    /// carries a malformed payload.
    pub fn decode(frame: &str) -> Result<Option<Self>> {
        let (name, data) = split_event(frame)?;
        let event = match name.as_str() {
            LOBBY_INFO_RECEIVED => Self::LobbyInfoReceived(serde_json::from_value(data)?),
            PLAYERS_UPDATED => Self::PlayersUpdated(
                Option::<Vec<PlayerSummary>>::deserialize(data)?.unwrap_or_default(),
            ),
            TABLES_UPDATED => Self::TablesUpdated(
                Option::<Vec<TableSummary>>::deserialize(data)?.unwrap_or_default(),
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Split `["name", data?]` into its name and payload (`null` when absent).
fn split_event(frame: &str) -> Result<(String, Value)> {
    let parts: Vec<Value> = serde_json::from_str(frame)?;
    let mut parts = parts.into_iter();
    let name = match parts.next() {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(LobbyError::Protocol(format!(
                "event name must be a string, got {other}"
            )))
        }
        None => return Err(LobbyError::Protocol("empty event array".into())),
    };
    Ok((name, parts.next().unwrap_or(Value::Null)))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn fetch_lobby_info_encodes_null_token_for_guests() {
        let frame = ClientEvent::FetchLobbyInfo { token: None }.encode().unwrap();
        assert_eq!(frame, r#"["fetch-lobby-info",null]"#);
    }

    #[test]
    fn disconnect_notice_has_no_payload() {
        let frame = ClientEvent::DisconnectNotice.encode().unwrap();
        assert_eq!(frame, r#"["disconnect-notice"]"#);
    }

    #[test]
    fn lobby_info_reads_camel_case_payload() {
        let frame = r#"["lobby-info-received",{
            "tables":[{"id":7,"name":"Table 7","maxPlayers":6,"currentNumberOfPlayers":2,"smallBlind":5,"bigBlind":10,"limit":1000}],
            "players":[{"id":"p1","socketId":"s1","name":"Ann","bankroll":250.5}],
            "socketId":"abc"
        }]"#;
        let Some(ServerEvent::LobbyInfoReceived(info)) = ServerEvent::decode(frame).unwrap() else {
            panic!("expected lobby info");
        };
        assert_eq!(info.socket_id.as_deref(), Some("abc"));
        assert_eq!(info.tables[0].max_players, 6);
        assert_eq!(info.tables[0].big_blind, 10.0);
        assert_eq!(info.players[0].socket_id, "s1");
        assert_eq!(info.players[0].bankroll, 250.5);
    }

    #[test]
    fn null_lists_decode_as_empty() {
        let info = ServerEvent::decode(r#"["lobby-info-received",{"tables":null,"players":null}]"#)
            .unwrap();
        assert_eq!(
            info,
            Some(ServerEvent::LobbyInfoReceived(LobbyInfo::default()))
        );
        let players = ServerEvent::decode(r#"["players-updated",null]"#).unwrap();
        assert_eq!(players, Some(ServerEvent::PlayersUpdated(vec![])));
    }

    #[test]
    fn unknown_table_fields_are_preserved() {
        let frame = r#"["tables-updated",[{"id":1,"name":"A","seats":{"1":null}}]]"#;
        let Some(ServerEvent::TablesUpdated(tables)) = ServerEvent::decode(frame).unwrap() else {
            panic!("expected tables");
        };
        assert!(tables[0].extra.contains_key("seats"));

        let encoded = ServerEvent::TablesUpdated(tables).encode().unwrap();
        assert!(encoded.contains(r#""seats""#));
    }

    #[test]
    fn string_table_ids_decode() {
        let frame = r#"["tables-updated",[{"id":"65a1f0c2e4b0a1b2c3d4e5f6","name":"A"},{"id":2}]]"#;
        let Some(ServerEvent::TablesUpdated(tables)) = ServerEvent::decode(frame).unwrap() else {
            panic!("expected tables");
        };
        assert_eq!(tables[0].id, TableId::from("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert_eq!(tables[1].id, TableId::Number(2));
        assert_eq!(tables[0].id.to_string(), "65a1f0c2e4b0a1b2c3d4e5f6");

        let encoded = ServerEvent::TablesUpdated(tables).encode().unwrap();
        assert!(encoded.contains(r#""id":"65a1f0c2e4b0a1b2c3d4e5f6""#));
        assert!(encoded.contains(r#""id":2"#));
    }

    #[test]
    fn unrelated_events_are_skipped() {
        assert_eq!(ServerEvent::decode(r#"["table-joined",{"id":3}]"#).unwrap(), None);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(ServerEvent::decode("[]").is_err());
        assert!(ServerEvent::decode("[42]").is_err());
        assert!(ServerEvent::decode("not json").is_err());
        assert!(ServerEvent::decode(r#"["tables-updated",{"oops":true}]"#).is_err());
    }
}
