//! Events delivered to consumers of a [`ConnectionManager`](crate::ConnectionManager).

use std::sync::Arc;

use crate::snapshot::{ConnectionMode, LobbySnapshot};

/// Notifications emitted on the receiver returned by
/// [`ConnectionManager::new`](crate::ConnectionManager::new).
///
/// Every event is also reflected in the manager's synchronous accessors, so a
/// consumer that falls behind can always catch up with
/// [`snapshot`](crate::ConnectionManager::snapshot) and
/// [`mode`](crate::ConnectionManager::mode).
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// The lobby snapshot was replaced. `None` after the session was stopped.
    SnapshotChanged(Option<Arc<LobbySnapshot>>),
    /// The authoritative transport changed.
    ModeChanged(ConnectionMode),
}
