#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the [`ConnectionManager`] session lifecycle.
//!
//! Uses the scriptable `MockConnector` and `MockFetcher` from `tests/common`
//! to drive the realtime channel and the polling fallback, with tokio's paused
//! clock standing in for the poll interval and reconnect backoff.

mod common;

use std::time::Duration;

use lobby_link::{
    ConnectionManager, ConnectionMode, LobbyConfig, LobbyError, LobbyEvent, ReconnectPolicy,
};
use tokio::sync::mpsc;

use common::{
    lobby_info_frame, player, players_frame, table, tables_frame, wait_for, wait_for_mode,
    ConnectorControl, MockConnector, MockFetcher, WAIT,
};

const FETCH_ANONYMOUS: &str = r#"["fetch-lobby-info",null]"#;

// ════════════════════════════════════════════════════════════════════
// Helper: a manager wired to mock collaborators
// ════════════════════════════════════════════════════════════════════

fn test_config() -> LobbyConfig {
    LobbyConfig::new("http://lobby.test").with_poll_interval(Duration::from_secs(3))
}

fn start_manager() -> (
    ConnectionManager,
    mpsc::Receiver<LobbyEvent>,
    ConnectorControl,
    MockFetcher,
) {
    start_manager_with(test_config())
}

fn start_manager_with(
    config: LobbyConfig,
) -> (
    ConnectionManager,
    mpsc::Receiver<LobbyEvent>,
    ConnectorControl,
    MockFetcher,
) {
    let (connector, control) = MockConnector::new();
    let fetcher = MockFetcher::new();
    let (manager, events) = ConnectionManager::new(config, connector, fetcher.clone());
    (manager, events, control, fetcher)
}

/// Wait until a snapshot event satisfies `predicate`.
async fn wait_for_snapshot(
    events: &mut mpsc::Receiver<LobbyEvent>,
    mut predicate: impl FnMut(&lobby_link::LobbySnapshot) -> bool,
) {
    wait_for(events, |event| {
        matches!(event, LobbyEvent::SnapshotChanged(Some(snapshot)) if predicate(snapshot.as_ref()))
    })
    .await;
}

// ════════════════════════════════════════════════════════════════════
// Realtime / polling transitions
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn connect_error_falls_back_to_polling_with_an_immediate_fetch() {
    let (manager, mut events, control, fetcher) = start_manager();
    fetcher.push_ok(vec![table(1, "T1")]);

    manager.start(None).unwrap();
    wait_for_mode(&mut events, ConnectionMode::Realtime).await;

    control.refuse("connection refused");
    wait_for_mode(&mut events, ConnectionMode::Polling).await;
    wait_for_snapshot(&mut events, |s| s.tables == vec![table(1, "T1")]).await;

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(manager.mode(), ConnectionMode::Polling);
    let snapshot = manager.snapshot().expect("snapshot after poll");
    assert_eq!(snapshot.tables, vec![table(1, "T1")]);
    assert!(snapshot.players.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconnect_cancels_the_poll_timer() {
    let (manager, mut events, control, fetcher) = start_manager();
    fetcher.push_ok(vec![table(1, "T1")]);

    manager.start(None).unwrap();
    control.refuse("connection refused");
    wait_for_mode(&mut events, ConnectionMode::Polling).await;
    wait_for_snapshot(&mut events, |s| !s.tables.is_empty()).await;

    let mut server = control.accept();
    wait_for_mode(&mut events, ConnectionMode::Realtime).await;
    assert_eq!(manager.mode(), ConnectionMode::Realtime);
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);

    let calls = fetcher.calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.calls(), calls, "poll timer kept firing after reconnect");
}

#[tokio::test(start_paused = true)]
async fn repeated_channel_failures_run_a_single_poll_timer() {
    let (manager, mut events, control, fetcher) = start_manager();
    for _ in 0..8 {
        control.refuse("connection refused");
    }

    manager.start(None).unwrap();
    wait_for_mode(&mut events, ConnectionMode::Polling).await;
    tokio::time::sleep(Duration::from_millis(29_500)).await;

    // One fetch at t=0, then one every 3s.
    assert!(control.attempts() >= 8);
    assert_eq!(fetcher.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn failed_polls_keep_the_snapshot_and_the_timer_running() {
    let (manager, mut events, control, fetcher) = start_manager();
    fetcher.push_ok(vec![table(1, "T1")]);

    manager.start(None).unwrap();
    control.refuse("connection refused");
    wait_for_snapshot(&mut events, |s| !s.tables.is_empty()).await;
    let before = manager.snapshot().unwrap();

    // Every later fetch fails.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(fetcher.calls() >= 5);
    assert_eq!(manager.snapshot().unwrap(), before);
    assert_eq!(manager.mode(), ConnectionMode::Polling);

    manager.stop().await;
    let calls = fetcher.calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.calls(), calls, "fetch fired after stop");
}

#[tokio::test(start_paused = true)]
async fn lost_connection_polls_then_resyncs_on_reconnect() {
    let (manager, mut events, control, fetcher) = start_manager();
    fetcher.push_ok(vec![table(1, "T1"), table(2, "T2")]);

    manager.start(None).unwrap();
    let mut server = control.accept();
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);
    server.push(lobby_info_frame(
        vec![table(1, "T1")],
        vec![player("p1", "Ann")],
        Some("sid-1"),
    ));
    wait_for_snapshot(&mut events, |s| s.session_id.as_deref() == Some("sid-1")).await;

    server.push_close();
    wait_for_mode(&mut events, ConnectionMode::Polling).await;
    wait_for_snapshot(&mut events, |s| s.tables.len() == 2).await;
    let snapshot = manager.snapshot().unwrap();
    assert_eq!(snapshot.session_id, None);
    assert_eq!(snapshot.players, vec![player("p1", "Ann")]);

    let mut server = control.accept();
    wait_for_mode(&mut events, ConnectionMode::Realtime).await;
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);
}

#[tokio::test(start_paused = true)]
async fn exhausted_channel_is_redialled_by_the_next_start() {
    let config = test_config().with_reconnect(ReconnectPolicy {
        max_attempts: Some(1),
        ..ReconnectPolicy::default()
    });
    let (manager, mut events, control, fetcher) = start_manager_with(config);
    control.refuse("connection refused");
    control.refuse("connection refused");

    manager.start(None).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(control.attempts(), 2);
    assert_eq!(manager.mode(), ConnectionMode::Polling);
    assert!(fetcher.calls() > 1, "polling continues after the channel gives up");
    while events.try_recv().is_ok() {}

    manager.start(None).unwrap();
    let mut server = control.accept();
    wait_for_mode(&mut events, ConnectionMode::Realtime).await;
    assert_eq!(control.attempts(), 3);
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);

    let calls = fetcher.calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn unread_event_channel_never_stalls_the_session() {
    let (manager, mut events, control, fetcher) =
        start_manager_with(test_config().with_event_channel_capacity(1));
    fetcher.push_ok(vec![table(1, "T1")]);

    // The receiver is held but not read until the end.
    manager.start(None).unwrap();
    control.refuse("connection refused");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(manager.mode(), ConnectionMode::Polling);
    assert!(fetcher.calls() >= 4);
    assert_eq!(manager.snapshot().unwrap().tables, vec![table(1, "T1")]);

    let stopped = tokio::time::timeout(Duration::from_secs(30), manager.stop()).await;
    assert!(stopped.is_ok(), "stop() waited on the event consumer");
    assert_eq!(manager.mode(), ConnectionMode::Disconnected);

    // The consumer catches up to the latest mode once it reads.
    let first = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(first, Some(LobbyEvent::ModeChanged(ConnectionMode::Realtime)));
    let latest = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(
        latest,
        Some(LobbyEvent::ModeChanged(ConnectionMode::Disconnected))
    );
}

// ════════════════════════════════════════════════════════════════════
// Realtime updates and identity
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn realtime_events_replace_their_part_of_the_snapshot() {
    let (manager, mut events, control, _fetcher) = start_manager();

    manager.start(Some("tok1".into())).unwrap();
    let mut server = control.accept();
    assert_eq!(server.next_sent().await, r#"["fetch-lobby-info","tok1"]"#);

    server.push(lobby_info_frame(
        vec![table(1, "T1")],
        vec![player("p1", "Ann")],
        Some("sid-1"),
    ));
    wait_for_snapshot(&mut events, |s| s.players.len() == 1).await;

    server.push(tables_frame(vec![table(1, "T1"), table(2, "T2")]));
    wait_for_snapshot(&mut events, |s| s.tables.len() == 2).await;

    server.push(players_frame(vec![]));
    wait_for_snapshot(&mut events, |s| s.players.is_empty()).await;

    let snapshot = manager.snapshot().unwrap();
    assert_eq!(snapshot.tables, vec![table(1, "T1"), table(2, "T2")]);
    assert_eq!(snapshot.session_id.as_deref(), Some("sid-1"));
}

#[tokio::test(start_paused = true)]
async fn sign_out_clears_players_and_requests_anonymous_info() {
    let (manager, mut events, control, _fetcher) = start_manager();

    manager.start(Some("tok1".into())).unwrap();
    let mut server = control.accept();
    assert_eq!(server.next_sent().await, r#"["fetch-lobby-info","tok1"]"#);
    server.push(lobby_info_frame(
        vec![table(1, "T1")],
        vec![player("p1", "Ann")],
        Some("sid-1"),
    ));
    wait_for_snapshot(&mut events, |s| s.players.len() == 1).await;

    manager.set_auth_token(None).unwrap();
    wait_for_snapshot(&mut events, |s| s.players.is_empty()).await;
    let snapshot = manager.snapshot().unwrap();
    assert_eq!(snapshot.tables, vec![table(1, "T1")]);
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);
    assert_eq!(manager.mode(), ConnectionMode::Realtime);
}

#[tokio::test(start_paused = true)]
async fn second_start_reuses_the_channel() {
    let (manager, mut events, control, _fetcher) = start_manager();

    manager.start(None).unwrap();
    let mut server = control.accept();
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);

    manager.start(Some("tok2".into())).unwrap();
    assert_eq!(server.next_sent().await, r#"["fetch-lobby-info","tok2"]"#);
    assert_eq!(control.attempts(), 1);
    assert_eq!(manager.mode(), ConnectionMode::Realtime);
    while let Ok(event) = events.try_recv() {
        assert_eq!(event, LobbyEvent::ModeChanged(ConnectionMode::Realtime));
    }
}

// ════════════════════════════════════════════════════════════════════
// Stop and shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stop_without_a_session_is_harmless() {
    let (manager, mut events, _control, fetcher) = start_manager();

    manager.stop().await;
    manager.stop().await;

    assert_eq!(manager.mode(), ConnectionMode::Disconnected);
    assert!(manager.snapshot().is_none());
    assert!(events.try_recv().is_err());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_says_goodbye_once_and_clears_the_session() {
    let (manager, mut events, control, _fetcher) = start_manager();

    manager.start(None).unwrap();
    let mut server = control.accept();
    assert_eq!(server.next_sent().await, FETCH_ANONYMOUS);
    server.push(lobby_info_frame(vec![table(1, "T1")], vec![], None));
    wait_for_snapshot(&mut events, |s| !s.tables.is_empty()).await;

    manager.stop().await;
    assert_eq!(manager.mode(), ConnectionMode::Disconnected);
    assert!(manager.snapshot().is_none());
    assert_eq!(server.next_sent().await, r#"["disconnect-notice"]"#);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(server.is_closed());

    wait_for(&mut events, |event| *event == LobbyEvent::SnapshotChanged(None)).await;
    wait_for_mode(&mut events, ConnectionMode::Disconnected).await;

    manager.stop().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(server.try_next_sent().is_none());
    assert!(events.try_recv().is_err());
    assert_eq!(manager.mode(), ConnectionMode::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn late_events_from_a_stopped_channel_are_ignored() {
    let (manager, mut events, control, _fetcher) = start_manager();

    manager.start(None).unwrap();
    let mut old = control.accept();
    assert_eq!(old.next_sent().await, FETCH_ANONYMOUS);

    manager.stop().await;
    manager.start(None).unwrap();

    old.push(tables_frame(vec![table(9, "stale")]));
    old.push_close();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(manager.snapshot().is_none());
    assert_eq!(manager.mode(), ConnectionMode::Realtime);
    while let Ok(event) = events.try_recv() {
        assert!(matches!(event, LobbyEvent::ModeChanged(_)), "{event:?}");
    }
}

#[tokio::test]
async fn commands_fail_after_shutdown() {
    let (mut manager, mut events, _control, _fetcher) = start_manager();
    manager.start(None).unwrap();

    manager.shutdown().await;
    assert!(matches!(manager.start(None), Err(LobbyError::ManagerClosed)));
    assert!(matches!(
        manager.set_auth_token(Some("tok".into())),
        Err(LobbyError::ManagerClosed)
    ));
    assert_eq!(manager.mode(), ConnectionMode::Disconnected);

    // Remaining events drain, then the channel ends.
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());

    // Stopping a shut-down manager is a no-op.
    manager.stop().await;
}
