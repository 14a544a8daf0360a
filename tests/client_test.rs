//! End-to-end convergence tests: two independent clients, one shared
//! store, no server-side game logic.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use gridhunt::{
    ActiveSession, Cell, GameClient, GridConfig, MemoryStore, Phase, RepositoryError, SessionRecord,
};

/// Waits until this client observes a snapshot satisfying `pred`.
async fn wait_for<F>(session: &ActiveSession, mut pred: F) -> SessionRecord
where
    F: FnMut(&SessionRecord) -> bool,
{
    let mut rx = session.snapshots();
    timeout(Duration::from_secs(5), async move {
        loop {
            if let Some(record) = rx.borrow_and_update().clone()
                && pred(&record)
            {
                return record;
            }
            rx.changed().await.expect("snapshot channel closed");
        }
    })
    .await
    .expect("condition not reached in time")
}

/// Waits until this client observes the session's disappearance.
async fn wait_gone(session: &ActiveSession) {
    let mut rx = session.snapshots();
    timeout(Duration::from_secs(5), async move {
        loop {
            if rx.borrow_and_update().is_none() {
                return;
            }
            rx.changed().await.expect("snapshot channel closed");
        }
    })
    .await
    .expect("session still present")
}

#[tokio::test]
async fn two_clients_converge_through_a_full_game() {
    let store = Arc::new(MemoryStore::new());
    let grid = GridConfig::default();
    let host = GameClient::with_player_id(store.clone(), grid, "host".to_string());
    let guest = GameClient::with_player_id(store.clone(), grid, "guest".to_string());

    let host_session = host.create("Ada").await.expect("create");
    let code = host_session.snapshot().expect("initial snapshot").code;

    let guest_session = guest.join("Grace", &code).await.expect("join");
    wait_for(&host_session, |r| r.players.len() == 2).await;

    host_session.start_game().await.expect("start");
    wait_for(&guest_session, |r| r.phase == Phase::Setup).await;

    host_session
        .select_position(Cell::new(0, 0))
        .await
        .expect("host position");
    guest_session
        .select_position(Cell::new(5, 5))
        .await
        .expect("guest position");

    // Either watcher drives setup → battle on observing "both ready"; the
    // racing first-turn writes settle last-write-wins.
    wait_for(&host_session, |r| r.phase == Phase::Battle).await;
    wait_for(&guest_session, |r| r.phase == Phase::Battle).await;
    sleep(Duration::from_millis(200)).await;

    let record = host_session.snapshot().expect("battle snapshot");
    let turn = record.current_turn.clone().expect("turn assigned");
    assert!(turn == "host" || turn == "guest");

    // The turn holder fires at the opponent's known position and wins.
    let (shooter, target) = if turn == "host" {
        (&host_session, Cell::new(5, 5))
    } else {
        (&guest_session, Cell::new(0, 0))
    };
    shooter.submit_guess(target).await.expect("guess");

    let record = wait_for(&guest_session, |r| r.phase == Phase::Finished).await;
    assert_eq!(record.winner.as_deref(), Some(turn.as_str()));
    assert_eq!(record.current_turn, None);
    wait_for(&host_session, |r| r.phase == Phase::Finished).await;

    // Replay: guesses cleared, participants reset, back to setup for both.
    guest_session.replay().await.expect("replay");
    let record = wait_for(&host_session, |r| {
        r.phase == Phase::Setup && r.players.values().all(|p| !p.ready)
    })
    .await;
    assert!(record.guesses.is_empty());
    assert!(record.players.values().all(|p| p.position.is_none()));

    // Leaving deletes the session; the peer observes a forced return.
    host_session.leave().await.expect("leave");
    wait_gone(&guest_session).await;
}

#[tokio::test]
async fn a_third_client_cannot_join() {
    let store = Arc::new(MemoryStore::new());
    let grid = GridConfig::default();
    let host = GameClient::with_player_id(store.clone(), grid, "host".to_string());
    let guest = GameClient::with_player_id(store.clone(), grid, "guest".to_string());
    let third = GameClient::with_player_id(store.clone(), grid, "third".to_string());

    let host_session = host.create("Ada").await.expect("create");
    let code = host_session.snapshot().expect("initial snapshot").code;

    let _guest_session = guest.join("Grace", &code).await.expect("join");
    let result = third.join("Edsger", &code).await;
    assert!(matches!(result, Err(RepositoryError::Full)));
}

#[tokio::test]
async fn joining_with_an_unknown_code_fails_before_any_mutation() {
    let store = Arc::new(MemoryStore::new());
    let client = GameClient::with_player_id(store, GridConfig::default(), "p1".to_string());
    let result = client.join("Ada", "WRONG1").await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));
}
