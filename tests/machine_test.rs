//! Tests for the session state machine's guarded transitions.

use std::sync::Arc;

use gridhunt::session::{guesses_path, session_path};
use gridhunt::{
    Cell, GridConfig, GuessEngine, MemoryStore, Phase, SessionMachine, SessionRecord,
    SessionRepository, Store,
};

struct Fixture {
    store: Arc<MemoryStore>,
    repository: SessionRepository,
    machine: SessionMachine,
    engine: GuessEngine,
}

fn setup() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let repository = SessionRepository::new(store.clone());
    let machine = SessionMachine::new(store.clone(), GridConfig::default());
    let engine = GuessEngine::new(store.clone(), machine.clone());
    Fixture {
        store,
        repository,
        machine,
        engine,
    }
}

impl Fixture {
    async fn load(&self, session_id: &str) -> SessionRecord {
        let value = self
            .store
            .read_once(&session_path(session_id))
            .await
            .expect("read")
            .expect("record present");
        SessionRecord::from_value(&value).expect("valid record")
    }

    /// Create + join: a two-player lobby.
    async fn lobby(&self) -> String {
        let (session_id, _code) = self
            .repository
            .create_session("host", "Ada")
            .await
            .expect("create");
        self.repository
            .join_session(&session_id, "joiner", "Grace")
            .await
            .expect("join");
        session_id
    }

    /// Lobby through setup with both positions locked in.
    async fn both_ready(&self) -> String {
        let session_id = self.lobby().await;
        self.machine
            .start_game(&session_id, "host")
            .await
            .expect("start");
        self.machine
            .select_position(&session_id, "host", Cell::new(0, 0))
            .await
            .expect("host position");
        self.machine
            .select_position(&session_id, "joiner", Cell::new(5, 5))
            .await
            .expect("joiner position");
        session_id
    }

    /// All the way to battle via the auto-transition.
    async fn battle(&self) -> String {
        let session_id = self.both_ready().await;
        let snapshot = self.load(&session_id).await;
        self.machine
            .try_begin_battle(&session_id, &snapshot)
            .await
            .expect("begin battle");
        session_id
    }
}

#[tokio::test]
async fn start_requires_the_host_and_two_players() {
    let fixture = setup();
    let (session_id, _code) = fixture
        .repository
        .create_session("host", "Ada")
        .await
        .expect("create");

    // One participant: starting is a no-op.
    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");
    assert_eq!(fixture.load(&session_id).await.phase, Phase::Lobby);

    fixture
        .repository
        .join_session(&session_id, "joiner", "Grace")
        .await
        .expect("join");

    // Non-host: still a no-op.
    fixture
        .machine
        .start_game(&session_id, "joiner")
        .await
        .expect("start");
    assert_eq!(fixture.load(&session_id).await.phase, Phase::Lobby);

    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");
    assert_eq!(fixture.load(&session_id).await.phase, Phase::Setup);
}

#[tokio::test]
async fn positions_lock_in_once_and_mark_ready() {
    let fixture = setup();
    let session_id = fixture.lobby().await;
    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");

    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(2, 3))
        .await
        .expect("select");
    let record = fixture.load(&session_id).await;
    assert!(record.players["host"].ready);
    assert_eq!(record.players["host"].position, Some(Cell::new(2, 3)));

    // A second choice does not move the position.
    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(4, 4))
        .await
        .expect("reselect");
    let record = fixture.load(&session_id).await;
    assert_eq!(record.players["host"].position, Some(Cell::new(2, 3)));
}

#[tokio::test]
async fn off_grid_and_out_of_phase_selections_are_ignored() {
    let fixture = setup();
    let session_id = fixture.lobby().await;

    // Still in lobby: ignored.
    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(1, 1))
        .await
        .expect("select");
    assert_eq!(fixture.load(&session_id).await.players["host"].position, None);

    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");

    // Off the 6×6 grid: ignored.
    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(6, 0))
        .await
        .expect("select");
    let record = fixture.load(&session_id).await;
    assert_eq!(record.players["host"].position, None);
    assert!(!record.players["host"].ready);
}

#[tokio::test]
async fn setup_advances_to_battle_once_both_are_ready() {
    let fixture = setup();
    let session_id = fixture.both_ready().await;
    let snapshot = fixture.load(&session_id).await;

    fixture
        .machine
        .try_begin_battle(&session_id, &snapshot)
        .await
        .expect("begin");

    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Battle);
    let turn = record.current_turn.expect("turn assigned");
    assert!(turn == "host" || turn == "joiner");
}

#[tokio::test]
async fn begin_battle_is_idempotent_across_racing_observers() {
    let fixture = setup();
    let session_id = fixture.both_ready().await;
    let snapshot = fixture.load(&session_id).await;

    // Both clients attempt the transition from the same observed snapshot.
    fixture
        .machine
        .try_begin_battle(&session_id, &snapshot)
        .await
        .expect("first observer");
    fixture
        .machine
        .try_begin_battle(&session_id, &snapshot)
        .await
        .expect("second observer");

    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Battle);
    // The first-turn pick is nondeterministic under the race, but it must
    // name one of the two participants.
    let turn = record.current_turn.expect("turn assigned");
    assert!(record.players.contains_key(&turn));
}

#[tokio::test]
async fn begin_battle_waits_for_both_positions() {
    let fixture = setup();
    let session_id = fixture.lobby().await;
    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");
    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(0, 0))
        .await
        .expect("select");

    let snapshot = fixture.load(&session_id).await;
    fixture
        .machine
        .try_begin_battle(&session_id, &snapshot)
        .await
        .expect("begin");

    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Setup);
    assert_eq!(record.current_turn, None);
}

#[tokio::test]
async fn turn_is_assigned_only_during_battle() {
    let fixture = setup();
    let session_id = fixture.lobby().await;
    assert_eq!(fixture.load(&session_id).await.current_turn, None);

    fixture
        .machine
        .start_game(&session_id, "host")
        .await
        .expect("start");
    assert_eq!(fixture.load(&session_id).await.current_turn, None);

    let session_id = fixture.battle().await;
    assert!(fixture.load(&session_id).await.current_turn.is_some());
}

#[tokio::test]
async fn replay_resets_the_session_for_another_round() {
    let fixture = setup();
    let session_id = fixture.battle().await;

    // Drive to finished: the turn holder guesses the opponent's position.
    let record = fixture.load(&session_id).await;
    let guesser = record.current_turn.clone().expect("turn");
    let (_, opponent) = record.opponent_of(&guesser).expect("opponent");
    let target = opponent.position.expect("position");
    fixture
        .engine
        .submit_guess(&session_id, &guesser, target)
        .await
        .expect("winning guess");
    assert_eq!(fixture.load(&session_id).await.phase, Phase::Finished);

    fixture.machine.replay(&session_id).await.expect("replay");

    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Setup);
    assert_eq!(record.current_turn, None);
    assert_eq!(record.winner, None);
    assert!(record.guesses.is_empty());
    for participant in record.players.values() {
        assert!(!participant.ready);
        assert_eq!(participant.position, None);
    }
}

#[tokio::test]
async fn replay_round_trip_reaches_battle_again() {
    let fixture = setup();
    let session_id = fixture.battle().await;

    let record = fixture.load(&session_id).await;
    let guesser = record.current_turn.clone().expect("turn");
    let (_, opponent) = record.opponent_of(&guesser).expect("opponent");
    fixture
        .engine
        .submit_guess(&session_id, &guesser, opponent.position.expect("position"))
        .await
        .expect("winning guess");
    fixture.machine.replay(&session_id).await.expect("replay");

    // Both participants re-select, exactly as from a fresh setup.
    fixture
        .machine
        .select_position(&session_id, "host", Cell::new(1, 2))
        .await
        .expect("host position");
    fixture
        .machine
        .select_position(&session_id, "joiner", Cell::new(3, 4))
        .await
        .expect("joiner position");

    let snapshot = fixture.load(&session_id).await;
    fixture
        .machine
        .try_begin_battle(&session_id, &snapshot)
        .await
        .expect("begin");

    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Battle);
    assert!(record.guesses.is_empty());
    let turn = record.current_turn.expect("turn assigned");
    assert!(record.players.contains_key(&turn));
}

#[tokio::test]
async fn replay_outside_finished_is_ignored() {
    let fixture = setup();
    let session_id = fixture.battle().await;
    let before = fixture.load(&session_id).await;

    fixture.machine.replay(&session_id).await.expect("replay");

    assert_eq!(fixture.load(&session_id).await, before);
}

#[tokio::test]
async fn intermediate_replay_states_still_parse() {
    let fixture = setup();
    let session_id = fixture.battle().await;

    let record = fixture.load(&session_id).await;
    let guesser = record.current_turn.clone().expect("turn");
    let miss = Cell::new(1, 1);
    fixture
        .engine
        .submit_guess(&session_id, &guesser, miss)
        .await
        .expect("miss");

    // Simulate the first step of a replay landing alone: guesses removed,
    // phase not yet reset. Observers must still get a valid record.
    fixture
        .store
        .remove(&guesses_path(&session_id))
        .await
        .expect("remove guesses");
    let record = fixture.load(&session_id).await;
    assert_eq!(record.phase, Phase::Battle);
    assert!(record.guesses.is_empty());
}

#[tokio::test]
async fn leave_removes_the_session_from_any_phase() {
    let fixture = setup();
    let session_id = fixture.battle().await;

    fixture.machine.leave(&session_id).await.expect("leave");

    let value = fixture
        .store
        .read_once(&session_path(&session_id))
        .await
        .expect("read");
    assert_eq!(value, None);
}
