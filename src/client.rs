//! Per-process glue between the store and the UI.
//!
//! There is no request/response between the two players' clients; each one
//! subscribes to the single session record and recomputes its view whenever
//! a snapshot arrives. [`GameClient`] owns the local identity and the
//! entry-point actions (create/join); [`ActiveSession`] owns one live
//! subscription and the in-session actions.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::engine::GuessEngine;
use crate::machine::SessionMachine;
use crate::repository::{RepositoryError, SessionRepository, generate_player_id};
use crate::session::{Cell, GridConfig, Phase, PlayerId, SessionId, SessionRecord, session_path};
use crate::store::{Store, StoreError, Subscription};

/// A player's client: local identity plus the create/join entry points.
#[derive(Clone)]
pub struct GameClient {
    store: Arc<dyn Store>,
    repository: SessionRepository,
    machine: SessionMachine,
    engine: GuessEngine,
    player_id: PlayerId,
    grid: GridConfig,
}

impl GameClient {
    /// Creates a client with a freshly generated player identity.
    pub fn new(store: Arc<dyn Store>, grid: GridConfig) -> Self {
        Self::with_player_id(store, grid, generate_player_id())
    }

    /// Creates a client with an explicit player identity.
    pub fn with_player_id(store: Arc<dyn Store>, grid: GridConfig, player_id: PlayerId) -> Self {
        let repository = SessionRepository::new(store.clone());
        let machine = SessionMachine::new(store.clone(), grid);
        let engine = GuessEngine::new(store.clone(), machine.clone());
        info!(player_id = %player_id, "client ready");
        Self {
            store,
            repository,
            machine,
            engine,
            player_id,
            grid,
        }
    }

    /// This client's player identity.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// The grid configuration in play.
    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    /// Creates a session hosted by this client and starts observing it.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<ActiveSession, RepositoryError> {
        let (session_id, code) = self
            .repository
            .create_session(&self.player_id, name)
            .await?;
        info!(code = %code, "hosting new session");
        self.open(session_id).await
    }

    /// Joins the session matching `code` and starts observing it.
    #[instrument(skip(self))]
    pub async fn join(&self, name: &str, code: &str) -> Result<ActiveSession, RepositoryError> {
        let session_id = self.repository.find_session_by_code(code).await?;
        self.repository
            .join_session(&session_id, &self.player_id, name)
            .await?;
        self.open(session_id).await
    }

    async fn open(&self, session_id: SessionId) -> Result<ActiveSession, RepositoryError> {
        ActiveSession::open(
            self.store.clone(),
            self.machine.clone(),
            self.engine.clone(),
            session_id,
            self.player_id.clone(),
        )
        .await
        .map_err(RepositoryError::Store)
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("player_id", &self.player_id)
            .finish_non_exhaustive()
    }
}

/// One observed session: a background watcher republishing snapshots on a
/// watch channel, plus the in-session actions.
///
/// The watcher also runs the `setup → battle` auto-transition on every
/// observed snapshot, so either client drives the game forward as soon as
/// both positions are in. Dropping the session stops observation; the
/// record itself is only removed by [`ActiveSession::leave`].
#[derive(Debug)]
pub struct ActiveSession {
    session_id: SessionId,
    player_id: PlayerId,
    machine: SessionMachine,
    engine: GuessEngine,
    snapshots: watch::Receiver<Option<SessionRecord>>,
    watcher: JoinHandle<()>,
}

impl ActiveSession {
    async fn open(
        store: Arc<dyn Store>,
        machine: SessionMachine,
        engine: GuessEngine,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<Self, StoreError> {
        let mut subscription = store.subscribe(&session_path(&session_id)).await?;
        // The adapter delivers the current value immediately; seed the watch
        // channel with it so the UI never renders a phantom empty state.
        let initial = subscription.next().await.flatten();
        let record = initial.as_ref().and_then(SessionRecord::from_value);
        maybe_begin_battle(&machine, &session_id, record.as_ref()).await;
        let (tx, snapshots) = watch::channel(record);
        let watcher = tokio::spawn(watch_loop(
            subscription,
            tx,
            machine.clone(),
            session_id.clone(),
        ));
        Ok(Self {
            session_id,
            player_id,
            machine,
            engine,
            snapshots,
            watcher,
        })
    }

    /// The observed session's id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The local player's id.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// The latest synchronized snapshot; `None` once the session is gone.
    pub fn snapshot(&self) -> Option<SessionRecord> {
        self.snapshots.borrow().clone()
    }

    /// A watch receiver for snapshot changes (for select-style waiting).
    pub fn snapshots(&self) -> watch::Receiver<Option<SessionRecord>> {
        self.snapshots.clone()
    }

    /// Host action: `lobby → setup`.
    pub async fn start_game(&self) -> Result<(), StoreError> {
        self.machine
            .start_game(&self.session_id, &self.player_id)
            .await
    }

    /// Setup action: lock in the local player's hidden position.
    pub async fn select_position(&self, cell: Cell) -> Result<(), StoreError> {
        self.machine
            .select_position(&self.session_id, &self.player_id, cell)
            .await
    }

    /// Battle action: guess a cell.
    pub async fn submit_guess(&self, cell: Cell) -> Result<(), StoreError> {
        self.engine
            .submit_guess(&self.session_id, &self.player_id, cell)
            .await
    }

    /// Finished action: reset the session for another round.
    pub async fn replay(&self) -> Result<(), StoreError> {
        self.machine.replay(&self.session_id).await
    }

    /// Deletes the session. The other client observes the disappearance as
    /// a forced return to its menu.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn leave(self) -> Result<(), StoreError> {
        self.machine.leave(&self.session_id).await
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch_loop(
    mut subscription: Subscription,
    tx: watch::Sender<Option<SessionRecord>>,
    machine: SessionMachine,
    session_id: SessionId,
) {
    while let Some(value) = subscription.next().await {
        match value {
            None => {
                // Session removed: forced return, not an error.
                debug!(session_id = %session_id, "session gone");
                let _ = tx.send(None);
                return;
            }
            Some(value) => match SessionRecord::from_value(&value) {
                Some(record) => {
                    maybe_begin_battle(&machine, &session_id, Some(&record)).await;
                    if tx.send(Some(record)).is_err() {
                        return;
                    }
                }
                // Mid-write interleaving; keep the last good snapshot.
                None => warn!(session_id = %session_id, "unparseable snapshot, skipping"),
            },
        }
    }
    // The store side is gone; treat like a removed session.
    let _ = tx.send(None);
}

/// Runs the idempotent `setup → battle` transition when the observed
/// snapshot says both participants are ready. Failures are logged, not
/// surfaced: the next snapshot (or the other client) retries naturally.
async fn maybe_begin_battle(
    machine: &SessionMachine,
    session_id: &str,
    record: Option<&SessionRecord>,
) {
    let Some(record) = record else { return };
    if record.phase == Phase::Setup
        && record.both_ready()
        && let Err(e) = machine.try_begin_battle(session_id, record).await
    {
        warn!(error = %e, session_id, "auto transition to battle failed");
    }
}
