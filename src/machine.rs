//! Guarded, idempotent session phase transitions.
//!
//! Every transition is a precondition-guarded write against the shared
//! record. Guards are evaluated on the freshest snapshot available to the
//! caller; a failed guard is a silent no-op (logged, never an error),
//! because invalid attempts only arise from stale UI state in a cooperative
//! protocol. Store failures are the only errors returned.
//!
//! Two clients may race the `setup → battle` transition: both observe the
//! "both ready" snapshot and both write a randomly chosen first turn. The
//! store resolves the overlap last-write-wins, so the clients can
//! transiently disagree on who starts until the store converges. That
//! nondeterminism is accepted protocol semantics, not a bug.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::session::{
    Cell, GridConfig, Phase, PlayerId, SessionRecord, guesses_path, participant_path, session_path,
};
use crate::store::{Store, StoreError};

/// Drives phase transitions for session records in the store.
#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<dyn Store>,
    grid: GridConfig,
}

impl SessionMachine {
    /// Creates a machine over the given store and grid configuration.
    pub fn new(store: Arc<dyn Store>, grid: GridConfig) -> Self {
        Self { store, grid }
    }

    /// The grid configuration transitions validate against.
    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let snapshot = self.store.read_once(&session_path(session_id)).await?;
        Ok(snapshot.as_ref().and_then(SessionRecord::from_value))
    }

    /// `lobby → setup`. Host only, and only with two participants present.
    #[instrument(skip(self))]
    pub async fn start_game(&self, session_id: &str, actor: &str) -> Result<(), StoreError> {
        let Some(record) = self.load(session_id).await? else {
            debug!(session_id, "start on absent session");
            return Ok(());
        };
        if record.phase != Phase::Lobby {
            debug!(phase = %record.phase, "start outside lobby, ignoring");
            return Ok(());
        }
        if record.host != actor {
            warn!(actor, "non-host tried to start the game");
            return Ok(());
        }
        if !record.is_full() {
            debug!("start before second participant, ignoring");
            return Ok(());
        }
        self.store
            .update(&session_path(session_id), fields(json!({ "phase": "setup" })))
            .await?;
        info!(session_id, "game started");
        Ok(())
    }

    /// Records `player`'s hidden position during setup and marks them
    /// ready in the same write. The first choice sticks: a participant
    /// with a position already set is left untouched.
    #[instrument(skip(self))]
    pub async fn select_position(
        &self,
        session_id: &str,
        player: &str,
        cell: Cell,
    ) -> Result<(), StoreError> {
        let Some(record) = self.load(session_id).await? else {
            return Ok(());
        };
        if record.phase != Phase::Setup {
            debug!(phase = %record.phase, "position choice outside setup, ignoring");
            return Ok(());
        }
        let Some(participant) = record.participant(player) else {
            warn!(player, "position choice by non-participant");
            return Ok(());
        };
        if participant.position.is_some() {
            debug!(player, "position already locked");
            return Ok(());
        }
        if !self.grid.contains(cell) {
            warn!(?cell, size = self.grid.size(), "position off the grid");
            return Ok(());
        }
        self.store
            .update(
                &participant_path(session_id, player),
                fields(json!({ "position": cell, "ready": true })),
            )
            .await?;
        info!(session_id, player, "position locked");
        Ok(())
    }

    /// `setup → battle`, attempted by any observing client once both
    /// participants are ready.
    ///
    /// Idempotent by guard: the caller passes the snapshot that triggered
    /// the attempt, and once the store reads `battle` no client observes a
    /// setup snapshot anymore, so the write window closes. Within the
    /// window, racing writers each pick a first turn at random and the last
    /// write wins (see the module docs).
    #[instrument(skip(self, observed))]
    pub async fn try_begin_battle(
        &self,
        session_id: &str,
        observed: &SessionRecord,
    ) -> Result<(), StoreError> {
        if observed.phase != Phase::Setup || !observed.both_ready() {
            debug!(phase = %observed.phase, "battle preconditions not met");
            return Ok(());
        }
        let ids: Vec<&PlayerId> = observed.players.keys().collect();
        let first = {
            let mut rng = rand::thread_rng();
            match ids.choose(&mut rng) {
                Some(id) => (*id).clone(),
                None => return Ok(()),
            }
        };
        self.store
            .update(
                &session_path(session_id),
                fields(json!({ "phase": "battle", "current_turn": first })),
            )
            .await?;
        info!(session_id, first_turn = %first, "battle begun");
        Ok(())
    }

    /// `battle → finished`: records the winner and clears the turn.
    #[instrument(skip(self))]
    pub(crate) async fn finish(&self, session_id: &str, winner: &str) -> Result<(), StoreError> {
        self.store
            .update(
                &session_path(session_id),
                fields(json!({
                    "phase": "finished",
                    "winner": winner,
                    "current_turn": null,
                })),
            )
            .await?;
        info!(session_id, winner, "game finished");
        Ok(())
    }

    /// `battle → battle`: hands the turn to `next`.
    #[instrument(skip(self))]
    pub(crate) async fn pass_turn(&self, session_id: &str, next: &str) -> Result<(), StoreError> {
        self.store
            .update(
                &session_path(session_id),
                fields(json!({ "current_turn": next })),
            )
            .await?;
        debug!(session_id, next, "turn passed");
        Ok(())
    }

    /// `finished → setup` replay, from either client.
    ///
    /// Applied as a sequence of independent writes, never atomically:
    /// guesses removed first, then the record-level reset, then each
    /// participant reset. An observer may see any intermediate state (for
    /// example guesses already gone while the phase still reads
    /// `finished`) and must render it without failing.
    #[instrument(skip(self))]
    pub async fn replay(&self, session_id: &str) -> Result<(), StoreError> {
        let Some(record) = self.load(session_id).await? else {
            return Ok(());
        };
        if record.phase != Phase::Finished {
            debug!(phase = %record.phase, "replay outside finished, ignoring");
            return Ok(());
        }
        self.store.remove(&guesses_path(session_id)).await?;
        self.store
            .update(
                &session_path(session_id),
                fields(json!({
                    "phase": "setup",
                    "current_turn": null,
                    "winner": null,
                })),
            )
            .await?;
        for player in record.players.keys() {
            self.store
                .update(
                    &participant_path(session_id, player),
                    fields(json!({ "ready": false, "position": null })),
                )
                .await?;
        }
        info!(session_id, "replay reset complete");
        Ok(())
    }

    /// Removes the session from any phase. Observers treat the
    /// disappearance as a forced return to the menu, not an error.
    #[instrument(skip(self))]
    pub async fn leave(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.remove(&session_path(session_id)).await?;
        info!(session_id, "session removed");
        Ok(())
    }
}

impl std::fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

/// Extracts the object map from a `json!` literal for a store update.
fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
