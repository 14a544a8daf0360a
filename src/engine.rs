//! Guess validation, recording, and win condition during battle.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::machine::SessionMachine;
use crate::session::{Cell, Guess, PhaseView, SessionRecord, guess_path, session_path};
use crate::store::{Store, StoreError};

/// Validates guesses, determines hit/miss, and drives the resulting phase
/// transition.
#[derive(Clone)]
pub struct GuessEngine {
    store: Arc<dyn Store>,
    machine: SessionMachine,
}

impl GuessEngine {
    /// Creates an engine sharing the machine's store and grid.
    pub fn new(store: Arc<dyn Store>, machine: SessionMachine) -> Self {
        Self { store, machine }
    }

    /// Submits a guess by `guesser` at `cell`.
    ///
    /// Precondition failures are silent no-ops: it must be the guesser's
    /// turn, the (guesser, cell) key must be unrecorded, the cell on the
    /// grid, and the opponent present with a chosen position. A hit drives
    /// the session to `finished` with the guesser as winner; a miss flips
    /// the turn to the opponent. Only store failures are returned.
    #[instrument(skip(self))]
    pub async fn submit_guess(
        &self,
        session_id: &str,
        guesser: &str,
        cell: Cell,
    ) -> Result<(), StoreError> {
        let snapshot = self.store.read_once(&session_path(session_id)).await?;
        let Some(record) = snapshot.as_ref().and_then(SessionRecord::from_value) else {
            debug!(session_id, "guess against absent session");
            return Ok(());
        };
        match record.phase_view() {
            Some(PhaseView::Battle { current_turn }) if current_turn == guesser => {}
            _ => {
                debug!(guesser, phase = %record.phase, "guess out of turn, ignoring");
                return Ok(());
            }
        }
        if !self.machine.grid().contains(cell) {
            warn!(?cell, "guess off the grid");
            return Ok(());
        }
        let key = SessionRecord::guess_key(guesser, cell);
        if record.guesses.contains_key(&key) {
            debug!(key, "cell already guessed, ignoring");
            return Ok(());
        }
        let Some((opponent_id, opponent)) = record.opponent_of(guesser) else {
            warn!(guesser, "no opponent to guess against");
            return Ok(());
        };
        let Some(position) = opponent.position else {
            debug!("opponent has no position yet, ignoring");
            return Ok(());
        };

        let hit = position == cell;
        let guess = Guess {
            player: guesser.to_string(),
            row: cell.row,
            col: cell.col,
            hit,
            timestamp: Utc::now().timestamp_millis(),
        };
        let opponent_id = opponent_id.clone();
        self.store
            .write(&guess_path(session_id, &key), encode(&guess)?)
            .await?;
        info!(session_id, guesser, ?cell, hit, "guess recorded");

        if hit {
            self.machine.finish(session_id, guesser).await
        } else {
            self.machine.pass_turn(session_id, &opponent_id).await
        }
    }
}

impl std::fmt::Debug for GuessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuessEngine").finish_non_exhaustive()
    }
}

fn encode(guess: &Guess) -> Result<Value, StoreError> {
    serde_json::to_value(guess).map_err(|e| StoreError::new(format!("encode guess: {e}")))
}
