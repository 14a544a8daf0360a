//! Session data model: the record both clients synchronize on.
//!
//! One [`SessionRecord`] per live game, stored at `sessions/<id>`. The
//! persisted layout is flat (every field present in every phase, optionals
//! null outside their phase); [`PhaseView`] is the typed projection the rest
//! of the core consumes, in which per-phase fields only exist in the phase
//! that owns them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier for a session, assigned at creation.
pub type SessionId = String;

/// Opaque identifier for a participant's client.
pub type PlayerId = String;

/// Root path of the live-session collection.
pub const SESSIONS_PATH: &str = "sessions";

/// Length of the human-shareable join code.
pub const JOIN_CODE_LEN: usize = 6;

/// Path of a session record.
pub fn session_path(session_id: &str) -> String {
    format!("{SESSIONS_PATH}/{session_id}")
}

/// Path of one participant entry inside a session.
pub fn participant_path(session_id: &str, player_id: &str) -> String {
    format!("{SESSIONS_PATH}/{session_id}/players/{player_id}")
}

/// Path of the guess collection inside a session.
pub fn guesses_path(session_id: &str) -> String {
    format!("{SESSIONS_PATH}/{session_id}/guesses")
}

/// Path of one guess entry inside a session.
pub fn guess_path(session_id: &str, key: &str) -> String {
    format!("{SESSIONS_PATH}/{session_id}/guesses/{key}")
}

/// Stage of a session's lifecycle.
///
/// Advances `lobby → setup → battle → finished`, with the single reset
/// `finished → setup` on replay. No other transition is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Waiting for a second participant to join by code.
    Lobby,
    /// Both participants choose their hidden position.
    Setup,
    /// Alternating guesses until a hit.
    Battle,
    /// A winner exists; replay or leave.
    Finished,
}

/// A grid coordinate, `row` and `col` each in `[0, grid size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Zero-based row.
    pub row: u8,
    /// Zero-based column.
    pub col: u8,
}

impl Cell {
    /// Creates a cell.
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

/// Grid dimensions shared by both clients in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    size: u8,
}

impl GridConfig {
    /// Default grid dimension.
    pub const DEFAULT_SIZE: u8 = 6;

    /// Creates a square grid configuration.
    pub fn new(size: u8) -> Self {
        Self { size }
    }

    /// Grid dimension N; rows and columns run `0..N`.
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Whether `cell` lies on the grid.
    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.size && cell.col < self.size
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

/// One of the (at most two) players in a session.
///
/// Mutated only by its owning client. `position` is set at most once, during
/// setup; `ready` flips true in the same write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Display name.
    pub name: String,
    /// True exactly when a position has been chosen.
    pub ready: bool,
    /// The hidden position, immutable once set (until a replay reset).
    #[serde(default)]
    pub position: Option<Cell>,
}

impl Participant {
    /// A freshly joined participant: not ready, no position.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: false,
            position: None,
        }
    }
}

/// One recorded guess. Written once by the acting client, never mutated,
/// removed only en masse on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    /// The guessing participant.
    pub player: PlayerId,
    /// Guessed row.
    pub row: u8,
    /// Guessed column.
    pub col: u8,
    /// Whether the guess matched the opponent's hidden position.
    pub hit: bool,
    /// Epoch milliseconds at which the guess was recorded.
    pub timestamp: i64,
}

/// The shared session record, one per live game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Human-shareable join code, 6 uppercase alphanumerics, immutable.
    pub code: String,
    /// The creating participant.
    pub host: PlayerId,
    /// Participant entries, keyed by player id. At most two.
    #[serde(default)]
    pub players: BTreeMap<PlayerId, Participant>,
    /// Current lifecycle stage.
    pub phase: Phase,
    /// Whose turn it is. Non-null only during `battle`.
    #[serde(default)]
    pub current_turn: Option<PlayerId>,
    /// The winner. Non-null only during/after `finished`.
    #[serde(default)]
    pub winner: Option<PlayerId>,
    /// Recorded guesses, keyed by `"{player}-{row}-{col}"`.
    #[serde(default)]
    pub guesses: BTreeMap<String, Guess>,
    /// Epoch milliseconds at creation.
    pub created_at: i64,
}

impl SessionRecord {
    /// A new lobby-phase record with the host as sole participant.
    pub fn new(
        code: impl Into<String>,
        host: impl Into<PlayerId>,
        host_name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        let host = host.into();
        let mut players = BTreeMap::new();
        players.insert(host.clone(), Participant::new(host_name));
        Self {
            code: code.into(),
            host,
            players,
            phase: Phase::Lobby,
            current_turn: None,
            winner: None,
            guesses: BTreeMap::new(),
            created_at,
        }
    }

    /// Parses a store snapshot, `None` when absent or not (yet) a valid
    /// record, so observers of a mid-write state render from the last
    /// good snapshot instead of failing.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// The participant entry for `player_id`.
    pub fn participant(&self, player_id: &str) -> Option<&Participant> {
        self.players.get(player_id)
    }

    /// The other participant, when two are present.
    pub fn opponent_of(&self, player_id: &str) -> Option<(&PlayerId, &Participant)> {
        self.players.iter().find(|(id, _)| id.as_str() != player_id)
    }

    /// Whether the session has reached its two-participant cap.
    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    /// Whether both participants are present and have chosen a position.
    pub fn both_ready(&self) -> bool {
        self.players.len() == 2 && self.players.values().all(|p| p.ready)
    }

    /// Key under which a guess at `cell` by `player` is recorded. One key
    /// per (guesser, cell), so a cell holds at most one outcome per guesser.
    pub fn guess_key(player: &str, cell: Cell) -> String {
        format!("{player}-{}-{}", cell.row, cell.col)
    }

    /// Guesses made by `player`, in key order.
    pub fn guesses_by(&self, player: &str) -> impl Iterator<Item = &Guess> {
        self.guesses.values().filter(move |g| g.player == player)
    }

    /// Typed view of the phase machine.
    ///
    /// `None` when the flat record violates a phase invariant (a battle
    /// record without a turn holder, a finished record without a winner),
    /// which an observer can see transiently between two independent
    /// writes. Callers fall back to a conservative rendering.
    pub fn phase_view(&self) -> Option<PhaseView<'_>> {
        match self.phase {
            Phase::Lobby => Some(PhaseView::Lobby),
            Phase::Setup => Some(PhaseView::Setup),
            Phase::Battle => self
                .current_turn
                .as_ref()
                .filter(|turn| self.players.contains_key(*turn))
                .map(|turn| PhaseView::Battle { current_turn: turn }),
            Phase::Finished => self
                .winner
                .as_ref()
                .map(|winner| PhaseView::Finished { winner }),
        }
    }
}

/// Tagged-variant view of the session phase machine.
///
/// Per-phase fields exist only in the variant that owns them, so a turn
/// holder outside battle or a winner outside finished is unrepresentable
/// past this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseView<'a> {
    /// Waiting for the second participant.
    Lobby,
    /// Participants are choosing positions.
    Setup,
    /// Alternating guesses.
    Battle {
        /// The participant whose turn it is.
        current_turn: &'a PlayerId,
    },
    /// The game is over.
    Finished {
        /// The participant who found the opponent's position.
        winner: &'a PlayerId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_record() -> SessionRecord {
        let mut record = SessionRecord::new("AB12CD", "host", "Ada", 0);
        record
            .players
            .insert("joiner".to_string(), Participant::new("Grace"));
        record
    }

    #[test]
    fn guess_key_is_per_guesser_per_cell() {
        assert_eq!(SessionRecord::guess_key("p1", Cell::new(2, 3)), "p1-2-3");
    }

    #[test]
    fn battle_view_requires_a_valid_turn_holder() {
        let mut record = two_player_record();
        record.phase = Phase::Battle;
        assert_eq!(record.phase_view(), None);

        record.current_turn = Some("nobody".to_string());
        assert_eq!(record.phase_view(), None);

        record.current_turn = Some("joiner".to_string());
        assert!(matches!(
            record.phase_view(),
            Some(PhaseView::Battle { current_turn }) if current_turn == "joiner"
        ));
    }

    #[test]
    fn record_roundtrips_through_store_values() {
        let record = two_player_record();
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(SessionRecord::from_value(&value), Some(record));
    }

    #[test]
    fn null_optionals_read_back_as_absent() {
        let value = serde_json::json!({
            "code": "AB12CD",
            "host": "host",
            "players": {},
            "phase": "setup",
            "current_turn": null,
            "winner": null,
            "created_at": 0,
        });
        let record = SessionRecord::from_value(&value).expect("parse");
        assert_eq!(record.current_turn, None);
        assert_eq!(record.winner, None);
        assert!(record.guesses.is_empty());
    }
}
