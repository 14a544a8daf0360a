//! Pure derivation of the local screen from a session snapshot.
//!
//! [`project`] is a pure function of (snapshot, local transient state, local
//! identity): no side effects, no store access, and re-evaluating it on an
//! unchanged snapshot yields an identical [`ScreenView`]. The TUI renders
//! exactly what comes out and nothing else.

use crate::session::{Cell, GridConfig, Phase, PhaseView, SessionRecord};

/// What a single grid cell should render as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Nothing known about this cell.
    Empty,
    /// The local player's own hidden position.
    Own,
    /// A recorded guess by the local player that hit.
    Hit,
    /// A recorded guess by the local player that missed.
    Miss,
    /// The opponent's hidden position, revealed on the summary screen.
    Revealed,
}

/// A grid of cell render states, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridView {
    size: u8,
    cells: Vec<CellState>,
}

impl GridView {
    fn new(size: u8) -> Self {
        Self {
            size,
            cells: vec![CellState::Empty; size as usize * size as usize],
        }
    }

    fn set(&mut self, cell: Cell, state: CellState) {
        if cell.row < self.size && cell.col < self.size {
            self.cells[cell.row as usize * self.size as usize + cell.col as usize] = state;
        }
    }

    /// Grid dimension.
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Render state of the cell at (`row`, `col`).
    pub fn get(&self, row: u8, col: u8) -> CellState {
        if row < self.size && col < self.size {
            self.cells[row as usize * self.size as usize + col as usize]
        } else {
            CellState::Empty
        }
    }
}

/// One entry of the lobby participant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyMember {
    /// Display name.
    pub name: String,
    /// Whether this entry is the local player.
    pub is_me: bool,
}

/// Local-only transient state: the square selected on this client before
/// (or while) the store confirms it. Never synchronized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalState {
    selected: Option<Cell>,
}

impl LocalState {
    /// The locally selected hidden position, if any.
    pub fn selected(&self) -> Option<Cell> {
        self.selected
    }

    /// Remembers a selected square.
    pub fn select(&mut self, cell: Cell) {
        self.selected = Some(cell);
    }

    /// Clears the selection (replay reset).
    pub fn clear(&mut self) {
        self.selected = None;
    }
}

/// The screen a client should display, with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenView {
    /// No session: the create/join menu.
    Menu,
    /// Waiting room.
    Lobby {
        /// Join code to share with the opponent.
        code: String,
        /// Participant list.
        members: Vec<LobbyMember>,
        /// Whether the local player hosts this session.
        is_host: bool,
        /// Whether the host may start the game (two participants present).
        can_start: bool,
    },
    /// Position selection.
    Setup {
        /// Grid with the local selection marked.
        grid: GridView,
        /// True once a position is locked in; interaction disabled.
        locked: bool,
    },
    /// Alternating guesses.
    Battle {
        /// Grid with the local player's guesses and own position.
        grid: GridView,
        /// Whether the local player may guess right now.
        my_turn: bool,
        /// The local player's own position, for the status line.
        my_position: Option<Cell>,
    },
    /// Game-over summary.
    Winner {
        /// Grid with guesses and the opponent's revealed position.
        grid: GridView,
        /// Whether the local player won.
        victory: bool,
        /// Winner's display name, when known.
        winner_name: Option<String>,
    },
}

/// Derives the screen for `me` from the latest synchronized snapshot plus
/// local transient state. An absent snapshot means the session is gone
/// (deleted or never joined) and maps to the menu.
pub fn project(
    snapshot: Option<&SessionRecord>,
    local: &LocalState,
    me: &str,
    grid: GridConfig,
) -> ScreenView {
    let Some(record) = snapshot else {
        return ScreenView::Menu;
    };
    match record.phase {
        Phase::Lobby => lobby(record, me),
        Phase::Setup => setup(record, local, me, grid),
        Phase::Battle => battle(record, local, me, grid),
        Phase::Finished => winner(record, local, me, grid),
    }
}

fn lobby(record: &SessionRecord, me: &str) -> ScreenView {
    let members = record
        .players
        .iter()
        .map(|(id, p)| LobbyMember {
            name: p.name.clone(),
            is_me: id == me,
        })
        .collect();
    let is_host = record.host == me;
    ScreenView::Lobby {
        code: record.code.clone(),
        members,
        is_host,
        can_start: is_host && record.is_full(),
    }
}

/// The locally remembered selection wins over the synchronized position so
/// the square shows as locked before the store round-trips.
fn own_position(record: &SessionRecord, local: &LocalState, me: &str) -> Option<Cell> {
    local
        .selected()
        .or_else(|| record.participant(me).and_then(|p| p.position))
}

fn setup(record: &SessionRecord, local: &LocalState, me: &str, config: GridConfig) -> ScreenView {
    let mut grid = GridView::new(config.size());
    let own = own_position(record, local, me);
    if let Some(cell) = own {
        grid.set(cell, CellState::Own);
    }
    ScreenView::Setup {
        grid,
        locked: own.is_some(),
    }
}

fn battle(record: &SessionRecord, local: &LocalState, me: &str, config: GridConfig) -> ScreenView {
    let mut grid = GridView::new(config.size());
    let my_position = own_position(record, local, me);
    if let Some(cell) = my_position {
        grid.set(cell, CellState::Own);
    }
    mark_guesses(&mut grid, record, me);
    // A battle record without a valid turn holder is a transient
    // inconsistency; rendering it as "not my turn" keeps interaction off
    // until the store converges.
    let my_turn = matches!(
        record.phase_view(),
        Some(PhaseView::Battle { current_turn }) if current_turn == me
    );
    ScreenView::Battle {
        grid,
        my_turn,
        my_position,
    }
}

fn winner(record: &SessionRecord, local: &LocalState, me: &str, config: GridConfig) -> ScreenView {
    let mut grid = GridView::new(config.size());
    if let Some(cell) = own_position(record, local, me) {
        grid.set(cell, CellState::Own);
    }
    mark_guesses(&mut grid, record, me);
    if let Some((_, opponent)) = record.opponent_of(me)
        && let Some(cell) = opponent.position
        && grid.get(cell.row, cell.col) != CellState::Hit
    {
        // The winning hit already marks this cell; otherwise reveal it.
        grid.set(cell, CellState::Revealed);
    }
    let winner_name = record
        .winner
        .as_ref()
        .and_then(|id| record.participant(id))
        .map(|p| p.name.clone());
    ScreenView::Winner {
        grid,
        victory: record.winner.as_deref() == Some(me),
        winner_name,
    }
}

fn mark_guesses(grid: &mut GridView, record: &SessionRecord, me: &str) {
    for guess in record.guesses_by(me) {
        let state = if guess.hit {
            CellState::Hit
        } else {
            CellState::Miss
        };
        grid.set(Cell::new(guess.row, guess.col), state);
    }
}
