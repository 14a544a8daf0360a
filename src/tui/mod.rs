//! Terminal UI rendering projector output and feeding actions back.
//!
//! The controller owns no game state of its own: every frame it projects
//! the latest synchronized snapshot into a [`ScreenView`] and renders that.
//! Key handling only triggers client actions the view says are available,
//! so invalid actions are unreachable from the keyboard.

mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use tokio::time::{Duration, sleep};
use tracing::{info, instrument, warn};

use crate::client::GameClient;
use crate::projector::{LocalState, ScreenView, project};
use crate::session::{Cell, GridConfig, JOIN_CODE_LEN, Phase};
use crate::store::Store;

const MAX_NAME_LEN: usize = 20;

/// Runs the TUI client against the given store until the user quits.
///
/// Sets up the terminal, drives the controller loop, and restores the
/// terminal on exit.
#[instrument(skip(store))]
pub async fn run(store: Arc<dyn Store>, grid: GridConfig, name: Option<String>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let client = GameClient::new(store, grid);
    let mut controller = Controller::new(client, name.unwrap_or_default());
    let result = controller.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

/// Which menu input currently has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MenuField {
    Name,
    Code,
}

impl MenuField {
    fn other(self) -> Self {
        match self {
            Self::Name => Self::Code,
            Self::Code => Self::Name,
        }
    }
}

/// Input state of the create/join menu.
#[derive(Debug)]
pub(crate) struct MenuForm {
    pub(crate) name: String,
    pub(crate) code: String,
    pub(crate) focus: MenuField,
}

impl MenuForm {
    fn new(name: String) -> Self {
        let focus = if name.is_empty() {
            MenuField::Name
        } else {
            MenuField::Code
        };
        Self {
            name,
            code: String::new(),
            focus,
        }
    }
}

/// Per-session UI state: the observed session plus purely local extras.
#[derive(Debug)]
struct SessionUi {
    session: crate::client::ActiveSession,
    local: LocalState,
    cursor: Cell,
    last_phase: Option<Phase>,
}

impl SessionUi {
    fn new(session: crate::client::ActiveSession) -> Self {
        Self {
            session,
            local: LocalState::default(),
            cursor: Cell::new(0, 0),
            last_phase: None,
        }
    }
}

#[derive(Debug)]
enum Route {
    Menu(MenuForm),
    InSession(SessionUi),
}

/// Drives the screen loop: project, render, dispatch keys.
#[derive(Debug)]
struct Controller {
    client: GameClient,
    route: Route,
    /// Last entered name, restored when returning to the menu.
    name: String,
    /// Blocking notice; any key dismisses it.
    notice: Option<String>,
}

impl Controller {
    fn new(client: GameClient, name: String) -> Self {
        Self {
            client,
            route: Route::Menu(MenuForm::new(name.clone())),
            name,
            notice: None,
        }
    }

    async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        <B as Backend>::Error: Send + Sync + 'static,
    {
        info!("starting screen loop");
        loop {
            self.sync_route();
            let view = self.current_view();

            terminal.draw(|frame| match &self.route {
                Route::Menu(form) => ui::render_menu(frame, form, self.notice.as_deref()),
                Route::InSession(s) => {
                    ui::render_view(frame, &view, s.cursor, self.notice.as_deref())
                }
            })?;

            if event::poll(Duration::from_millis(100))?
                && let Event::Key(key) = event::read()?
            {
                // Crossterm fires both press and release events.
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                // A pending notice blocks everything until dismissed.
                if self.notice.take().is_some() {
                    continue;
                }
                if !self.handle_key(key, &view).await? {
                    info!("quitting");
                    return Ok(());
                }
            }

            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Reconciles local-only state with the latest snapshot: a vanished
    /// session forces a return to the menu, and an observed replay reset
    /// (`finished → setup`) drops the stale local selection so both
    /// clients can pick a fresh position, not just the one that pressed
    /// "play again".
    fn sync_route(&mut self) {
        let gone = match &mut self.route {
            Route::Menu(_) => false,
            Route::InSession(s) => match s.session.snapshot() {
                None => true,
                Some(record) => {
                    if s.last_phase == Some(Phase::Finished) && record.phase == Phase::Setup {
                        s.local.clear();
                    }
                    s.last_phase = Some(record.phase);
                    false
                }
            },
        };
        if gone {
            info!("session disappeared, returning to menu");
            self.route = Route::Menu(MenuForm::new(self.name.clone()));
            self.notice = Some("The game was closed.".to_string());
        }
    }

    fn current_view(&self) -> ScreenView {
        match &self.route {
            Route::Menu(_) => ScreenView::Menu,
            Route::InSession(s) => {
                let snapshot = s.session.snapshot();
                project(
                    snapshot.as_ref(),
                    &s.local,
                    s.session.player_id(),
                    self.client.grid(),
                )
            }
        }
    }

    /// Returns false to quit the application.
    async fn handle_key(&mut self, key: KeyEvent, view: &ScreenView) -> Result<bool> {
        if matches!(self.route, Route::Menu(_)) {
            self.handle_menu_key(key).await
        } else {
            self.handle_session_key(key, view).await
        }
    }

    async fn handle_menu_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Route::Menu(form) = &mut self.route else {
            return Ok(true);
        };
        match key.code {
            KeyCode::Esc => return Ok(false),
            KeyCode::Tab | KeyCode::Up | KeyCode::Down => form.focus = form.focus.other(),
            KeyCode::Backspace => {
                match form.focus {
                    MenuField::Name => form.name.pop(),
                    MenuField::Code => form.code.pop(),
                };
            }
            KeyCode::Char(c) => match form.focus {
                MenuField::Name if form.name.len() < MAX_NAME_LEN => form.name.push(c),
                MenuField::Code if form.code.len() < JOIN_CODE_LEN => {
                    form.code.push(c.to_ascii_uppercase())
                }
                _ => {}
            },
            KeyCode::Enter => {
                let name = form.name.trim().to_string();
                let code = form.code.trim().to_string();
                if name.is_empty() {
                    self.notice = Some("Enter your name first.".to_string());
                    return Ok(true);
                }
                self.name = name.clone();
                // Empty code creates a game, a filled one joins it.
                let result = if code.is_empty() {
                    self.client.create(&name).await
                } else {
                    self.client.join(&name, &code).await
                };
                match result {
                    Ok(session) => {
                        self.route = Route::InSession(SessionUi::new(session));
                    }
                    Err(e) => {
                        warn!(error = %e, "menu action failed");
                        self.notice = Some(e.to_string());
                    }
                }
            }
            _ => {}
        }
        Ok(true)
    }

    async fn handle_session_key(&mut self, key: KeyEvent, view: &ScreenView) -> Result<bool> {
        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
            self.leave_session().await;
            return Ok(true);
        }
        let size = self.client.grid().size();
        let Route::InSession(s) = &mut self.route else {
            return Ok(true);
        };
        match view {
            ScreenView::Lobby { can_start, .. } => {
                if key.code == KeyCode::Char('s')
                    && *can_start
                    && let Err(e) = s.session.start_game().await
                {
                    self.notice = Some(e.to_string());
                }
            }
            ScreenView::Setup { locked, .. } => {
                move_cursor(&mut s.cursor, key.code, size);
                if matches!(key.code, KeyCode::Enter | KeyCode::Char(' ')) && !*locked {
                    let cell = s.cursor;
                    s.local.select(cell);
                    if let Err(e) = s.session.select_position(cell).await {
                        self.notice = Some(e.to_string());
                    }
                }
            }
            ScreenView::Battle { my_turn, .. } => {
                move_cursor(&mut s.cursor, key.code, size);
                if matches!(key.code, KeyCode::Enter | KeyCode::Char(' '))
                    && *my_turn
                    && let Err(e) = s.session.submit_guess(s.cursor).await
                {
                    self.notice = Some(e.to_string());
                }
            }
            ScreenView::Winner { .. } => {
                if matches!(key.code, KeyCode::Char('r') | KeyCode::Enter) {
                    s.local.clear();
                    if let Err(e) = s.session.replay().await {
                        self.notice = Some(e.to_string());
                    }
                }
            }
            ScreenView::Menu => {}
        }
        Ok(true)
    }

    /// Leaves the current session (deleting it) and returns to the menu.
    async fn leave_session(&mut self) {
        let menu = Route::Menu(MenuForm::new(self.name.clone()));
        let route = std::mem::replace(&mut self.route, menu);
        if let Route::InSession(SessionUi { session, .. }) = route
            && let Err(e) = session.leave().await
        {
            warn!(error = %e, "leave failed");
            self.notice = Some(e.to_string());
        }
    }
}

fn move_cursor(cursor: &mut Cell, code: KeyCode, size: u8) {
    match code {
        KeyCode::Up if cursor.row > 0 => cursor.row -= 1,
        KeyCode::Down if cursor.row + 1 < size => cursor.row += 1,
        KeyCode::Left if cursor.col > 0 => cursor.col -= 1,
        KeyCode::Right if cursor.col + 1 < size => cursor.col += 1,
        _ => {}
    }
}
