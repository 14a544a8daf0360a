//! Screen rendering for the TUI.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::projector::{CellState, GridView, LobbyMember, ScreenView};
use crate::session::Cell;

use super::{MenuField, MenuForm};

const TITLE: &str = "GRID HUNTER";

/// Renders the create/join menu.
pub(crate) fn render_menu(frame: &mut Frame, form: &MenuForm, notice: Option<&str>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(title_bar("Find your enemy's position"), chunks[0]);
    frame.render_widget(
        input_field("Commander Name", &form.name, form.focus == MenuField::Name),
        chunks[1],
    );
    frame.render_widget(
        input_field("Game Code", &form.code, form.focus == MenuField::Code),
        chunks[2],
    );

    let hint = Paragraph::new("Leave the code empty to host a new game.")
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[3]);

    frame.render_widget(
        help_bar("Tab: Switch field | Enter: Create / Join | Esc: Quit"),
        chunks[4],
    );

    render_notice(frame, notice);
}

/// Renders any in-session screen from its projected view.
pub(crate) fn render_view(frame: &mut Frame, view: &ScreenView, cursor: Cell, notice: Option<&str>) {
    match view {
        ScreenView::Lobby {
            code,
            members,
            is_host,
            can_start,
        } => render_lobby(frame, code, members, *is_host, *can_start),
        ScreenView::Setup { grid, locked } => render_setup(frame, grid, *locked, cursor),
        ScreenView::Battle {
            grid,
            my_turn,
            my_position,
        } => render_battle(frame, grid, *my_turn, *my_position, cursor),
        ScreenView::Winner {
            grid,
            victory,
            winner_name,
        } => render_winner(frame, grid, *victory, winner_name.as_deref()),
        // The controller swaps back to the menu route on the next tick.
        ScreenView::Menu => {
            frame.render_widget(title_bar("Returning to menu"), frame.area());
        }
    }
    render_notice(frame, notice);
}

fn render_lobby(
    frame: &mut Frame,
    code: &str,
    members: &[LobbyMember],
    is_host: bool,
    can_start: bool,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(title_bar("Waiting Room"), chunks[0]);

    let code_display = Paragraph::new(spaced(code))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Share this code"));
    frame.render_widget(code_display, chunks[1]);

    let items: Vec<ListItem> = members
        .iter()
        .map(|m| {
            let label = if m.is_me {
                format!("{} (you)", m.name)
            } else {
                m.name.clone()
            };
            ListItem::new(label)
        })
        .collect();
    let title = format!("Players ({}/2)", members.len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, chunks[2]);

    let help = if can_start {
        "s: Start game | q: Leave"
    } else if is_host {
        "Waiting for another player to join... | q: Leave"
    } else {
        "Waiting for the host to start... | q: Leave"
    };
    frame.render_widget(help_bar(help), chunks[3]);
}

fn render_setup(frame: &mut Frame, grid: &GridView, locked: bool, cursor: Cell) {
    let chunks = standard_chunks(frame, grid.size());

    frame.render_widget(title_bar("Deploy Your Position"), chunks[0]);

    let (info, style) = if locked {
        (
            "Position locked. Waiting for opponent...",
            Style::default().fg(Color::Green),
        )
    } else {
        (
            "Select one square to hide your position.",
            Style::default().fg(Color::Cyan),
        )
    };
    frame.render_widget(
        Paragraph::new(info).style(style).alignment(Alignment::Center),
        chunks[1],
    );

    let cursor = (!locked).then_some(cursor);
    frame.render_widget(grid_widget(grid, cursor), chunks[2]);
    frame.render_widget(help_bar("Arrows: Move | Enter: Lock in | q: Leave"), chunks[3]);
}

fn render_battle(
    frame: &mut Frame,
    grid: &GridView,
    my_turn: bool,
    my_position: Option<Cell>,
    cursor: Cell,
) {
    let chunks = standard_chunks(frame, grid.size());

    frame.render_widget(title_bar("Battle"), chunks[0]);

    let (text, style) = if my_turn {
        (
            "YOUR TURN - fire!",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        ("Opponent's turn...", Style::default().fg(Color::Cyan))
    };
    frame.render_widget(
        Paragraph::new(text).style(style).alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(grid_widget(grid, Some(cursor)), chunks[2]);

    let own = my_position
        .map(|cell| format!("Your position: {}", position_label(cell)))
        .unwrap_or_default();
    frame.render_widget(help_bar(&format!("{own} | Arrows: Aim | Enter: Fire | q: Leave")), chunks[3]);
}

fn render_winner(frame: &mut Frame, grid: &GridView, victory: bool, winner_name: Option<&str>) {
    let chunks = standard_chunks(frame, grid.size());

    frame.render_widget(title_bar("Game Over"), chunks[0]);

    let (banner, style) = if victory {
        (
            "VICTORY - you located the enemy position!".to_string(),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        let name = winner_name.unwrap_or("The opponent");
        (
            format!("DEFEATED - {name} discovered your position."),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    };
    frame.render_widget(
        Paragraph::new(banner)
            .style(style)
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(grid_widget(grid, None), chunks[2]);
    frame.render_widget(help_bar("r: Play again | q: Leave"), chunks[3]);
}

/// Title / status line / grid / help, shared by the grid screens.
fn standard_chunks(frame: &Frame, grid_size: u8) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Min(grid_size as u16 + 2),
            Constraint::Length(3),
        ])
        .split(frame.area())
}

fn title_bar(subtitle: &str) -> Paragraph<'static> {
    Paragraph::new(format!("{TITLE} - {subtitle}"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
}

fn help_bar(text: &str) -> Paragraph<'static> {
    Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
}

fn input_field<'a>(label: &'a str, value: &str, focused: bool) -> Paragraph<'a> {
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let shown = if focused {
        format!("{value}_")
    } else {
        value.to_string()
    };
    Paragraph::new(shown).block(
        Block::default()
            .borders(Borders::ALL)
            .title(label)
            .border_style(border),
    )
}

fn grid_widget(grid: &GridView, cursor: Option<Cell>) -> Paragraph<'static> {
    let mut lines = Vec::with_capacity(grid.size() as usize);
    for row in 0..grid.size() {
        let mut spans = Vec::with_capacity(grid.size() as usize);
        for col in 0..grid.size() {
            let (symbol, mut style) = cell_symbol(grid.get(row, col));
            if cursor == Some(Cell::new(row, col)) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            spans.push(Span::styled(format!(" {symbol} "), style));
        }
        lines.push(Line::from(spans));
    }
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
}

fn cell_symbol(state: CellState) -> (&'static str, Style) {
    match state {
        CellState::Empty => ("·", Style::default().fg(Color::DarkGray)),
        CellState::Own => (
            "◉",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        CellState::Hit => (
            "✶",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        CellState::Miss => ("◌", Style::default().fg(Color::DarkGray)),
        CellState::Revealed => (
            "◉",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    }
}

/// Letter-spaces a join code for the big lobby display ("A B 1 2 C D").
fn spaced(code: &str) -> String {
    let mut out = String::with_capacity(code.len() * 2);
    for (i, c) in code.chars().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Human-readable cell label, column letter then one-based row ("A1").
fn position_label(cell: Cell) -> String {
    let col = (b'A' + cell.col) as char;
    format!("{col}{}", cell.row + 1)
}

fn render_notice(frame: &mut Frame, notice: Option<&str>) {
    let Some(message) = notice else { return };
    let area = centered_rect(frame.area(), 44, 6);
    frame.render_widget(Clear, area);
    let text = Paragraph::new(format!("{message}\n\nPress any key to continue."))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Notice")
                .border_style(Style::default().fg(Color::Yellow)),
        );
    frame.render_widget(text, area);
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(area.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Length(area.width.saturating_sub(width) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Length(area.height.saturating_sub(height) / 2),
        ])
        .split(horizontal[1])[1]
}
