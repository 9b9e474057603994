//! Terminal status view for a foreground resident.
//!
//! Runs on its own thread. It only reads published snapshots and posts
//! ordinary requests into the control loop, exactly like an IPC client.

use crate::app::Snapshot;
use crate::daemon::ControlRequest;
use crate::intent::{truncate_for_ui, TaskIntentState};
use crate::session::{format_clock, Phase, PomodoroState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pomodoro_ipc::IpcRequest;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Theme {
    foreground: Color,
    background: Color,
    black: Color,
    gray: Color,
    red: Color,
    green: Color,
    yellow: Color,
    blue: Color,
    magenta: Color,
    cyan: Color,
    selection: Color,
}

const THEME: Theme = Theme {
    foreground: Color::Rgb(0xd8, 0xde, 0xe9),
    background: Color::Rgb(0x2e, 0x34, 0x40),
    black: Color::Rgb(0x3b, 0x42, 0x52),
    gray: Color::Rgb(0x7b, 0x88, 0xa1),
    red: Color::Rgb(0xbf, 0x61, 0x6a),
    green: Color::Rgb(0xa3, 0xbe, 0x8c),
    yellow: Color::Rgb(0xeb, 0xcb, 0x8b),
    blue: Color::Rgb(0x81, 0xa1, 0xc1),
    magenta: Color::Rgb(0xb4, 0x8e, 0xad),
    cyan: Color::Rgb(0x88, 0xc0, 0xd0),
    selection: Color::Rgb(0x88, 0xc0, 0xd0),
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    EditingIntent,
}

/// Interface-local state: nothing here is persisted.
#[derive(Debug, Default)]
pub struct View {
    pub mode: Mode,
    pub input: String,
    /// Index into pinned followed by recents.
    pub selected: usize,
}

impl View {
    /// Map a key press to the request it stands for, if any.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        snapshot: &Snapshot,
        intents: &TaskIntentState,
    ) -> Option<IpcRequest> {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Some(IpcRequest::new("exit"));
        }

        match self.mode {
            Mode::EditingIntent => self.handle_input_key(code),
            Mode::Normal => self.handle_normal_key(code, snapshot, intents),
        }
    }

    fn handle_normal_key(
        &mut self,
        code: KeyCode,
        snapshot: &Snapshot,
        intents: &TaskIntentState,
    ) -> Option<IpcRequest> {
        let choices = choices(intents);
        match code {
            KeyCode::Char('q') => Some(IpcRequest::new("exit")),
            KeyCode::Char(' ') => match &snapshot.state {
                Some(state) if state.is_paused => Some(IpcRequest::new("resume")),
                Some(_) => Some(IpcRequest::new("pause")),
                None => Some(IpcRequest::new("start")),
            },
            KeyCode::Char('s') => Some(IpcRequest::new("start")),
            KeyCode::Char('x') => Some(IpcRequest::new("stop")),
            KeyCode::Char('n') => Some(IpcRequest::new("skip")),
            KeyCode::Char('i') => {
                self.mode = Mode::EditingIntent;
                self.input = intents.current().unwrap_or_default().to_string();
                None
            }
            KeyCode::Char('p') => Some(intent_request(&["pin"])),
            KeyCode::Char('u') => {
                let target = choices
                    .get(self.selected)
                    .filter(|choice| intents.is_pinned(choice))
                    .map(String::as_str)
                    .or(intents.current())?;
                Some(intent_request(&["unpin", target]))
            }
            KeyCode::Char('c') => Some(intent_request(&["clear"])),
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !choices.is_empty() {
                    self.selected = (self.selected + 1).min(choices.len() - 1);
                }
                None
            }
            KeyCode::Enter => {
                let choice = choices.get(self.selected)?;
                Some(intent_request(&["set", choice.as_str()]))
            }
            _ => None,
        }
    }

    fn handle_input_key(&mut self, code: KeyCode) -> Option<IpcRequest> {
        match code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.input.clear();
                None
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                let text = std::mem::take(&mut self.input);
                if text.trim().is_empty() {
                    Some(intent_request(&["clear"]))
                } else {
                    Some(intent_request(&["set", text.as_str()]))
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
                None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                None
            }
            _ => None,
        }
    }
}

fn intent_request(args: &[&str]) -> IpcRequest {
    IpcRequest::new("intent").with_positionals(args.iter().map(|s| s.to_string()).collect())
}

/// Pinned intents, then recents that are not pinned.
fn choices(intents: &TaskIntentState) -> Vec<String> {
    let mut all: Vec<String> = intents.pinned().to_vec();
    all.extend(
        intents
            .recents()
            .iter()
            .filter(|recent| !intents.is_pinned(recent))
            .cloned(),
    );
    all
}

/// Run the view on a new thread until shutdown.
pub fn spawn(
    control: mpsc::Sender<ControlRequest>,
    snapshots: watch::Receiver<Snapshot>,
    intents: watch::Receiver<TaskIntentState>,
    shutdown: Arc<watch::Sender<bool>>,
) -> JoinHandle<Result<()>> {
    std::thread::spawn(move || {
        let result = run(&control, &snapshots, &intents, &shutdown);
        if let Err(e) = &result {
            error!("Interface stopped: {:#}", e);
            let _ = shutdown.send(true);
        }
        result
    })
}

fn run(
    control: &mpsc::Sender<ControlRequest>,
    snapshots: &watch::Receiver<Snapshot>,
    intents: &watch::Receiver<TaskIntentState>,
    shutdown: &watch::Sender<bool>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_view(&mut terminal, control, snapshots, intents, shutdown);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_view<B: Backend>(
    terminal: &mut Terminal<B>,
    control: &mpsc::Sender<ControlRequest>,
    snapshots: &watch::Receiver<Snapshot>,
    intents: &watch::Receiver<TaskIntentState>,
    shutdown: &watch::Sender<bool>,
) -> Result<()> {
    let stop = shutdown.subscribe();
    let mut view = View::default();

    loop {
        if *stop.borrow() {
            return Ok(());
        }

        let snapshot = snapshots.borrow().clone();
        let current_intents = intents.borrow().clone();
        let choice_count = choices(&current_intents).len();
        if view.selected >= choice_count {
            view.selected = choice_count.saturating_sub(1);
        }

        terminal.draw(|f| draw(f, &view, &snapshot, &current_intents, Utc::now()))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(request) =
                        view.handle_key(key.code, key.modifiers, &snapshot, &current_intents)
                    {
                        post(control, request);
                    }
                }
            }
        }
    }
}

/// Fire and forget: the outcome shows up in the next snapshot.
fn post(control: &mpsc::Sender<ControlRequest>, request: IpcRequest) {
    debug!(command = %request.command, "key press");
    let (reply, _answer) = oneshot::channel();
    if control.blocking_send(ControlRequest { request, reply }).is_err() {
        debug!("control loop gone");
    }
}

pub fn draw(
    f: &mut Frame,
    view: &View,
    snapshot: &Snapshot,
    intents: &TaskIntentState,
    now: DateTime<Utc>,
) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(f, chunks[0]);
    draw_timer(f, chunks[1], snapshot.state.as_ref(), now);
    draw_intents(f, chunks[2], view, intents);
    draw_status_bar(f, chunks[3], view, snapshot);

    if view.mode == Mode::EditingIntent {
        draw_input_overlay(f, "Intent", &view.input);
    }
}

fn draw_header(f: &mut Frame, area: Rect) {
    let text = Line::from(vec![Span::styled(
        "POMODORO",
        Style::default().fg(THEME.blue).add_modifier(Modifier::BOLD),
    )]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(THEME.black)),
        ),
        area,
    );
}

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Work => THEME.red,
        Phase::Break => THEME.green,
        Phase::LongBreak => THEME.blue,
    }
}

fn draw_timer(f: &mut Frame, area: Rect, state: Option<&PomodoroState>, now: DateTime<Utc>) {
    let (title, color) = match state {
        Some(state) => (
            format!(
                " {} {}/{}{} ",
                state.phase.label(),
                state.cycle_index,
                state.cycles,
                if state.is_paused { " (paused)" } else { "" }
            ),
            phase_color(state.phase),
        ),
        None => (" Idle ".to_string(), THEME.gray),
    };
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(THEME.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner_area);

    let Some(state) = state else {
        f.render_widget(
            Paragraph::new("No active session. Press 's' to start one.")
                .style(Style::default().fg(THEME.gray))
                .alignment(Alignment::Center),
            v_chunks[0],
        );
        return;
    };

    f.render_widget(
        Paragraph::new(format_clock(state.remaining_seconds(now)))
            .style(
                Style::default()
                    .fg(THEME.foreground)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center),
        v_chunks[0],
    );
    let elapsed = 1.0 - state.remaining_fraction(now);
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(color).bg(THEME.black))
            .ratio(elapsed.clamp(0.0, 1.0)),
        v_chunks[1],
    );
}

fn draw_intents(f: &mut Frame, area: Rect, view: &View, intents: &TaskIntentState) {
    let block = Block::default()
        .title(Span::styled(" Intent ", Style::default().fg(THEME.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(THEME.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner_area);

    let width = usize::from(rows[0].width.saturating_sub(4));
    let current = match intents.current() {
        Some(text) => Span::styled(
            truncate_for_ui(text, width),
            Style::default()
                .fg(THEME.foreground)
                .add_modifier(Modifier::BOLD),
        ),
        None => Span::styled(
            "Nothing set. Press 'i' to set one.",
            Style::default().fg(THEME.gray),
        ),
    };
    f.render_widget(Paragraph::new(Line::from(vec![Span::raw("▸ "), current])), rows[0]);

    let items: Vec<ListItem> = choices(intents)
        .into_iter()
        .map(|choice| {
            let pinned = intents.is_pinned(&choice);
            let marker = if pinned { "★ " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(THEME.yellow)),
                Span::styled(
                    truncate_for_ui(&choice, width),
                    Style::default().fg(if pinned { THEME.foreground } else { THEME.gray }),
                ),
            ]))
        })
        .collect();
    if items.is_empty() {
        return;
    }
    let mut list_state = ListState::default();
    list_state.select(Some(view.selected));
    f.render_stateful_widget(
        List::new(items).highlight_style(Style::default().bg(THEME.black).fg(THEME.selection)),
        rows[1],
        &mut list_state,
    );
}

fn draw_status_bar(f: &mut Frame, area: Rect, view: &View, snapshot: &Snapshot) {
    let (mode_text, mode_color) = match view.mode {
        Mode::Normal => ("NORMAL", THEME.green),
        Mode::EditingIntent => ("INTENT", THEME.yellow),
    };
    let help = if view.mode == Mode::Normal {
        "space:pause/resume │ s:start │ x:stop │ n:skip │ i:intent │ p:pin │ u:unpin │ c:clear │ q:quit"
    } else {
        "enter:confirm │ esc:cancel"
    };
    let mut spans = vec![
        Span::styled(
            format!(" {} ", mode_text),
            Style::default()
                .bg(mode_color)
                .fg(THEME.background)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
    ];
    if !snapshot.status.is_empty() {
        spans.push(Span::styled(
            format!("{} │ ", snapshot.status),
            Style::default().fg(THEME.foreground),
        ));
    }
    if let Some(message) = &snapshot.last_message {
        spans.push(Span::styled(
            format!("{} ", message),
            Style::default().fg(THEME.magenta),
        ));
    }
    spans.push(Span::raw(help));
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(Block::default().style(Style::default().bg(THEME.black).fg(THEME.gray))),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, input: &str) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(THEME.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(THEME.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(THEME.foreground)),
            Span::styled(input, Style::default().fg(THEME.foreground)),
            Span::styled(
                "█",
                Style::default()
                    .fg(THEME.cyan)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
