use crate::{
    amount::{
        BetError,
        POOL_RESERVE_RATIO,
        format_coin_amount,
        is_amount_keystroke_valid,
        parse_coin_amount,
    },
    client::{
        AdminStatus,
        AppSnapshot,
        MINT_DEFAULT_COINS,
        PlayOutcome,
    },
    transactions::CoinSide,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    ToggleSide,
    Refresh,
    Mint(u64),
    Play(u64),
    Deposit(u64),
    Withdraw(u64),
}

pub type InputEventReceiver = EventStream;

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    AmountModal(AmountState),
    QuitModal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AmountAction {
    Play,
    Mint,
    Deposit,
    Withdraw,
}

impl AmountAction {
    fn title(self) -> &'static str {
        match self {
            AmountAction::Play => "Place Bet",
            AmountAction::Mint => "Mint Tokens",
            AmountAction::Deposit => "Deposit to Pool",
            AmountAction::Withdraw => "Withdraw from Pool",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct AmountState {
    action: AmountAction,
    input: String,
    error: Option<String>,
}

impl AmountState {
    fn new(action: AmountAction) -> Self {
        Self {
            action,
            input: String::new(),
            error: None,
        }
    }

    fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Validated amount in base units, or a message to show inside the modal.
    fn submit(&self, snap: &AppSnapshot) -> Result<u64, String> {
        let amount =
            parse_coin_amount(&self.input, snap.decimals).map_err(|e| e.to_string())?;
        match self.action {
            AmountAction::Play => {
                snap.limits
                    .check(amount)
                    .map_err(|e| describe_bet_error(&e, snap))?;
            }
            AmountAction::Withdraw if amount > snap.pool_balance => {
                return Err(format!(
                    "Pool only holds {}",
                    fmt_amount(snap.pool_balance, snap)
                ));
            }
            _ => {}
        }
        Ok(amount)
    }
}

impl UiState {
    pub fn is_modal_open(&self) -> bool {
        self.mode != Mode::Normal
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(
    state: &mut UiState,
    snap: &AppSnapshot,
    event: Event,
) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match &mut state.mode {
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::AmountModal(amount) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Backspace => {
                amount.input.pop();
                amount.error = None;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                let mut candidate = amount.input.clone();
                candidate.push(c);
                if is_amount_keystroke_valid(&candidate) {
                    amount.input = candidate;
                    amount.error = None;
                    Some(UserEvent::Redraw)
                } else {
                    None
                }
            }
            KeyCode::Enter => match amount.submit(snap) {
                Ok(value) => {
                    let action = amount.action;
                    state.mode = Mode::Normal;
                    Some(match action {
                        AmountAction::Play => UserEvent::Play(value),
                        AmountAction::Mint => UserEvent::Mint(value),
                        AmountAction::Deposit => UserEvent::Deposit(value),
                        AmountAction::Withdraw => UserEvent::Withdraw(value),
                    })
                }
                Err(message) => {
                    amount.error = Some(message);
                    Some(UserEvent::Redraw)
                }
            },
            _ => None,
        },
        Mode::Normal => interpret_normal_key(state, snap, key),
    }
}

fn interpret_normal_key(
    state: &mut UiState,
    snap: &AppSnapshot,
    key: KeyEvent,
) -> Option<UserEvent> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('h') if snap.side != CoinSide::Heads => Some(UserEvent::ToggleSide),
        KeyCode::Char('t') if snap.side != CoinSide::Tails => Some(UserEvent::ToggleSide),
        KeyCode::Left | KeyCode::Right => Some(UserEvent::ToggleSide),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        _ if !snap.loaded => None,
        KeyCode::Char('p') | KeyCode::Enter => {
            let modal = AmountState::new(AmountAction::Play);
            let modal = if snap.limits.can_play() {
                modal
            } else {
                modal.with_error(play_disabled_reason(snap))
            };
            state.mode = Mode::AmountModal(modal);
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('m') => {
            state.mode = Mode::AmountModal(
                AmountState::new(AmountAction::Mint).with_input(MINT_DEFAULT_COINS.to_string()),
            );
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('d') => {
            state.mode = Mode::AmountModal(AmountState::new(AmountAction::Deposit));
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('w') if matches!(snap.admin, AdminStatus::Admin(_)) => {
            state.mode = Mode::AmountModal(AmountState::new(AmountAction::Withdraw));
            Some(UserEvent::Redraw)
        }
        _ => None,
    }
}

fn fmt_amount(base_units: u64, snap: &AppSnapshot) -> String {
    format!("{} {}", format_coin_amount(base_units, snap.decimals), snap.ticker)
}

fn describe_bet_error(err: &BetError, snap: &AppSnapshot) -> String {
    match err {
        BetError::Amount(e) => e.to_string(),
        BetError::BelowMinimum { min } => format!("Minimum bet is {}", fmt_amount(*min, snap)),
        BetError::AboveMaximum { max } => format!("Maximum bet is {}", fmt_amount(*max, snap)),
        BetError::PoolTooSmall { pool, required } => format!(
            "Pool holds {} but this bet needs {}",
            fmt_amount(*pool, snap),
            fmt_amount(*required, snap)
        ),
    }
}

fn play_disabled_reason(snap: &AppSnapshot) -> String {
    let needed = snap.limits.min.saturating_mul(POOL_RESERVE_RATIO);
    if snap.pool_balance < needed {
        format!(
            "Play is disabled: pool needs at least {}",
            fmt_amount(needed, snap)
        )
    } else {
        format!(
            "Play is disabled: you need at least {} to bet",
            fmt_amount(snap.limits.min, snap)
        )
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // wallet
            Constraint::Length(4),  // pool
            Constraint::Min(12),    // play + rules
            Constraint::Length(6),  // status/errors
            Constraint::Length(3),  // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    draw_pool_panel(f, chunks[1], snap);
    draw_play_area(f, chunks[2], snap);
    draw_status(f, chunks[3], snap);
    draw_help(f, chunks[4], snap);
    draw_modals(f, state, snap);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let balance = if snap.loaded {
        format!("{} ({} coins)", fmt_amount(snap.wallet_balance, snap), snap.coin_count)
    } else {
        String::from("loading...")
    };
    let role = match snap.admin {
        AdminStatus::Admin(_) => " | Admin",
        _ => "",
    };
    let text = format!(
        "{} | {} | Balance: {}{}",
        snap.network,
        snap.address.short(),
        balance,
        role
    );
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_pool_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let refreshed = snap
        .last_refreshed
        .map(|at| at.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| String::from("never"));
    let range = if snap.limits.can_play() {
        Line::from(format!(
            "Bet range: {} to {}",
            fmt_amount(snap.limits.min, snap),
            fmt_amount(snap.limits.max, snap)
        ))
    } else if snap.loaded {
        Line::styled(play_disabled_reason(snap), Style::default().fg(Color::Yellow))
    } else {
        Line::from("")
    };
    let lines = vec![
        Line::from(format!(
            "Pool: {} | Last refresh: {}",
            fmt_amount(snap.pool_balance, snap),
            refreshed
        )),
        range,
    ];
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Game Pool"));
    f.render_widget(widget, area);
}

fn draw_play_area(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let mut lines = vec![side_line(snap.side), Line::from("")];
    if snap.history.is_empty() {
        lines.push(Line::styled(
            "No flips yet",
            Style::default().fg(Color::DarkGray),
        ));
    }
    for record in &snap.history {
        let (label, color) = match record.outcome {
            PlayOutcome::Won { payout } => (format!("won {}", fmt_amount(payout, snap)), Color::Green),
            PlayOutcome::Lost { stake } => (format!("lost {}", fmt_amount(stake, snap)), Color::Red),
            PlayOutcome::Undetermined => (String::from("no coins moved"), Color::Yellow),
        };
        lines.push(Line::styled(
            format!(
                "{} {} {} -> {}",
                record.played_at.format("%H:%M:%S"),
                record.side,
                fmt_amount(record.stake, snap),
                label
            ),
            Style::default().fg(color),
        ));
    }
    let play = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Flip"));
    f.render_widget(play, cols[0]);

    let rules = Paragraph::new(vec![
        Line::from("Pick heads or tails and place a bet."),
        Line::from("A win pays out an amount equal to your stake."),
        Line::from(format!(
            "Max bet is 1/{POOL_RESERVE_RATIO} of the pool or your balance, whichever is smaller."
        )),
        Line::from(format!(
            "Minimum bet: {}",
            fmt_amount(snap.limits.min, snap)
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Rules"));
    f.render_widget(rules, cols[1]);
}

fn side_line(side: CoinSide) -> Line<'static> {
    let selected = Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let idle = Style::default().fg(Color::Gray);
    let (heads, tails) = match side {
        CoinSide::Heads => (selected, idle),
        CoinSide::Tails => (idle, selected),
    };
    Line::from(vec![
        Span::raw("Guess: "),
        Span::styled(" Heads ", heads),
        Span::raw("  "),
        Span::styled(" Tails ", tails),
    ])
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let text = if snap.status.trim().is_empty() {
            String::from("Ready")
        } else {
            snap.status.clone()
        };
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = snap.errors.iter().map(|e| Line::from(e.clone())).collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let withdraw = match snap.admin {
        AdminStatus::Admin(_) => " | w withdraw",
        _ => "",
    };
    let help = Paragraph::new(format!(
        "h/t or ←/→ side | p/Enter bet | m mint | d deposit{withdraw} | r refresh | q quit"
    ))
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::AmountModal(amount) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(amount.action.title());
            let mut lines = vec![Line::from(format!(
                "Amount: {}_ {}",
                amount.input, snap.ticker
            ))];
            match amount.action {
                AmountAction::Play => lines.push(Line::from(format!(
                    "Betting on {} | range {} to {}",
                    snap.side,
                    fmt_amount(snap.limits.min, snap),
                    fmt_amount(snap.limits.max, snap)
                ))),
                AmountAction::Withdraw => lines.push(Line::from(format!(
                    "Pool holds {}",
                    fmt_amount(snap.pool_balance, snap)
                ))),
                AmountAction::Mint | AmountAction::Deposit => {}
            }
            if let Some(err) = &amount.error {
                lines.push(Line::styled(err.clone(), Style::default().fg(Color::Red)));
            }
            lines.push(Line::from("Enter=confirm Esc=cancel digits to edit"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(
                Paragraph::new(lines).wrap(Wrap { trim: true }),
                block.inner(area),
            );
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit flip-coin? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
