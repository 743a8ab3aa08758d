// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use coinscope_app::{
    AppCommand, AppEvent, AppMode, AppState, AuthMode, Candidate, CoinDetail, CoinId, Liveness,
    LookupFailure, LookupRequest, MarketCoin, PanelState, RequestToken, SearchCommand,
    SearchConfig, SearchEngine, SearchEvent, SessionListener, SessionUser, SignUpOutcome,
    StatusToken, Subscription, TabKind, format_compact_usd, format_currency,
    format_optional_currency, format_optional_percentage, normalize_sparkline, page_count,
    page_range,
};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::macros::format_description;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 16;
const HIGHLIGHT_MARK: &str = "›";
const SEARCH_PLACEHOLDER: &str = "press / to search coins";
const BROWSE_HINTS: &str =
    "/ search | tab switch | j/k move | n/p page | enter detail | r reload | a sign in | L sign out | ctrl+q quit";
const AUTH_HINTS: &str = "enter submit | tab field | ctrl+t login/sign up | esc cancel";

/// Everything the UI loop needs from the outside world.
pub trait AppRuntime {
    fn load_popular(&mut self) -> Result<Vec<MarketCoin>>;
    fn load_coin_detail(&mut self, id: &CoinId) -> Result<CoinDetail>;
    fn lookup(&mut self, query: &str) -> Result<Vec<Candidate>, LookupFailure>;

    /// Runs `request` and reports the outcome on `tx`.
    ///
    /// The default runs inline. Runtimes backed by the network should move the
    /// call onto a worker and must not send once `liveness` is shut down.
    fn spawn_lookup(
        &mut self,
        request: LookupRequest,
        liveness: Liveness,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let outcome = self.lookup(&request.query);
        if !liveness.is_alive() {
            return Ok(());
        }
        tx.send(InternalEvent::Lookup {
            token: request.token,
            outcome,
        })
        .map_err(|_| anyhow::anyhow!("lookup event channel closed"))?;
        Ok(())
    }

    /// Runs a sign-in or sign-up and reports it as `InternalEvent::AuthFinished`.
    ///
    /// The default runs inline; network runtimes move it onto a worker.
    fn spawn_auth(&mut self, request: AuthRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let outcome = match request.mode {
            AuthMode::SignIn => AuthOutcome::SignedIn(
                self.sign_in(&request.email, &request.password)
                    .map_err(|error| format!("{error:#}")),
            ),
            AuthMode::SignUp => AuthOutcome::Registered(
                self.register(&request.email, &request.password)
                    .map_err(|error| format!("{error:#}")),
            ),
        };
        tx.send(InternalEvent::AuthFinished(outcome))
            .map_err(|_| anyhow::anyhow!("auth event channel closed"))?;
        Ok(())
    }

    fn auth_enabled(&self) -> bool {
        false
    }

    fn current_user(&self) -> Option<SessionUser> {
        None
    }

    fn subscribe_session(&mut self, _listener: SessionListener) -> Option<Subscription> {
        None
    }

    fn sign_in(&mut self, email: &str, password: &str) -> Result<SessionUser>;
    fn register(&mut self, email: &str, password: &str) -> Result<SignUpOutcome>;
    fn sign_out(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: StatusToken,
    },
    Lookup {
        token: RequestToken,
        outcome: Result<Vec<Candidate>, LookupFailure>,
    },
    SessionChanged(Option<SessionUser>),
    AuthFinished(AuthOutcome),
}

/// Credentials submitted from the auth form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub mode: AuthMode,
    pub email: String,
    pub password: String,
}

/// Result of an `AuthRequest`; errors are already rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    SignedIn(Result<SessionUser, String>),
    Registered(Result<SignUpOutcome, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiOptions {
    pub search: SearchConfig,
    pub page_size: usize,
    /// Query typed into the search box at startup.
    pub initial_query: Option<String>,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            page_size: 6,
            initial_query: None,
        }
    }
}

#[derive(Debug, Clone)]
struct SearchUi {
    engine: SearchEngine,
    liveness: Liveness,
    highlighted: usize,
}

impl SearchUi {
    fn new(config: SearchConfig) -> Self {
        Self {
            engine: SearchEngine::new(config),
            liveness: Liveness::new(),
            highlighted: 0,
        }
    }

    fn shut_down(&mut self, now: Instant) {
        self.engine.dispatch(SearchCommand::Teardown, now);
        self.liveness.shut_down();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum AuthField {
    #[default]
    Email,
    Password,
}

impl AuthField {
    const fn toggled(self) -> Self {
        match self {
            Self::Email => Self::Password,
            Self::Password => Self::Email,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AuthForm {
    email: String,
    password: String,
    field: AuthField,
    error: Option<String>,
    /// A submission is out and its answer has not arrived yet.
    pending: bool,
}

impl AuthForm {
    fn active_mut(&mut self) -> &mut String {
        match self.field {
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
        }
    }
}

#[derive(Debug, Clone)]
struct ViewData {
    search: SearchUi,
    popular: Vec<MarketCoin>,
    cursor: usize,
    page_size: usize,
    detail: Option<CoinDetail>,
    auth: Option<AuthForm>,
    status_token: StatusToken,
}

impl ViewData {
    fn new(options: &UiOptions) -> Self {
        Self {
            search: SearchUi::new(options.search),
            popular: Vec::new(),
            cursor: 0,
            page_size: options.page_size.max(1),
            detail: None,
            auth: None,
            status_token: StatusToken::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenRegions {
    tabs: Rect,
    search: Rect,
    body: Rect,
    status: Rect,
}

impl ScreenRegions {
    fn for_area(area: Rect) -> Self {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(2),
            ])
            .split(area);
        Self {
            tabs: layout[0],
            search: layout[1],
            body: layout[2],
            status: layout[3],
        }
    }
}

/// Terminal mouse reporting, held for as long as the search box can be
/// clicked away from.
struct MouseCapture;

impl MouseCapture {
    fn acquire() -> Result<Self> {
        execute!(io::stdout(), EnableMouseCapture).context("enable mouse capture")?;
        Ok(Self)
    }
}

impl Drop for MouseCapture {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), DisableMouseCapture);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PopularRow {
    rank: String,
    coin: String,
    price: String,
    change: String,
    trend: String,
    rising: bool,
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: &UiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;
    let mouse_capture = MouseCapture::acquire()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options);
    let (internal_tx, internal_rx) = mpsc::channel();
    let session_subscription = start_session(state, runtime, &internal_tx);

    if let Err(error) = reload_popular(state, runtime, &mut view_data) {
        emit_status(
            state,
            &mut view_data,
            &internal_tx,
            format!("load failed: {error:#}"),
        );
    }
    if let Some(query) = &options.initial_query {
        prefill_search(
            state,
            runtime,
            &mut view_data,
            &internal_tx,
            query,
            Instant::now(),
        );
    }

    let mut area = Rect::default();
    let mut result = Ok(());
    loop {
        let now = Instant::now();
        process_internal_events(
            state,
            runtime,
            &mut view_data,
            &internal_tx,
            &internal_rx,
            now,
        );
        drive_search(
            state,
            runtime,
            &mut view_data,
            &internal_tx,
            SearchCommand::Tick,
            now,
        );

        if let Err(error) = terminal.draw(|frame| {
            area = frame.area();
            render(frame, state, &view_data);
        }) {
            result = Err(error).context("draw frame");
            break;
        }

        match next_event(poll_timeout(&view_data, Instant::now())) {
            Ok(Some(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if handle_key_event(
                    state,
                    runtime,
                    &mut view_data,
                    &internal_tx,
                    key,
                    Instant::now(),
                ) {
                    break;
                }
            }
            Ok(Some(Event::Mouse(mouse))) => handle_mouse_event(
                state,
                runtime,
                &mut view_data,
                &internal_tx,
                mouse,
                area,
                Instant::now(),
            ),
            Ok(_) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    view_data.search.shut_down(Instant::now());
    drop(session_subscription);
    drop(mouse_capture);
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn next_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout).context("poll event")? {
        return event::read().context("read event").map(Some);
    }
    Ok(None)
}

/// Wakes up early enough to fire a pending debounce deadline on time.
fn poll_timeout(view_data: &ViewData, now: Instant) -> Duration {
    view_data
        .search
        .engine
        .next_deadline()
        .map_or(EVENT_POLL_INTERVAL, |deadline| {
            deadline
                .saturating_duration_since(now)
                .min(EVENT_POLL_INTERVAL)
        })
}

fn start_session<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    internal_tx: &Sender<InternalEvent>,
) -> Option<Subscription> {
    state.user = runtime.current_user();
    let sender = internal_tx.clone();
    runtime.subscribe_session(Box::new(move |user| {
        let _ = sender.send(InternalEvent::SessionChanged(user.cloned()));
    }))
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
    now: Instant,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Lookup { token, outcome } => drive_search(
                state,
                runtime,
                view_data,
                tx,
                SearchCommand::LookupCompleted { token, outcome },
                now,
            ),
            InternalEvent::SessionChanged(user) => {
                apply_app_command(state, view_data, tx, AppCommand::SessionChanged(user));
            }
            InternalEvent::AuthFinished(outcome) => finish_auth(state, view_data, tx, outcome),
        }
    }
}

fn drive_search<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: SearchCommand,
    now: Instant,
) {
    for event in view_data.search.engine.dispatch(command, now) {
        match event {
            SearchEvent::LookupIssued(request) => {
                view_data.search.highlighted = 0;
                let liveness = view_data.search.liveness.clone();
                if let Err(error) = runtime.spawn_lookup(request, liveness, tx.clone()) {
                    tracing::warn!(error = %error, "lookup could not be started");
                }
            }
            SearchEvent::Selected(candidate) => {
                view_data.search.highlighted = 0;
                apply_app_command(state, view_data, tx, AppCommand::BlurSearch);
                open_detail(state, runtime, view_data, tx, &candidate.id);
            }
            SearchEvent::PanelChanged(panel) => {
                tracing::trace!(panel = panel.label(), "search panel changed");
            }
        }
    }

    let visible = view_data.search.engine.results().len();
    if view_data.search.highlighted >= visible {
        view_data.search.highlighted = visible.saturating_sub(1);
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: StatusToken) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn apply_app_command(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) -> Vec<AppEvent> {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.next();
        schedule_status_clear(internal_tx, view_data.status_token);
    }
    events
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    apply_app_command(
        state,
        view_data,
        internal_tx,
        AppCommand::SetStatus(message.into()),
    );
}

fn reload_popular<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
) -> Result<usize> {
    view_data.popular = runtime.load_popular()?;
    view_data.cursor = 0;
    state.dispatch(AppCommand::ResetPage);
    Ok(view_data.popular.len())
}

fn open_detail<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    id: &CoinId,
) {
    match runtime.load_coin_detail(id) {
        Ok(detail) => view_data.detail = Some(detail),
        Err(error) => {
            tracing::warn!(coin = %id, error = %error, "coin detail failed");
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("detail failed: {error:#}"),
            );
        }
    }
}

fn prefill_search<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    query: &str,
    now: Instant,
) {
    focus_search(state, runtime, view_data, internal_tx, now);
    drive_search(
        state,
        runtime,
        view_data,
        internal_tx,
        SearchCommand::QueryChanged(query.to_owned()),
        now,
    );
}

fn focus_search<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    now: Instant,
) {
    apply_app_command(state, view_data, internal_tx, AppCommand::FocusSearch);
    drive_search(
        state,
        runtime,
        view_data,
        internal_tx,
        SearchCommand::Focus,
        now,
    );
}

fn blur_search<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    now: Instant,
) {
    drive_search(
        state,
        runtime,
        view_data,
        internal_tx,
        SearchCommand::OutsideClick,
        now,
    );
    apply_app_command(state, view_data, internal_tx, AppCommand::BlurSearch);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.detail.is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
            view_data.detail = None;
        }
        return false;
    }

    match state.mode {
        AppMode::Auth(mode) => handle_auth_key(state, runtime, view_data, internal_tx, key, mode),
        AppMode::Search => handle_search_key(state, runtime, view_data, internal_tx, key, now),
        AppMode::Browse => handle_browse_key(state, runtime, view_data, internal_tx, key, now),
    }
    false
}

fn is_plain_char(key: KeyEvent) -> bool {
    !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

fn handle_search_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) {
    let edited = match key.code {
        KeyCode::Esc => {
            blur_search(state, runtime, view_data, internal_tx, now);
            return;
        }
        KeyCode::Enter => {
            let index = view_data.search.highlighted;
            drive_search(
                state,
                runtime,
                view_data,
                internal_tx,
                SearchCommand::Select(index),
                now,
            );
            return;
        }
        KeyCode::Down => {
            move_highlight(&mut view_data.search, 1);
            return;
        }
        KeyCode::Up => {
            move_highlight(&mut view_data.search, -1);
            return;
        }
        KeyCode::Backspace => {
            let mut query = view_data.search.engine.query().to_owned();
            query.pop();
            query
        }
        KeyCode::Char(ch) if is_plain_char(key) => {
            let mut query = view_data.search.engine.query().to_owned();
            query.push(ch);
            query
        }
        _ => return,
    };

    drive_search(
        state,
        runtime,
        view_data,
        internal_tx,
        SearchCommand::QueryChanged(edited),
        now,
    );
}

fn move_highlight(search: &mut SearchUi, delta: isize) {
    if search.engine.panel_state() != PanelState::Results {
        return;
    }
    let count = search.engine.results().len() as isize;
    if count == 0 {
        return;
    }
    search.highlighted = (search.highlighted as isize + delta).clamp(0, count - 1) as usize;
}

fn handle_browse_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) {
    match key.code {
        KeyCode::Char('/') => focus_search(state, runtime, view_data, internal_tx, now),
        KeyCode::Tab => {
            apply_app_command(state, view_data, internal_tx, AppCommand::NextTab);
        }
        KeyCode::BackTab => {
            apply_app_command(state, view_data, internal_tx, AppCommand::PrevTab);
        }
        KeyCode::Char('j') | KeyCode::Down => move_cursor(state, view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_cursor(state, view_data, -1),
        KeyCode::Char('n') => {
            let command = AppCommand::NextPage {
                total: view_data.popular.len(),
                per_page: view_data.page_size,
            };
            if !apply_app_command(state, view_data, internal_tx, command).is_empty() {
                view_data.cursor = 0;
            }
        }
        KeyCode::Char('p') => {
            if !apply_app_command(state, view_data, internal_tx, AppCommand::PrevPage).is_empty()
            {
                view_data.cursor = 0;
            }
        }
        KeyCode::Enter if state.active_tab == TabKind::Coins => {
            if let Some(id) = selected_coin(state, view_data).map(|coin| coin.id.clone()) {
                open_detail(state, runtime, view_data, internal_tx, &id);
            }
        }
        KeyCode::Char('r') => {
            let message = match reload_popular(state, runtime, view_data) {
                Ok(count) => format!("loaded {count} coins"),
                Err(error) => format!("load failed: {error:#}"),
            };
            emit_status(state, view_data, internal_tx, message);
        }
        KeyCode::Char('a') => open_auth(state, runtime, view_data, internal_tx),
        KeyCode::Char('L') => sign_out(state, runtime, view_data, internal_tx),
        _ => {}
    }
}

fn move_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let rows = page_range(state.page, view_data.popular.len(), view_data.page_size).len() as isize;
    if rows == 0 {
        view_data.cursor = 0;
        return;
    }
    view_data.cursor = (view_data.cursor as isize + delta).clamp(0, rows - 1) as usize;
}

fn selected_coin<'a>(state: &AppState, view_data: &'a ViewData) -> Option<&'a MarketCoin> {
    let range = page_range(state.page, view_data.popular.len(), view_data.page_size);
    if view_data.cursor >= range.len() {
        return None;
    }
    view_data.popular.get(range.start + view_data.cursor)
}

fn open_auth<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !runtime.auth_enabled() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "sign-in is not configured; set [auth] url and anon_key",
        );
        return;
    }
    if let Some(message) = state
        .user
        .as_ref()
        .map(|user| format!("already signed in as {}", user.email))
    {
        emit_status(state, view_data, internal_tx, message);
        return;
    }

    view_data.auth = Some(AuthForm::default());
    apply_app_command(state, view_data, internal_tx, AppCommand::OpenAuth);
}

fn sign_out<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !state.is_signed_in() {
        emit_status(state, view_data, internal_tx, "not signed in");
        return;
    }
    if let Err(error) = runtime.sign_out() {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("sign out failed: {error:#}"),
        );
    }
}

fn handle_auth_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    mode: AuthMode,
) {
    let Some(form) = view_data.auth.as_mut() else {
        apply_app_command(state, view_data, internal_tx, AppCommand::CloseAuth);
        return;
    };

    match key.code {
        KeyCode::Esc => close_auth(state, view_data, internal_tx),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            form.field = form.field.toggled();
        }
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            form.error = None;
            apply_app_command(state, view_data, internal_tx, AppCommand::ToggleAuthMode);
        }
        KeyCode::Backspace => {
            form.active_mut().pop();
        }
        KeyCode::Char(ch) if is_plain_char(key) => form.active_mut().push(ch),
        KeyCode::Enter => submit_auth(state, runtime, view_data, internal_tx, mode),
        _ => {}
    }
}

fn close_auth(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.auth = None;
    apply_app_command(state, view_data, internal_tx, AppCommand::CloseAuth);
}

fn submit_auth<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mode: AuthMode,
) {
    let Some(form) = view_data.auth.as_mut() else {
        return;
    };
    if form.pending {
        return;
    }
    form.pending = true;
    form.error = None;
    let request = AuthRequest {
        mode,
        email: form.email.clone(),
        password: form.password.clone(),
    };

    if let Err(error) = runtime.spawn_auth(request, internal_tx.clone()) {
        let message = format!("{error:#}");
        if let Some(form) = view_data.auth.as_mut() {
            form.pending = false;
            form.error = Some(message.clone());
        }
        emit_status(state, view_data, internal_tx, message);
    }
}

fn finish_auth(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    outcome: AuthOutcome,
) {
    let Some(form) = view_data.auth.as_mut() else {
        tracing::debug!(?outcome, "auth form closed before the answer arrived");
        return;
    };
    form.pending = false;

    match outcome {
        AuthOutcome::SignedIn(Ok(user)) => {
            tracing::debug!(email = %user.email, "sign-in form accepted");
            close_auth(state, view_data, internal_tx);
        }
        AuthOutcome::SignedIn(Err(message)) => {
            form.password.clear();
            form.field = AuthField::Password;
            form.error = Some(message.clone());
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("sign in failed: {message}"),
            );
        }
        AuthOutcome::Registered(Ok(outcome)) => {
            form.password.clear();
            form.field = AuthField::Password;
            form.error = None;
            apply_app_command(state, view_data, internal_tx, AppCommand::ToggleAuthMode);
            emit_status(state, view_data, internal_tx, outcome.message());
        }
        AuthOutcome::Registered(Err(message)) => {
            form.error = Some(message.clone());
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("sign up failed: {message}"),
            );
        }
    }
}

fn handle_mouse_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
    area: Rect,
    now: Instant,
) {
    if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
        return;
    }
    if view_data.detail.is_some() || view_data.auth.is_some() {
        return;
    }

    let regions = ScreenRegions::for_area(area);
    let position = Position::new(mouse.column, mouse.row);

    if regions.search.contains(position) {
        focus_search(state, runtime, view_data, internal_tx, now);
        return;
    }

    if let Some(index) = panel_row_at(&regions, &view_data.search, position) {
        view_data.search.highlighted = index;
        drive_search(
            state,
            runtime,
            view_data,
            internal_tx,
            SearchCommand::Select(index),
            now,
        );
        return;
    }

    if panel_area(&regions, &view_data.search).is_some_and(|panel| panel.contains(position)) {
        return;
    }

    drive_search(
        state,
        runtime,
        view_data,
        internal_tx,
        SearchCommand::OutsideClick,
        now,
    );
    if state.mode == AppMode::Search {
        apply_app_command(state, view_data, internal_tx, AppCommand::BlurSearch);
    }
}

/// Lines of the dropdown under the search box; empty while it is closed.
fn panel_lines(search: &SearchUi) -> Vec<String> {
    let engine = &search.engine;
    match engine.panel_state() {
        PanelState::Closed => Vec::new(),
        PanelState::Loading => vec!["Loading…".to_owned()],
        PanelState::Error => vec![engine.error().unwrap_or_default().to_owned()],
        PanelState::Empty => vec!["No results".to_owned()],
        PanelState::Results => engine
            .results()
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let mark = if index == search.highlighted {
                    HIGHLIGHT_MARK
                } else {
                    " "
                };
                format!("{mark} {}", candidate.label())
            })
            .collect(),
    }
}

fn panel_area(regions: &ScreenRegions, search: &SearchUi) -> Option<Rect> {
    let lines = panel_lines(search).len();
    if lines == 0 {
        return None;
    }
    let height = (lines as u16).saturating_add(2).min(regions.body.height);
    Some(Rect {
        x: regions.search.x,
        y: regions.body.y,
        width: regions.search.width,
        height,
    })
}

fn panel_row_at(regions: &ScreenRegions, search: &SearchUi, position: Position) -> Option<usize> {
    if search.engine.panel_state() != PanelState::Results {
        return None;
    }
    let panel = panel_area(regions, search)?;
    if !panel.contains(position) {
        return None;
    }
    let row = usize::from(position.y - panel.y);
    if row == 0 || row > search.engine.results().len() {
        return None;
    }
    Some(row - 1)
}

/// Block-character sparkline of at most `width` samples.
fn sparkline_text(prices: &[f64], width: usize) -> String {
    let normalized = normalize_sparkline(prices);
    let count = width.min(normalized.len());
    if count == 0 {
        return String::new();
    }
    let last = normalized.len() - 1;
    (0..count)
        .map(|sample| {
            let index = if count == 1 {
                last
            } else {
                sample * last / (count - 1)
            };
            spark_char(normalized[index])
        })
        .collect()
}

fn spark_char(value: f64) -> char {
    let top = (SPARK_LEVELS.len() - 1) as f64;
    let level = (value / 100.0 * top).round().clamp(0.0, top) as usize;
    SPARK_LEVELS[level]
}

fn popular_rows(state: &AppState, view_data: &ViewData) -> Vec<PopularRow> {
    let range = page_range(state.page, view_data.popular.len(), view_data.page_size);
    view_data
        .popular
        .get(range)
        .unwrap_or_default()
        .iter()
        .map(|coin| PopularRow {
            rank: coin
                .market_cap_rank
                .map_or_else(|| "-".to_owned(), |rank| rank.to_string()),
            coin: format!("{} ({})", coin.name, coin.symbol.to_uppercase()),
            price: format_currency(coin.current_price),
            change: format_optional_percentage(coin.price_change_24h),
            trend: sparkline_text(&coin.sparkline_7d, SPARK_WIDTH),
            rising: coin.is_rising(),
        })
        .collect()
}

fn render_detail_text(detail: &CoinDetail, trend: Option<&[f64]>) -> String {
    let compact = |value: Option<f64>| value.map_or_else(|| "n/a".to_owned(), format_compact_usd);
    let genesis = detail.genesis_date.map_or_else(
        || "n/a".to_owned(),
        |date| {
            date.format(format_description!(
                "[month repr:short] [day padding:none], [year]"
            ))
            .unwrap_or_else(|_| date.to_string())
        },
    );

    let mut lines = vec![
        format!(
            "price: {}   24h: {}",
            format_optional_currency(detail.current_price),
            format_optional_percentage(detail.price_change_24h)
        ),
        format!(
            "market cap: {}   volume: {}",
            compact(detail.market_cap),
            compact(detail.total_volume)
        ),
        format!(
            "24h high / low: {} / {}",
            format_optional_currency(detail.high_24h),
            format_optional_currency(detail.low_24h)
        ),
        format!("genesis: {genesis}"),
    ];
    if let Some(homepage) = &detail.homepage {
        lines.push(format!("homepage: {homepage}"));
    }
    if let Some(github) = &detail.github {
        lines.push(format!("github: {github}"));
    }
    if let Some(trend) = trend.filter(|trend| !trend.is_empty()) {
        lines.push(format!("7d: {}", sparkline_text(trend, SPARK_WIDTH * 2)));
    }
    if !detail.summary.is_empty() {
        lines.push(String::new());
        lines.push(detail.summary.clone());
    }
    lines.join("\n")
}

fn render_auth_text(form: &AuthForm) -> String {
    let mark = |field: AuthField| {
        if form.field == field {
            HIGHLIGHT_MARK
        } else {
            " "
        }
    };
    let mut lines = vec![
        format!("{} email:    {}", mark(AuthField::Email), form.email),
        format!(
            "{} password: {}",
            mark(AuthField::Password),
            "*".repeat(form.password.chars().count())
        ),
    ];
    if form.pending {
        lines.push(String::new());
        lines.push("Working…".to_owned());
    } else if let Some(error) = &form.error {
        lines.push(String::new());
        lines.push(error.clone());
    }
    lines.join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(status) = &state.status_line {
        return status.clone();
    }
    if view_data.detail.is_some() {
        return "esc close".to_owned();
    }
    match state.mode {
        AppMode::Browse => BROWSE_HINTS.to_owned(),
        AppMode::Search => format!(
            "SEARCH {} | up/down move | enter select | esc close",
            view_data.search.engine.panel_state().label()
        ),
        AppMode::Auth(_) => AUTH_HINTS.to_owned(),
    }
}

fn header_title(state: &AppState) -> String {
    match &state.user {
        Some(user) => format!("coinscope · {}", user.email),
        None => "coinscope".to_owned(),
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let regions = ScreenRegions::for_area(frame.area());

    let selected = TabKind::ALL
        .iter()
        .position(|tab| *tab == state.active_tab)
        .unwrap_or(0);
    let tab_titles = TabKind::ALL
        .iter()
        .map(|tab| tab.label().to_owned())
        .collect::<Vec<String>>();
    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .title(header_title(state))
                .borders(Borders::ALL),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, regions.tabs);

    render_search_input(frame, regions.search, state, view_data);

    match state.active_tab {
        TabKind::Coins => render_popular(frame, regions.body, state, view_data),
        TabKind::Alerts => {
            let alerts = Paragraph::new(state.alerts_message())
                .block(Block::default().title("alerts").borders(Borders::ALL));
            frame.render_widget(alerts, regions.body);
        }
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, regions.status);

    if let Some(area) = panel_area(&regions, &view_data.search) {
        render_search_panel(frame, area, view_data);
    }

    if let Some(detail) = &view_data.detail {
        let trend = view_data
            .popular
            .iter()
            .find(|coin| coin.id == detail.id)
            .map(|coin| coin.sparkline_7d.as_slice());
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let card = Paragraph::new(render_detail_text(detail, trend)).block(
            Block::default()
                .title(format!("{} ({})", detail.name, detail.symbol.to_uppercase()))
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(card, area);
    }

    if let (AppMode::Auth(mode), Some(form)) = (state.mode, &view_data.auth) {
        let area = centered_rect(50, 30, frame.area());
        frame.render_widget(Clear, area);
        let auth = Paragraph::new(render_auth_text(form))
            .block(Block::default().title(mode.label()).borders(Borders::ALL));
        frame.render_widget(auth, area);
    }
}

fn render_search_input(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let searching = state.mode == AppMode::Search;
    let query = view_data.search.engine.query();
    let input = if query.is_empty() && !searching {
        Paragraph::new(SEARCH_PLACEHOLDER).style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(query.to_owned())
    };
    let border = if searching {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    frame.render_widget(
        input.block(
            Block::default()
                .title("search")
                .borders(Borders::ALL)
                .border_style(border),
        ),
        area,
    );

    if searching {
        let typed = u16::try_from(query.chars().count()).unwrap_or(u16::MAX);
        let x = area
            .x
            .saturating_add(1)
            .saturating_add(typed)
            .min(area.right().saturating_sub(2));
        frame.set_cursor_position(Position::new(x, area.y.saturating_add(1)));
    }
}

fn render_search_panel(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let search = &view_data.search;
    let panel_state = search.engine.panel_state();
    let lines = panel_lines(search)
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let style = match panel_state {
                PanelState::Error => Style::default().fg(Color::Red),
                PanelState::Results if index == search.highlighted => Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
                PanelState::Loading | PanelState::Empty => Style::default().fg(Color::DarkGray),
                _ => Style::default(),
            };
            Line::styled(text, style)
        })
        .collect::<Vec<Line<'_>>>();

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn render_popular(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    if view_data.popular.is_empty() {
        let empty = Paragraph::new("no coins loaded; press r to retry")
            .block(Block::default().title("popular").borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(["#", "coin", "price", "24h", "7d"].map(|label| {
        Cell::from(label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = popular_rows(state, view_data)
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let trend_color = if row.rising { Color::Green } else { Color::Red };
            let row_style = if index == view_data.cursor && state.mode == AppMode::Browse {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new([
                Cell::from(row.rank),
                Cell::from(row.coin),
                Cell::from(row.price),
                Cell::from(row.change).style(Style::default().fg(trend_color)),
                Cell::from(row.trend).style(Style::default().fg(trend_color)),
            ])
            .style(row_style)
        })
        .collect::<Vec<_>>();

    let widths = [
        Constraint::Length(4),
        Constraint::Min(18),
        Constraint::Length(14),
        Constraint::Length(9),
        Constraint::Length(SPARK_WIDTH as u16),
    ];
    let title = format!(
        "popular · page {}/{}",
        state.page + 1,
        page_count(view_data.popular.len(), view_data.page_size)
    );
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, AuthField, BROWSE_HINTS, InternalEvent, PanelState, ScreenRegions, UiOptions,
        ViewData, apply_app_command, drive_search, emit_status, handle_key_event,
        handle_mouse_event, panel_area, panel_lines, poll_timeout, popular_rows, prefill_search,
        process_internal_events, reload_popular, render_auth_text, render_detail_text,
        sparkline_text, start_session, status_text,
    };
    use anyhow::{Result, anyhow, bail};
    use coinscope_app::{
        AppCommand, AppMode, AppState, AuthMode, Candidate, CoinDetail, CoinId, CoinLookup,
        Liveness, LookupFailure, LookupRequest, MarketCoin, RequestToken, SearchCommand,
        SessionHub, SessionListener, SessionUser, SignUpOutcome, StatusToken, Subscription,
        TabKind,
    };
    use coinscope_testkit::{
        ManualClock, ScriptedLookup, bitcoin, bitcoin_cash, coin_detail, market_coins,
    };
    use crossterm::event::{
        KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    };
    use ratatui::layout::Rect;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct TestRuntime {
        lookup: ScriptedLookup,
        popular: Vec<MarketCoin>,
        popular_error: Option<String>,
        hub: SessionHub,
        auth_enabled: bool,
        registered: Vec<String>,
        detail_requests: Vec<CoinId>,
    }

    impl TestRuntime {
        fn with_lookup(lookup: ScriptedLookup) -> Self {
            Self {
                lookup,
                ..Self::default()
            }
        }
    }

    impl AppRuntime for TestRuntime {
        fn load_popular(&mut self) -> Result<Vec<MarketCoin>> {
            match &self.popular_error {
                Some(error) => Err(anyhow!("{error}")),
                None => Ok(self.popular.clone()),
            }
        }

        fn load_coin_detail(&mut self, id: &CoinId) -> Result<CoinDetail> {
            self.detail_requests.push(id.clone());
            coin_detail(id.as_str())
        }

        fn lookup(&mut self, query: &str) -> Result<Vec<Candidate>, LookupFailure> {
            self.lookup.lookup(query)
        }

        fn auth_enabled(&self) -> bool {
            self.auth_enabled
        }

        fn current_user(&self) -> Option<SessionUser> {
            self.hub.current_user()
        }

        fn subscribe_session(&mut self, listener: SessionListener) -> Option<Subscription> {
            Some(self.hub.subscribe(listener))
        }

        fn sign_in(&mut self, email: &str, password: &str) -> Result<SessionUser> {
            if password != "secret" {
                bail!("Invalid login credentials");
            }
            let user = SessionUser {
                id: "u-1".to_owned(),
                email: email.to_owned(),
            };
            self.hub.set_user(Some(user.clone()));
            Ok(user)
        }

        fn register(&mut self, email: &str, _password: &str) -> Result<SignUpOutcome> {
            if self.registered.iter().any(|known| known == email) {
                return Ok(SignUpOutcome::AlreadyRegistered);
            }
            self.registered.push(email.to_owned());
            Ok(SignUpOutcome::Created)
        }

        fn sign_out(&mut self) -> Result<()> {
            self.hub.set_user(None);
            Ok(())
        }
    }

    fn view_data_for_test() -> ViewData {
        ViewData::new(&UiOptions::default())
    }

    fn internal_channel() -> (
        mpsc::Sender<InternalEvent>,
        mpsc::Receiver<InternalEvent>,
    ) {
        mpsc::channel()
    }

    fn click(column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
        clock: ManualClock,
    }

    impl Harness {
        fn new(runtime: TestRuntime) -> Self {
            let (tx, rx) = internal_channel();
            Self {
                state: AppState::default(),
                runtime,
                view_data: view_data_for_test(),
                tx,
                rx,
                clock: ManualClock::new(),
            }
        }

        fn press(&mut self, code: KeyCode) -> bool {
            self.press_with(code, KeyModifiers::NONE)
        }

        fn press_with(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
            handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                KeyEvent::new(code, modifiers),
                self.clock.now(),
            )
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch));
            }
        }

        fn click(&mut self, column: u16, row: u16) {
            handle_mouse_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                click(column, row),
                screen(),
                self.clock.now(),
            );
        }

        fn tick_after(&mut self, millis: u64) {
            let now = self.clock.advance_ms(millis);
            drive_search(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                SearchCommand::Tick,
                now,
            );
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
                self.clock.now(),
            );
        }

        /// Lets the debounce fire and applies whatever the lookup answered.
        fn settle(&mut self) {
            self.tick_after(400);
            self.pump();
        }

        fn panel(&self) -> PanelState {
            self.view_data.search.engine.panel_state()
        }
    }

    fn screen() -> Rect {
        Rect::new(0, 0, 80, 24)
    }

    fn searching_for_bit() -> Harness {
        let lookup = ScriptedLookup::new().respond("bit", vec![bitcoin_cash(), bitcoin()]);
        let mut harness = Harness::new(TestRuntime::with_lookup(lookup));
        harness.press(KeyCode::Char('/'));
        harness.type_text("bit");
        harness.settle();
        harness
    }

    #[test]
    fn typing_issues_one_lookup_after_idle() {
        let lookup = ScriptedLookup::new().respond("bit", vec![bitcoin()]);
        let mut harness = Harness::new(TestRuntime::with_lookup(lookup));

        harness.press(KeyCode::Char('/'));
        assert_eq!(harness.state.mode, AppMode::Search);
        harness.type_text("bit");

        harness.tick_after(399);
        assert!(harness.runtime.lookup.calls().is_empty());
        assert_eq!(harness.panel(), PanelState::Closed);

        harness.tick_after(1);
        assert_eq!(harness.runtime.lookup.calls(), vec!["bit"]);
        assert_eq!(harness.panel(), PanelState::Loading);
        assert_eq!(panel_lines(&harness.view_data.search), vec!["Loading…"]);

        harness.pump();
        assert_eq!(harness.panel(), PanelState::Results);
        assert_eq!(
            panel_lines(&harness.view_data.search),
            vec!["› Bitcoin (BTC)"]
        );
    }

    #[test]
    fn escape_closes_panel_and_slash_reopens_cached_results() {
        let mut harness = searching_for_bit();
        assert_eq!(harness.panel(), PanelState::Results);

        harness.press(KeyCode::Esc);
        assert_eq!(harness.state.mode, AppMode::Browse);
        assert_eq!(harness.panel(), PanelState::Closed);
        assert_eq!(harness.view_data.search.engine.results().len(), 2);

        harness.press(KeyCode::Char('/'));
        assert_eq!(harness.panel(), PanelState::Results);
        assert_eq!(harness.runtime.lookup.calls().len(), 1);
    }

    #[test]
    fn enter_opens_detail_for_highlighted_candidate() {
        let mut harness = searching_for_bit();

        harness.press(KeyCode::Down);
        harness.press(KeyCode::Down);
        assert_eq!(harness.view_data.search.highlighted, 1);
        harness.press(KeyCode::Up);
        harness.press(KeyCode::Down);

        harness.press(KeyCode::Enter);
        assert_eq!(harness.runtime.detail_requests, vec![CoinId::new("bitcoin")]);
        assert_eq!(
            harness.view_data.detail.as_ref().map(|detail| detail.name.as_str()),
            Some("Bitcoin")
        );
        assert_eq!(harness.view_data.search.engine.query(), "");
        assert_eq!(harness.panel(), PanelState::Closed);
        assert_eq!(harness.state.mode, AppMode::Browse);

        harness.press(KeyCode::Char('x'));
        assert!(harness.view_data.detail.is_some());
        harness.press(KeyCode::Esc);
        assert!(harness.view_data.detail.is_none());
    }

    #[test]
    fn failed_detail_load_reports_status() {
        let mut harness = searching_for_bit();

        harness.press(KeyCode::Enter);
        assert!(harness.view_data.detail.is_none());
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.starts_with("detail failed"))
        );
    }

    #[test]
    fn lookup_failure_shows_error_line() {
        let lookup = ScriptedLookup::new().fail("doge", 500);
        let mut harness = Harness::new(TestRuntime::with_lookup(lookup));
        harness.press(KeyCode::Char('/'));
        harness.type_text("doge");
        harness.settle();

        assert_eq!(harness.panel(), PanelState::Error);
        assert_eq!(
            panel_lines(&harness.view_data.search),
            vec!["Failed to load suggestions"]
        );
        assert_eq!(harness.view_data.search.engine.query(), "doge");
    }

    #[test]
    fn backspace_below_threshold_closes_panel() {
        let mut harness = searching_for_bit();

        harness.press(KeyCode::Backspace);
        assert_eq!(harness.panel(), PanelState::Results);
        harness.press(KeyCode::Backspace);
        assert_eq!(harness.view_data.search.engine.query(), "b");
        assert_eq!(harness.panel(), PanelState::Closed);
    }

    #[test]
    fn clicking_a_panel_row_selects_it() {
        let mut harness = searching_for_bit();
        let regions = ScreenRegions::for_area(screen());
        let panel = panel_area(&regions, &harness.view_data.search).expect("panel should be open");

        harness.click(panel.x + 3, panel.y + 2);
        assert_eq!(harness.runtime.detail_requests, vec![CoinId::new("bitcoin")]);
        assert_eq!(harness.panel(), PanelState::Closed);
    }

    #[test]
    fn clicking_outside_closes_and_clicking_input_reopens() {
        let mut harness = searching_for_bit();
        let regions = ScreenRegions::for_area(screen());

        harness.click(regions.body.x + 70, regions.body.bottom() - 1);
        assert_eq!(harness.panel(), PanelState::Closed);
        assert_eq!(harness.state.mode, AppMode::Browse);

        harness.click(regions.search.x + 2, regions.search.y + 1);
        assert_eq!(harness.state.mode, AppMode::Search);
        assert_eq!(harness.panel(), PanelState::Results);
    }

    #[test]
    fn clicking_panel_border_keeps_it_open() {
        let mut harness = searching_for_bit();
        let regions = ScreenRegions::for_area(screen());
        let panel = panel_area(&regions, &harness.view_data.search).expect("panel should be open");

        harness.click(panel.x + 3, panel.y);
        assert_eq!(harness.panel(), PanelState::Results);
        assert!(harness.runtime.detail_requests.is_empty());
    }

    #[test]
    fn shut_down_search_drops_deferred_lookups() {
        let mut runtime = TestRuntime::with_lookup(ScriptedLookup::new().respond("bit", vec![bitcoin()]));
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();
        let clock = ManualClock::new();

        view_data.search.shut_down(clock.now());
        assert!(view_data.search.engine.is_torn_down());
        assert!(!view_data.search.liveness.is_alive());

        runtime
            .spawn_lookup(
                LookupRequest {
                    token: RequestToken::new(1),
                    query: "bit".to_owned(),
                },
                view_data.search.liveness.clone(),
                tx,
            )
            .expect("spawn should succeed");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn live_lookup_is_reported_on_channel() {
        let mut runtime = TestRuntime::with_lookup(ScriptedLookup::new().respond("bit", vec![bitcoin()]));
        let (tx, rx) = internal_channel();

        runtime
            .spawn_lookup(
                LookupRequest {
                    token: RequestToken::new(3),
                    query: "bit".to_owned(),
                },
                Liveness::new(),
                tx,
            )
            .expect("spawn should succeed");
        assert_eq!(
            rx.try_recv().ok(),
            Some(InternalEvent::Lookup {
                token: RequestToken::new(3),
                outcome: Ok(vec![bitcoin()]),
            })
        );
    }

    #[test]
    fn poll_timeout_wakes_for_debounce_deadline() {
        let mut harness = Harness::new(TestRuntime::default());
        assert_eq!(
            poll_timeout(&harness.view_data, harness.clock.now()),
            Duration::from_millis(120)
        );

        harness.press(KeyCode::Char('/'));
        harness.type_text("eth");
        let later = harness.clock.advance_ms(350);
        assert_eq!(
            poll_timeout(&harness.view_data, later),
            Duration::from_millis(50)
        );

        let overdue = harness.clock.advance_ms(100);
        assert_eq!(poll_timeout(&harness.view_data, overdue), Duration::ZERO);
    }

    #[test]
    fn prefilled_query_searches_after_debounce() {
        let lookup = ScriptedLookup::new().respond("bit", vec![bitcoin()]);
        let mut harness = Harness::new(TestRuntime::with_lookup(lookup));
        prefill_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            "bit",
            harness.clock.now(),
        );
        assert_eq!(harness.state.mode, AppMode::Search);

        harness.settle();
        assert_eq!(harness.runtime.lookup.calls(), vec!["bit"]);
        assert_eq!(harness.panel(), PanelState::Results);
    }

    #[test]
    fn status_clear_only_honors_latest_token() {
        let mut harness = Harness::new(TestRuntime::default());
        emit_status(&mut harness.state, &mut harness.view_data, &harness.tx, "first");
        emit_status(&mut harness.state, &mut harness.view_data, &harness.tx, "second");
        assert_eq!(harness.view_data.status_token, StatusToken::new(2));

        harness
            .tx
            .send(InternalEvent::ClearStatus {
                token: StatusToken::new(1),
            })
            .expect("send should succeed");
        harness.pump();
        assert_eq!(harness.state.status_line.as_deref(), Some("second"));

        harness
            .tx
            .send(InternalEvent::ClearStatus {
                token: StatusToken::new(2),
            })
            .expect("send should succeed");
        harness.pump();
        assert_eq!(harness.state.status_line, None);
    }

    #[test]
    fn tab_keys_switch_between_coins_and_alerts() {
        let mut harness = Harness::new(TestRuntime::default());
        harness.press(KeyCode::Tab);
        assert_eq!(harness.state.active_tab, TabKind::Alerts);
        harness.press(KeyCode::BackTab);
        assert_eq!(harness.state.active_tab, TabKind::Coins);
    }

    #[test]
    fn paging_moves_through_popular_list() -> Result<()> {
        let mut harness = Harness::new(TestRuntime {
            popular: market_coins(),
            ..TestRuntime::default()
        });
        let loaded = reload_popular(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
        )?;
        assert_eq!(loaded, 10);

        let first_page = popular_rows(&harness.state, &harness.view_data);
        assert_eq!(first_page.len(), 6);
        assert_eq!(first_page[0].coin, "Bitcoin (BTC)");
        assert_eq!(first_page[0].price, "$64,250.12");
        assert_eq!(first_page[0].change, "+1.84%");
        assert!(first_page[0].rising);

        for _ in 0..10 {
            harness.press(KeyCode::Char('j'));
        }
        assert_eq!(harness.view_data.cursor, 5);

        harness.press(KeyCode::Char('n'));
        assert_eq!(harness.state.page, 1);
        assert_eq!(harness.view_data.cursor, 0);
        assert_eq!(popular_rows(&harness.state, &harness.view_data).len(), 4);

        harness.press(KeyCode::Char('n'));
        assert_eq!(harness.state.page, 1);

        harness.press(KeyCode::Enter);
        assert_eq!(harness.runtime.detail_requests, vec![CoinId::new("ripple")]);
        harness.press(KeyCode::Esc);

        harness.press(KeyCode::Char('p'));
        assert_eq!(harness.state.page, 0);
        Ok(())
    }

    #[test]
    fn reload_failure_is_reported() {
        let mut harness = Harness::new(TestRuntime {
            popular_error: Some("cannot reach market".to_owned()),
            ..TestRuntime::default()
        });
        harness.press(KeyCode::Char('r'));
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some("load failed: cannot reach market")
        );
    }

    #[test]
    fn sign_in_flows_through_session_subscription() {
        let mut harness = Harness::new(TestRuntime {
            auth_enabled: true,
            ..TestRuntime::default()
        });
        let subscription = start_session(&mut harness.state, &mut harness.runtime, &harness.tx);
        assert!(subscription.is_some());
        assert_eq!(harness.runtime.hub.listener_count(), 1);

        harness.press(KeyCode::Char('a'));
        assert_eq!(harness.state.mode, AppMode::Auth(AuthMode::SignIn));
        harness.type_text("ada@example.com");
        harness.press(KeyCode::Tab);
        harness.type_text("secret");
        assert_eq!(
            harness.view_data.auth.as_ref().map(render_auth_text),
            Some("  email:    ada@example.com\n› password: ******".to_owned())
        );
        harness.press(KeyCode::Enter);
        assert_eq!(harness.state.mode, AppMode::Auth(AuthMode::SignIn));
        assert!(harness.view_data.auth.as_ref().is_some_and(|form| form.pending));

        harness.pump();
        assert_eq!(harness.state.mode, AppMode::Browse);
        assert!(harness.view_data.auth.is_none());
        assert_eq!(
            harness.state.user.as_ref().map(|user| user.email.as_str()),
            Some("ada@example.com")
        );
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some("signed in as ada@example.com")
        );
        assert_eq!(
            harness.state.alerts_message(),
            "[Here we will render alerts later]"
        );

        harness.press(KeyCode::Char('L'));
        harness.pump();
        assert!(harness.state.user.is_none());

        drop(subscription);
        assert_eq!(harness.runtime.hub.listener_count(), 0);
    }

    #[test]
    fn wrong_password_keeps_form_open() {
        let mut harness = Harness::new(TestRuntime {
            auth_enabled: true,
            ..TestRuntime::default()
        });
        harness.press(KeyCode::Char('a'));
        harness.type_text("ada@example.com");
        harness.press(KeyCode::Tab);
        harness.type_text("nope");
        harness.press(KeyCode::Enter);
        harness.pump();

        assert_eq!(harness.state.mode, AppMode::Auth(AuthMode::SignIn));
        let form = harness.view_data.auth.as_ref().expect("form should stay open");
        assert!(form.password.is_empty());
        assert_eq!(form.field, AuthField::Password);
        assert_eq!(form.error.as_deref(), Some("Invalid login credentials"));

        harness.press(KeyCode::Esc);
        assert_eq!(harness.state.mode, AppMode::Browse);
        assert!(harness.view_data.auth.is_none());
    }

    #[test]
    fn sign_up_reports_outcome_and_switches_to_login() {
        let mut harness = Harness::new(TestRuntime {
            auth_enabled: true,
            ..TestRuntime::default()
        });
        harness.press(KeyCode::Char('a'));
        harness.press_with(KeyCode::Char('t'), KeyModifiers::CONTROL);
        assert_eq!(harness.state.mode, AppMode::Auth(AuthMode::SignUp));

        harness.type_text("grace@example.com");
        harness.press(KeyCode::Tab);
        harness.type_text("secret");
        harness.press(KeyCode::Enter);
        harness.pump();
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some(SignUpOutcome::Created.message())
        );
        assert_eq!(harness.state.mode, AppMode::Auth(AuthMode::SignIn));

        harness.press_with(KeyCode::Char('t'), KeyModifiers::CONTROL);
        harness.type_text("secret");
        harness.press(KeyCode::Enter);
        harness.pump();
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some(SignUpOutcome::AlreadyRegistered.message())
        );
    }

    #[test]
    fn auth_submission_waits_for_its_answer() {
        let mut harness = Harness::new(TestRuntime {
            auth_enabled: true,
            ..TestRuntime::default()
        });
        harness.press(KeyCode::Char('a'));
        harness.press_with(KeyCode::Char('t'), KeyModifiers::CONTROL);
        harness.type_text("grace@example.com");
        harness.press(KeyCode::Tab);
        harness.type_text("secret");

        harness.press(KeyCode::Enter);
        assert_eq!(
            harness.view_data.auth.as_ref().map(render_auth_text),
            Some("  email:    grace@example.com\n› password: ******\n\nWorking…".to_owned())
        );
        harness.press(KeyCode::Enter);
        assert_eq!(harness.runtime.registered, vec!["grace@example.com".to_owned()]);

        harness.pump();
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some(SignUpOutcome::Created.message())
        );
        assert!(harness.view_data.auth.as_ref().is_some_and(|form| !form.pending));
    }

    #[test]
    fn late_auth_answer_after_cancel_is_ignored() {
        let mut harness = Harness::new(TestRuntime {
            auth_enabled: true,
            ..TestRuntime::default()
        });
        harness.press(KeyCode::Char('a'));
        harness.type_text("ada@example.com");
        harness.press(KeyCode::Tab);
        harness.type_text("nope");
        harness.press(KeyCode::Enter);
        harness.press(KeyCode::Esc);

        harness.pump();
        assert_eq!(harness.state.mode, AppMode::Browse);
        assert!(harness.view_data.auth.is_none());
        assert_eq!(harness.state.status_line, None);
    }

    #[test]
    fn auth_keys_explain_missing_configuration() {
        let mut harness = Harness::new(TestRuntime::default());
        harness.press(KeyCode::Char('a'));
        assert_eq!(harness.state.mode, AppMode::Browse);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("[auth]"))
        );

        harness.press(KeyCode::Char('L'));
        assert_eq!(harness.state.status_line.as_deref(), Some("not signed in"));
    }

    #[test]
    fn ctrl_q_quits_from_any_mode() {
        let mut harness = searching_for_bit();
        assert!(!harness.press(KeyCode::Char('q')));
        assert_eq!(harness.view_data.search.engine.query(), "bitq");
        assert!(harness.press_with(KeyCode::Char('q'), KeyModifiers::CONTROL));
    }

    #[test]
    fn sparkline_text_tracks_direction() {
        assert_eq!(sparkline_text(&[], 8), "");
        assert_eq!(sparkline_text(&[5.0, 5.0, 5.0], 8), "▅▅▅");
        assert_eq!(sparkline_text(&[1.0, 2.0, 3.0, 4.0, 5.0], 2), "▁█");

        let falling: Vec<f64> = (0..48).rev().map(f64::from).collect();
        let text = sparkline_text(&falling, 16);
        assert_eq!(text.chars().count(), 16);
        assert!(text.starts_with('█'));
        assert!(text.ends_with('▁'));
    }

    #[test]
    fn detail_text_lists_market_figures() -> Result<()> {
        let detail = coin_detail("bitcoin")?;
        let text = render_detail_text(&detail, Some([1.0, 2.0].as_slice()));

        assert!(text.contains("price: $64,250.12   24h: +1.84%"));
        assert!(text.contains("market cap: $1.27T"));
        assert!(text.contains("genesis: Jan 3, 2009"));
        assert!(text.contains("homepage: https://bitcoin.example.test"));
        assert!(!text.contains("github"));
        assert!(text.contains("7d: ▁█"));
        assert!(text.ends_with("Bitcoin is a fixture coin."));
        Ok(())
    }

    #[test]
    fn status_text_follows_mode() {
        let mut harness = Harness::new(TestRuntime::default());
        assert_eq!(status_text(&harness.state, &harness.view_data), BROWSE_HINTS);

        harness.press(KeyCode::Char('/'));
        assert!(status_text(&harness.state, &harness.view_data).starts_with("SEARCH closed"));

        apply_app_command(
            &mut harness.state,
            &mut harness.view_data,
            &harness.tx,
            AppCommand::SetStatus("hello".to_owned()),
        );
        assert_eq!(status_text(&harness.state, &harness.view_data), "hello");
    }
}
