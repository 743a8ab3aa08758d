// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Incremental coin search: debounced input, token-fenced lookups and the
//! results panel state machine.
//!
//! The engine is driven from a single event loop through [`SearchEngine::dispatch`].
//! Time is passed in explicitly so the debounce window is a single deadline
//! rather than a live timer, and lookups run elsewhere: the engine only hands
//! out [`LookupRequest`]s and later accepts completions tagged with the
//! request's [`RequestToken`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::ids::RequestToken;
use crate::model::Candidate;

pub const DEFAULT_MIN_CHARS: usize = 2;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Why a lookup did not produce candidates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupFailure {
    #[error("cannot reach {base_url} ({reason})")]
    Transport { base_url: String, reason: String },
    #[error("{}", describe_status(*status, message))]
    Status { status: u16, message: String },
    #[error("decode {context}: {reason}")]
    Decode {
        context: &'static str,
        reason: String,
    },
}

impl LookupFailure {
    /// Panel text for every kind of failure. The variant and its detail only
    /// go to the log.
    pub const USER_MESSAGE: &'static str = "Failed to load suggestions";
}

fn describe_status(status: u16, message: &str) -> String {
    if message.is_empty() {
        format!("server returned {status}")
    } else {
        format!("server error ({status}): {message}")
    }
}

/// The lookup capability the engine is fed from.
pub trait CoinLookup: Send + Sync {
    fn lookup(&self, query: &str) -> Result<Vec<Candidate>, LookupFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    pub min_chars: usize,
    pub debounce: Duration,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            debounce: DEFAULT_DEBOUNCE,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Closed,
    Loading,
    Error,
    Empty,
    Results,
}

impl PanelState {
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Loading => "open-loading",
            Self::Error => "open-error",
            Self::Empty => "open-empty",
            Self::Results => "open-results",
        }
    }
}

/// Everything the panel state is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelInputs {
    pub trimmed_len: usize,
    pub min_chars: usize,
    pub in_flight: bool,
    pub has_error: bool,
    /// `None` until a lookup for the current query has completed.
    pub result_count: Option<usize>,
    pub explicit_close: bool,
}

/// Rules are checked in priority order; the first match wins.
pub fn derive_panel_state(inputs: PanelInputs) -> PanelState {
    if inputs.trimmed_len == 0 || inputs.explicit_close {
        return PanelState::Closed;
    }
    if inputs.in_flight {
        return PanelState::Loading;
    }
    if inputs.has_error {
        return PanelState::Error;
    }
    match inputs.result_count {
        Some(0) if inputs.trimmed_len >= inputs.min_chars => PanelState::Empty,
        Some(count) if count > 0 => PanelState::Results,
        _ => PanelState::Closed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub token: RequestToken,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommand {
    QueryChanged(String),
    Focus,
    OutsideClick,
    /// Lets the debounce deadline fire if it is due.
    Tick,
    Select(usize),
    LookupCompleted {
        token: RequestToken,
        outcome: Result<Vec<Candidate>, LookupFailure>,
    },
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    LookupIssued(LookupRequest),
    Selected(Candidate),
    PanelChanged(PanelState),
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    config: SearchConfig,
    query: String,
    results: Option<Vec<Candidate>>,
    error: Option<String>,
    in_flight: bool,
    explicit_close: bool,
    deadline: Option<Instant>,
    last_issued: RequestToken,
    outstanding: Option<RequestToken>,
    torn_down: bool,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            query: String::new(),
            results: None,
            error: None,
            in_flight: false,
            explicit_close: false,
            deadline: None,
            last_issued: RequestToken::new(0),
            outstanding: None,
            torn_down: false,
        }
    }

    pub fn config(&self) -> SearchConfig {
        self.config
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[Candidate] {
        self.results.as_deref().unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_explicitly_closed(&self) -> bool {
        self.explicit_close
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Token of the most recent lookup handed out, `0` before the first one.
    pub fn last_issued(&self) -> RequestToken {
        self.last_issued
    }

    /// When the pending debounce fires, if one is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn panel_state(&self) -> PanelState {
        derive_panel_state(self.panel_inputs())
    }

    pub fn panel_inputs(&self) -> PanelInputs {
        PanelInputs {
            trimmed_len: self.trimmed_len(),
            min_chars: self.config.min_chars,
            in_flight: self.in_flight,
            has_error: self.error.is_some(),
            result_count: self.results.as_ref().map(Vec::len),
            explicit_close: self.explicit_close,
        }
    }

    pub fn dispatch(&mut self, command: SearchCommand, now: Instant) -> Vec<SearchEvent> {
        if self.torn_down {
            return Vec::new();
        }

        let before = self.panel_state();
        let mut events = Vec::new();
        match command {
            SearchCommand::QueryChanged(query) => self.change_query(query, now),
            SearchCommand::Focus => self.focus(),
            SearchCommand::OutsideClick => {
                self.explicit_close = true;
            }
            SearchCommand::Tick => {
                if let Some(request) = self.fire_due(now) {
                    events.push(SearchEvent::LookupIssued(request));
                }
            }
            SearchCommand::Select(index) => {
                if let Some(candidate) = self.select(index) {
                    events.push(SearchEvent::Selected(candidate));
                }
            }
            SearchCommand::LookupCompleted { token, outcome } => {
                if !self.complete(token, outcome) {
                    return Vec::new();
                }
            }
            SearchCommand::Teardown => {
                self.teardown();
                return Vec::new();
            }
        }

        let after = self.panel_state();
        if after != before {
            events.push(SearchEvent::PanelChanged(after));
        }
        events
    }

    fn trimmed_len(&self) -> usize {
        self.query.trim().chars().count()
    }

    /// A blank query never qualifies, whatever `min_chars` says.
    fn is_searchable(&self) -> bool {
        let len = self.trimmed_len();
        len > 0 && len >= self.config.min_chars
    }

    fn change_query(&mut self, query: String, now: Instant) {
        self.query = query;
        self.explicit_close = false;

        if !self.is_searchable() {
            self.deadline = None;
            self.results = None;
            self.error = None;
            // A lookup still running for the longer query must not land here.
            self.outstanding = None;
            self.in_flight = false;
            return;
        }

        self.deadline = Some(now + self.config.debounce);
    }

    fn focus(&mut self) {
        if self.is_searchable() {
            self.explicit_close = false;
        }
    }

    fn fire_due(&mut self, now: Instant) -> Option<LookupRequest> {
        let due = self.deadline?;
        if now < due {
            return None;
        }
        self.deadline = None;
        self.issue()
    }

    fn issue(&mut self) -> Option<LookupRequest> {
        if !self.is_searchable() {
            return None;
        }

        let token = self.last_issued.next();
        self.last_issued = token;
        self.outstanding = Some(token);
        self.in_flight = true;

        let query = self.query.trim().to_owned();
        tracing::debug!(token = token.get(), query = %query, "issuing coin lookup");
        Some(LookupRequest { token, query })
    }

    fn complete(
        &mut self,
        token: RequestToken,
        outcome: Result<Vec<Candidate>, LookupFailure>,
    ) -> bool {
        if self.outstanding != Some(token) {
            tracing::trace!(token = token.get(), "dropping superseded lookup response");
            return false;
        }

        self.outstanding = None;
        self.in_flight = false;
        match outcome {
            Ok(mut candidates) => {
                candidates.truncate(self.config.max_results);
                self.results = Some(candidates);
                self.error = None;
            }
            Err(failure) => {
                tracing::warn!(token = token.get(), error = %failure, "coin lookup failed");
                self.error = Some(LookupFailure::USER_MESSAGE.to_owned());
                self.results = None;
            }
        }
        true
    }

    fn select(&mut self, index: usize) -> Option<Candidate> {
        if self.panel_state() != PanelState::Results {
            return None;
        }
        let candidate = self.results.as_ref()?.get(index)?.clone();

        self.query.clear();
        self.results = None;
        self.error = None;
        self.deadline = None;
        self.outstanding = None;
        self.in_flight = false;
        self.explicit_close = true;
        Some(candidate)
    }

    fn teardown(&mut self) {
        self.deadline = None;
        self.outstanding = None;
        self.in_flight = false;
        self.torn_down = true;
    }
}

/// Shared flag telling background work whether its owner is still around.
///
/// Workers check it before delivering a completion so nothing reaches the
/// event loop after teardown.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn shut_down(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Liveness, LookupFailure, PanelInputs, PanelState, SearchCommand, SearchConfig,
        SearchEngine, SearchEvent, derive_panel_state,
    };
    use crate::{Candidate, CoinId, RequestToken};
    use std::time::{Duration, Instant};

    fn inputs() -> PanelInputs {
        PanelInputs {
            trimmed_len: 3,
            min_chars: 2,
            in_flight: false,
            has_error: false,
            result_count: None,
            explicit_close: false,
        }
    }

    fn coin(id: &str) -> Candidate {
        Candidate {
            id: CoinId::new(id),
            name: id.to_owned(),
            symbol: id.chars().take(3).collect(),
            thumb: String::new(),
        }
    }

    #[test]
    fn empty_query_closes_over_every_other_input() {
        let state = derive_panel_state(PanelInputs {
            trimmed_len: 0,
            in_flight: true,
            has_error: true,
            result_count: Some(3),
            ..inputs()
        });
        assert_eq!(state, PanelState::Closed);
    }

    #[test]
    fn explicit_close_beats_loading() {
        let state = derive_panel_state(PanelInputs {
            in_flight: true,
            explicit_close: true,
            ..inputs()
        });
        assert_eq!(state, PanelState::Closed);
    }

    #[test]
    fn loading_beats_cached_error_and_results() {
        let state = derive_panel_state(PanelInputs {
            in_flight: true,
            has_error: true,
            result_count: Some(2),
            ..inputs()
        });
        assert_eq!(state, PanelState::Loading);
    }

    #[test]
    fn error_beats_results() {
        let state = derive_panel_state(PanelInputs {
            has_error: true,
            result_count: Some(2),
            ..inputs()
        });
        assert_eq!(state, PanelState::Error);
    }

    #[test]
    fn empty_and_result_lists() {
        assert_eq!(
            derive_panel_state(PanelInputs {
                result_count: Some(0),
                ..inputs()
            }),
            PanelState::Empty
        );
        assert_eq!(
            derive_panel_state(PanelInputs {
                result_count: Some(4),
                ..inputs()
            }),
            PanelState::Results
        );
        assert_eq!(derive_panel_state(inputs()), PanelState::Closed);
    }

    #[test]
    fn empty_list_below_threshold_stays_closed() {
        let state = derive_panel_state(PanelInputs {
            trimmed_len: 1,
            result_count: Some(0),
            ..inputs()
        });
        assert_eq!(state, PanelState::Closed);
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let start = Instant::now();
        let mut engine = SearchEngine::default();
        engine.dispatch(SearchCommand::QueryChanged("eth".to_owned()), start);

        let events = engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(399));
        assert!(events.is_empty());
        assert_eq!(
            engine.next_deadline(),
            Some(start + Duration::from_millis(400))
        );
    }

    #[test]
    fn issued_query_is_trimmed() {
        let start = Instant::now();
        let mut engine = SearchEngine::default();
        engine.dispatch(SearchCommand::QueryChanged("  sol ".to_owned()), start);

        let events = engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(400));
        let Some(SearchEvent::LookupIssued(request)) = events.first() else {
            panic!("expected lookup, got {events:?}");
        };
        assert_eq!(request.query, "sol");
        assert_eq!(request.token, RequestToken::new(1));
        assert_eq!(engine.query(), "  sol ");
    }

    #[test]
    fn blank_query_never_issues_even_without_minimum() {
        let start = Instant::now();
        let mut engine = SearchEngine::new(SearchConfig {
            min_chars: 0,
            ..SearchConfig::default()
        });

        engine.dispatch(SearchCommand::QueryChanged("   ".to_owned()), start);
        assert_eq!(engine.next_deadline(), None);
        let events = engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(400));
        assert!(events.is_empty());
        assert_eq!(engine.last_issued(), RequestToken::default());
        assert_eq!(engine.panel_state(), PanelState::Closed);

        engine.dispatch(SearchCommand::Focus, start + Duration::from_millis(500));
        assert!(engine.dispatch(SearchCommand::Tick, start + Duration::from_secs(2)).is_empty());

        engine.dispatch(SearchCommand::QueryChanged("b".to_owned()), start);
        let events = engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(400));
        assert!(matches!(
            events.first(),
            Some(SearchEvent::LookupIssued(request)) if request.query == "b"
        ));
    }

    #[test]
    fn results_are_capped() {
        let start = Instant::now();
        let mut engine = SearchEngine::default();
        engine.dispatch(SearchCommand::QueryChanged("coin".to_owned()), start);
        engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(400));

        let many = (0..8).map(|i| coin(&format!("coin-{i}"))).collect();
        engine.dispatch(
            SearchCommand::LookupCompleted {
                token: RequestToken::new(1),
                outcome: Ok(many),
            },
            start + Duration::from_millis(450),
        );
        assert_eq!(engine.results().len(), 5);
        assert_eq!(engine.results()[0].id.as_str(), "coin-0");
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let start = Instant::now();
        let mut engine = SearchEngine::default();
        engine.dispatch(SearchCommand::QueryChanged("doge".to_owned()), start);
        engine.dispatch(SearchCommand::Tick, start + Duration::from_millis(400));
        engine.dispatch(
            SearchCommand::LookupCompleted {
                token: RequestToken::new(1),
                outcome: Ok(vec![coin("dogecoin")]),
            },
            start,
        );

        let events = engine.dispatch(
            SearchCommand::LookupCompleted {
                token: RequestToken::new(1),
                outcome: Err(LookupFailure::Status {
                    status: 500,
                    message: String::new(),
                }),
            },
            start,
        );
        assert!(events.is_empty());
        assert_eq!(engine.panel_state(), PanelState::Results);
    }

    #[test]
    fn status_failure_display_depends_on_message() {
        let bare = LookupFailure::Status {
            status: 502,
            message: String::new(),
        };
        assert_eq!(bare.to_string(), "server returned 502");

        let detailed = LookupFailure::Status {
            status: 429,
            message: "rate limited".to_owned(),
        };
        assert_eq!(detailed.to_string(), "server error (429): rate limited");
        assert_eq!(LookupFailure::USER_MESSAGE, "Failed to load suggestions");
    }

    #[test]
    fn liveness_is_shared_between_clones() {
        let owner = Liveness::new();
        let worker = owner.clone();
        assert!(worker.is_alive());
        owner.shut_down();
        assert!(!worker.is_alive());
    }
}
