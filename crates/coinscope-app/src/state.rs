// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::paging::clamp_page;
use crate::{AppMode, AuthMode, SessionUser, TabKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_tab: TabKind,
    pub user: Option<SessionUser>,
    pub page: usize,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Browse,
            active_tab: TabKind::Coins,
            user: None,
            page: 0,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    NextTab,
    PrevTab,
    FocusSearch,
    BlurSearch,
    OpenAuth,
    ToggleAuthMode,
    CloseAuth,
    SessionChanged(Option<SessionUser>),
    NextPage { total: usize, per_page: usize },
    PrevPage,
    ResetPage,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    TabChanged(TabKind),
    PageChanged(usize),
    SessionChanged(Option<SessionUser>),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub const fn alerts_message(&self) -> &'static str {
        if self.user.is_some() {
            "[Here we will render alerts later]"
        } else {
            "Please log in to view your alerts."
        }
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::FocusSearch => self.set_mode(AppMode::Search),
            AppCommand::BlurSearch | AppCommand::CloseAuth => self.set_mode(AppMode::Browse),
            AppCommand::OpenAuth => self.set_mode(AppMode::Auth(AuthMode::SignIn)),
            AppCommand::ToggleAuthMode => match self.mode {
                AppMode::Auth(mode) => self.set_mode(AppMode::Auth(mode.toggled())),
                _ => Vec::new(),
            },
            AppCommand::SessionChanged(user) => {
                if self.user == user {
                    return Vec::new();
                }
                let label = match &user {
                    Some(user) => format!("signed in as {}", user.email),
                    None => "signed out".to_owned(),
                };
                self.user = user.clone();
                vec![AppEvent::SessionChanged(user), self.set_status(&label)]
            }
            AppCommand::NextPage { total, per_page } => {
                let next = clamp_page(self.page.saturating_add(1), total, per_page);
                self.set_page(next)
            }
            AppCommand::PrevPage => self.set_page(self.page.saturating_sub(1)),
            AppCommand::ResetPage => self.set_page(0),
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        let tabs = TabKind::ALL;
        let current = tabs
            .iter()
            .position(|tab| *tab == self.active_tab)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_tab = tabs[next];
        vec![AppEvent::TabChanged(self.active_tab)]
    }

    fn set_mode(&mut self, mode: AppMode) -> Vec<AppEvent> {
        if self.mode == mode {
            return Vec::new();
        }
        self.mode = mode;
        vec![AppEvent::ModeChanged(mode)]
    }

    fn set_page(&mut self, page: usize) -> Vec<AppEvent> {
        if self.page == page {
            return Vec::new();
        }
        self.page = page;
        vec![AppEvent::PageChanged(page)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
