// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, BaseId, FormKind, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Bases,
    Tables { base: BaseId },
    Grid { base: BaseId, table: TableId },
}

impl Screen {
    pub const fn table(self) -> Option<TableId> {
        match self {
            Self::Grid { table, .. } => Some(table),
            Self::Bases | Self::Tables { .. } => None,
        }
    }

    pub const fn base(self) -> Option<BaseId> {
        match self {
            Self::Bases => None,
            Self::Tables { base } | Self::Grid { base, .. } => Some(base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub screen: Screen,
    pub mode: AppMode,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            screen: Screen::Bases,
            mode: AppMode::Nav,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    OpenBase(BaseId),
    OpenTable(TableId),
    Back,
    EnterEditMode,
    ExitToNav,
    OpenForm(FormKind),
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ScreenChanged(Screen),
    /// The grid of this table is no longer displayed.
    TableClosed(TableId),
    ModeChanged(AppMode),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::OpenBase(base) => {
                let mut events = self.leave_grid();
                events.extend(self.change_screen(Screen::Tables { base }));
                events
            }
            AppCommand::OpenTable(table) => match self.screen.base() {
                Some(base) => {
                    let mut events = self.leave_grid();
                    events.extend(self.change_screen(Screen::Grid { base, table }));
                    events
                }
                None => vec![self.set_status("open a base first")],
            },
            AppCommand::Back => {
                let target = match self.screen {
                    Screen::Bases => return Vec::new(),
                    Screen::Tables { .. } => Screen::Bases,
                    Screen::Grid { base, .. } => Screen::Tables { base },
                };
                let mut events = self.leave_grid();
                events.extend(self.change_screen(target));
                events
            }
            AppCommand::EnterEditMode => {
                if self.screen.table().is_none() {
                    return vec![self.set_status("edit mode needs an open table")];
                }
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode), self.set_status("nav")]
            }
            AppCommand::OpenForm(kind) => {
                self.mode = AppMode::Form(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn leave_grid(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        if let Some(table) = self.screen.table() {
            events.push(AppEvent::TableClosed(table));
        }
        if self.mode != AppMode::Nav {
            self.mode = AppMode::Nav;
            events.push(AppEvent::ModeChanged(self.mode));
        }
        events
    }

    fn change_screen(&mut self, screen: Screen) -> Vec<AppEvent> {
        self.screen = screen;
        vec![AppEvent::ScreenChanged(screen)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
