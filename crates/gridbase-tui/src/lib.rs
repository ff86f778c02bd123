// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use gridbase_app::color::{self, Rgb};
use gridbase_app::field_kind::{self, CellTone, EditorKind, RowDefaults};
use gridbase_app::{
    ApiError, AppCommand, AppEvent, AppMode, AppState, Base, BaseDetail, BaseId, CellEditor,
    CellOutcome, DEFAULT_OVERSCAN_ROWS, DEFAULT_PAGE_LIMIT, DEFAULT_PREFETCH_THRESHOLD, DateStep,
    Field, FieldId, FormEntry, FormKind, FormPayload, GridBody, MAX_BULK_RECORDS, MutationKind,
    MutationLedger, NewBase, NewTable, PageOutcome, Record, RecordCache, RecordValues, RemoteReply,
    RemoteRequest, Screen, Sentinel, SortDirection, TableDetail, TableId, TableSummary,
    ViewportMetrics, can_add_row, grid_body, order_columns, scroll_to_reveal, should_prefetch,
    sorted_indices, visible_window,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::{Date, OffsetDateTime};

const HALF_PAGE_ROWS: isize = 10;
const FULL_PAGE_ROWS: isize = 20;
/// Header, status bar, grid borders and the column header row.
const GRID_CHROME_ROWS: u16 = 8;
const SORT_MARK_ASC: &str = "▲";
const SORT_MARK_DESC: &str = "▼";
const EDIT_CURSOR: &str = "▏";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    pub page_size: usize,
    pub overscan_rows: usize,
    pub prefetch_threshold: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            prefetch_threshold: DEFAULT_PREFETCH_THRESHOLD,
        }
    }
}

/// Data access used by the UI. Listing and creation calls run inline; grid
/// traffic goes through [`AppRuntime::spawn_remote`] and comes back as an
/// [`InternalEvent::Remote`].
pub trait AppRuntime {
    fn list_bases(&mut self) -> Result<Vec<BaseDetail>>;
    fn list_tables(&mut self, base: BaseId) -> Result<Vec<TableSummary>>;
    fn create_base(&mut self, input: NewBase) -> Result<Base>;
    fn create_table(&mut self, base: BaseId, input: NewTable) -> Result<TableDetail>;
    fn delete_base(&mut self, base: BaseId) -> Result<()>;
    fn delete_table(&mut self, table: TableId) -> Result<()>;
    fn execute_remote(&mut self, request: RemoteRequest) -> RemoteReply;

    /// Run `request` and deliver its reply on `tx`. The default runs it on
    /// the calling thread; the reply is still only seen on the next drain.
    fn spawn_remote(&mut self, request: RemoteRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let reply = self.execute_remote(request);
        tx.send(InternalEvent::Remote(reply))
            .map_err(|_| anyhow!("remote reply channel closed"))?;
        Ok(())
    }

    fn today(&self) -> Date {
        OffsetDateTime::now_utc().date()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Remote(RemoteReply),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GridCommand {
    MoveRow(isize),
    MoveColumn(isize),
    FirstRow,
    LastRow,
    FirstColumn,
    LastColumn,
    CycleSort,
    ClearSort,
}

#[derive(Debug, Default)]
struct ListUiState {
    selected: usize,
    armed_delete: Option<i64>,
    /// Row id to select after the next list refresh.
    focus: Option<i64>,
}

#[derive(Debug)]
struct GridUiState {
    table: TableId,
    selected_row: usize,
    selected_col: usize,
    scroll_top: usize,
    sort: Option<(FieldId, SortDirection)>,
    order: Option<RowOrder>,
    editor: Option<CellEditor>,
}

/// Sorted row order, valid while the cache revision and sort are unchanged.
#[derive(Debug)]
struct RowOrder {
    revision: u64,
    sort: (FieldId, SortDirection),
    indices: Vec<usize>,
}

impl GridUiState {
    fn new(table: TableId) -> Self {
        Self {
            table,
            selected_row: 0,
            selected_col: 0,
            scroll_top: 0,
            sort: None,
            order: None,
            editor: None,
        }
    }

    fn is_editing(&self) -> bool {
        self.editor.as_ref().is_some_and(CellEditor::is_editing)
    }
}

#[derive(Debug)]
struct FormUiState {
    payload: FormPayload,
    field_index: usize,
}

#[derive(Debug)]
struct ViewData {
    options: GridOptions,
    bases: Vec<BaseDetail>,
    tables: Vec<TableSummary>,
    list: ListUiState,
    grid: Option<GridUiState>,
    cache: RecordCache,
    ledger: MutationLedger,
    grid_rows: usize,
    form: Option<FormUiState>,
    help_visible: bool,
    status_token: u64,
}

impl ViewData {
    fn new(options: GridOptions) -> Self {
        Self {
            options,
            bases: Vec::new(),
            tables: Vec::new(),
            list: ListUiState::default(),
            grid: None,
            cache: RecordCache::new(options.page_size),
            ledger: MutationLedger::new(),
            grid_rows: 20,
            form: None,
            help_visible: false,
            status_token: 0,
        }
    }

    fn metrics(&self) -> ViewportMetrics {
        ViewportMetrics::rows(
            self.grid_rows.max(1),
            self.options.overscan_rows,
            self.options.prefetch_threshold,
        )
    }

    fn list_len(&self, screen: Screen) -> usize {
        match screen {
            Screen::Bases => self.bases.len(),
            Screen::Tables { .. } => self.tables.len(),
            Screen::Grid { .. } => 0,
        }
    }
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: GridOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options);
    let (internal_tx, internal_rx) = mpsc::channel();

    if let Err(error) = refresh_view_data(state, runtime, &mut view_data) {
        state.dispatch(AppCommand::SetStatus(format!("load failed: {error}")));
    }
    if let Screen::Grid { table, .. } = state.screen {
        open_grid(state, runtime, &mut view_data, &internal_tx, table);
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        match terminal.size() {
            Ok(size) => view_data.grid_rows = grid_rows_for_height(size.height),
            Err(error) => {
                result = Err(error).context("read terminal size");
                break;
            }
        }
        refresh_row_order(&mut view_data);
        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn grid_rows_for_height(height: u16) -> usize {
    usize::from(height.saturating_sub(GRID_CHROME_ROWS)).max(1)
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Remote(reply) => {
                handle_remote_reply(state, runtime, view_data, tx, reply);
            }
        }
    }
}

fn handle_remote_reply<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    reply: RemoteReply,
) {
    match reply {
        RemoteReply::Page { ticket, result } => match result {
            Ok(page) => match view_data.cache.apply_page(ticket, page) {
                PageOutcome::Applied { next: Some(next) } => {
                    spawn_request(state, runtime, view_data, tx, RemoteRequest::FetchPage(next));
                }
                PageOutcome::Applied { next: None } => {
                    clamp_grid_cursor(view_data);
                    maybe_prefetch(state, runtime, view_data, tx);
                }
                PageOutcome::Stale => {}
            },
            Err(error) => {
                log::warn!("page fetch failed for table {}: {error}", ticket.table);
                if view_data.cache.fail_fetch(ticket) {
                    emit_status(state, view_data, tx, format!("load failed: {error}"));
                }
            }
        },
        RemoteReply::Structure { ticket, result } => match result {
            Ok(detail) => {
                if view_data.cache.apply_structure(ticket, detail) {
                    clamp_grid_cursor(view_data);
                }
            }
            Err(error) => {
                log::warn!("structure load failed for table {}: {error}", ticket.table);
                emit_status(state, view_data, tx, format!("table load failed: {error}"));
            }
        },
        RemoteReply::Mutation { id, result } => {
            let Some(resolution) = view_data.ledger.resolve(&mut view_data.cache, id, result)
            else {
                return;
            };
            let reconcile = resolution.reconcile();
            emit_status(state, view_data, tx, resolution.status_message());
            if let Some(ticket) = reconcile.structure {
                spawn_request(
                    state,
                    runtime,
                    view_data,
                    tx,
                    RemoteRequest::LoadStructure(ticket),
                );
            }
            if let Some(ticket) = reconcile.page {
                spawn_request(state, runtime, view_data, tx, RemoteRequest::FetchPage(ticket));
            }
            clamp_grid_cursor(view_data);
        }
    }
}

/// Hand `request` to the runtime. When the runtime cannot take it, a failed
/// reply is queued instead so the cache and ledger release their claims.
fn spawn_request<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    request: RemoteRequest,
) {
    let fallback = request.clone();
    if let Err(error) = runtime.spawn_remote(request, tx.clone()) {
        log::error!("remote request failed to start: {error:#}");
        let reply = failed_reply(fallback, ApiError::internal(format!("{error:#}")));
        if tx.send(InternalEvent::Remote(reply)).is_err() {
            emit_status(state, view_data, tx, format!("request failed: {error}"));
        }
    }
}

fn failed_reply(request: RemoteRequest, error: ApiError) -> RemoteReply {
    match request {
        RemoteRequest::FetchPage(ticket) => RemoteReply::Page {
            ticket,
            result: Err(error),
        },
        RemoteRequest::LoadStructure(ticket) => RemoteReply::Structure {
            ticket,
            result: Err(error),
        },
        RemoteRequest::Mutate { id, .. } => RemoteReply::Mutation {
            id,
            result: Err(error),
        },
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if let AppMode::Form(_) = state.mode {
        handle_form_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.grid.as_ref().is_some_and(GridUiState::is_editing) {
        handle_editor_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if key.code == KeyCode::Char('?') {
        view_data.help_visible = true;
        return false;
    }

    match state.screen {
        Screen::Bases | Screen::Tables { .. } => {
            handle_list_key(state, runtime, view_data, internal_tx, key);
        }
        Screen::Grid { .. } => handle_grid_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn dispatch_and_refresh<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let previous = state.screen;
    let events = state.dispatch(command);

    let mut screen_changed = false;
    for event in &events {
        match event {
            AppEvent::TableClosed(table) => close_grid(view_data, *table),
            AppEvent::ScreenChanged(screen) => {
                screen_changed = true;
                view_data.list.selected = 0;
                view_data.list.armed_delete = None;
                view_data.list.focus = match (previous, *screen) {
                    (Screen::Tables { base }, Screen::Bases) => Some(base.get()),
                    (Screen::Grid { table, .. }, Screen::Tables { .. }) => Some(table.get()),
                    _ => None,
                };
            }
            AppEvent::ModeChanged(AppMode::Form(_)) => {}
            AppEvent::ModeChanged(_) => view_data.form = None,
            AppEvent::StatusUpdated(_) | AppEvent::StatusCleared => {}
        }
    }

    if screen_changed {
        if let Err(error) = refresh_view_data(state, runtime, view_data) {
            emit_status(state, view_data, internal_tx, format!("load failed: {error}"));
        }
        if let Screen::Grid { table, .. } = state.screen {
            open_grid(state, runtime, view_data, internal_tx, table);
        }
    }

    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
}

fn refresh_view_data<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
) -> Result<()> {
    match state.screen {
        Screen::Bases => {
            view_data.bases = runtime.list_bases()?;
            if let Some(focus) = view_data.list.focus.take() {
                if let Some(index) = view_data
                    .bases
                    .iter()
                    .position(|detail| detail.base.id.get() == focus)
                {
                    view_data.list.selected = index;
                }
            }
        }
        Screen::Tables { base } => {
            view_data.tables = runtime.list_tables(base)?;
            if !view_data.bases.iter().any(|detail| detail.base.id == base) {
                view_data.bases = runtime.list_bases()?;
            }
            if let Some(focus) = view_data.list.focus.take() {
                if let Some(index) = view_data
                    .tables
                    .iter()
                    .position(|summary| summary.table.id.get() == focus)
                {
                    view_data.list.selected = index;
                }
            }
        }
        Screen::Grid { .. } => {}
    }

    let len = view_data.list_len(state.screen);
    view_data.list.selected = view_data.list.selected.min(len.saturating_sub(1));
    Ok(())
}

fn open_grid<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    table: TableId,
) {
    log::debug!("opening grid for table {table}");
    view_data.cache.forget(table);
    view_data.grid = Some(GridUiState::new(table));

    let structure = view_data.cache.begin_structure_load(table);
    spawn_request(
        state,
        runtime,
        view_data,
        tx,
        RemoteRequest::LoadStructure(structure),
    );
    if let Some(ticket) = view_data.cache.begin_fetch(table) {
        spawn_request(state, runtime, view_data, tx, RemoteRequest::FetchPage(ticket));
    }
}

fn close_grid(view_data: &mut ViewData, table: TableId) {
    view_data.cache.forget(table);
    if view_data
        .grid
        .as_ref()
        .is_some_and(|grid| grid.table == table)
    {
        view_data.grid = None;
    }
}

fn maybe_prefetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some((table, scroll_top)) = view_data
        .grid
        .as_ref()
        .map(|grid| (grid.table, grid.scroll_top))
    else {
        return;
    };
    let loaded = view_data.cache.len(table);
    let metrics = view_data.metrics();
    let window = visible_window(&metrics, loaded, scroll_top);
    if !should_prefetch(
        &metrics,
        window,
        loaded,
        view_data.cache.has_more(table),
        view_data.cache.is_fetching(table),
    ) {
        return;
    }
    if let Some(ticket) = view_data.cache.begin_fetch(table) {
        log::debug!("prefetching table {table} at offset {}", ticket.query.offset);
        spawn_request(state, runtime, view_data, tx, RemoteRequest::FetchPage(ticket));
    }
}

fn handle_list_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if key.code != KeyCode::Char('d') {
        view_data.list.armed_delete = None;
    }
    let len = view_data.list_len(state.screen);

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.list.selected = (view_data.list.selected + 1).min(len.saturating_sub(1));
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.list.selected = view_data.list.selected.saturating_sub(1);
        }
        KeyCode::Char('g') | KeyCode::Home => view_data.list.selected = 0,
        KeyCode::Char('G') | KeyCode::End => view_data.list.selected = len.saturating_sub(1),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            let command = match state.screen {
                Screen::Bases => view_data
                    .bases
                    .get(view_data.list.selected)
                    .map(|detail| AppCommand::OpenBase(detail.base.id)),
                Screen::Tables { .. } => view_data
                    .tables
                    .get(view_data.list.selected)
                    .map(|summary| AppCommand::OpenTable(summary.table.id)),
                Screen::Grid { .. } => None,
            };
            match command {
                Some(command) => {
                    dispatch_and_refresh(state, runtime, view_data, command, internal_tx);
                }
                None => emit_status(state, view_data, internal_tx, "nothing to open"),
            }
        }
        KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('h') | KeyCode::Left => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
        }
        KeyCode::Char('a') => {
            let kind = match state.screen {
                Screen::Tables { .. } => FormKind::Table,
                Screen::Bases | Screen::Grid { .. } => FormKind::Base,
            };
            open_form(state, runtime, view_data, internal_tx, kind);
        }
        KeyCode::Char('d') => delete_selected_entry(state, runtime, view_data, internal_tx),
        KeyCode::Char('r') => match refresh_view_data(state, runtime, view_data) {
            Ok(()) => emit_status(state, view_data, internal_tx, "reloaded"),
            Err(error) => {
                emit_status(state, view_data, internal_tx, format!("load failed: {error}"));
            }
        },
        _ => {}
    }
}

/// First press arms the delete, a second press on the same row runs it.
fn delete_selected_entry<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let target = match state.screen {
        Screen::Bases => view_data
            .bases
            .get(view_data.list.selected)
            .map(|detail| (detail.base.id.get(), "base", detail.base.name.clone())),
        Screen::Tables { .. } => view_data
            .tables
            .get(view_data.list.selected)
            .map(|summary| (summary.table.id.get(), "table", summary.table.name.clone())),
        Screen::Grid { .. } => None,
    };
    let Some((id, what, name)) = target else {
        emit_status(state, view_data, internal_tx, "nothing to delete");
        return;
    };

    if view_data.list.armed_delete != Some(id) {
        view_data.list.armed_delete = Some(id);
        let scope = match what {
            "base" => " and all of its tables",
            _ => " and all of its records",
        };
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("press d again to delete {what} {name}{scope}"),
        );
        return;
    }
    view_data.list.armed_delete = None;

    let result = match state.screen {
        Screen::Bases => runtime.delete_base(BaseId::new(id)),
        Screen::Tables { .. } => runtime.delete_table(TableId::new(id)),
        Screen::Grid { .. } => Ok(()),
    };
    match result {
        Ok(()) => {
            if let Err(error) = refresh_view_data(state, runtime, view_data) {
                emit_status(state, view_data, internal_tx, format!("load failed: {error}"));
                return;
            }
            emit_status(state, view_data, internal_tx, format!("deleted {what} {name}"));
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("delete failed: {error}"));
        }
    }
}

fn grid_command_for_key(key: KeyEvent) -> Option<GridCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('d') => Some(GridCommand::MoveRow(HALF_PAGE_ROWS)),
            KeyCode::Char('u') => Some(GridCommand::MoveRow(-HALF_PAGE_ROWS)),
            _ => None,
        };
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        return None;
    }

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(GridCommand::MoveRow(1)),
        KeyCode::Char('k') | KeyCode::Up => Some(GridCommand::MoveRow(-1)),
        KeyCode::Char('h') | KeyCode::Left => Some(GridCommand::MoveColumn(-1)),
        KeyCode::Char('l') | KeyCode::Right => Some(GridCommand::MoveColumn(1)),
        KeyCode::PageDown => Some(GridCommand::MoveRow(FULL_PAGE_ROWS)),
        KeyCode::PageUp => Some(GridCommand::MoveRow(-FULL_PAGE_ROWS)),
        KeyCode::Char('g') | KeyCode::Home => Some(GridCommand::FirstRow),
        KeyCode::Char('G') | KeyCode::End => Some(GridCommand::LastRow),
        KeyCode::Char('^') => Some(GridCommand::FirstColumn),
        KeyCode::Char('$') => Some(GridCommand::LastColumn),
        KeyCode::Char('s') => Some(GridCommand::CycleSort),
        KeyCode::Char('S') => Some(GridCommand::ClearSort),
        _ => None,
    }
}

/// Move the cursor or change the sort. Returns a status message when the
/// command has something to report.
fn apply_grid_command(view_data: &mut ViewData, command: GridCommand) -> Option<String> {
    let metrics = view_data.metrics();
    let grid = view_data.grid.as_mut()?;
    let loaded = view_data.cache.len(grid.table);
    let columns = view_data
        .cache
        .structure(grid.table)
        .map(|structure| order_columns(&structure.fields))
        .unwrap_or_default();

    let mut status = None;
    match command {
        GridCommand::MoveRow(delta) => {
            grid.selected_row = offset_index(grid.selected_row, delta, loaded);
        }
        GridCommand::MoveColumn(delta) => {
            grid.selected_col = offset_index(grid.selected_col, delta, columns.len());
        }
        GridCommand::FirstRow => grid.selected_row = 0,
        GridCommand::LastRow => grid.selected_row = loaded.saturating_sub(1),
        GridCommand::FirstColumn => grid.selected_col = 0,
        GridCommand::LastColumn => grid.selected_col = columns.len().saturating_sub(1),
        GridCommand::CycleSort => {
            let field = columns.get(grid.selected_col)?;
            grid.sort = match grid.sort {
                Some((current, SortDirection::Asc)) if current == field.id => {
                    Some((field.id, SortDirection::Desc))
                }
                Some((current, SortDirection::Desc)) if current == field.id => None,
                _ => Some((field.id, SortDirection::Asc)),
            };
            status = Some(match grid.sort {
                Some((_, SortDirection::Asc)) => format!("sorted by {} ascending", field.name),
                Some((_, SortDirection::Desc)) => format!("sorted by {} descending", field.name),
                None => "sort cleared".to_owned(),
            });
        }
        GridCommand::ClearSort => {
            grid.sort = None;
            status = Some("sort cleared".to_owned());
        }
    }
    grid.scroll_top = scroll_to_reveal(&metrics, grid.scroll_top, grid.selected_row);
    status
}

fn offset_index(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let last = (len - 1) as isize;
    (current as isize + delta).clamp(0, last) as usize
}

fn clamp_grid_cursor(view_data: &mut ViewData) {
    let metrics = view_data.metrics();
    let Some(grid) = view_data.grid.as_mut() else {
        return;
    };
    let loaded = view_data.cache.len(grid.table);
    let structure = view_data.cache.structure(grid.table);
    let columns = structure.map_or(0, |structure| structure.fields.len());

    grid.selected_row = grid.selected_row.min(loaded.saturating_sub(1));
    grid.selected_col = grid.selected_col.min(columns.saturating_sub(1));
    grid.scroll_top = scroll_to_reveal(&metrics, grid.scroll_top, grid.selected_row);

    let sort_field_gone = grid.sort.is_some_and(|(field, _)| {
        structure.is_some_and(|structure| structure.field(field).is_none())
    });
    if sort_field_gone {
        grid.sort = None;
    }
    let edited_record_gone = grid
        .editor
        .as_ref()
        .is_some_and(|editor| view_data.cache.find(grid.table, editor.record()).is_none());
    if edited_record_gone {
        grid.editor = None;
    }
}

/// Loaded rows in display order: fetch order, or the active column sort.
fn sort_field(cache: &RecordCache, grid: &GridUiState) -> Option<(Field, SortDirection)> {
    let (field_id, direction) = grid.sort?;
    let field = cache.structure(grid.table)?.field(field_id)?;
    Some((field.clone(), direction))
}

fn compute_row_order(cache: &RecordCache, grid: &GridUiState) -> Option<Vec<usize>> {
    let (field, direction) = sort_field(cache, grid)?;
    let records: Vec<&Record> = cache.records(grid.table).collect();
    Some(sorted_indices(&records, &field, direction))
}

/// Rebuild the sorted order when the rows or the sort changed since the last
/// build. Runs once per frame.
fn refresh_row_order(view_data: &mut ViewData) {
    let Some(grid) = view_data.grid.as_mut() else {
        return;
    };
    let Some(sort) = grid.sort else {
        grid.order = None;
        return;
    };
    let revision = view_data.cache.revision(grid.table);
    let current = grid
        .order
        .as_ref()
        .is_some_and(|order| order.revision == revision && order.sort == sort);
    if current {
        return;
    }
    grid.order = compute_row_order(&view_data.cache, grid).map(|indices| RowOrder {
        revision,
        sort,
        indices,
    });
}

/// Record shown at display row `row`. Uses the stored order when it is
/// current and sorts afresh otherwise.
fn display_record<'a>(
    cache: &'a RecordCache,
    grid: &GridUiState,
    row: usize,
) -> Option<&'a Record> {
    let Some(sort) = grid.sort else {
        return cache.record_at(grid.table, row);
    };
    let revision = cache.revision(grid.table);
    let index = match &grid.order {
        Some(order) if order.revision == revision && order.sort == sort => {
            order.indices.get(row).copied()
        }
        _ => match compute_row_order(cache, grid) {
            Some(indices) => indices.get(row).copied(),
            None => Some(row),
        },
    }?;
    cache.record_at(grid.table, index)
}

fn selected_field(view_data: &ViewData) -> Option<Field> {
    let grid = view_data.grid.as_ref()?;
    let structure = view_data.cache.structure(grid.table)?;
    order_columns(&structure.fields)
        .get(grid.selected_col)
        .map(|field| (*field).clone())
}

fn selected_record(view_data: &ViewData) -> Option<Record> {
    let grid = view_data.grid.as_ref()?;
    display_record(&view_data.cache, grid, grid.selected_row).cloned()
}

fn handle_grid_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if let Some(command) = grid_command_for_key(key) {
        if let Some(status) = apply_grid_command(view_data, command) {
            emit_status(state, view_data, internal_tx, status);
        }
        maybe_prefetch(state, runtime, view_data, internal_tx);
        return;
    }

    match state.mode {
        AppMode::Nav => match key.code {
            KeyCode::Char('i') => dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::EnterEditMode,
                internal_tx,
            ),
            KeyCode::Enter => {
                dispatch_and_refresh(
                    state,
                    runtime,
                    view_data,
                    AppCommand::EnterEditMode,
                    internal_tx,
                );
                activate_cell(state, runtime, view_data, internal_tx);
            }
            KeyCode::Char('r') => reload_grid(state, runtime, view_data, internal_tx),
            KeyCode::Esc | KeyCode::Backspace => {
                dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
            }
            _ => {}
        },
        AppMode::Edit => match key.code {
            KeyCode::Esc => dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::ExitToNav,
                internal_tx,
            ),
            KeyCode::Enter | KeyCode::Char('e') | KeyCode::Char(' ') => {
                activate_cell(state, runtime, view_data, internal_tx);
            }
            KeyCode::Char('a') => add_row(state, runtime, view_data, internal_tx),
            KeyCode::Char('d') => delete_selected_row(state, runtime, view_data, internal_tx),
            KeyCode::Char('D') => delete_selected_column(state, runtime, view_data, internal_tx),
            KeyCode::Char('f') => {
                open_form(state, runtime, view_data, internal_tx, FormKind::Field);
            }
            KeyCode::Char('B') => stage_mutation(
                state,
                runtime,
                view_data,
                internal_tx,
                MutationKind::BulkCreate {
                    count: MAX_BULK_RECORDS,
                },
                Some(format!("inserting {MAX_BULK_RECORDS} records...")),
            ),
            KeyCode::Char('t') => stage_mutation(
                state,
                runtime,
                view_data,
                internal_tx,
                MutationKind::AddDueDateField,
                None,
            ),
            _ => {}
        },
        AppMode::Form(_) => {}
    }
}

fn reload_grid<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(table) = view_data.grid.as_ref().map(|grid| grid.table) else {
        return;
    };
    let structure = view_data.cache.begin_structure_load(table);
    spawn_request(
        state,
        runtime,
        view_data,
        internal_tx,
        RemoteRequest::LoadStructure(structure),
    );
    if let Some(ticket) = view_data.cache.settle(table) {
        spawn_request(
            state,
            runtime,
            view_data,
            internal_tx,
            RemoteRequest::FetchPage(ticket),
        );
    }
    emit_status(state, view_data, internal_tx, "reloading");
}

fn stage_mutation<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: MutationKind,
    pending_status: Option<String>,
) {
    let Some(table) = view_data.grid.as_ref().map(|grid| grid.table) else {
        emit_status(state, view_data, internal_tx, "open a table first");
        return;
    };
    let request = view_data.ledger.stage(&mut view_data.cache, table, kind);
    clamp_grid_cursor(view_data);
    if let Some(status) = pending_status {
        emit_status(state, view_data, internal_tx, status);
    }
    spawn_request(state, runtime, view_data, internal_tx, request);
}

fn add_row<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(table) = view_data.grid.as_ref().map(|grid| grid.table) else {
        return;
    };
    if !can_add_row(view_data.cache.structure(table)) {
        emit_status(
            state,
            view_data,
            internal_tx,
            "add a field before adding rows",
        );
        return;
    }

    let known = view_data
        .cache
        .total_count(table)
        .unwrap_or(0)
        .max(view_data.cache.len(table));
    let defaults = RowDefaults {
        ordinal: known + 1,
        today: runtime.today(),
    };
    let values: RecordValues = view_data
        .cache
        .structure(table)
        .map(|structure| {
            structure
                .fields
                .iter()
                .map(|field| (field.id, field_kind::default_value(field, defaults)))
                .collect()
        })
        .unwrap_or_default();
    stage_mutation(
        state,
        runtime,
        view_data,
        internal_tx,
        MutationKind::CreateRecord { values },
        None,
    );
}

fn delete_selected_row<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(record) = selected_record(view_data) else {
        emit_status(state, view_data, internal_tx, "no row selected");
        return;
    };
    stage_mutation(
        state,
        runtime,
        view_data,
        internal_tx,
        MutationKind::DeleteRecords {
            records: vec![record.id],
        },
        None,
    );
}

fn delete_selected_column<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(field) = selected_field(view_data) else {
        emit_status(state, view_data, internal_tx, "no field selected");
        return;
    };
    if field.is_primary() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "Primary field cannot be deleted",
        );
        return;
    }
    stage_mutation(
        state,
        runtime,
        view_data,
        internal_tx,
        MutationKind::DeleteField { field: field.id },
        None,
    );
}

fn activate_cell<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let (Some(record), Some(field)) = (selected_record(view_data), selected_field(view_data))
    else {
        emit_status(state, view_data, internal_tx, "no cell selected");
        return;
    };
    let mut editor = CellEditor::new(&record, &field);
    let outcome = editor.activate();
    if editor.is_editing() {
        if let Some(grid) = view_data.grid.as_mut() {
            grid.editor = Some(editor);
        }
    }
    finish_cell_edit(state, runtime, view_data, internal_tx, outcome);
}

fn handle_editor_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let today = runtime.today();
    let outcome = {
        let Some(editor) = view_data
            .grid
            .as_mut()
            .and_then(|grid| grid.editor.as_mut())
        else {
            return;
        };
        let kind = field_kind::editor_kind(editor.field().field_type);
        let year_step = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => editor.cancel(),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                editor.newline();
                CellOutcome::Editing
            }
            KeyCode::Enter => editor.confirm(),
            KeyCode::Backspace => {
                editor.backspace();
                CellOutcome::Editing
            }
            KeyCode::Up | KeyCode::Down => {
                let delta = if key.code == KeyCode::Up { -1 } else { 1 };
                match kind {
                    EditorKind::Choice => editor.cycle_option(delta),
                    EditorKind::DatePicker => {
                        editor.shift_date(DateStep::Days(-(delta as i64)), today);
                    }
                    EditorKind::SingleLine | EditorKind::MultiLine | EditorKind::Toggle => {}
                }
                CellOutcome::Editing
            }
            KeyCode::PageUp | KeyCode::PageDown => {
                let delta = if key.code == KeyCode::PageUp { 1 } else { -1 };
                let step = if year_step {
                    DateStep::Years(delta)
                } else {
                    DateStep::Months(delta)
                };
                editor.shift_date(step, today);
                CellOutcome::Editing
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                editor.input(ch);
                CellOutcome::Editing
            }
            _ => CellOutcome::Editing,
        }
    };
    finish_cell_edit(state, runtime, view_data, internal_tx, outcome);
}

fn finish_cell_edit<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    outcome: CellOutcome,
) {
    if !matches!(outcome, CellOutcome::Editing | CellOutcome::Rejected(_)) {
        if let Some(grid) = view_data.grid.as_mut() {
            grid.editor = None;
        }
    }

    match outcome {
        CellOutcome::Editing => {}
        CellOutcome::Commit(commit) => stage_mutation(
            state,
            runtime,
            view_data,
            internal_tx,
            MutationKind::UpdateValue {
                record: commit.record,
                field: commit.field,
                value: commit.value,
            },
            None,
        ),
        CellOutcome::Rejected(error) => {
            emit_status(state, view_data, internal_tx, format!("invalid value: {error}"));
        }
        CellOutcome::Unchanged => emit_status(state, view_data, internal_tx, "no change"),
        CellOutcome::Discarded => emit_status(state, view_data, internal_tx, "edit canceled"),
    }
}

fn open_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: FormKind,
) {
    dispatch_and_refresh(
        state,
        runtime,
        view_data,
        AppCommand::OpenForm(kind),
        internal_tx,
    );
    view_data.form = Some(FormUiState {
        payload: FormPayload::blank_for(kind),
        field_index: 0,
    });
}

fn close_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.form = None;
    let command = match state.screen {
        Screen::Grid { .. } => AppCommand::EnterEditMode,
        Screen::Bases | Screen::Tables { .. } => AppCommand::ExitToNav,
    };
    dispatch_and_refresh(state, runtime, view_data, command, internal_tx);
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut() else {
        dispatch_and_refresh(
            state,
            runtime,
            view_data,
            AppCommand::ExitToNav,
            internal_tx,
        );
        return;
    };
    let entry_count = form.payload.entries().len();

    match key.code {
        KeyCode::Esc => {
            close_form(state, runtime, view_data, internal_tx);
            emit_status(state, view_data, internal_tx, "form canceled");
        }
        KeyCode::Enter => submit_form(state, runtime, view_data, internal_tx),
        KeyCode::Tab | KeyCode::Down => {
            form.field_index = (form.field_index + 1) % entry_count;
        }
        KeyCode::BackTab | KeyCode::Up => {
            form.field_index = (form.field_index + entry_count - 1) % entry_count;
        }
        KeyCode::Left => form.payload.cycle(form.field_index, -1),
        KeyCode::Right => form.payload.cycle(form.field_index, 1),
        KeyCode::Backspace => {
            if let Some(text) = form.payload.text_mut(form.field_index) {
                text.pop();
            }
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let index = form.field_index;
            if let Some(text) = form.payload.text_mut(index) {
                text.push(ch);
            } else if ch == ' ' {
                form.payload.cycle(index, 1);
            }
        }
        _ => {}
    }
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(payload) = view_data.form.as_ref().map(|form| form.payload.clone()) else {
        return;
    };
    if let Err(error) = payload.validate() {
        emit_status(state, view_data, internal_tx, format!("{error}"));
        return;
    }

    match payload {
        FormPayload::Base(input) => match runtime.create_base(input.to_new_base()) {
            Ok(base) => {
                view_data.list.focus = Some(base.id.get());
                close_form(state, runtime, view_data, internal_tx);
                if let Err(error) = refresh_view_data(state, runtime, view_data) {
                    emit_status(state, view_data, internal_tx, format!("load failed: {error}"));
                    return;
                }
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    format!("created base {}", base.name),
                );
            }
            Err(error) => {
                emit_status(state, view_data, internal_tx, format!("save failed: {error}"));
            }
        },
        FormPayload::Table(input) => {
            let Some(base) = state.screen.base() else {
                emit_status(state, view_data, internal_tx, "open a base first");
                return;
            };
            match runtime.create_table(base, input.to_new_table()) {
                Ok(detail) => {
                    view_data.list.focus = Some(detail.table.id.get());
                    close_form(state, runtime, view_data, internal_tx);
                    if let Err(error) = refresh_view_data(state, runtime, view_data) {
                        emit_status(state, view_data, internal_tx, format!("load failed: {error}"));
                        return;
                    }
                    emit_status(
                        state,
                        view_data,
                        internal_tx,
                        format!("created table {}", detail.table.name),
                    );
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("save failed: {error}"));
                }
            }
        }
        FormPayload::Field(input) => {
            close_form(state, runtime, view_data, internal_tx);
            let field = input.to_new_field();
            let pending = format!("adding field {}...", field.name);
            stage_mutation(
                state,
                runtime,
                view_data,
                internal_tx,
                MutationKind::CreateField { input: field },
                Some(pending),
            );
        }
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let breadcrumb = Paragraph::new(breadcrumb_text(state, view_data))
        .block(Block::default().title("gridbase").borders(Borders::ALL));
    frame.render_widget(breadcrumb, layout[0]);

    match state.screen {
        Screen::Bases => render_bases(frame, layout[1], view_data),
        Screen::Tables { .. } => render_tables(frame, layout[1], view_data),
        Screen::Grid { .. } => match &view_data.grid {
            Some(grid) => render_grid(frame, layout[1], view_data, grid),
            None => {
                let body = Paragraph::new("Loading table...")
                    .block(Block::default().borders(Borders::ALL));
                frame.render_widget(body, layout[1]);
            }
        },
    }

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status_widget, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(60, 40, frame.area());
        frame.render_widget(Clear, area);
        let overlay = Paragraph::new(form_overlay_text(form)).block(
            Block::default()
                .title(form.payload.kind().label())
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(overlay, area);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text()).block(
            Block::default()
                .title("help")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(help, area);
    }
}

fn breadcrumb_text(state: &AppState, view_data: &ViewData) -> String {
    let base_name = |base: BaseId| {
        view_data
            .bases
            .iter()
            .find(|detail| detail.base.id == base)
            .map_or_else(|| format!("base {base}"), |detail| detail.base.name.clone())
    };

    match state.screen {
        Screen::Bases => "Bases".to_owned(),
        Screen::Tables { base } => format!("Bases › {}", base_name(base)),
        Screen::Grid { base, table } => {
            let table_name = view_data
                .cache
                .structure(table)
                .map(|structure| format!("{} {}", structure.table.icon, structure.table.name))
                .or_else(|| {
                    view_data
                        .tables
                        .iter()
                        .find(|summary| summary.table.id == table)
                        .map(|summary| format!("{} {}", summary.table.icon, summary.table.name))
                })
                .unwrap_or_else(|| format!("table {table}"));
            format!("Bases › {} › {table_name}", base_name(base))
        }
    }
}

fn rgb_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

fn accent_color(raw: &str) -> Color {
    color::parse_hex(raw).map_or(Color::Cyan, rgb_color)
}

/// Name cell of a list row. The selected row gets the accent's gradient pair.
fn accent_name_style(raw: &str, selected: bool, armed: bool) -> Style {
    if armed {
        return Style::default();
    }
    if !selected {
        return Style::default().fg(accent_color(raw));
    }
    match color::parse_hex(raw) {
        Some(_) => {
            let (light, dark) = color::gradient_pair(raw);
            Style::default().fg(rgb_color(light)).bg(rgb_color(dark))
        }
        None => Style::default(),
    }
}

fn list_row_style(selected: bool, armed: bool) -> Style {
    match (selected, armed) {
        (true, true) => Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
        (true, false) => Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
        (false, _) => Style::default(),
    }
}

fn empty_list_row(message: &str) -> Row<'static> {
    Row::new(vec![
        Cell::from(message.to_owned()).style(Style::default().fg(Color::DarkGray)),
    ])
}

fn render_bases(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let header = Row::new(vec!["Base", "Tables", "Description"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = if view_data.bases.is_empty() {
        vec![empty_list_row("No bases yet -- press a to create one")]
    } else {
        view_data
            .bases
            .iter()
            .enumerate()
            .map(|(index, detail)| {
                let selected = index == view_data.list.selected;
                let armed = view_data.list.armed_delete == Some(detail.base.id.get());
                Row::new(vec![
                    Cell::from(format!("■ {}", detail.base.name))
                        .style(accent_name_style(&detail.base.color, selected, armed)),
                    Cell::from(detail.tables.len().to_string()),
                    Cell::from(detail.base.description.clone().unwrap_or_default()),
                ])
                .style(list_row_style(selected, armed))
            })
            .collect()
    };

    let widths = [
        Constraint::Percentage(35),
        Constraint::Length(8),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title("bases").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn render_tables(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let header = Row::new(vec!["Table", "Records", "Description"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = if view_data.tables.is_empty() {
        vec![empty_list_row("No tables yet -- press a to create one")]
    } else {
        view_data
            .tables
            .iter()
            .enumerate()
            .map(|(index, summary)| {
                let selected = index == view_data.list.selected;
                let armed = view_data.list.armed_delete == Some(summary.table.id.get());
                Row::new(vec![
                    Cell::from(format!("{} {}", summary.table.icon, summary.table.name))
                        .style(accent_name_style(&summary.table.color, selected, armed)),
                    Cell::from(summary.record_count.to_string()),
                    Cell::from(summary.table.description.clone().unwrap_or_default()),
                ])
                .style(list_row_style(selected, armed))
            })
            .collect()
    };

    let widths = [
        Constraint::Percentage(35),
        Constraint::Length(8),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title("tables").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn header_label(field: &Field, sort: Option<(FieldId, SortDirection)>) -> String {
    let marker = match sort {
        Some((id, SortDirection::Asc)) if id == field.id => format!(" {SORT_MARK_ASC}"),
        Some((id, SortDirection::Desc)) if id == field.id => format!(" {SORT_MARK_DESC}"),
        _ => String::new(),
    };
    format!(
        "{} {}{marker}",
        field_kind::glyph(field.field_type),
        field.name
    )
}

fn sentinel_row(sentinel: Sentinel, page_limit: usize) -> Row<'static> {
    Row::new(vec![Cell::from(sentinel.label(page_limit)).style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )])
}

fn cell_style(tone: CellTone) -> Style {
    match tone {
        CellTone::Plain => Style::default(),
        CellTone::Placeholder => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
        CellTone::Pill(rgb) => Style::default()
            .fg(rgb_color(rgb))
            .add_modifier(Modifier::BOLD),
        CellTone::Check(true) => Style::default().fg(Color::Green),
        CellTone::Check(false) => Style::default().fg(Color::DarkGray),
    }
}

fn record_row<'a>(
    record: &Record,
    columns: &[&Field],
    grid: &GridUiState,
    row_selected: bool,
) -> Row<'a> {
    let cells: Vec<Cell> = columns
        .iter()
        .enumerate()
        .map(|(col, field)| {
            let cell_selected = row_selected && col == grid.selected_col;
            let draft = grid
                .editor
                .as_ref()
                .filter(|editor| editor.record() == record.id && editor.field().id == field.id)
                .and_then(CellEditor::draft);
            if let Some(draft) = draft {
                let text = format!("{}{EDIT_CURSOR}", draft.replace('\n', " ⏎ "));
                return Cell::from(text).style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                );
            }

            let display = field_kind::display(field, record.value(field.id));
            let text = match display.tone {
                CellTone::Pill(_) => format!("● {}", display.text),
                _ => display.text.replace('\n', " "),
            };
            let style = if cell_selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                cell_style(display.tone)
            };
            Cell::from(text).style(style)
        })
        .collect();

    let row = Row::new(cells);
    if row_selected {
        row.style(Style::default().bg(Color::DarkGray))
    } else {
        row
    }
}

fn grid_title(structure: &TableDetail, view_data: &ViewData, grid: &GridUiState) -> String {
    let loaded = view_data.cache.len(grid.table);
    let total = view_data
        .cache
        .total_count(grid.table)
        .map_or_else(|| "?".to_owned(), |total| total.to_string());
    let mut title = format!(
        "{} {} | {loaded} of {total} rows",
        structure.table.icon, structure.table.name
    );
    if grid.sort.is_some() {
        title.push_str(" | sorted (loaded rows)");
    }
    let pending = view_data.ledger.pending_count();
    if pending > 0 {
        title.push_str(&format!(" | saving {pending}"));
    }
    title
}

fn render_grid(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    view_data: &ViewData,
    grid: &GridUiState,
) {
    let table = grid.table;
    let Some(structure) = view_data.cache.structure(table) else {
        let body = Paragraph::new("Loading table...")
            .block(Block::default().title("grid").borders(Borders::ALL));
        frame.render_widget(body, area);
        return;
    };

    let columns = order_columns(&structure.fields);
    let loaded = view_data.cache.len(table);
    let has_more = view_data.cache.has_more(table);
    let in_flight = view_data.cache.is_fetching(table);
    let page_limit = view_data.cache.page_limit();
    let metrics = view_data.metrics();
    let window = visible_window(&metrics, loaded, grid.scroll_top);

    let header = Row::new(
        columns
            .iter()
            .map(|field| {
                let style = if field.is_primary() {
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
                } else {
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD)
                };
                Cell::from(header_label(field, grid.sort)).style(style)
            })
            .collect::<Vec<_>>(),
    );

    let rows: Vec<Row> = match grid_body(columns.len(), loaded, has_more, in_flight, window) {
        GridBody::HeaderOnly => vec![empty_list_row(
            "No fields yet -- press i then f to add one",
        )],
        GridBody::EmptyState(sentinel) => vec![sentinel_row(sentinel, page_limit)],
        GridBody::Rows(window) => {
            let first = grid.scroll_top.max(window.start);
            let last = (grid.scroll_top + metrics.visible_rows()).min(window.end);
            (first..last)
                .map(|index| match display_record(&view_data.cache, grid, index) {
                    Some(record) => {
                        record_row(record, &columns, grid, index == grid.selected_row)
                    }
                    None => sentinel_row(Sentinel::resolve(loaded, has_more, in_flight), page_limit),
                })
                .collect()
        }
    };

    let widths = vec![Constraint::Min(10); columns.len().max(1)];
    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(grid_title(structure, view_data, grid))
                .borders(Borders::ALL),
        );
    frame.render_widget(widget, area);
}

fn form_overlay_text(form: &FormUiState) -> String {
    let mut lines = Vec::new();
    for (index, entry) in form.payload.entries().iter().enumerate() {
        let marker = if index == form.field_index { ">" } else { " " };
        let value = form.payload.value(index);
        let line = match entry {
            FormEntry::Text(label) => format!("{marker} {label}: {value}"),
            FormEntry::Choice(label) => format!("{marker} {label}: ‹ {value} ›"),
        };
        lines.push(line);
    }
    lines.push(String::new());
    lines.push("tab/shift+tab move | ←/→ change choice | enter save | esc cancel".to_owned());
    lines.join("\n")
}

fn help_overlay_text() -> String {
    [
        "lists",
        "  j/k move   enter open   a add   d d delete   r reload   esc back",
        "",
        "grid (nav)",
        "  h/j/k/l move   g/G first/last row   ctrl+d/u half page   ^/$ first/last column",
        "  s cycle sort   S clear sort   r reload   i edit mode   enter edit cell   esc back",
        "",
        "grid (edit)",
        "  enter/e edit cell   space toggle checkbox   a add row   d delete row",
        "  f add field   D delete field   t due date field   B bulk insert   esc nav",
        "",
        "cell editor",
        "  enter save   alt+enter newline   esc cancel",
        "  ↑/↓ option or day   pgup/pgdn month   ctrl+pgup/pgdn year",
        "",
        "ctrl+q quit   ? close help",
    ]
    .join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Edit => "EDIT",
        AppMode::Form(_) => "FORM",
    };
    let hints = key_hints(state, view_data);
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn key_hints(state: &AppState, view_data: &ViewData) -> &'static str {
    let editing = view_data.grid.as_ref().is_some_and(GridUiState::is_editing);
    match (state.screen, state.mode) {
        (_, AppMode::Form(_)) => "tab next | enter save | esc cancel",
        (Screen::Grid { .. }, _) if editing => "enter save | esc cancel | ↑/↓ step",
        (Screen::Grid { .. }, AppMode::Nav) => "hjkl move | s sort | i edit | esc back | ? help",
        (Screen::Grid { .. }, AppMode::Edit) => {
            "enter edit | a row | f field | d/D delete | esc nav | ? help"
        }
        (Screen::Bases, _) => "enter open | a new base | d delete | ? help | ctrl+q quit",
        (Screen::Tables { .. }, _) => "enter open | a new table | d delete | esc back | ? help",
    }
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
