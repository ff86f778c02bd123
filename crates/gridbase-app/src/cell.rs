// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Per-cell edit state machine.
//!
//! A cell starts in [`CellState::Viewing`]. Activation enters
//! [`CellState::Editing`] with a draft seeded from the current value, except
//! for checkboxes, which toggle and commit immediately.

use time::{Date, Month};

use crate::color;
use crate::error::ValueError;
use crate::field_kind::{self, EditorKind};
use crate::ids::{FieldId, RecordId};
use crate::model::{CellValue, Field, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState {
    Viewing,
    Editing { draft: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub record: RecordId,
    pub field: FieldId,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
    Editing,
    Commit(Commit),
    /// The draft did not parse; the cell stays in edit mode.
    Rejected(ValueError),
    Unchanged,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStep {
    Days(i64),
    Months(i32),
    Years(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEditor {
    record: RecordId,
    field: Field,
    committed: CellValue,
    state: CellState,
}

impl CellEditor {
    pub fn new(record: &Record, field: &Field) -> Self {
        Self {
            record: record.id,
            field: field.clone(),
            committed: record.value(field.id).clone(),
            state: CellState::Viewing,
        }
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, CellState::Editing { .. })
    }

    pub fn draft(&self) -> Option<&str> {
        match &self.state {
            CellState::Editing { draft } => Some(draft),
            CellState::Viewing => None,
        }
    }

    pub fn activate(&mut self) -> CellOutcome {
        if self.is_editing() {
            return CellOutcome::Editing;
        }
        if field_kind::editor_kind(self.field.field_type) == EditorKind::Toggle {
            let value = CellValue::Bool(!field_kind::is_checked(&self.committed));
            return self.commit(value);
        }
        self.state = CellState::Editing {
            draft: field_kind::draft_text(&self.field, &self.committed),
        };
        CellOutcome::Editing
    }

    pub fn input(&mut self, ch: char) {
        if ch == '\n' || ch == '\r' {
            self.newline();
            return;
        }
        if let CellState::Editing { draft } = &mut self.state {
            draft.push(ch);
        }
    }

    /// Line breaks only enter multi-line drafts.
    pub fn newline(&mut self) {
        if field_kind::editor_kind(self.field.field_type) != EditorKind::MultiLine {
            return;
        }
        if let CellState::Editing { draft } = &mut self.state {
            draft.push('\n');
        }
    }

    pub fn backspace(&mut self) {
        if let CellState::Editing { draft } = &mut self.state {
            draft.pop();
        }
    }

    /// Step through the select options, wrapping at either end.
    pub fn cycle_option(&mut self, delta: isize) {
        if field_kind::editor_kind(self.field.field_type) != EditorKind::Choice {
            return;
        }
        let options = color::select_options(&self.field);
        let CellState::Editing { draft } = &mut self.state else {
            return;
        };
        if options.is_empty() {
            return;
        }

        let len = options.len() as isize;
        let next = match options
            .iter()
            .position(|option| option.label.eq_ignore_ascii_case(draft.trim()))
        {
            Some(current) => (current as isize + delta).rem_euclid(len),
            None if delta < 0 => len - 1,
            None => 0,
        };
        *draft = options[next as usize].label.clone();
    }

    /// Move a date draft. An empty or unreadable draft starts from `today`.
    pub fn shift_date(&mut self, step: DateStep, today: Date) {
        if field_kind::editor_kind(self.field.field_type) != EditorKind::DatePicker {
            return;
        }
        let CellState::Editing { draft } = &mut self.state else {
            return;
        };
        let current = field_kind::parse_iso_date(draft).unwrap_or(today);
        let shifted = match step {
            DateStep::Days(days) => shift_date_by_days(current, days),
            DateStep::Months(months) => shift_date_by_months(current, months),
            DateStep::Years(years) => shift_date_by_years(current, years),
        };
        if let Some(date) = shifted {
            *draft = field_kind::format_iso_date(date);
        }
    }

    pub fn confirm(&mut self) -> CellOutcome {
        let CellState::Editing { draft } = &self.state else {
            return CellOutcome::Unchanged;
        };
        match field_kind::parse(&self.field, draft) {
            Ok(value) if value == self.committed => {
                self.state = CellState::Viewing;
                CellOutcome::Unchanged
            }
            Ok(value) => self.commit(value),
            Err(error) => CellOutcome::Rejected(error),
        }
    }

    pub fn cancel(&mut self) -> CellOutcome {
        if !self.is_editing() {
            return CellOutcome::Unchanged;
        }
        self.state = CellState::Viewing;
        CellOutcome::Discarded
    }

    fn commit(&mut self, value: CellValue) -> CellOutcome {
        self.state = CellState::Viewing;
        self.committed = value.clone();
        CellOutcome::Commit(Commit {
            record: self.record,
            field: self.field.id,
            value,
        })
    }
}

pub fn shift_date_by_days(date: Date, days: i64) -> Option<Date> {
    date.checked_add(time::Duration::days(days))
}

pub fn shift_date_by_years(date: Date, years: i32) -> Option<Date> {
    shift_date_by_months(date, years.saturating_mul(12))
}

pub fn shift_date_by_months(date: Date, months: i32) -> Option<Date> {
    let base_month = i32::from(date.month() as u8);
    let total_month = base_month - 1 + months;
    let year = date.year() + total_month.div_euclid(12);
    let month = Month::try_from((total_month.rem_euclid(12) + 1) as u8).ok()?;
    let max_day = last_day_of_month(year, month)?;
    Date::from_calendar_date(year, month, date.day().min(max_day)).ok()
}

fn last_day_of_month(year: i32, month: Month) -> Option<u8> {
    let (next_year, next_month) = if month == Month::December {
        (year + 1, Month::January)
    } else {
        (year, month.next())
    };
    let first_next_month = Date::from_calendar_date(next_year, next_month, 1).ok()?;
    first_next_month.previous_day().map(|last| last.day())
}
