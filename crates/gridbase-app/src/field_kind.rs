// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Per-field-type behavior. Every function here matches exhaustively on
//! [`FieldType`], so adding a type fails to compile until each behavior is
//! defined for it.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::color::{self, Rgb};
use crate::error::ValueError;
use crate::model::{CellValue, Field, FieldType};

pub const DATE_PLACEHOLDER: &str = "No date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
    SingleLine,
    MultiLine,
    Choice,
    Toggle,
    DatePicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellTone {
    Plain,
    Placeholder,
    Pill(Rgb),
    Check(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDisplay {
    pub text: String,
    pub tone: CellTone,
}

impl CellDisplay {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: CellTone::Plain,
        }
    }
}

/// Inputs for the values an added row starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowDefaults {
    pub ordinal: usize,
    pub today: Date,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Bool(bool),
    Date(Date),
    Text(String),
    Empty,
}

pub const fn editor_kind(field_type: FieldType) -> EditorKind {
    match field_type {
        FieldType::ShortText => EditorKind::SingleLine,
        FieldType::LongText => EditorKind::MultiLine,
        FieldType::SingleSelect => EditorKind::Choice,
        FieldType::Checkbox => EditorKind::Toggle,
        FieldType::Date => EditorKind::DatePicker,
    }
}

pub const fn glyph(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::ShortText => "A",
        FieldType::LongText => "¶",
        FieldType::SingleSelect => "▾",
        FieldType::Checkbox => "✓",
        FieldType::Date => "◷",
    }
}

pub fn display(field: &Field, value: &CellValue) -> CellDisplay {
    match field.field_type {
        FieldType::ShortText | FieldType::LongText => match value {
            CellValue::Null => CellDisplay::plain(""),
            CellValue::Bool(flag) => CellDisplay::plain(flag.to_string()),
            CellValue::Text(text) => CellDisplay::plain(single_line(text)),
        },
        FieldType::SingleSelect => match value {
            CellValue::Text(label) if !label.trim().is_empty() => CellDisplay {
                text: label.clone(),
                tone: CellTone::Pill(color::resolve_select_color(
                    field.configured_options(),
                    label,
                )),
            },
            CellValue::Bool(flag) => CellDisplay::plain(flag.to_string()),
            _ => CellDisplay::plain(""),
        },
        FieldType::Checkbox => {
            let checked = is_checked(value);
            CellDisplay {
                text: if checked { "☑" } else { "☐" }.to_owned(),
                tone: CellTone::Check(checked),
            }
        }
        FieldType::Date => match value {
            CellValue::Text(raw) if !raw.trim().is_empty() => match parse_iso_date(raw) {
                Some(date) => CellDisplay::plain(format_display_date(date)),
                None => CellDisplay::plain(raw.clone()),
            },
            CellValue::Bool(flag) => CellDisplay::plain(flag.to_string()),
            _ => CellDisplay {
                text: DATE_PLACEHOLDER.to_owned(),
                tone: CellTone::Placeholder,
            },
        },
    }
}

/// Parse an editor draft into a value for the field.
pub fn parse(field: &Field, raw: &str) -> Result<CellValue, ValueError> {
    match field.field_type {
        FieldType::ShortText => Ok(CellValue::text(single_line(raw))),
        FieldType::LongText => Ok(CellValue::text(raw)),
        FieldType::SingleSelect => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(CellValue::Null);
            }
            color::select_options(field)
                .into_iter()
                .find(|option| option.label.eq_ignore_ascii_case(trimmed))
                .map(|option| CellValue::Text(option.label))
                .ok_or_else(|| ValueError::UnknownOption(trimmed.to_owned()))
        }
        FieldType::Checkbox => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "x" => Ok(CellValue::Bool(true)),
            "" | "0" | "false" | "no" | "off" => Ok(CellValue::Bool(false)),
            _ => Err(ValueError::ExpectedBool),
        },
        FieldType::Date => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(CellValue::Null);
            }
            parse_iso_date(trimmed)
                .map(|date| CellValue::Text(format_iso_date(date)))
                .ok_or_else(|| ValueError::InvalidDate(trimmed.to_owned()))
        }
    }
}

/// Check a value submitted through the record service against the field.
pub fn validate(field: &Field, value: &CellValue) -> Result<(), ValueError> {
    match field.field_type {
        FieldType::ShortText | FieldType::LongText => match value {
            CellValue::Bool(_) => Err(ValueError::ExpectedText(field.field_type.label())),
            CellValue::Null | CellValue::Text(_) => Ok(()),
        },
        FieldType::SingleSelect => match value {
            CellValue::Null => Ok(()),
            CellValue::Bool(_) => Err(ValueError::ExpectedText(field.field_type.label())),
            CellValue::Text(label) if label.trim().is_empty() => Ok(()),
            CellValue::Text(label) => match field.configured_options() {
                Some(options) if !options.iter().any(|option| option.label == *label) => {
                    Err(ValueError::UnknownOption(label.clone()))
                }
                _ => Ok(()),
            },
        },
        FieldType::Checkbox => match value {
            CellValue::Null | CellValue::Bool(_) => Ok(()),
            CellValue::Text(_) => Err(ValueError::ExpectedBool),
        },
        FieldType::Date => match value {
            CellValue::Null => Ok(()),
            CellValue::Bool(_) => Err(ValueError::ExpectedText(field.field_type.label())),
            CellValue::Text(raw) if raw.trim().is_empty() => Ok(()),
            CellValue::Text(raw) => parse_iso_date(raw)
                .map(|_| ())
                .ok_or_else(|| ValueError::InvalidDate(raw.clone())),
        },
    }
}

pub fn default_value(field: &Field, defaults: RowDefaults) -> CellValue {
    match field.field_type {
        FieldType::ShortText | FieldType::LongText => {
            let name = field.name.trim().to_ascii_lowercase();
            if field.is_primary() || name == "name" {
                CellValue::Text(format!("Record {}", defaults.ordinal))
            } else if name.contains("email") {
                CellValue::Text(format!("user{}@example.com", defaults.ordinal))
            } else {
                CellValue::text("")
            }
        }
        FieldType::SingleSelect => color::select_options(field)
            .into_iter()
            .next()
            .map(|option| CellValue::Text(option.label))
            .unwrap_or(CellValue::Null),
        FieldType::Checkbox => CellValue::Bool(false),
        FieldType::Date => CellValue::Text(format_iso_date(defaults.today)),
    }
}

/// Text an editor starts from when a cell enters edit mode.
pub fn draft_text(field: &Field, value: &CellValue) -> String {
    match field.field_type {
        FieldType::ShortText | FieldType::LongText | FieldType::SingleSelect => match value {
            CellValue::Null => String::new(),
            CellValue::Bool(flag) => flag.to_string(),
            CellValue::Text(text) => text.clone(),
        },
        FieldType::Checkbox => is_checked(value).to_string(),
        FieldType::Date => match value {
            CellValue::Text(raw) => parse_iso_date(raw)
                .map(format_iso_date)
                .unwrap_or_else(|| raw.clone()),
            _ => String::new(),
        },
    }
}

pub fn sort_key(field: &Field, value: &CellValue) -> SortKey {
    match field.field_type {
        FieldType::ShortText | FieldType::LongText | FieldType::SingleSelect => match value {
            CellValue::Text(text) if !text.trim().is_empty() => {
                SortKey::Text(text.to_lowercase())
            }
            CellValue::Bool(flag) => SortKey::Text(flag.to_string()),
            _ => SortKey::Empty,
        },
        FieldType::Checkbox => SortKey::Bool(is_checked(value)),
        FieldType::Date => match value {
            CellValue::Text(raw) => parse_iso_date(raw).map_or(SortKey::Empty, SortKey::Date),
            _ => SortKey::Empty,
        },
    }
}

pub fn is_checked(value: &CellValue) -> bool {
    match value {
        CellValue::Bool(flag) => *flag,
        CellValue::Text(raw) => matches!(raw.trim(), "true" | "1"),
        CellValue::Null => false,
    }
}

pub fn parse_iso_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    if let Ok(date) = Date::parse(trimmed, &format_description!("[year]-[month]-[day]")) {
        return Some(date);
    }

    // Older rows may hold full timestamps; keep only the calendar date.
    if let Ok(value) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(value.date());
    }
    PrimitiveDateTime::parse(
        trimmed,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
    .map(PrimitiveDateTime::date)
}

pub fn format_iso_date(date: Date) -> String {
    date.format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_owned())
}

fn format_display_date(date: Date) -> String {
    date.format(&format_description!(
        "[month repr:short] [day padding:none], [year]"
    ))
    .unwrap_or_else(|_| format_iso_date(date))
}

fn single_line(text: &str) -> String {
    if text.contains(['\n', '\r']) {
        text.split(['\n', '\r'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        text.to_owned()
    }
}
