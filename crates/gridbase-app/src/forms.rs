// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::color;
use crate::{FieldType, FormKind, NewBase, NewField, NewTable, SelectOption};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaseFormInput {
    pub name: String,
    pub description: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableFormInput {
    pub name: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFormInput {
    pub name: String,
    pub field_type: FieldType,
    /// Comma-separated option labels; only read for single-select fields.
    pub options: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEntry {
    Text(&'static str),
    Choice(&'static str),
}

impl FormEntry {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text(label) | Self::Choice(label) => label,
        }
    }
}

const BASE_ENTRIES: [FormEntry; 3] = [
    FormEntry::Text("Name"),
    FormEntry::Text("Description"),
    FormEntry::Text("Color"),
];

const TABLE_ENTRIES: [FormEntry; 3] = [
    FormEntry::Text("Name"),
    FormEntry::Text("Icon"),
    FormEntry::Text("Color"),
];

const FIELD_ENTRIES: [FormEntry; 3] = [
    FormEntry::Text("Name"),
    FormEntry::Choice("Type"),
    FormEntry::Text("Options"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    Base(BaseFormInput),
    Table(TableFormInput),
    Field(FieldFormInput),
}

impl FormPayload {
    pub fn kind(&self) -> FormKind {
        match self {
            Self::Base(_) => FormKind::Base,
            Self::Table(_) => FormKind::Table,
            Self::Field(_) => FormKind::Field,
        }
    }

    pub fn blank_for(kind: FormKind) -> Self {
        match kind {
            FormKind::Base => Self::Base(BaseFormInput::default()),
            FormKind::Table => Self::Table(TableFormInput::default()),
            FormKind::Field => Self::Field(FieldFormInput {
                name: String::new(),
                field_type: FieldType::ShortText,
                options: String::new(),
            }),
        }
    }

    pub fn entries(&self) -> &'static [FormEntry] {
        match self {
            Self::Base(_) => &BASE_ENTRIES,
            Self::Table(_) => &TABLE_ENTRIES,
            Self::Field(_) => &FIELD_ENTRIES,
        }
    }

    pub fn value(&self, index: usize) -> String {
        match (self, index) {
            (Self::Field(field), 1) => field.field_type.label().to_owned(),
            _ => self.text(index).cloned().unwrap_or_default(),
        }
    }

    fn text(&self, index: usize) -> Option<&String> {
        match (self, index) {
            (Self::Base(base), 0) => Some(&base.name),
            (Self::Base(base), 1) => Some(&base.description),
            (Self::Base(base), 2) => Some(&base.color),
            (Self::Table(table), 0) => Some(&table.name),
            (Self::Table(table), 1) => Some(&table.icon),
            (Self::Table(table), 2) => Some(&table.color),
            (Self::Field(field), 0) => Some(&field.name),
            (Self::Field(field), 2) => Some(&field.options),
            _ => None,
        }
    }

    /// Mutable text of a free-text entry; `None` for choice entries.
    pub fn text_mut(&mut self, index: usize) -> Option<&mut String> {
        match (self, index) {
            (Self::Base(base), 0) => Some(&mut base.name),
            (Self::Base(base), 1) => Some(&mut base.description),
            (Self::Base(base), 2) => Some(&mut base.color),
            (Self::Table(table), 0) => Some(&mut table.name),
            (Self::Table(table), 1) => Some(&mut table.icon),
            (Self::Table(table), 2) => Some(&mut table.color),
            (Self::Field(field), 0) => Some(&mut field.name),
            (Self::Field(field), 2) => Some(&mut field.options),
            _ => None,
        }
    }

    pub fn cycle(&mut self, index: usize, delta: isize) {
        if let (Self::Field(field), 1) = (self, index) {
            let all = FieldType::ALL;
            let current = all
                .iter()
                .position(|candidate| *candidate == field.field_type)
                .unwrap_or(0) as isize;
            let next = (current + delta).rem_euclid(all.len() as isize) as usize;
            field.field_type = all[next];
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Base(base) => base.validate(),
            Self::Table(table) => table.validate(),
            Self::Field(field) => field.validate(),
        }
    }
}

fn validate_color(raw: &str, what: &str) -> Result<()> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && color::parse_hex(trimmed).is_none() {
        bail!("{what} color {trimmed:?} is not a hex color -- use a value like #2563eb and retry");
    }
    Ok(())
}

fn optional(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

impl BaseFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("base name is required -- enter a name and retry");
        }
        validate_color(&self.color, "base")
    }

    pub fn to_new_base(&self) -> NewBase {
        NewBase {
            name: self.name.trim().to_owned(),
            description: optional(&self.description),
            color: optional(&self.color).map(|raw| color::normalize_hex(&raw)),
        }
    }
}

impl TableFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("table name is required -- enter a name and retry");
        }
        if self.icon.trim().chars().count() > 8 {
            bail!("table icon is too long -- use a single emoji or short symbol");
        }
        validate_color(&self.color, "table")
    }

    pub fn to_new_table(&self) -> NewTable {
        NewTable {
            name: self.name.trim().to_owned(),
            description: None,
            icon: optional(&self.icon),
            color: optional(&self.color).map(|raw| color::normalize_hex(&raw)),
        }
    }
}

impl FieldFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("field name is required -- enter a name and retry");
        }
        if self.field_type == FieldType::SingleSelect {
            let labels = self.option_labels();
            for (index, label) in labels.iter().enumerate() {
                if labels[..index]
                    .iter()
                    .any(|earlier| earlier.eq_ignore_ascii_case(label))
                {
                    bail!("option {label:?} is listed twice -- remove the duplicate and retry");
                }
            }
        }
        Ok(())
    }

    fn option_labels(&self) -> Vec<&str> {
        self.options
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .collect()
    }

    /// Select fields without listed options fall back to the default palette.
    pub fn to_new_field(&self) -> NewField {
        let options = match self.field_type {
            FieldType::SingleSelect => {
                let options: Vec<SelectOption> = self
                    .option_labels()
                    .into_iter()
                    .enumerate()
                    .map(|(index, label)| {
                        SelectOption::new(label, color::option_color_for_index(index))
                    })
                    .collect();
                (!options.is_empty()).then_some(options)
            }
            FieldType::ShortText | FieldType::LongText | FieldType::Checkbox | FieldType::Date => {
                None
            }
        };
        NewField {
            name: self.name.trim().to_owned(),
            field_type: self.field_type,
            options,
        }
    }
}
