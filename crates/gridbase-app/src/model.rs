// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::ids::*;

pub const DEFAULT_BASE_COLOR: &str = "#2563eb";
pub const DEFAULT_TABLE_COLOR: &str = "#38bdf8";
pub const DEFAULT_TABLE_ICON: &str = "📋";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "text")]
    ShortText,
    #[serde(rename = "longText")]
    LongText,
    #[serde(rename = "singleSelect")]
    SingleSelect,
    #[serde(rename = "checkbox")]
    Checkbox,
    #[serde(rename = "date")]
    Date,
}

impl FieldType {
    pub const ALL: [Self; 5] = [
        Self::ShortText,
        Self::LongText,
        Self::SingleSelect,
        Self::Checkbox,
        Self::Date,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortText => "text",
            Self::LongText => "longText",
            Self::SingleSelect => "singleSelect",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::ShortText),
            "longText" => Some(Self::LongText),
            "singleSelect" => Some(Self::SingleSelect),
            "checkbox" => Some(Self::Checkbox),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::ShortText => "short text",
            Self::LongText => "long text",
            Self::SingleSelect => "single select",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewType {
    #[serde(rename = "grid")]
    Grid,
}

impl ViewType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "grid" => Some(Self::Grid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub color: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Type-specific column configuration, persisted as a JSON blob.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, rename = "isPrimary", skip_serializing_if = "is_false")]
    pub is_primary: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single record value. Records are untyped maps; the owning field's type
/// decides how the scalar is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Text(String),
}

static NULL_CELL: CellValue = CellValue::Null;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Lenient conversion used when reading stored JSON. Numbers and nested
    /// structures are coerced to text rather than rejected.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::String(text) => Self::Text(text.clone()),
            serde_json::Value::Number(number) => Self::Text(number.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(flag) => serde_json::Value::Bool(*flag),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

pub type RecordValues = BTreeMap<FieldId, CellValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub id: BaseId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub base_id: BaseId,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
    pub view_type: ViewType,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: Table,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub table_id: TableId,
    pub name: String,
    pub field_type: FieldType,
    pub order_index: i64,
    pub config: FieldConfig,
    pub created_at: OffsetDateTime,
}

impl Field {
    pub fn is_primary(&self) -> bool {
        self.config.is_primary
    }

    pub fn configured_options(&self) -> Option<&[SelectOption]> {
        self.config
            .options
            .as_deref()
            .filter(|options| !options.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub table_id: TableId,
    pub values: RecordValues,
    pub created_at: OffsetDateTime,
}

impl Record {
    pub fn value(&self, field: FieldId) -> &CellValue {
        self.values.get(&field).unwrap_or(&NULL_CELL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Base,
    Table,
    Field,
}

impl FormKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Base => "new base",
            Self::Table => "new table",
            Self::Field => "new field",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Edit,
    Form(FormKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}
