// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Request and response contract of the record service.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::field_kind;
use crate::ids::{BaseId, FieldId, RecordId, TableId};
use crate::model::{
    Base, CellValue, Field, FieldType, Record, RecordValues, SelectOption, Table, TableSummary,
};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;
pub const MAX_BULK_RECORDS: usize = 100_000;
pub const BULK_BATCH_SIZE: usize = 1_000;
pub const DUE_DATE_FIELD_NAME: &str = "Due Date";

pub fn clamp_page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Offset pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageQuery {
    pub limit: usize,
    pub offset: usize,
}

impl PageQuery {
    pub fn new(limit: Option<usize>, offset: usize) -> Self {
        Self {
            limit: clamp_page_limit(limit),
            offset,
        }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(Some(limit), 0)
    }

    pub fn next(self, returned: usize) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset + returned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<Record>,
    /// Exact only on the first page; zero for every later offset.
    pub total_count: usize,
    pub has_more: bool,
    pub next_offset: Option<usize>,
}

impl RecordPage {
    /// `has_more` is a heuristic: a full page means there may be more. When
    /// the remainder is exactly one page, one extra empty fetch finds the end.
    pub fn from_fetch(records: Vec<Record>, query: PageQuery, total_count: usize) -> Self {
        let has_more = records.len() == query.limit;
        let next_offset = has_more.then(|| query.offset + records.len());
        Self {
            total_count: if query.offset == 0 { total_count } else { 0 },
            records,
            has_more,
            next_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDetail {
    pub base: Base,
    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetail {
    pub table: Table,
    pub fields: Vec<Field>,
}

impl TableDetail {
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|field| field.is_primary())
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewBase {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTable {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewField {
    pub name: String,
    pub field_type: FieldType,
    pub options: Option<Vec<SelectOption>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkInsertReport {
    pub count: usize,
    pub batches: usize,
    pub message: String,
}

/// Remote data access. Implementations must never panic; every failure maps
/// to an [`ApiError`].
pub trait RecordService {
    fn list_bases(&self) -> ApiResult<Vec<BaseDetail>>;
    fn get_base(&self, base: BaseId) -> ApiResult<BaseDetail>;
    fn create_base(&self, input: NewBase) -> ApiResult<Base>;
    fn update_base(&self, base: BaseId, patch: BasePatch) -> ApiResult<Base>;
    fn delete_base(&self, base: BaseId) -> ApiResult<()>;

    fn list_tables(&self, base: BaseId) -> ApiResult<Vec<TableSummary>>;
    fn get_table(&self, table: TableId) -> ApiResult<TableDetail>;
    fn create_table(&self, base: BaseId, input: NewTable) -> ApiResult<TableDetail>;
    fn delete_table(&self, table: TableId) -> ApiResult<()>;

    fn get_records_page(&self, table: TableId, query: PageQuery) -> ApiResult<RecordPage>;
    fn create_record(&self, table: TableId, values: RecordValues) -> ApiResult<Record>;
    fn update_record_field(
        &self,
        record: RecordId,
        field: FieldId,
        value: CellValue,
    ) -> ApiResult<Record>;
    fn delete_records(&self, table: TableId, records: &[RecordId]) -> ApiResult<usize>;

    fn create_field(&self, table: TableId, input: NewField) -> ApiResult<Field>;
    fn delete_field(&self, field: FieldId) -> ApiResult<()>;

    fn create_bulk_records(&self, table: TableId, count: usize) -> ApiResult<BulkInsertReport>;
    fn add_due_date_field(&self, table: TableId) -> ApiResult<Field>;
}

pub fn require_name(raw: &str, what: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request(format!("{what} name is required")));
    }
    Ok(name.to_owned())
}

pub fn validate_bulk_count(count: usize) -> ApiResult<()> {
    if count == 0 || count > MAX_BULK_RECORDS {
        return Err(ApiError::bad_request(format!(
            "bulk count must be between 1 and {MAX_BULK_RECORDS}, got {count}"
        )));
    }
    Ok(())
}

pub fn batch_count(count: usize) -> usize {
    count.div_ceil(BULK_BATCH_SIZE)
}

/// Keep only values keyed by one of `fields`, validating each kept value.
pub fn retain_known_fields(fields: &[Field], values: RecordValues) -> ApiResult<RecordValues> {
    if fields.is_empty() {
        return Err(ApiError::not_found("table has no fields"));
    }

    let mut kept = RecordValues::new();
    for (field_id, value) in values {
        let Some(field) = fields.iter().find(|field| field.id == field_id) else {
            continue;
        };
        field_kind::validate(field, &value)?;
        kept.insert(field_id, value);
    }

    if kept.is_empty() {
        return Err(ApiError::bad_request(
            "record values do not match any field of the table",
        ));
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::{
        BULK_BATCH_SIZE, PageQuery, RecordPage, batch_count, clamp_page_limit,
        retain_known_fields, validate_bulk_count,
    };
    use crate::error::ApiError;
    use crate::ids::{FieldId, RecordId, TableId};
    use crate::model::{CellValue, Field, FieldConfig, FieldType, Record, RecordValues};
    use time::OffsetDateTime;

    fn record(id: i64) -> Record {
        Record {
            id: RecordId::new(id),
            table_id: TableId::new(1),
            values: RecordValues::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn field(id: i64, field_type: FieldType) -> Field {
        Field {
            id: FieldId::new(id),
            table_id: TableId::new(1),
            name: format!("f{id}"),
            field_type,
            order_index: id,
            config: FieldConfig::default(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(clamp_page_limit(None), 50);
        assert_eq!(clamp_page_limit(Some(0)), 1);
        assert_eq!(clamp_page_limit(Some(500)), 100);
        assert_eq!(PageQuery::first(10).next(10), PageQuery::new(Some(10), 10));
    }

    #[test]
    fn full_page_reports_more_and_total_only_on_first_page() {
        let query = PageQuery::first(2);
        let page = RecordPage::from_fetch(vec![record(1), record(2)], query, 5);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(2));
        assert_eq!(page.total_count, 5);

        let later = RecordPage::from_fetch(vec![record(5)], query.next(4), 5);
        assert!(!later.has_more);
        assert_eq!(later.next_offset, None);
        assert_eq!(later.total_count, 0);
    }

    #[test]
    fn bulk_bounds() {
        assert!(validate_bulk_count(0).is_err());
        assert!(validate_bulk_count(100_001).is_err());
        assert!(validate_bulk_count(100_000).is_ok());
        assert_eq!(batch_count(100_000), 100);
        assert_eq!(batch_count(BULK_BATCH_SIZE + 1), 2);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let fields = vec![field(1, FieldType::ShortText), field(2, FieldType::Checkbox)];
        let mut values = RecordValues::new();
        values.insert(FieldId::new(1), CellValue::text("kept"));
        values.insert(FieldId::new(99), CellValue::text("dropped"));

        let kept = retain_known_fields(&fields, values).expect("values kept");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get(&FieldId::new(1)), Some(&CellValue::text("kept")));
    }

    #[test]
    fn rejects_tables_without_fields_and_fully_unknown_values() {
        let mut values = RecordValues::new();
        values.insert(FieldId::new(99), CellValue::text("x"));

        assert!(matches!(
            retain_known_fields(&[], values.clone()),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            retain_known_fields(&[field(1, FieldType::ShortText)], values),
            Err(ApiError::BadRequest(_))
        ));
    }
}
