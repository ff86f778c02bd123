// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use gridbase_app::color;
use gridbase_app::field_kind::{self, RowDefaults};
use gridbase_app::{
    ApiError, ApiResult, Base, BaseDetail, BaseId, BasePatch, BulkInsertReport,
    CellValue, DEFAULT_BASE_COLOR, DEFAULT_TABLE_COLOR, DEFAULT_TABLE_ICON, DUE_DATE_FIELD_NAME,
    Field, FieldConfig, FieldId, FieldType, NewBase, NewField, NewTable, PageQuery, Record,
    RecordId, RecordPage, RecordService, RecordValues, SelectOption, Table, TableDetail, TableId,
    TableSummary, ViewType, batch_count, require_name, retain_known_fields, validate_bulk_count,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use time::macros::{date, datetime};
use time::{Date, Duration, OffsetDateTime};

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("gridbase.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> OffsetDateTime {
    datetime!(2026-02-19 12:34:56 UTC)
}

/// The "today" every scripted default date is computed from.
pub fn fixture_today() -> Date {
    date!(2026 - 02 - 19)
}

pub fn fixture_table(id: i64, base: i64, name: &str) -> Table {
    Table {
        id: TableId::new(id),
        base_id: BaseId::new(base),
        name: name.to_owned(),
        description: None,
        icon: DEFAULT_TABLE_ICON.to_owned(),
        color: DEFAULT_TABLE_COLOR.to_owned(),
        view_type: ViewType::Grid,
        created_at: fixture_datetime(),
    }
}

pub fn fixture_field(id: i64, table: i64, name: &str, field_type: FieldType) -> Field {
    Field {
        id: FieldId::new(id),
        table_id: TableId::new(table),
        name: name.to_owned(),
        field_type,
        order_index: id,
        config: FieldConfig::default(),
        created_at: fixture_datetime(),
    }
}

pub fn primary_field(id: i64, table: i64, name: &str) -> Field {
    let mut field = fixture_field(id, table, name, FieldType::ShortText);
    field.config.is_primary = true;
    field
}

pub fn select_field(id: i64, table: i64, name: &str, labels: &[&str]) -> Field {
    let mut field = fixture_field(id, table, name, FieldType::SingleSelect);
    field.config.options = Some(
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| SelectOption::new(*label, color::option_color_for_index(index)))
            .collect(),
    );
    field
}

pub fn fixture_record(id: i64, table: i64, values: &[(FieldId, CellValue)]) -> Record {
    Record {
        id: RecordId::new(id),
        table_id: TableId::new(table),
        values: values.iter().cloned().collect(),
        created_at: fixture_datetime(),
    }
}

/// Records `first..first + count` with one text value in `field`.
pub fn numbered_records(table: i64, field: FieldId, first: i64, count: usize) -> Vec<Record> {
    (first..first + count as i64)
        .map(|id| fixture_record(id, table, &[(field, CellValue::Text(format!("row {id}")))]))
        .collect()
}

pub fn fixture_detail(table: Table, fields: Vec<Field>) -> TableDetail {
    TableDetail { table, fields }
}

#[derive(Debug, Default)]
struct ScriptState {
    next_id: i64,
    bases: Vec<Base>,
    tables: Vec<Table>,
    fields: Vec<Field>,
    records: Vec<Record>,
    failures: VecDeque<ApiError>,
    calls: Vec<&'static str>,
}

impl ScriptState {
    fn allocate(&mut self) -> (i64, OffsetDateTime) {
        self.next_id += 1;
        let created_at = fixture_datetime() + Duration::seconds(self.next_id);
        (self.next_id, created_at)
    }

    fn enter(&mut self, call: &'static str) -> ApiResult<()> {
        self.calls.push(call);
        match self.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn base(&self, base: BaseId) -> ApiResult<&Base> {
        self.bases
            .iter()
            .find(|candidate| candidate.id == base)
            .ok_or_else(|| ApiError::not_found(format!("base {base}")))
    }

    fn table(&self, table: TableId) -> ApiResult<&Table> {
        self.tables
            .iter()
            .find(|candidate| candidate.id == table)
            .ok_or_else(|| ApiError::not_found(format!("table {table}")))
    }

    fn fields_of(&self, table: TableId) -> Vec<Field> {
        let mut fields: Vec<Field> = self
            .fields
            .iter()
            .filter(|field| field.table_id == table)
            .cloned()
            .collect();
        fields.sort_by_key(|field| (field.order_index, field.created_at, field.id));
        fields
    }

    fn summaries(&self, base: BaseId) -> Vec<TableSummary> {
        let mut tables: Vec<TableSummary> = self
            .tables
            .iter()
            .filter(|table| table.base_id == base)
            .map(|table| TableSummary {
                table: table.clone(),
                record_count: self.count(table.id),
            })
            .collect();
        tables.reverse();
        tables
    }

    fn count(&self, table: TableId) -> usize {
        self.records
            .iter()
            .filter(|record| record.table_id == table)
            .count()
    }

    fn push_field(&mut self, table: TableId, name: &str, field_type: FieldType, config: FieldConfig) -> Field {
        let order_index = self
            .fields
            .iter()
            .filter(|field| field.table_id == table)
            .map(|field| field.order_index)
            .max()
            .map_or(0, |max| max + 1);
        let (id, created_at) = self.allocate();
        let field = Field {
            id: FieldId::new(id),
            table_id: table,
            name: name.to_owned(),
            field_type,
            order_index,
            config,
            created_at,
        };
        self.fields.push(field.clone());
        field
    }

    fn push_record(&mut self, table: TableId, values: RecordValues) -> Record {
        let (id, created_at) = self.allocate();
        let record = Record {
            id: RecordId::new(id),
            table_id: table,
            values,
            created_at,
        };
        self.records.push(record.clone());
        record
    }

    fn default_row(&self, table: TableId, ordinal: usize) -> RecordValues {
        let defaults = RowDefaults {
            ordinal,
            today: fixture_today(),
        };
        self.fields_of(table)
            .iter()
            .map(|field| (field.id, field_kind::default_value(field, defaults)))
            .collect()
    }
}

/// In-memory [`RecordService`] with deterministic ids and timestamps. Calls
/// can be scripted to fail with [`ScriptedService::fail_next`].
#[derive(Debug, Default)]
pub struct ScriptedService {
    state: RefCell<ScriptState>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call fails with `error` instead of running. Queued failures
    /// are consumed in order, one per call.
    pub fn fail_next(&self, error: ApiError) {
        self.state.borrow_mut().failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn record_count(&self, table: TableId) -> usize {
        self.state.borrow().count(table)
    }

    /// A base holding one table with the given fields and `rows` default
    /// records. The first field is the primary field.
    pub fn seed_table(&self, name: &str, fields: &[(&str, FieldType)], rows: usize) -> TableDetail {
        let mut state = self.state.borrow_mut();
        let (base_id, created_at) = state.allocate();
        state.bases.push(Base {
            id: BaseId::new(base_id),
            name: format!("{name} base"),
            description: None,
            color: DEFAULT_BASE_COLOR.to_owned(),
            created_at,
        });
        let (table_id, created_at) = state.allocate();
        let table = Table {
            created_at,
            ..fixture_table(table_id, base_id, name)
        };
        state.tables.push(table.clone());

        for (index, (field_name, field_type)) in fields.iter().enumerate() {
            let config = FieldConfig {
                options: None,
                is_primary: index == 0,
            };
            state.push_field(table.id, field_name, *field_type, config);
        }
        for ordinal in 1..=rows {
            let values = state.default_row(table.id, ordinal);
            state.push_record(table.id, values);
        }

        let fields = state.fields_of(table.id);
        TableDetail { table, fields }
    }

    pub fn records(&self, table: TableId) -> Vec<Record> {
        self.state
            .borrow()
            .records
            .iter()
            .filter(|record| record.table_id == table)
            .cloned()
            .collect()
    }
}

impl RecordService for ScriptedService {
    fn list_bases(&self) -> ApiResult<Vec<BaseDetail>> {
        let mut state = self.state.borrow_mut();
        state.enter("list_bases")?;
        Ok(state
            .bases
            .iter()
            .rev()
            .map(|base| BaseDetail {
                base: base.clone(),
                tables: state.summaries(base.id),
            })
            .collect())
    }

    fn get_base(&self, base: BaseId) -> ApiResult<BaseDetail> {
        let mut state = self.state.borrow_mut();
        state.enter("get_base")?;
        let found = state.base(base)?.clone();
        Ok(BaseDetail {
            tables: state.summaries(base),
            base: found,
        })
    }

    fn create_base(&self, input: NewBase) -> ApiResult<Base> {
        let mut state = self.state.borrow_mut();
        state.enter("create_base")?;
        let name = require_name(&input.name, "base")?;
        let (id, created_at) = state.allocate();
        let base = Base {
            id: BaseId::new(id),
            name,
            description: input.description,
            color: input
                .color
                .as_deref()
                .map_or_else(|| DEFAULT_BASE_COLOR.to_owned(), color::normalize_hex),
            created_at,
        };
        state.bases.push(base.clone());
        Ok(base)
    }

    fn update_base(&self, base: BaseId, patch: BasePatch) -> ApiResult<Base> {
        let mut state = self.state.borrow_mut();
        state.enter("update_base")?;
        let name = patch
            .name
            .as_deref()
            .map(|name| require_name(name, "base"))
            .transpose()?;
        let Some(current) = state.bases.iter_mut().find(|candidate| candidate.id == base) else {
            return Err(ApiError::not_found(format!("base {base}")));
        };
        if let Some(name) = name {
            current.name = name;
        }
        if let Some(description) = patch.description {
            current.description = description;
        }
        if let Some(raw) = patch.color {
            current.color = color::normalize_hex(&raw);
        }
        Ok(current.clone())
    }

    fn delete_base(&self, base: BaseId) -> ApiResult<()> {
        let mut state = self.state.borrow_mut();
        state.enter("delete_base")?;
        state.base(base)?;
        let tables: Vec<TableId> = state
            .tables
            .iter()
            .filter(|table| table.base_id == base)
            .map(|table| table.id)
            .collect();
        state.bases.retain(|candidate| candidate.id != base);
        state.tables.retain(|table| table.base_id != base);
        state.fields.retain(|field| !tables.contains(&field.table_id));
        state
            .records
            .retain(|record| !tables.contains(&record.table_id));
        Ok(())
    }

    fn list_tables(&self, base: BaseId) -> ApiResult<Vec<TableSummary>> {
        let mut state = self.state.borrow_mut();
        state.enter("list_tables")?;
        state.base(base)?;
        Ok(state.summaries(base))
    }

    fn get_table(&self, table: TableId) -> ApiResult<TableDetail> {
        let mut state = self.state.borrow_mut();
        state.enter("get_table")?;
        let found = state.table(table)?.clone();
        Ok(TableDetail {
            fields: state.fields_of(table),
            table: found,
        })
    }

    fn create_table(&self, base: BaseId, input: NewTable) -> ApiResult<TableDetail> {
        let mut state = self.state.borrow_mut();
        state.enter("create_table")?;
        let name = require_name(&input.name, "table")?;
        state.base(base)?;
        let (id, created_at) = state.allocate();
        let table = Table {
            id: TableId::new(id),
            base_id: base,
            name,
            description: input.description,
            icon: input.icon.unwrap_or_else(|| DEFAULT_TABLE_ICON.to_owned()),
            color: input
                .color
                .as_deref()
                .map_or_else(|| DEFAULT_TABLE_COLOR.to_owned(), color::normalize_hex),
            view_type: ViewType::Grid,
            created_at,
        };
        state.tables.push(table.clone());
        state.push_field(
            table.id,
            "Name",
            FieldType::ShortText,
            FieldConfig {
                options: None,
                is_primary: true,
            },
        );
        state.push_field(
            table.id,
            "Status",
            FieldType::SingleSelect,
            FieldConfig {
                options: Some(color::default_palette()),
                is_primary: false,
            },
        );
        state.push_field(table.id, "Notes", FieldType::LongText, FieldConfig::default());
        for ordinal in 1..=3 {
            let values = state.default_row(table.id, ordinal);
            state.push_record(table.id, values);
        }
        Ok(TableDetail {
            fields: state.fields_of(table.id),
            table,
        })
    }

    fn delete_table(&self, table: TableId) -> ApiResult<()> {
        let mut state = self.state.borrow_mut();
        state.enter("delete_table")?;
        state.table(table)?;
        state.tables.retain(|candidate| candidate.id != table);
        state.fields.retain(|field| field.table_id != table);
        state.records.retain(|record| record.table_id != table);
        Ok(())
    }

    fn get_records_page(&self, table: TableId, query: PageQuery) -> ApiResult<RecordPage> {
        let mut state = self.state.borrow_mut();
        state.enter("get_records_page")?;
        state.table(table)?;
        let query = PageQuery::new(Some(query.limit), query.offset);
        let rows: Vec<Record> = state
            .records
            .iter()
            .filter(|record| record.table_id == table)
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(RecordPage::from_fetch(rows, query, state.count(table)))
    }

    fn create_record(&self, table: TableId, values: RecordValues) -> ApiResult<Record> {
        let mut state = self.state.borrow_mut();
        state.enter("create_record")?;
        state.table(table)?;
        let fields = state.fields_of(table);
        let values = retain_known_fields(&fields, values)?;
        Ok(state.push_record(table, values))
    }

    fn update_record_field(
        &self,
        record: RecordId,
        field: FieldId,
        value: CellValue,
    ) -> ApiResult<Record> {
        let mut state = self.state.borrow_mut();
        state.enter("update_record_field")?;
        let Some(table) = state
            .records
            .iter()
            .find(|candidate| candidate.id == record)
            .map(|candidate| candidate.table_id)
        else {
            return Err(ApiError::not_found(format!("record {record}")));
        };
        let fields = state.fields_of(table);
        let Some(target) = fields.iter().find(|candidate| candidate.id == field) else {
            return Err(ApiError::bad_request(format!(
                "field {field} does not belong to table {table}"
            )));
        };
        field_kind::validate(target, &value)?;

        let Some(stored) = state
            .records
            .iter_mut()
            .find(|candidate| candidate.id == record)
        else {
            return Err(ApiError::not_found(format!("record {record}")));
        };
        stored.values.insert(field, value);
        Ok(stored.clone())
    }

    fn delete_records(&self, table: TableId, records: &[RecordId]) -> ApiResult<usize> {
        let mut state = self.state.borrow_mut();
        state.enter("delete_records")?;
        if records.is_empty() {
            return Err(ApiError::bad_request("no records selected for deletion"));
        }
        let before = state.records.len();
        state
            .records
            .retain(|record| record.table_id != table || !records.contains(&record.id));
        Ok(before - state.records.len())
    }

    fn create_field(&self, table: TableId, input: NewField) -> ApiResult<Field> {
        let mut state = self.state.borrow_mut();
        state.enter("create_field")?;
        let name = require_name(&input.name, "field")?;
        state.table(table)?;
        let config = FieldConfig {
            options: match input.field_type {
                FieldType::SingleSelect => input.options.filter(|options| !options.is_empty()),
                _ => None,
            },
            is_primary: false,
        };
        Ok(state.push_field(table, &name, input.field_type, config))
    }

    fn delete_field(&self, field: FieldId) -> ApiResult<()> {
        let mut state = self.state.borrow_mut();
        state.enter("delete_field")?;
        let Some(table) = state
            .fields
            .iter()
            .find(|candidate| candidate.id == field)
            .map(|candidate| candidate.table_id)
        else {
            return Err(ApiError::not_found(format!("field {field}")));
        };
        state.fields.retain(|candidate| candidate.id != field);
        for record in state
            .records
            .iter_mut()
            .filter(|record| record.table_id == table)
        {
            record.values.remove(&field);
        }
        Ok(())
    }

    fn create_bulk_records(&self, table: TableId, count: usize) -> ApiResult<BulkInsertReport> {
        let mut state = self.state.borrow_mut();
        state.enter("create_bulk_records")?;
        validate_bulk_count(count)?;
        state.table(table)?;
        if state.fields_of(table).is_empty() {
            return Err(ApiError::not_found("table has no fields"));
        }
        let existing = state.count(table);
        for index in 0..count {
            let values = state.default_row(table, existing + index + 1);
            state.push_record(table, values);
        }
        let batches = batch_count(count);
        Ok(BulkInsertReport {
            count,
            batches,
            message: format!("inserted {count} records in {batches} batches"),
        })
    }

    fn add_due_date_field(&self, table: TableId) -> ApiResult<Field> {
        let mut state = self.state.borrow_mut();
        state.enter("add_due_date_field")?;
        state.table(table)?;
        if let Some(existing) = state
            .fields_of(table)
            .into_iter()
            .find(|field| field.field_type == FieldType::Date && field.name == DUE_DATE_FIELD_NAME)
        {
            return Ok(existing);
        }
        Ok(state.push_field(
            table,
            DUE_DATE_FIELD_NAME,
            FieldType::Date,
            FieldConfig::default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{ScriptedService, fixture_today, numbered_records, select_field};
    use gridbase_app::{
        ApiError, CellValue, FieldId, FieldType, NewBase, PageQuery, RecordService, RecordValues,
    };

    #[test]
    fn seeded_table_has_default_rows() {
        let service = ScriptedService::new();
        let detail = service.seed_table(
            "Tasks",
            &[("Name", FieldType::ShortText), ("Done", FieldType::Checkbox)],
            4,
        );
        assert!(detail.fields[0].is_primary());

        let records = service.records(detail.table.id);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[3].value(detail.fields[0].id),
            &CellValue::text("Record 4")
        );
        assert_eq!(records[0].value(detail.fields[1].id), &CellValue::Bool(false));
    }

    #[test]
    fn scripted_failures_are_consumed_in_order() {
        let service = ScriptedService::new();
        service.fail_next(ApiError::internal("offline"));

        assert_eq!(
            service.list_bases(),
            Err(ApiError::Internal("offline".to_owned()))
        );
        assert_eq!(service.list_bases(), Ok(Vec::new()));
        assert_eq!(service.calls(), vec!["list_bases", "list_bases"]);
    }

    #[test]
    fn pages_and_bulk_inserts_follow_store_rules() {
        let service = ScriptedService::new();
        let detail = service.seed_table("Tasks", &[("Name", FieldType::ShortText)], 0);
        let report = service
            .create_bulk_records(detail.table.id, 2_500)
            .expect("bulk insert");
        assert_eq!(report.batches, 3);

        let page = service
            .get_records_page(detail.table.id, PageQuery::first(100))
            .expect("first page");
        assert_eq!(page.total_count, 2_500);
        assert!(page.has_more);

        let tail = service
            .get_records_page(
                detail.table.id,
                PageQuery {
                    limit: 100,
                    offset: 2_450,
                },
            )
            .expect("last page");
        assert_eq!(tail.records.len(), 50);
        assert_eq!(tail.total_count, 0);
        assert!(!tail.has_more);
    }

    #[test]
    fn field_deletion_strips_values() {
        let service = ScriptedService::new();
        let detail = service.seed_table(
            "Tasks",
            &[("Name", FieldType::ShortText), ("Notes", FieldType::LongText)],
            2,
        );
        let notes = detail.fields[1].id;
        service.delete_field(notes).expect("delete field");
        assert!(
            service
                .records(detail.table.id)
                .iter()
                .all(|record| !record.values.contains_key(&notes))
        );
        assert!(matches!(
            service.delete_field(notes),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn create_record_without_fields_is_not_found() {
        let service = ScriptedService::new();
        let detail = service.seed_table("Empty", &[], 0);
        let mut values = RecordValues::new();
        values.insert(FieldId::new(1), CellValue::text("x"));
        assert!(matches!(
            service.create_record(detail.table.id, values),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn fixtures() {
        let field = select_field(3, 1, "Stage", &["Todo", "Done"]);
        assert_eq!(field.configured_options().map(<[_]>::len), Some(2));
        let rows = numbered_records(1, field.id, 10, 3);
        assert_eq!(rows[2].id.get(), 12);
        assert_eq!(fixture_today().year(), 2026);

        let service = ScriptedService::new();
        let base = service
            .create_base(NewBase {
                name: "Ops".to_owned(),
                ..NewBase::default()
            })
            .expect("create base");
        assert_eq!(service.list_bases().expect("list").len(), 1);
        assert_eq!(base.color, "#2563eb");
    }
}
