// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod faker;

pub use faker::RecordFaker;

use anyhow::{Context, Result, anyhow, bail};
use gridbase_app::color;
use gridbase_app::{
    ApiError, ApiResult, BULK_BATCH_SIZE, Base, BaseDetail, BaseId, BasePatch, BulkInsertReport,
    CellValue, DEFAULT_BASE_COLOR, DEFAULT_TABLE_COLOR, DEFAULT_TABLE_ICON, DUE_DATE_FIELD_NAME,
    Field, FieldConfig, FieldId, FieldType, NewBase, NewField, NewTable, PageQuery, Record,
    RecordId, RecordPage, RecordService, RecordValues, Table, TableDetail, TableId,
    TableSummary, ViewType, batch_count, field_kind, require_name, retain_known_fields,
    validate_bulk_count,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const APP_NAME: &str = "gridbase";

const DEMO_BULK_RECORDS: usize = 250;

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "bases",
        &["id", "name", "description", "color", "created_at"],
    ),
    (
        "base_tables",
        &[
            "id",
            "base_id",
            "name",
            "description",
            "icon",
            "color",
            "view_type",
            "created_at",
        ],
    ),
    (
        "table_fields",
        &[
            "id",
            "table_id",
            "name",
            "field_type",
            "order_index",
            "config",
            "created_at",
        ],
    ),
    ("table_records", &["id", "table_id", "data", "created_at"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "base_tables_base_idx",
        create_sql: "CREATE INDEX IF NOT EXISTS base_tables_base_idx ON base_tables (base_id);",
    },
    RequiredIndex {
        name: "table_fields_table_idx",
        create_sql: "CREATE INDEX IF NOT EXISTS table_fields_table_idx ON table_fields (table_id);",
    },
    RequiredIndex {
        name: "table_fields_order_idx",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS table_fields_order_idx ON table_fields (table_id, order_index);",
    },
    RequiredIndex {
        name: "table_records_table_idx",
        create_sql: "CREATE INDEX IF NOT EXISTS table_records_table_idx ON table_records (table_id);",
    },
    RequiredIndex {
        name: "table_records_created_idx",
        create_sql: "CREATE INDEX IF NOT EXISTS table_records_created_idx ON table_records (table_id, created_at, id);",
    },
];

const SAMPLE_ROWS: [(&str, &str, &str); 3] = [
    (
        "Kickoff meeting",
        "In Progress",
        "Align on roadmap and responsibilities.",
    ),
    (
        "Design review",
        "Backlog",
        "Collect feedback from the design partners.",
    ),
    (
        "Launch prep",
        "Complete",
        "Finalize marketing and onboarding assets.",
    ),
];

const TABLE_COLUMNS: &str =
    "t.id, t.base_id, t.name, t.description, t.icon, t.color, t.view_type, t.created_at";
const FIELD_COLUMNS: &str = "id, table_id, name, field_type, order_index, config, created_at";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    /// Create a demo base with one populated table. Returns the new base.
    pub fn seed_demo_data(&self) -> Result<BaseId> {
        let base = self.create_base(NewBase {
            name: "Product Roadmap".to_owned(),
            description: Some("Plans, launches and the work behind them.".to_owned()),
            color: Some(DEFAULT_BASE_COLOR.to_owned()),
        })?;
        let detail = self.create_table(
            base.id,
            NewTable {
                name: "Tasks".to_owned(),
                description: Some("Everything the team is working on.".to_owned()),
                icon: Some("✅".to_owned()),
                color: None,
            },
        )?;
        let table = detail.table.id;
        self.add_due_date_field(table)?;
        self.create_field(
            table,
            NewField {
                name: "Done".to_owned(),
                field_type: FieldType::Checkbox,
                options: None,
            },
        )?;
        let report = self.create_bulk_records(table, DEMO_BULK_RECORDS)?;
        log::info!("seeded demo base {} ({})", base.id, report.message);
        Ok(base.id)
    }

    fn immediate(&self) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .context("begin write transaction")
    }

    fn load_base(&self, base: BaseId) -> ApiResult<Base> {
        self.conn
            .query_row(
                "SELECT id, name, description, color, created_at FROM bases WHERE id = ?",
                params![base.get()],
                map_base,
            )
            .optional()
            .with_context(|| format!("load base {base}"))?
            .ok_or_else(|| ApiError::not_found(format!("base {base}")))
    }

    fn load_table(&self, table: TableId) -> ApiResult<Table> {
        self.conn
            .query_row(
                &format!("SELECT {TABLE_COLUMNS} FROM base_tables t WHERE t.id = ?"),
                params![table.get()],
                map_table,
            )
            .optional()
            .with_context(|| format!("load table {table}"))?
            .ok_or_else(|| ApiError::not_found(format!("table {table}")))
    }

    fn table_summaries(&self, base: BaseId) -> Result<Vec<TableSummary>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "
                SELECT
                  {TABLE_COLUMNS},
                  (SELECT COUNT(*) FROM table_records r WHERE r.table_id = t.id)
                FROM base_tables t
                WHERE t.base_id = ?
                ORDER BY t.created_at DESC, t.id DESC
                "
            ))
            .context("prepare tables query")?;
        let rows = stmt
            .query_map(params![base.get()], |row| {
                let count: i64 = row.get(8)?;
                Ok(TableSummary {
                    table: map_table(row)?,
                    record_count: usize::try_from(count).unwrap_or_default(),
                })
            })
            .context("query tables")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect tables")
    }

    fn fields_for(&self, table: TableId) -> Result<Vec<Field>> {
        load_fields(&self.conn, table)
    }

    fn load_record(&self, record: RecordId) -> ApiResult<Record> {
        self.conn
            .query_row(
                "SELECT id, table_id, data, created_at FROM table_records WHERE id = ?",
                params![record.get()],
                map_record,
            )
            .optional()
            .with_context(|| format!("load record {record}"))?
            .ok_or_else(|| ApiError::not_found(format!("record {record}")))
    }

    fn count_records(&self, table: TableId) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM table_records WHERE table_id = ?",
                params![table.get()],
                |row| row.get(0),
            )
            .with_context(|| format!("count records of table {table}"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn insert_bulk_batch(
        &self,
        table: TableId,
        rows: &[RecordValues],
        created_at: &str,
    ) -> Result<()> {
        let tx = self.immediate()?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO table_records (table_id, data, created_at) VALUES (?, ?, ?)")
                .context("prepare bulk insert")?;
            for values in rows {
                stmt.execute(params![table.get(), encode_values(values)?, created_at])
                    .context("insert bulk record")?;
            }
        }
        tx.commit().context("commit bulk batch")
    }
}

impl RecordService for Store {
    fn list_bases(&self) -> ApiResult<Vec<BaseDetail>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, name, description, color, created_at
                FROM bases
                ORDER BY created_at DESC, id DESC
                ",
            )
            .context("prepare bases query")?;
        let bases = stmt
            .query_map([], map_base)
            .context("query bases")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect bases")?;

        let mut details = Vec::with_capacity(bases.len());
        for base in bases {
            let tables = self.table_summaries(base.id)?;
            details.push(BaseDetail { base, tables });
        }
        Ok(details)
    }

    fn get_base(&self, base: BaseId) -> ApiResult<BaseDetail> {
        let base = self.load_base(base)?;
        let tables = self.table_summaries(base.id)?;
        Ok(BaseDetail { base, tables })
    }

    fn create_base(&self, input: NewBase) -> ApiResult<Base> {
        let name = require_name(&input.name, "base")?;
        let color = input
            .color
            .as_deref()
            .map_or_else(|| DEFAULT_BASE_COLOR.to_owned(), color::normalize_hex);
        let description = input.description.filter(|text| !text.trim().is_empty());
        let now = now_timestamp()?;

        self.conn
            .execute(
                "INSERT INTO bases (name, description, color, created_at) VALUES (?, ?, ?, ?)",
                params![name, description, color, now],
            )
            .context("insert base")?;
        let id = BaseId::new(self.conn.last_insert_rowid());
        log::info!("created base {id} {name:?}");
        self.load_base(id)
    }

    fn update_base(&self, base: BaseId, patch: BasePatch) -> ApiResult<Base> {
        let current = self.load_base(base)?;
        let name = match patch.name {
            Some(name) => require_name(&name, "base")?,
            None => current.name,
        };
        let description = match patch.description {
            Some(description) => description.filter(|text| !text.trim().is_empty()),
            None => current.description,
        };
        let color = patch
            .color
            .as_deref()
            .map_or(current.color, color::normalize_hex);

        self.conn
            .execute(
                "UPDATE bases SET name = ?, description = ?, color = ? WHERE id = ?",
                params![name, description, color, base.get()],
            )
            .with_context(|| format!("update base {base}"))?;
        self.load_base(base)
    }

    fn delete_base(&self, base: BaseId) -> ApiResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM bases WHERE id = ?", params![base.get()])
            .with_context(|| format!("delete base {base}"))?;
        if deleted == 0 {
            return Err(ApiError::not_found(format!("base {base}")));
        }
        log::info!("deleted base {base}");
        Ok(())
    }

    fn list_tables(&self, base: BaseId) -> ApiResult<Vec<TableSummary>> {
        self.load_base(base)?;
        Ok(self.table_summaries(base)?)
    }

    fn get_table(&self, table: TableId) -> ApiResult<TableDetail> {
        let table = self.load_table(table)?;
        let fields = self.fields_for(table.id)?;
        Ok(TableDetail { table, fields })
    }

    fn create_table(&self, base: BaseId, input: NewTable) -> ApiResult<TableDetail> {
        let name = require_name(&input.name, "table")?;
        self.load_base(base)?;
        let icon = input
            .icon
            .filter(|icon| !icon.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_ICON.to_owned());
        let color = input
            .color
            .as_deref()
            .map_or_else(|| DEFAULT_TABLE_COLOR.to_owned(), color::normalize_hex);
        let description = input.description.filter(|text| !text.trim().is_empty());
        let now = now_timestamp()?;

        let tx = self.immediate()?;
        tx.execute(
            "
            INSERT INTO base_tables (base_id, name, description, icon, color, view_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                base.get(),
                name,
                description,
                icon,
                color,
                ViewType::Grid.as_str(),
                now
            ],
        )
        .context("insert table")?;
        let table = TableId::new(tx.last_insert_rowid());

        let defaults = [
            (
                "Name",
                FieldType::ShortText,
                FieldConfig {
                    options: None,
                    is_primary: true,
                },
            ),
            (
                "Status",
                FieldType::SingleSelect,
                FieldConfig {
                    options: Some(color::default_palette()),
                    is_primary: false,
                },
            ),
            ("Notes", FieldType::LongText, FieldConfig::default()),
        ];
        for (order_index, (field_name, field_type, config)) in defaults.into_iter().enumerate() {
            insert_field(
                &tx,
                table,
                field_name,
                field_type,
                order_index as i64,
                &config,
                &now,
            )?;
        }

        let fields = load_fields(&tx, table)?;
        let find = |wanted: &str| {
            fields
                .iter()
                .find(|field| field.name == wanted)
                .map(|field| field.id)
        };
        let (Some(name_field), Some(status_field), Some(notes_field)) =
            (find("Name"), find("Status"), find("Notes"))
        else {
            return Err(ApiError::internal("default fields could not be created"));
        };

        for (title, status, notes) in SAMPLE_ROWS {
            let mut values = RecordValues::new();
            values.insert(name_field, CellValue::text(title));
            values.insert(status_field, CellValue::text(status));
            values.insert(notes_field, CellValue::text(notes));
            tx.execute(
                "INSERT INTO table_records (table_id, data, created_at) VALUES (?, ?, ?)",
                params![table.get(), encode_values(&values)?, now],
            )
            .context("insert sample record")?;
        }
        tx.commit().context("commit new table")?;
        log::info!("created table {table} {name:?} in base {base}");

        self.get_table(table)
    }

    fn delete_table(&self, table: TableId) -> ApiResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM base_tables WHERE id = ?", params![table.get()])
            .with_context(|| format!("delete table {table}"))?;
        if deleted == 0 {
            return Err(ApiError::not_found(format!("table {table}")));
        }
        log::info!("deleted table {table}");
        Ok(())
    }

    fn get_records_page(&self, table: TableId, query: PageQuery) -> ApiResult<RecordPage> {
        self.load_table(table)?;
        let query = PageQuery::new(Some(query.limit), query.offset);

        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, table_id, data, created_at
                FROM table_records
                WHERE table_id = ?
                ORDER BY created_at ASC, id ASC
                LIMIT ? OFFSET ?
                ",
            )
            .context("prepare records page query")?;
        let records = stmt
            .query_map(
                params![table.get(), query.limit as i64, query.offset as i64],
                map_record,
            )
            .context("query records page")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect records page")?;

        let total_count = if query.offset == 0 {
            self.count_records(table)?
        } else {
            0
        };
        Ok(RecordPage::from_fetch(records, query, total_count))
    }

    fn create_record(&self, table: TableId, values: RecordValues) -> ApiResult<Record> {
        self.load_table(table)?;
        let fields = self.fields_for(table)?;
        let values = retain_known_fields(&fields, values)?;
        let now = now_timestamp()?;

        self.conn
            .execute(
                "INSERT INTO table_records (table_id, data, created_at) VALUES (?, ?, ?)",
                params![table.get(), encode_values(&values)?, now],
            )
            .context("insert record")?;
        self.load_record(RecordId::new(self.conn.last_insert_rowid()))
    }

    fn update_record_field(
        &self,
        record: RecordId,
        field: FieldId,
        value: CellValue,
    ) -> ApiResult<Record> {
        let mut current = self.load_record(record)?;
        let fields = self.fields_for(current.table_id)?;
        let Some(target) = fields.iter().find(|candidate| candidate.id == field) else {
            return Err(ApiError::bad_request(format!(
                "field {field} does not belong to table {}",
                current.table_id
            )));
        };
        field_kind::validate(target, &value)?;

        current.values.insert(field, value);
        self.conn
            .execute(
                "UPDATE table_records SET data = ? WHERE id = ?",
                params![encode_values(&current.values)?, record.get()],
            )
            .with_context(|| format!("update record {record}"))?;
        Ok(current)
    }

    fn delete_records(&self, table: TableId, records: &[RecordId]) -> ApiResult<usize> {
        if records.is_empty() {
            return Err(ApiError::bad_request("no records selected for deletion"));
        }

        let tx = self.immediate()?;
        let mut deleted = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM table_records WHERE table_id = ? AND id = ?")
                .context("prepare record delete")?;
            for record in records {
                deleted += stmt
                    .execute(params![table.get(), record.get()])
                    .with_context(|| format!("delete record {record}"))?;
            }
        }
        tx.commit().context("commit record delete")?;
        log::debug!("deleted {deleted} records from table {table}");
        Ok(deleted)
    }

    fn create_field(&self, table: TableId, input: NewField) -> ApiResult<Field> {
        let name = require_name(&input.name, "field")?;
        let config = FieldConfig {
            options: match input.field_type {
                FieldType::SingleSelect => input.options.filter(|options| !options.is_empty()),
                _ => None,
            },
            is_primary: false,
        };
        let now = now_timestamp()?;

        // The write lock is taken before reading the max so concurrent
        // creators cannot pick the same order index.
        let tx = self.immediate()?;
        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM base_tables WHERE id = ?)",
                params![table.get()],
                |row| row.get(0),
            )
            .with_context(|| format!("check table {table}"))?;
        if !exists {
            return Err(ApiError::not_found(format!("table {table}")));
        }
        let order_index: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(order_index), -1) + 1 FROM table_fields WHERE table_id = ?",
                params![table.get()],
                |row| row.get(0),
            )
            .context("compute next field order")?;
        let field = insert_field(
            &tx,
            table,
            &name,
            input.field_type,
            order_index,
            &config,
            &now,
        )?;
        tx.commit().context("commit new field")?;
        log::info!("created field {} {name:?} on table {table}", field.id);
        Ok(field)
    }

    fn delete_field(&self, field: FieldId) -> ApiResult<()> {
        let tx = self.immediate()?;
        let table: Option<i64> = tx
            .query_row(
                "SELECT table_id FROM table_fields WHERE id = ?",
                params![field.get()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load field {field}"))?;
        let Some(table) = table else {
            return Err(ApiError::not_found(format!("field {field}")));
        };

        tx.execute("DELETE FROM table_fields WHERE id = ?", params![field.get()])
            .with_context(|| format!("delete field {field}"))?;
        let path = format!("$.\"{}\"", field.as_key());
        let stripped = tx
            .execute(
                "
                UPDATE table_records
                SET data = json_remove(data, ?1)
                WHERE table_id = ?2 AND json_type(data, ?1) IS NOT NULL
                ",
                params![path, table],
            )
            .with_context(|| format!("strip field {field} from records"))?;
        tx.commit().context("commit field delete")?;
        log::info!("deleted field {field}; stripped {stripped} records");
        Ok(())
    }

    fn create_bulk_records(&self, table: TableId, count: usize) -> ApiResult<BulkInsertReport> {
        validate_bulk_count(count)?;
        self.load_table(table)?;
        let fields = self.fields_for(table)?;
        if fields.is_empty() {
            return Err(ApiError::not_found("table has no fields"));
        }

        let existing = self.count_records(table)?;
        let mut faker = RecordFaker::new((table.get() as u64) ^ (existing as u64));
        let created_at = now_timestamp()?;
        let batches = batch_count(count);
        let mut inserted = 0;

        for batch in 0..batches {
            let size = BULK_BATCH_SIZE.min(count - inserted);
            let rows: Vec<RecordValues> = (0..size)
                .map(|index| faker.record_values(&fields, existing + inserted + index + 1))
                .collect();
            if let Err(error) = self.insert_bulk_batch(table, &rows, &created_at) {
                log::error!(
                    "bulk insert into table {table} failed at batch {}: {error:#}",
                    batch + 1
                );
                return Err(ApiError::internal(format!(
                    "bulk insert stopped after {inserted} of {count} records: {error:#}"
                )));
            }
            inserted += size;
            log::debug!(
                "bulk insert table={table} batch={}/{batches} rows={inserted}",
                batch + 1
            );
        }

        let message = format!("inserted {inserted} records in {batches} batches");
        log::info!("table {table}: {message}");
        Ok(BulkInsertReport {
            count: inserted,
            batches,
            message,
        })
    }

    fn add_due_date_field(&self, table: TableId) -> ApiResult<Field> {
        self.load_table(table)?;
        let existing = self.fields_for(table)?.into_iter().find(|field| {
            field.field_type == FieldType::Date
                && field.name.eq_ignore_ascii_case(DUE_DATE_FIELD_NAME)
        });
        if let Some(field) = existing {
            return Ok(field);
        }
        self.create_field(
            table,
            NewField {
                name: DUE_DATE_FIELD_NAME.to_owned(),
                field_type: FieldType::Date,
                options: None,
            },
        )
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("GRIDBASE_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set GRIDBASE_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("gridbase.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn insert_field(
    conn: &Connection,
    table: TableId,
    name: &str,
    field_type: FieldType,
    order_index: i64,
    config: &FieldConfig,
    created_at: &str,
) -> Result<Field> {
    let config_json = serde_json::to_string(config).context("encode field config")?;
    conn.execute(
        "
        INSERT INTO table_fields (table_id, name, field_type, order_index, config, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
        params![
            table.get(),
            name,
            field_type.as_str(),
            order_index,
            config_json,
            created_at
        ],
    )
    .with_context(|| format!("insert field {name:?}"))?;

    Ok(Field {
        id: FieldId::new(conn.last_insert_rowid()),
        table_id: table,
        name: name.to_owned(),
        field_type,
        order_index,
        config: config.clone(),
        created_at: parse_datetime(created_at)?,
    })
}

fn load_fields(conn: &Connection, table: TableId) -> Result<Vec<Field>> {
    let mut stmt = conn
        .prepare(&format!(
            "
            SELECT {FIELD_COLUMNS}
            FROM table_fields
            WHERE table_id = ?
            ORDER BY order_index ASC, created_at ASC, id ASC
            "
        ))
        .context("prepare fields query")?;
    let rows = stmt
        .query_map(params![table.get()], map_field)
        .context("query fields")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("collect fields of table {table}"))
}

fn map_base(row: &Row<'_>) -> rusqlite::Result<Base> {
    let created_at_raw: String = row.get(4)?;
    Ok(Base {
        id: BaseId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
    })
}

fn map_table(row: &Row<'_>) -> rusqlite::Result<Table> {
    let view_type_raw: String = row.get(6)?;
    let view_type = ViewType::parse(&view_type_raw).ok_or_else(|| {
        invalid_column(6, format!("unknown view type {view_type_raw}"))
    })?;
    let created_at_raw: String = row.get(7)?;
    Ok(Table {
        id: TableId::new(row.get(0)?),
        base_id: BaseId::new(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        color: row.get(5)?,
        view_type,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
    })
}

fn map_field(row: &Row<'_>) -> rusqlite::Result<Field> {
    let type_raw: String = row.get(3)?;
    let field_type = FieldType::parse(&type_raw)
        .ok_or_else(|| invalid_column(3, format!("unknown field type {type_raw}")))?;
    let config_raw: String = row.get(5)?;
    let config: FieldConfig = serde_json::from_str(&config_raw)
        .map_err(|error| invalid_column(5, format!("invalid field config: {error}")))?;
    let created_at_raw: String = row.get(6)?;
    Ok(Field {
        id: FieldId::new(row.get(0)?),
        table_id: TableId::new(row.get(1)?),
        name: row.get(2)?,
        field_type,
        order_index: row.get(4)?,
        config,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
    })
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let data_raw: String = row.get(2)?;
    let created_at_raw: String = row.get(3)?;
    Ok(Record {
        id: RecordId::new(row.get(0)?),
        table_id: TableId::new(row.get(1)?),
        values: decode_values(&data_raw).map_err(to_sql_error)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
    })
}

/// Record values are a JSON object keyed by field id.
fn encode_values(values: &RecordValues) -> Result<String> {
    let object: serde_json::Map<String, serde_json::Value> = values
        .iter()
        .map(|(field, value)| (field.as_key(), value.to_json()))
        .collect();
    serde_json::to_string(&object).context("encode record values")
}

fn decode_values(raw: &str) -> Result<RecordValues> {
    let parsed: serde_json::Value =
        serde_json::from_str(raw).context("decode record values")?;
    let serde_json::Value::Object(object) = parsed else {
        bail!("record values must be a JSON object, got {raw:?}");
    };
    Ok(object
        .iter()
        .filter_map(|(key, value)| {
            FieldId::parse_key(key).map(|field| (field, CellValue::from_json(value)))
        })
        .collect())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a gridbase database or pick another path"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

/// Fixed-width UTC timestamp; lexical order matches chronological order.
fn now_timestamp() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .context("format current timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn invalid_column(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    )
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    invalid_column(0, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::{decode_values, encode_values, now_timestamp, parse_datetime};
    use anyhow::Result;
    use gridbase_app::{CellValue, FieldId, RecordValues};

    #[test]
    fn timestamps_are_fixed_width_and_parse_back() -> Result<()> {
        let stamp = now_timestamp()?;
        assert_eq!(stamp.len(), "2026-01-01T00:00:00.000000Z".len());
        parse_datetime(&stamp)?;
        parse_datetime("2026-01-01 08:30:00")?;
        assert!(parse_datetime("yesterday").is_err());
        Ok(())
    }

    #[test]
    fn record_values_use_field_id_keys() -> Result<()> {
        let mut values = RecordValues::new();
        values.insert(FieldId::new(3), CellValue::text("Kickoff"));
        values.insert(FieldId::new(12), CellValue::Bool(true));
        values.insert(FieldId::new(15), CellValue::Null);

        let encoded = encode_values(&values)?;
        assert_eq!(encoded, r#"{"12":true,"15":null,"3":"Kickoff"}"#);
        assert_eq!(decode_values(&encoded)?, values);
        Ok(())
    }

    #[test]
    fn decoding_is_lenient_about_foreign_keys_and_numbers() -> Result<()> {
        let values = decode_values(r#"{"4":17,"legacy":"x"}"#)?;
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&FieldId::new(4)), Some(&CellValue::text("17")));
        assert!(decode_values("[1,2]").is_err());
        Ok(())
    }
}
