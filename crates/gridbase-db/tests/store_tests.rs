// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use gridbase_app::{
    ApiError, BasePatch, CellValue, FieldId, FieldType, NewBase, NewField, NewTable, PageQuery,
    RecordId, RecordService, RecordValues, TableDetail,
};
use gridbase_db::{Store, validate_db_path};
use gridbase_testkit::temp_db_path;

fn open_store() -> Result<Store> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    Ok(store)
}

fn new_table(store: &Store, name: &str) -> Result<TableDetail> {
    let base = store.create_base(NewBase {
        name: format!("{name} base"),
        ..NewBase::default()
    })?;
    Ok(store.create_table(
        base.id,
        NewTable {
            name: name.to_owned(),
            ..NewTable::default()
        },
    )?)
}

fn field_id(detail: &TableDetail, name: &str) -> FieldId {
    detail
        .fields
        .iter()
        .find(|field| field.name == name)
        .map(|field| field.id)
        .expect("field exists")
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("/tmp/gridbase.db").is_ok());
    assert!(validate_db_path(":memory:").is_ok());
}

#[test]
fn bootstrap_is_idempotent() -> Result<()> {
    let store = open_store()?;
    store.bootstrap()?;
    assert!(store.list_bases()?.is_empty());
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = open_store()?;
    store.raw_connection().execute_batch(
        "
        ALTER TABLE table_records RENAME TO table_records_old;
        CREATE TABLE table_records (
          id INTEGER PRIMARY KEY,
          table_id INTEGER NOT NULL,
          created_at TEXT NOT NULL
        );
        DROP TABLE table_records_old;
        ",
    )?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    let message = err.to_string();
    assert!(message.contains("table `table_records` is missing required columns"));
    assert!(message.contains("data"));
    Ok(())
}

#[test]
fn store_persists_across_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        new_table(&store, "Tasks")?;
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    let bases = store.list_bases()?;
    assert_eq!(bases.len(), 1);
    assert_eq!(bases[0].tables.len(), 1);
    assert_eq!(bases[0].tables[0].record_count, 3);
    Ok(())
}

#[test]
fn create_table_adds_default_fields_and_sample_records() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;

    let names: Vec<&str> = detail.fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(names, vec!["Name", "Status", "Notes"]);
    let orders: Vec<i64> = detail.fields.iter().map(|field| field.order_index).collect();
    assert_eq!(orders, vec![0, 1, 2]);
    assert_eq!(detail.fields[0].field_type, FieldType::ShortText);
    assert!(detail.fields[0].is_primary());
    assert!(!detail.fields[1].is_primary());

    let status_labels: Vec<String> = detail.fields[1]
        .configured_options()
        .unwrap_or_default()
        .iter()
        .map(|option| option.label.clone())
        .collect();
    assert_eq!(status_labels, vec!["Backlog", "In Progress", "Complete"]);
    assert_eq!(detail.table.icon, "📋");
    assert_eq!(detail.table.color, "#38bdf8");

    let page = store.get_records_page(detail.table.id, PageQuery::first(50))?;
    assert_eq!(page.total_count, 3);
    assert!(!page.has_more);
    assert_eq!(page.next_offset, None);
    let name = field_id(&detail, "Name");
    let titles: Vec<Option<&str>> = page
        .records
        .iter()
        .map(|record| record.value(name).as_text())
        .collect();
    assert_eq!(
        titles,
        vec![
            Some("Kickoff meeting"),
            Some("Design review"),
            Some("Launch prep")
        ]
    );
    Ok(())
}

#[test]
fn missing_entities_are_not_found() -> Result<()> {
    let store = open_store()?;
    let missing_base = gridbase_app::BaseId::new(404);
    let missing_table = gridbase_app::TableId::new(404);

    assert!(matches!(store.get_base(missing_base), Err(ApiError::NotFound(_))));
    assert!(matches!(
        store.get_table(missing_table),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        store.get_records_page(missing_table, PageQuery::first(10)),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        store.create_table(missing_base, NewTable {
            name: "Orphan".to_owned(),
            ..NewTable::default()
        }),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        store.create_base(NewBase::default()),
        Err(ApiError::BadRequest(_))
    ));
    Ok(())
}

#[test]
fn bases_list_newest_first_and_update_partially() -> Result<()> {
    let store = open_store()?;
    let first = store.create_base(NewBase {
        name: "First".to_owned(),
        description: Some("keep me".to_owned()),
        color: Some("#abc".to_owned()),
    })?;
    let second = store.create_base(NewBase {
        name: "Second".to_owned(),
        ..NewBase::default()
    })?;
    assert_eq!(first.color, "#aabbcc");
    assert_eq!(second.color, "#2563eb");

    let bases = store.list_bases()?;
    let ids: Vec<_> = bases.iter().map(|detail| detail.base.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let renamed = store.update_base(
        first.id,
        BasePatch {
            name: Some("Renamed".to_owned()),
            ..BasePatch::default()
        },
    )?;
    assert_eq!(renamed.name, "Renamed");
    assert_eq!(renamed.description.as_deref(), Some("keep me"));
    assert_eq!(renamed.color, "#aabbcc");

    let cleared = store.update_base(
        first.id,
        BasePatch {
            description: Some(None),
            ..BasePatch::default()
        },
    )?;
    assert_eq!(cleared.description, None);
    assert!(matches!(
        store.update_base(
            first.id,
            BasePatch {
                name: Some("  ".to_owned()),
                ..BasePatch::default()
            }
        ),
        Err(ApiError::BadRequest(_))
    ));
    Ok(())
}

#[test]
fn deleting_a_base_cascades_to_tables_and_records() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let base = detail.table.base_id;

    store.delete_base(base)?;
    assert!(matches!(
        store.get_table(detail.table.id),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(store.delete_base(base), Err(ApiError::NotFound(_))));

    let orphans: i64 = store.raw_connection().query_row(
        "SELECT COUNT(*) FROM table_records",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(orphans, 0);
    Ok(())
}

#[test]
fn record_pages_follow_insertion_order() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let table = detail.table.id;
    store.create_bulk_records(table, 120)?;

    let first = store.get_records_page(table, PageQuery::first(50))?;
    assert_eq!(first.records.len(), 50);
    assert_eq!(first.total_count, 123);
    assert!(first.has_more);
    assert_eq!(first.next_offset, Some(50));

    let mut query = PageQuery::first(50);
    let mut ids: Vec<RecordId> = Vec::new();
    loop {
        let page = store.get_records_page(table, query)?;
        if query.offset > 0 {
            assert_eq!(page.total_count, 0);
        }
        ids.extend(page.records.iter().map(|record| record.id));
        match page.next_offset {
            Some(_) => query = query.next(page.records.len()),
            None => break,
        }
    }
    assert_eq!(ids.len(), 123);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let again = store.get_records_page(table, PageQuery::first(50))?;
    assert_eq!(again.records, first.records);
    Ok(())
}

#[test]
fn page_limit_is_clamped() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    store.create_bulk_records(detail.table.id, 200)?;

    let wide = store.get_records_page(
        detail.table.id,
        PageQuery {
            limit: 500,
            offset: 0,
        },
    )?;
    assert_eq!(wide.records.len(), 100);

    let narrow = store.get_records_page(
        detail.table.id,
        PageQuery {
            limit: 0,
            offset: 0,
        },
    )?;
    assert_eq!(narrow.records.len(), 1);
    assert!(narrow.has_more);
    Ok(())
}

#[test]
fn create_record_drops_unknown_keys() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let name = field_id(&detail, "Name");

    let mut values = RecordValues::new();
    values.insert(name, CellValue::text("Write changelog"));
    values.insert(FieldId::new(9_999), CellValue::text("stray"));
    let record = store.create_record(detail.table.id, values)?;
    assert_eq!(record.values.len(), 1);
    assert_eq!(record.value(name).as_text(), Some("Write changelog"));

    let mut only_unknown = RecordValues::new();
    only_unknown.insert(FieldId::new(9_999), CellValue::text("stray"));
    assert!(matches!(
        store.create_record(detail.table.id, only_unknown),
        Err(ApiError::BadRequest(_))
    ));
    Ok(())
}

#[test]
fn create_record_rejected_when_table_has_no_fields() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    for field in &detail.fields {
        store.delete_field(field.id)?;
    }
    assert!(!store.get_table(detail.table.id)?.has_fields());

    let mut values = RecordValues::new();
    values.insert(detail.fields[0].id, CellValue::text("x"));
    assert!(matches!(
        store.create_record(detail.table.id, values),
        Err(ApiError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn update_record_field_validates_ownership_and_value() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let other = new_table(&store, "Bugs")?;
    let due = store.add_due_date_field(detail.table.id)?;
    let record = store
        .get_records_page(detail.table.id, PageQuery::first(1))?
        .records
        .remove(0);

    let updated = store.update_record_field(record.id, due.id, CellValue::text("2026-03-14"))?;
    assert_eq!(updated.value(due.id).as_text(), Some("2026-03-14"));
    let reread = store.get_records_page(detail.table.id, PageQuery::first(1))?;
    assert_eq!(reread.records[0].value(due.id).as_text(), Some("2026-03-14"));

    assert!(matches!(
        store.update_record_field(record.id, due.id, CellValue::text("someday")),
        Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
        store.update_record_field(record.id, other.fields[0].id, CellValue::text("x")),
        Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
        store.update_record_field(RecordId::new(9_999), due.id, CellValue::Null),
        Err(ApiError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn delete_records_is_scoped_to_the_table() -> Result<()> {
    let store = open_store()?;
    let tasks = new_table(&store, "Tasks")?;
    let bugs = new_table(&store, "Bugs")?;
    let ids: Vec<RecordId> = store
        .get_records_page(tasks.table.id, PageQuery::first(10))?
        .records
        .iter()
        .map(|record| record.id)
        .collect();

    assert_eq!(store.delete_records(bugs.table.id, &ids)?, 0);
    assert_eq!(store.delete_records(tasks.table.id, &ids[..2])?, 2);
    assert_eq!(
        store
            .get_records_page(tasks.table.id, PageQuery::first(10))?
            .total_count,
        1
    );
    assert!(matches!(
        store.delete_records(tasks.table.id, &[]),
        Err(ApiError::BadRequest(_))
    ));
    Ok(())
}

#[test]
fn deleting_a_field_strips_its_values() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let status = field_id(&detail, "Status");

    store.delete_field(status)?;
    let fields = store.get_table(detail.table.id)?.fields;
    assert!(fields.iter().all(|field| field.id != status));

    let page = store.get_records_page(detail.table.id, PageQuery::first(10))?;
    assert!(
        page.records
            .iter()
            .all(|record| !record.values.contains_key(&status))
    );
    let raw_hits: i64 = store.raw_connection().query_row(
        "SELECT COUNT(*) FROM table_records WHERE json_type(data, ?) IS NOT NULL",
        [format!("$.\"{}\"", status.as_key())],
        |row| row.get(0),
    )?;
    assert_eq!(raw_hits, 0);
    assert!(matches!(store.delete_field(status), Err(ApiError::NotFound(_))));
    Ok(())
}

#[test]
fn new_fields_append_after_the_highest_order_index() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    store.delete_field(field_id(&detail, "Status"))?;

    let owner = store.create_field(
        detail.table.id,
        NewField {
            name: "Owner".to_owned(),
            field_type: FieldType::ShortText,
            options: None,
        },
    )?;
    assert_eq!(owner.order_index, 3);

    let flag = store.create_field(
        detail.table.id,
        NewField {
            name: "Flagged".to_owned(),
            field_type: FieldType::Checkbox,
            options: Some(Vec::new()),
        },
    )?;
    assert_eq!(flag.order_index, 4);
    assert_eq!(flag.config.options, None);

    let names: Vec<String> = store
        .get_table(detail.table.id)?
        .fields
        .into_iter()
        .map(|field| field.name)
        .collect();
    assert_eq!(names, vec!["Name", "Notes", "Owner", "Flagged"]);

    assert!(matches!(
        store.create_field(
            detail.table.id,
            NewField {
                name: " ".to_owned(),
                field_type: FieldType::Date,
                options: None,
            }
        ),
        Err(ApiError::BadRequest(_))
    ));
    Ok(())
}

#[test]
fn due_date_field_is_added_once() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;

    let first = store.add_due_date_field(detail.table.id)?;
    let second = store.add_due_date_field(detail.table.id)?;
    assert_eq!(first.id, second.id);
    assert_eq!(first.field_type, FieldType::Date);
    assert_eq!(store.get_table(detail.table.id)?.fields.len(), 4);
    Ok(())
}

#[test]
fn bulk_insert_of_the_maximum_runs_in_one_hundred_batches() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;

    let report = store.create_bulk_records(detail.table.id, 100_000)?;
    assert_eq!(report.count, 100_000);
    assert_eq!(report.batches, 100);
    assert!(report.message.contains("100000"));

    let page = store.get_records_page(detail.table.id, PageQuery::first(1))?;
    assert_eq!(page.total_count, 100_003);
    Ok(())
}

#[test]
fn bulk_insert_values_fit_their_fields() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    store.add_due_date_field(detail.table.id)?;
    let detail = store.get_table(detail.table.id)?;

    let report = store.create_bulk_records(detail.table.id, 1_500)?;
    assert_eq!(report.batches, 2);

    let page = store.get_records_page(
        detail.table.id,
        PageQuery {
            limit: 100,
            offset: 3,
        },
    )?;
    for record in &page.records {
        for field in &detail.fields {
            assert!(
                gridbase_app::field_kind::validate(field, record.value(field.id)).is_ok(),
                "{} = {:?}",
                field.name,
                record.value(field.id)
            );
        }
    }
    Ok(())
}

#[test]
fn bulk_insert_failure_keeps_committed_batches() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    let table = detail.table.id;
    store.raw_connection().execute_batch(
        "CREATE TRIGGER record_quota BEFORE INSERT ON table_records
         WHEN (SELECT COUNT(*) FROM table_records WHERE table_id = NEW.table_id) >= 1503
         BEGIN SELECT RAISE(ABORT, 'record quota reached'); END;",
    )?;

    let Err(ApiError::Internal(message)) = store.create_bulk_records(table, 5_000) else {
        anyhow::bail!("bulk insert past the quota should fail");
    };
    assert!(message.contains("after 1000 of 5000 records"), "{message}");

    let page = store.get_records_page(table, PageQuery::first(1))?;
    assert_eq!(page.total_count, 1_003);
    Ok(())
}

#[test]
fn bulk_insert_rejects_out_of_range_counts() -> Result<()> {
    let store = open_store()?;
    let detail = new_table(&store, "Tasks")?;
    for count in [0, 100_001] {
        assert!(matches!(
            store.create_bulk_records(detail.table.id, count),
            Err(ApiError::BadRequest(_))
        ));
    }
    Ok(())
}

#[test]
fn demo_data_populates_a_roadmap_base() -> Result<()> {
    let store = open_store()?;
    let base = store.seed_demo_data()?;

    let detail = store.get_base(base)?;
    assert_eq!(detail.base.name, "Product Roadmap");
    assert_eq!(detail.tables.len(), 1);
    assert!(detail.tables[0].record_count > 3);

    let table = store.get_table(detail.tables[0].table.id)?;
    assert!(table.fields.iter().any(|field| field.name == "Due Date"));
    Ok(())
}
