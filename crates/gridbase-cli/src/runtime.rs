// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use gridbase_app::{
    Base, BaseDetail, BaseId, NewBase, NewTable, RecordService, RemoteReply, RemoteRequest,
    TableDetail, TableId, TableSummary,
};
use gridbase_db::Store;

/// Runs every UI request against the store on the UI thread.
pub struct DbRuntime<'a> {
    store: &'a Store,
}

impl<'a> DbRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }
}

impl gridbase_tui::AppRuntime for DbRuntime<'_> {
    fn list_bases(&mut self) -> Result<Vec<BaseDetail>> {
        self.store.list_bases().context("list bases")
    }

    fn list_tables(&mut self, base: BaseId) -> Result<Vec<TableSummary>> {
        self.store
            .list_tables(base)
            .with_context(|| format!("list tables of base {base}"))
    }

    fn create_base(&mut self, input: NewBase) -> Result<Base> {
        Ok(self.store.create_base(input)?)
    }

    fn create_table(&mut self, base: BaseId, input: NewTable) -> Result<TableDetail> {
        Ok(self.store.create_table(base, input)?)
    }

    fn delete_base(&mut self, base: BaseId) -> Result<()> {
        Ok(self.store.delete_base(base)?)
    }

    fn delete_table(&mut self, table: TableId) -> Result<()> {
        Ok(self.store.delete_table(table)?)
    }

    fn execute_remote(&mut self, request: RemoteRequest) -> RemoteReply {
        gridbase_app::execute(self.store, request)
    }
}

#[cfg(test)]
mod tests {
    use super::DbRuntime;
    use anyhow::{Result, anyhow};
    use gridbase_app::{
        CellValue, MutationKind, MutationLedger, NewBase, NewTable, PageQuery, RecordCache,
        RecordService, RemoteReply, RemoteRequest,
    };
    use gridbase_db::Store;
    use gridbase_tui::{AppRuntime, InternalEvent};
    use std::sync::mpsc;

    fn store() -> Result<Store> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        Ok(store)
    }

    #[test]
    fn created_table_shows_up_with_sample_rows() -> Result<()> {
        let store = store()?;
        let mut runtime = DbRuntime::new(&store);

        let base = runtime.create_base(NewBase {
            name: "Ops".to_owned(),
            ..NewBase::default()
        })?;
        let detail = runtime.create_table(
            base.id,
            NewTable {
                name: "Incidents".to_owned(),
                ..NewTable::default()
            },
        )?;

        let tables = runtime.list_tables(base.id)?;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table.id, detail.table.id);
        assert_eq!(tables[0].record_count, 3);
        assert_eq!(runtime.list_bases()?[0].tables.len(), 1);
        Ok(())
    }

    #[test]
    fn fetch_page_runs_against_the_store() -> Result<()> {
        let store = store()?;
        let mut runtime = DbRuntime::new(&store);
        let base = runtime.create_base(NewBase {
            name: "Ops".to_owned(),
            ..NewBase::default()
        })?;
        let detail = runtime.create_table(
            base.id,
            NewTable {
                name: "Incidents".to_owned(),
                ..NewTable::default()
            },
        )?;

        let mut cache = RecordCache::new(2);
        let ticket = cache
            .begin_fetch(detail.table.id)
            .ok_or_else(|| anyhow!("first fetch should be allowed"))?;
        let RemoteReply::Page { result, .. } =
            runtime.execute_remote(RemoteRequest::FetchPage(ticket))
        else {
            return Err(anyhow!("expected a page reply"));
        };
        let page = result?;
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_count, 3);
        assert!(page.has_more);
        Ok(())
    }

    #[test]
    fn spawned_requests_reply_on_the_channel() -> Result<()> {
        let store = store()?;
        let mut runtime = DbRuntime::new(&store);
        let base = runtime.create_base(NewBase {
            name: "Ops".to_owned(),
            ..NewBase::default()
        })?;
        let detail = runtime.create_table(
            base.id,
            NewTable {
                name: "Incidents".to_owned(),
                ..NewTable::default()
            },
        )?;

        let mut cache = RecordCache::default();
        let ticket = cache.begin_structure_load(detail.table.id);
        let (tx, rx) = mpsc::channel();
        runtime.spawn_remote(RemoteRequest::LoadStructure(ticket), tx)?;

        match rx.try_recv()? {
            InternalEvent::Remote(RemoteReply::Structure { result, .. }) => {
                assert_eq!(result?.fields.len(), 3);
            }
            other => return Err(anyhow!("unexpected event {other:?}")),
        }
        Ok(())
    }

    #[test]
    fn staged_update_is_saved_to_the_store() -> Result<()> {
        let store = store()?;
        let mut runtime = DbRuntime::new(&store);
        let base = runtime.create_base(NewBase {
            name: "Ops".to_owned(),
            ..NewBase::default()
        })?;
        let detail = runtime.create_table(
            base.id,
            NewTable {
                name: "Incidents".to_owned(),
                ..NewTable::default()
            },
        )?;
        let table = detail.table.id;
        let primary = detail
            .primary_field()
            .map(|field| field.id)
            .ok_or_else(|| anyhow!("new tables have a primary field"))?;

        let mut cache = RecordCache::default();
        let ticket = cache
            .begin_fetch(table)
            .ok_or_else(|| anyhow!("first fetch should be allowed"))?;
        if let RemoteReply::Page { ticket, result } =
            runtime.execute_remote(RemoteRequest::FetchPage(ticket))
        {
            cache.apply_page(ticket, result?);
        }
        let record = cache
            .record_at(table, 0)
            .map(|record| record.id)
            .ok_or_else(|| anyhow!("sample rows should be cached"))?;

        let mut ledger = MutationLedger::new();
        let request = ledger.stage(
            &mut cache,
            table,
            MutationKind::UpdateValue {
                record,
                field: primary,
                value: CellValue::text("Pager storm"),
            },
        );
        let RemoteReply::Mutation { id, result } = runtime.execute_remote(request) else {
            return Err(anyhow!("expected a mutation reply"));
        };
        assert_eq!(result.clone()?, "saved");
        assert!(ledger.resolve(&mut cache, id, result).is_some());

        let stored = store.get_records_page(table, PageQuery::first(50))?;
        assert_eq!(
            stored.records[0].value(primary),
            &CellValue::text("Pager storm")
        );
        Ok(())
    }

    #[test]
    fn deleting_a_base_removes_it() -> Result<()> {
        let store = store()?;
        let mut runtime = DbRuntime::new(&store);
        let base = runtime.create_base(NewBase {
            name: "Scratch".to_owned(),
            ..NewBase::default()
        })?;

        runtime.delete_base(base.id)?;
        assert!(runtime.list_bases()?.is_empty());
        assert!(runtime.delete_base(base.id).is_err());
        Ok(())
    }
}
