// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Optimistic mutation protocol.
//!
//! A mutation goes through three phases:
//! 1. [`MutationLedger::stage`] applies the optimistic cache change, keeps the
//!    snapshot it produced and returns the request to send.
//! 2. [`MutationLedger::resolve`] confirms or rolls back once the reply lands.
//! 3. Either way the table is settled; the [`Reconcile`] in the resolution
//!    carries the reload tickets the runtime must execute.
//!
//! Two mutations of the same record each settle; whichever reload finishes
//! last wins.

use std::collections::BTreeMap;

use crate::api::NewField;
use crate::cache::{CacheSnapshot, FetchTicket, RecordCache, StructureTicket};
use crate::error::{ApiError, ApiResult};
use crate::ids::{FieldId, RecordId, TableId};
use crate::model::{CellValue, RecordValues};
use crate::remote::RemoteRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

impl MutationId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    UpdateValue {
        record: RecordId,
        field: FieldId,
        value: CellValue,
    },
    DeleteRecords {
        records: Vec<RecordId>,
    },
    DeleteField {
        field: FieldId,
    },
    CreateRecord {
        values: RecordValues,
    },
    CreateField {
        input: NewField,
    },
    BulkCreate {
        count: usize,
    },
    AddDueDateField,
}

impl MutationKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UpdateValue { .. } => "update value",
            Self::DeleteRecords { .. } => "delete records",
            Self::DeleteField { .. } => "delete field",
            Self::CreateRecord { .. } => "create record",
            Self::CreateField { .. } => "create field",
            Self::BulkCreate { .. } => "bulk create",
            Self::AddDueDateField => "add due date field",
        }
    }

    /// Whether the table's field list changes, requiring a structure reload.
    pub const fn changes_structure(&self) -> bool {
        matches!(
            self,
            Self::DeleteField { .. } | Self::CreateField { .. } | Self::AddDueDateField
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reconcile {
    pub page: Option<FetchTicket>,
    pub structure: Option<StructureTicket>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed {
        table: TableId,
        message: String,
        reconcile: Reconcile,
    },
    RolledBack {
        table: TableId,
        error: ApiError,
        restored: bool,
        reconcile: Reconcile,
    },
}

impl Resolution {
    pub fn reconcile(&self) -> Reconcile {
        match self {
            Self::Confirmed { reconcile, .. } | Self::RolledBack { reconcile, .. } => *reconcile,
        }
    }

    pub fn table(&self) -> TableId {
        match self {
            Self::Confirmed { table, .. } | Self::RolledBack { table, .. } => *table,
        }
    }

    pub fn status_message(&self) -> String {
        match self {
            Self::Confirmed { message, .. } => message.clone(),
            Self::RolledBack { error, .. } => format!("change reverted: {error}"),
        }
    }
}

#[derive(Debug)]
struct PendingMutation {
    table: TableId,
    label: &'static str,
    changes_structure: bool,
    snapshot: Option<CacheSnapshot>,
}

#[derive(Debug, Default)]
pub struct MutationLedger {
    next_id: u64,
    pending: BTreeMap<MutationId, PendingMutation>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: MutationId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Apply the optimistic change for `kind` and return the request that
    /// carries it to the service. Creation kinds are not optimistic.
    pub fn stage(
        &mut self,
        cache: &mut RecordCache,
        table: TableId,
        kind: MutationKind,
    ) -> RemoteRequest {
        self.next_id += 1;
        let id = MutationId(self.next_id);

        let snapshot = match &kind {
            MutationKind::UpdateValue {
                record,
                field,
                value,
            } => Some(cache.patch_value(table, *record, *field, value.clone())),
            MutationKind::DeleteRecords { records } => Some(cache.remove_records(table, records)),
            MutationKind::DeleteField { field } => Some(cache.strip_field(table, *field)),
            MutationKind::CreateRecord { .. }
            | MutationKind::CreateField { .. }
            | MutationKind::BulkCreate { .. }
            | MutationKind::AddDueDateField => None,
        };

        log::debug!(
            "staged mutation id={} kind={} table={} touched={}",
            id.get(),
            kind.label(),
            table,
            snapshot.as_ref().map_or(0, CacheSnapshot::touched)
        );

        self.pending.insert(
            id,
            PendingMutation {
                table,
                label: kind.label(),
                changes_structure: kind.changes_structure(),
                snapshot,
            },
        );
        RemoteRequest::Mutate { id, table, kind }
    }

    /// Finish a mutation. Returns `None` for ids this ledger does not know.
    pub fn resolve(
        &mut self,
        cache: &mut RecordCache,
        id: MutationId,
        result: ApiResult<String>,
    ) -> Option<Resolution> {
        let pending = self.pending.remove(&id)?;
        let table = pending.table;

        match result {
            Ok(message) => {
                log::debug!("confirmed mutation id={} kind={}", id.get(), pending.label);
                Some(Resolution::Confirmed {
                    table,
                    message,
                    reconcile: reconcile(cache, table, pending.changes_structure),
                })
            }
            Err(error) => {
                log::warn!(
                    "mutation id={} kind={} failed on table {}: {}",
                    id.get(),
                    pending.label,
                    table,
                    error
                );
                let restored = pending
                    .snapshot
                    .is_some_and(|snapshot| cache.rollback(snapshot));
                Some(Resolution::RolledBack {
                    table,
                    error,
                    restored,
                    reconcile: reconcile(cache, table, pending.changes_structure),
                })
            }
        }
    }
}

fn reconcile(cache: &mut RecordCache, table: TableId, changes_structure: bool) -> Reconcile {
    if !cache.contains(table) {
        return Reconcile::default();
    }
    Reconcile {
        page: cache.settle(table),
        structure: changes_structure.then(|| cache.begin_structure_load(table)),
    }
}

#[cfg(test)]
mod tests {
    use super::{MutationKind, MutationLedger, Resolution};
    use crate::api::{PageQuery, RecordPage};
    use crate::cache::RecordCache;
    use crate::error::ApiError;
    use crate::ids::{FieldId, RecordId, TableId};
    use crate::model::{CellValue, Record, RecordValues};
    use crate::remote::RemoteRequest;
    use time::OffsetDateTime;

    const TABLE: TableId = TableId::new(3);
    const FIELD: FieldId = FieldId::new(9);
    const RECORD: RecordId = RecordId::new(1);

    fn loaded_cache(value: &str) -> RecordCache {
        let mut cache = RecordCache::new(10);
        let ticket = cache.begin_fetch(TABLE).expect("fetch");
        let mut values = RecordValues::new();
        values.insert(FIELD, CellValue::text(value));
        let record = Record {
            id: RECORD,
            table_id: TABLE,
            values,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        cache.apply_page(
            ticket,
            RecordPage::from_fetch(vec![record], ticket.query, 1),
        );
        cache
    }

    fn cached_value(cache: &RecordCache) -> Option<CellValue> {
        cache.find(TABLE, RECORD).map(|r| r.value(FIELD).clone())
    }

    fn update(value: &str) -> MutationKind {
        MutationKind::UpdateValue {
            record: RECORD,
            field: FIELD,
            value: CellValue::text(value),
        }
    }

    #[test]
    fn staged_value_is_visible_before_reply() {
        let mut cache = loaded_cache("before");
        let mut ledger = MutationLedger::new();
        let request = ledger.stage(&mut cache, TABLE, update("after"));

        assert!(matches!(request, RemoteRequest::Mutate { table: TABLE, .. }));
        assert_eq!(cached_value(&cache), Some(CellValue::text("after")));
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn failure_rolls_back_then_settles() {
        let mut cache = loaded_cache("before");
        let mut ledger = MutationLedger::new();
        let RemoteRequest::Mutate { id, .. } = ledger.stage(&mut cache, TABLE, update("after"))
        else {
            panic!("mutation request expected");
        };

        let resolution = ledger
            .resolve(&mut cache, id, Err(ApiError::internal("boom")))
            .expect("known mutation");
        assert!(matches!(
            resolution,
            Resolution::RolledBack { restored: true, .. }
        ));
        assert_eq!(cached_value(&cache), Some(CellValue::text("before")));

        // The settle reload replaces the rollback with the server's value.
        let reload = resolution.reconcile().page.expect("reload ticket");
        let mut values = RecordValues::new();
        values.insert(FIELD, CellValue::text("server"));
        let server = Record {
            id: RECORD,
            table_id: TABLE,
            values,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        cache.apply_page(
            reload,
            RecordPage::from_fetch(vec![server], PageQuery::first(10), 1),
        );
        assert_eq!(cached_value(&cache), Some(CellValue::text("server")));
        assert!(!ledger.is_pending(id));
    }

    #[test]
    fn success_settles_without_rollback() {
        let mut cache = loaded_cache("before");
        let mut ledger = MutationLedger::new();
        let RemoteRequest::Mutate { id, .. } = ledger.stage(&mut cache, TABLE, update("after"))
        else {
            panic!("mutation request expected");
        };

        let resolution = ledger
            .resolve(&mut cache, id, Ok("saved".to_owned()))
            .expect("known mutation");
        assert_eq!(resolution.status_message(), "saved");
        assert!(resolution.reconcile().page.is_some());
        assert!(resolution.reconcile().structure.is_none());
        assert_eq!(cached_value(&cache), Some(CellValue::text("after")));
    }

    #[test]
    fn field_mutations_reload_structure() {
        let mut cache = loaded_cache("before");
        let mut ledger = MutationLedger::new();
        let RemoteRequest::Mutate { id, .. } =
            ledger.stage(&mut cache, TABLE, MutationKind::DeleteField { field: FIELD })
        else {
            panic!("mutation request expected");
        };
        assert_eq!(cached_value(&cache), Some(CellValue::Null));

        let resolution = ledger
            .resolve(&mut cache, id, Ok("field deleted".to_owned()))
            .expect("known mutation");
        assert!(resolution.reconcile().structure.is_some());
    }

    #[test]
    fn unknown_or_forgotten_mutations() {
        let mut cache = loaded_cache("before");
        let mut ledger = MutationLedger::new();
        let RemoteRequest::Mutate { id, .. } = ledger.stage(&mut cache, TABLE, update("after"))
        else {
            panic!("mutation request expected");
        };
        cache.forget(TABLE);

        let resolution = ledger
            .resolve(&mut cache, id, Err(ApiError::not_found("record 1")))
            .expect("known mutation");
        assert!(matches!(
            resolution,
            Resolution::RolledBack { restored: false, .. }
        ));
        assert_eq!(resolution.reconcile().page, None);
        assert!(ledger.resolve(&mut cache, id, Ok(String::new())).is_none());
    }
}
