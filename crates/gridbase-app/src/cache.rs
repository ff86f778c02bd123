// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Per-table paginated record cache.
//!
//! Pages are kept in fetch order and never re-sorted; the flattened view is
//! their concatenation. Every entry carries a generation counter. Tickets
//! minted for a fetch remember the generation they were issued under, and a
//! reply whose generation no longer matches is dropped as stale.

use std::collections::HashMap;

use crate::api::{PageQuery, RecordPage, TableDetail, clamp_page_limit};
use crate::ids::{FieldId, RecordId, TableId};
use crate::model::{CellValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPurpose {
    Append,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub table: TableId,
    pub generation: u64,
    pub query: PageQuery,
    pub purpose: FetchPurpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureTicket {
    pub table: TableId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page landed. A multi-page reload hands back its next ticket.
    Applied { next: Option<FetchTicket> },
    Stale,
}

/// Pre-mutation copy of the records (and optionally the structure) an
/// optimistic mutation touched. Each mutation owns its snapshot, so rolling
/// one back never disturbs another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    table: TableId,
    epoch: u64,
    rows: Vec<SnapshotRow>,
    structure: Option<TableDetail>,
}

impl CacheSnapshot {
    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn touched(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotRow {
    page: usize,
    index: usize,
    record: Record,
}

#[derive(Debug)]
struct Reload {
    target: usize,
    staged: Vec<Vec<Record>>,
    staged_len: usize,
    total_count: Option<usize>,
}

#[derive(Debug)]
struct TableEntry {
    generation: u64,
    // Restamped whenever the page set is replaced wholesale.
    epoch: u64,
    // Restamped on any change to the cached rows or structure.
    revision: u64,
    pages: Vec<Vec<Record>>,
    has_more: bool,
    next_offset: usize,
    total_count: Option<usize>,
    in_flight: Option<FetchTicket>,
    reload: Option<Reload>,
    structure: Option<TableDetail>,
    structure_generation: u64,
}

impl TableEntry {
    fn new(stamp: u64) -> Self {
        Self {
            generation: stamp,
            epoch: stamp,
            revision: stamp,
            pages: Vec::new(),
            has_more: true,
            next_offset: 0,
            total_count: None,
            in_flight: None,
            reload: None,
            structure: None,
            structure_generation: stamp,
        }
    }

    fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

/// Generations and epochs are drawn from one cache-wide counter, so an entry
/// recreated after `forget` never matches a ticket or snapshot of the old one.
#[derive(Debug)]
pub struct RecordCache {
    page_limit: usize,
    stamps: u64,
    tables: HashMap<TableId, TableEntry>,
}

fn next_stamp(stamps: &mut u64) -> u64 {
    *stamps += 1;
    *stamps
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new(crate::api::DEFAULT_PAGE_LIMIT)
    }
}

impl RecordCache {
    pub fn new(page_limit: usize) -> Self {
        Self {
            page_limit: clamp_page_limit(Some(page_limit)),
            stamps: 0,
            tables: HashMap::new(),
        }
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub fn contains(&self, table: TableId) -> bool {
        self.tables.contains_key(&table)
    }

    /// Claim the next page for `table`. Returns `None` while another fetch or
    /// reload is outstanding, or once the end of data is known.
    pub fn begin_fetch(&mut self, table: TableId) -> Option<FetchTicket> {
        let limit = self.page_limit;
        let stamps = &mut self.stamps;
        let entry = self
            .tables
            .entry(table)
            .or_insert_with(|| TableEntry::new(next_stamp(stamps)));
        if entry.in_flight.is_some() || entry.reload.is_some() || !entry.has_more {
            return None;
        }

        let ticket = FetchTicket {
            table,
            generation: entry.generation,
            query: PageQuery::new(Some(limit), entry.next_offset),
            purpose: FetchPurpose::Append,
        };
        entry.in_flight = Some(ticket);
        log::debug!(
            "fetch table={} offset={} limit={}",
            table,
            ticket.query.offset,
            ticket.query.limit
        );
        Some(ticket)
    }

    pub fn apply_page(&mut self, ticket: FetchTicket, page: RecordPage) -> PageOutcome {
        let Some(entry) = self.tables.get_mut(&ticket.table) else {
            log::debug!("dropping page for forgotten table {}", ticket.table);
            return PageOutcome::Stale;
        };
        if entry.generation != ticket.generation || entry.in_flight != Some(ticket) {
            log::debug!(
                "dropping stale page table={} generation={} current={}",
                ticket.table,
                ticket.generation,
                entry.generation
            );
            return PageOutcome::Stale;
        }
        entry.in_flight = None;

        let returned = page.records.len();
        let next_offset = page
            .next_offset
            .unwrap_or(ticket.query.offset + returned);

        match ticket.purpose {
            FetchPurpose::Append => {
                if ticket.query.offset == 0 {
                    entry.total_count = Some(page.total_count);
                }
                if returned > 0 {
                    entry.pages.push(page.records);
                }
                entry.has_more = page.has_more;
                entry.next_offset = next_offset;
                entry.revision = next_stamp(&mut self.stamps);
                PageOutcome::Applied { next: None }
            }
            FetchPurpose::Reload => {
                let Some(reload) = entry.reload.as_mut() else {
                    return PageOutcome::Stale;
                };
                if ticket.query.offset == 0 {
                    reload.total_count = Some(page.total_count);
                }
                reload.staged_len += returned;
                if returned > 0 {
                    reload.staged.push(page.records);
                }

                if page.has_more && reload.staged_len < reload.target {
                    let next = FetchTicket {
                        query: ticket.query.next(returned),
                        ..ticket
                    };
                    entry.in_flight = Some(next);
                    return PageOutcome::Applied { next: Some(next) };
                }

                let Some(reload) = entry.reload.take() else {
                    return PageOutcome::Stale;
                };
                log::debug!(
                    "reload swapped table={} rows={}",
                    ticket.table,
                    reload.staged_len
                );
                entry.pages = reload.staged;
                entry.total_count = reload.total_count;
                entry.has_more = page.has_more;
                entry.next_offset = next_offset;
                entry.epoch = next_stamp(&mut self.stamps);
                entry.revision = entry.epoch;
                PageOutcome::Applied { next: None }
            }
        }
    }

    /// Release the in-flight claim after a failed fetch. A failed reload keeps
    /// the pages it was going to replace.
    pub fn fail_fetch(&mut self, ticket: FetchTicket) -> bool {
        let Some(entry) = self.tables.get_mut(&ticket.table) else {
            return false;
        };
        if entry.in_flight != Some(ticket) {
            return false;
        }
        entry.in_flight = None;
        if ticket.purpose == FetchPurpose::Reload {
            entry.reload = None;
        }
        true
    }

    /// Discard every cached page of `table`; the next read starts at offset 0.
    pub fn invalidate(&mut self, table: TableId) {
        if let Some(entry) = self.tables.get_mut(&table) {
            entry.generation = next_stamp(&mut self.stamps);
            entry.epoch = next_stamp(&mut self.stamps);
            entry.revision = entry.epoch;
            entry.pages.clear();
            entry.has_more = true;
            entry.next_offset = 0;
            entry.total_count = None;
            entry.in_flight = None;
            entry.reload = None;
        }
    }

    /// Drop `table` entirely. Replies still in flight for it are ignored.
    pub fn forget(&mut self, table: TableId) {
        if self.tables.remove(&table).is_some() {
            log::debug!("forgot table {table}");
        }
    }

    /// Changes whenever the cached rows or structure of `table` change. Zero
    /// for tables not in the cache.
    pub fn revision(&self, table: TableId) -> u64 {
        self.tables.get(&table).map_or(0, |entry| entry.revision)
    }

    pub fn len(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, TableEntry::len)
    }

    pub fn is_empty(&self, table: TableId) -> bool {
        self.len(table) == 0
    }

    pub fn page_count(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, |entry| entry.pages.len())
    }

    pub fn has_more(&self, table: TableId) -> bool {
        self.tables.get(&table).is_none_or(|entry| entry.has_more)
    }

    pub fn is_fetching(&self, table: TableId) -> bool {
        self.tables
            .get(&table)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn is_reloading(&self, table: TableId) -> bool {
        self.tables
            .get(&table)
            .is_some_and(|entry| entry.reload.is_some())
    }

    pub fn total_count(&self, table: TableId) -> Option<usize> {
        self.tables.get(&table).and_then(|entry| entry.total_count)
    }

    pub fn records(&self, table: TableId) -> impl Iterator<Item = &Record> {
        self.tables
            .get(&table)
            .into_iter()
            .flat_map(|entry| entry.pages.iter().flatten())
    }

    pub fn record_at(&self, table: TableId, index: usize) -> Option<&Record> {
        let entry = self.tables.get(&table)?;
        let mut remaining = index;
        for page in &entry.pages {
            if remaining < page.len() {
                return page.get(remaining);
            }
            remaining -= page.len();
        }
        None
    }

    pub fn find(&self, table: TableId, record: RecordId) -> Option<&Record> {
        self.records(table).find(|candidate| candidate.id == record)
    }

    /// Rewrite every cached record of `table` matching `predicate`. The
    /// transform returns `None` to remove the record.
    pub fn optimistic_mutate<P, T>(
        &mut self,
        table: TableId,
        mut predicate: P,
        mut transform: T,
    ) -> CacheSnapshot
    where
        P: FnMut(&Record) -> bool,
        T: FnMut(Record) -> Option<Record>,
    {
        let Some(entry) = self.tables.get_mut(&table) else {
            return CacheSnapshot {
                table,
                epoch: 0,
                rows: Vec::new(),
                structure: None,
            };
        };

        let mut rows = Vec::new();
        for (page_index, page) in entry.pages.iter_mut().enumerate() {
            let mut kept = Vec::with_capacity(page.len());
            for (index, record) in std::mem::take(page).into_iter().enumerate() {
                if !predicate(&record) {
                    kept.push(record);
                    continue;
                }
                rows.push(SnapshotRow {
                    page: page_index,
                    index,
                    record: record.clone(),
                });
                if let Some(next) = transform(record) {
                    kept.push(next);
                }
            }
            *page = kept;
        }
        entry.revision = next_stamp(&mut self.stamps);

        CacheSnapshot {
            table,
            epoch: entry.epoch,
            rows,
            structure: None,
        }
    }

    pub fn patch_value(
        &mut self,
        table: TableId,
        record: RecordId,
        field: FieldId,
        value: CellValue,
    ) -> CacheSnapshot {
        self.optimistic_mutate(
            table,
            |candidate| candidate.id == record,
            |mut candidate| {
                candidate.values.insert(field, value.clone());
                Some(candidate)
            },
        )
    }

    pub fn remove_records(&mut self, table: TableId, records: &[RecordId]) -> CacheSnapshot {
        self.optimistic_mutate(table, |candidate| records.contains(&candidate.id), |_| None)
    }

    /// Remove `field` from the cached structure and strip its key from every
    /// cached record.
    pub fn strip_field(&mut self, table: TableId, field: FieldId) -> CacheSnapshot {
        let previous = self.tables.get_mut(&table).and_then(|entry| {
            let structure = entry.structure.as_mut()?;
            let before = structure.clone();
            structure.fields.retain(|candidate| candidate.id != field);
            entry.structure_generation = next_stamp(&mut self.stamps);
            Some(before)
        });

        let mut snapshot = self.optimistic_mutate(
            table,
            |candidate| candidate.values.contains_key(&field),
            |mut candidate| {
                candidate.values.remove(&field);
                Some(candidate)
            },
        );
        snapshot.structure = previous;
        snapshot
    }

    /// Put back what `snapshot` captured. Record rows are skipped when the
    /// page set was replaced since the snapshot was taken; the replacement
    /// already came from the server.
    pub fn rollback(&mut self, snapshot: CacheSnapshot) -> bool {
        let Some(entry) = self.tables.get_mut(&snapshot.table) else {
            return false;
        };

        if let Some(structure) = snapshot.structure {
            entry.structure = Some(structure);
            entry.structure_generation = next_stamp(&mut self.stamps);
            entry.revision = entry.structure_generation;
        }

        if entry.epoch != snapshot.epoch {
            log::debug!(
                "rollback skipped rows for table={}; pages were replaced",
                snapshot.table
            );
            return false;
        }

        for row in snapshot.rows {
            while entry.pages.len() <= row.page {
                entry.pages.push(Vec::new());
            }
            let page = &mut entry.pages[row.page];
            if let Some(slot) = page.iter_mut().find(|record| record.id == row.record.id) {
                *slot = row.record;
            } else {
                let index = row.index.min(page.len());
                page.insert(index, row.record);
            }
        }
        entry.revision = next_stamp(&mut self.stamps);
        true
    }

    /// Start an authoritative reload of the span currently loaded. Pages are
    /// staged and swapped in once the span is covered, so readers keep seeing
    /// the old rows until then.
    pub fn settle(&mut self, table: TableId) -> Option<FetchTicket> {
        let limit = self.page_limit;
        let entry = self.tables.get_mut(&table)?;

        entry.generation = next_stamp(&mut self.stamps);
        let target = entry.len().max(limit);
        entry.reload = Some(Reload {
            target,
            staged: Vec::new(),
            staged_len: 0,
            total_count: None,
        });

        let ticket = FetchTicket {
            table,
            generation: entry.generation,
            query: PageQuery::first(limit),
            purpose: FetchPurpose::Reload,
        };
        entry.in_flight = Some(ticket);
        log::debug!("settle table={table} target={target}");
        Some(ticket)
    }

    pub fn begin_structure_load(&mut self, table: TableId) -> StructureTicket {
        let stamps = &mut self.stamps;
        let entry = self
            .tables
            .entry(table)
            .or_insert_with(|| TableEntry::new(next_stamp(stamps)));
        entry.structure_generation = next_stamp(&mut self.stamps);
        StructureTicket {
            table,
            generation: entry.structure_generation,
        }
    }

    /// Store a fetched structure if `ticket` is still the latest request.
    pub fn apply_structure(&mut self, ticket: StructureTicket, detail: TableDetail) -> bool {
        match self.tables.get_mut(&ticket.table) {
            Some(entry) if entry.structure_generation == ticket.generation => {
                entry.structure = Some(detail);
                entry.revision = next_stamp(&mut self.stamps);
                true
            }
            _ => false,
        }
    }

    pub fn structure(&self, table: TableId) -> Option<&TableDetail> {
        self.tables
            .get(&table)
            .and_then(|entry| entry.structure.as_ref())
    }
}
