// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Windowing math for the record grid. Everything here is pure: callers pass
//! the loaded row count and scroll position, and get back the row range to
//! render and whether the next page should be requested.

use crate::api::TableDetail;
use crate::field_kind;
use crate::model::{Field, Record, SortDirection};

pub const DEFAULT_OVERSCAN_ROWS: usize = 20;
pub const DEFAULT_PREFETCH_THRESHOLD: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportMetrics {
    pub row_height: usize,
    pub viewport_height: usize,
    pub overscan_rows: usize,
    pub prefetch_threshold: usize,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self {
            row_height: 40,
            viewport_height: 600,
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            prefetch_threshold: DEFAULT_PREFETCH_THRESHOLD,
        }
    }
}

impl ViewportMetrics {
    /// Terminal grids measure everything in rows.
    pub fn rows(viewport_rows: usize, overscan_rows: usize, prefetch_threshold: usize) -> Self {
        Self {
            row_height: 1,
            viewport_height: viewport_rows,
            overscan_rows,
            prefetch_threshold,
        }
    }

    pub fn visible_rows(&self) -> usize {
        self.viewport_height / self.row_height.max(1)
    }
}

/// Half-open range of row indices. Index `loaded` is the sentinel row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub end: usize,
}

impl RowWindow {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    pub fn last(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.end - 1)
    }
}

/// Scrollable height: every loaded row plus the sentinel row.
pub fn total_height(metrics: &ViewportMetrics, loaded: usize) -> usize {
    (loaded + 1) * metrics.row_height
}

pub fn visible_window(metrics: &ViewportMetrics, loaded: usize, scroll_top: usize) -> RowWindow {
    let height = metrics.row_height.max(1);
    let margin = metrics.overscan_rows * height;
    let low = scroll_top.saturating_sub(margin);
    let high = scroll_top + metrics.viewport_height + margin;
    let rows = loaded + 1;

    let start = (low / height).min(rows);
    let end = high.div_ceil(height).min(rows);
    RowWindow {
        start,
        end: end.max(start),
    }
}

/// Prefetch gate: the window reaches within `prefetch_threshold` rows of the
/// loaded end, more data exists, and nothing is already in flight.
pub fn should_prefetch(
    metrics: &ViewportMetrics,
    window: RowWindow,
    loaded: usize,
    has_more: bool,
    in_flight: bool,
) -> bool {
    if !has_more || in_flight {
        return false;
    }
    window
        .last()
        .is_some_and(|last| last + metrics.prefetch_threshold >= loaded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Loading,
    EndOfData,
    NoRecords,
}

impl Sentinel {
    pub fn resolve(loaded: usize, has_more: bool, in_flight: bool) -> Self {
        if in_flight || has_more {
            Self::Loading
        } else if loaded == 0 {
            Self::NoRecords
        } else {
            Self::EndOfData
        }
    }

    pub fn label(self, page_limit: usize) -> String {
        match self {
            Self::Loading => format!("Loading next {page_limit} rows..."),
            Self::EndOfData => "End of data".to_owned(),
            Self::NoRecords => "No records found".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridBody {
    HeaderOnly,
    EmptyState(Sentinel),
    Rows(RowWindow),
}

pub fn grid_body(
    field_count: usize,
    loaded: usize,
    has_more: bool,
    in_flight: bool,
    window: RowWindow,
) -> GridBody {
    if field_count == 0 {
        GridBody::HeaderOnly
    } else if loaded == 0 {
        GridBody::EmptyState(Sentinel::resolve(loaded, has_more, in_flight))
    } else {
        GridBody::Rows(window)
    }
}

pub fn can_add_row(structure: Option<&TableDetail>) -> bool {
    structure.is_some_and(TableDetail::has_fields)
}

/// Smallest scroll offset change that keeps `row` fully on screen.
pub fn scroll_to_reveal(metrics: &ViewportMetrics, scroll_top: usize, row: usize) -> usize {
    let top = row * metrics.row_height;
    let bottom = top + metrics.row_height;
    if top < scroll_top {
        top
    } else if bottom > scroll_top + metrics.viewport_height {
        bottom.saturating_sub(metrics.viewport_height)
    } else {
        scroll_top
    }
}

/// Column order: primary field first, then order index, created_at and id.
pub fn order_columns(fields: &[Field]) -> Vec<&Field> {
    let mut ordered: Vec<&Field> = fields.iter().collect();
    ordered.sort_by(|left, right| {
        right
            .is_primary()
            .cmp(&left.is_primary())
            .then_with(|| left.order_index.cmp(&right.order_index))
            .then_with(|| left.created_at.cmp(&right.created_at))
            .then_with(|| left.id.cmp(&right.id))
    });
    ordered
}

/// Stable sort of loaded rows by one column. Returns row indices in display
/// order; equal keys keep fetch order.
pub fn sorted_indices(records: &[&Record], field: &Field, direction: SortDirection) -> Vec<usize> {
    let keys: Vec<_> = records
        .iter()
        .map(|record| field_kind::sort_key(field, record.value(field.id)))
        .collect();
    let mut indices: Vec<usize> = (0..records.len()).collect();
    indices.sort_by(|&left, &right| {
        let ordering = keys[left].cmp(&keys[right]);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::{
        GridBody, RowWindow, Sentinel, ViewportMetrics, grid_body, order_columns,
        scroll_to_reveal, should_prefetch, sorted_indices, total_height, visible_window,
    };
    use crate::ids::{FieldId, RecordId, TableId};
    use crate::model::{
        CellValue, Field, FieldConfig, FieldType, Record, RecordValues, SortDirection,
    };
    use time::OffsetDateTime;

    fn metrics() -> ViewportMetrics {
        ViewportMetrics {
            row_height: 40,
            viewport_height: 400,
            overscan_rows: 5,
            prefetch_threshold: 15,
        }
    }

    fn field(id: i64, order_index: i64, primary: bool) -> Field {
        Field {
            id: FieldId::new(id),
            table_id: TableId::new(1),
            name: format!("f{id}"),
            field_type: FieldType::ShortText,
            order_index,
            config: FieldConfig {
                options: None,
                is_primary: primary,
            },
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn height_includes_sentinel() {
        assert_eq!(total_height(&metrics(), 0), 40);
        assert_eq!(total_height(&metrics(), 100), 4040);
    }

    #[test]
    fn window_is_overscanned_and_clamped() {
        let window = visible_window(&metrics(), 1000, 4000);
        // rows 100..110 visible, 5 rows of overscan on each side
        assert_eq!(window, RowWindow { start: 95, end: 115 });

        let top = visible_window(&metrics(), 1000, 0);
        assert_eq!(top.start, 0);
        assert_eq!(top.end, 15);

        let short = visible_window(&metrics(), 3, 0);
        assert_eq!(short, RowWindow { start: 0, end: 4 });
    }

    #[test]
    fn window_size_is_independent_of_loaded_count() {
        let small = visible_window(&metrics(), 200, 2000);
        let large = visible_window(&metrics(), 100_000, 2000);
        assert_eq!(small, large);
    }

    #[test]
    fn prefetch_needs_room_more_data_and_no_flight() {
        let near_end = visible_window(&metrics(), 50, 1600);
        assert!(should_prefetch(&metrics(), near_end, 50, true, false));
        assert!(!should_prefetch(&metrics(), near_end, 50, false, false));
        assert!(!should_prefetch(&metrics(), near_end, 50, true, true));

        let far = visible_window(&metrics(), 500, 0);
        assert!(!should_prefetch(&metrics(), far, 500, true, false));
    }

    #[test]
    fn sentinel_and_body_states() {
        assert_eq!(Sentinel::resolve(10, true, false), Sentinel::Loading);
        assert_eq!(Sentinel::resolve(10, false, false), Sentinel::EndOfData);
        assert_eq!(Sentinel::resolve(0, false, false), Sentinel::NoRecords);
        assert_eq!(Sentinel::Loading.label(50), "Loading next 50 rows...");

        let window = RowWindow { start: 0, end: 4 };
        assert_eq!(grid_body(0, 10, true, false, window), GridBody::HeaderOnly);
        assert_eq!(
            grid_body(2, 0, false, false, window),
            GridBody::EmptyState(Sentinel::NoRecords)
        );
        assert_eq!(grid_body(2, 3, false, false, window), GridBody::Rows(window));
    }

    #[test]
    fn reveal_scrolls_minimally() {
        let metrics = ViewportMetrics::rows(10, 2, 3);
        assert_eq!(scroll_to_reveal(&metrics, 0, 5), 0);
        assert_eq!(scroll_to_reveal(&metrics, 0, 12), 3);
        assert_eq!(scroll_to_reveal(&metrics, 8, 2), 2);
    }

    #[test]
    fn primary_column_leads() {
        let fields = vec![field(3, 0, false), field(1, 2, true), field(2, 1, false)];
        let ids: Vec<i64> = order_columns(&fields).iter().map(|f| f.id.get()).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn column_sort_is_stable() {
        let name = field(1, 0, true);
        let records: Vec<Record> = ["b", "a", "b", ""]
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let mut values = RecordValues::new();
                values.insert(name.id, CellValue::text(*value));
                Record {
                    id: RecordId::new(index as i64),
                    table_id: TableId::new(1),
                    values,
                    created_at: OffsetDateTime::UNIX_EPOCH,
                }
            })
            .collect();
        let refs: Vec<&Record> = records.iter().collect();

        assert_eq!(sorted_indices(&refs, &name, SortDirection::Asc), vec![1, 0, 2, 3]);
        assert_eq!(sorted_indices(&refs, &name, SortDirection::Desc), vec![3, 0, 2, 1]);
    }
}
