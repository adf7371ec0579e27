#![forbid(unsafe_code)]

//! In-memory [`Grid`] implementation.
//!
//! # Row mapping
//!
//! Source rows are stored in physical order. When a sort or filter is
//! active, `row_map[visual] = physical`; otherwise the mapping is the
//! identity. Structural edits recompute the mapping; plain cell writes do
//! not re-sort.
//!
//! # Hooks
//!
//! Every operation announces itself on [`MemoryGrid::hooks`], with no
//! borrow of grid state held while a hook runs.
//!
//! | Operation | Hooks |
//! |---|---|
//! | `set_data_at_cells` | `BeforeChange`, padding, `AfterChange` (deferrable) |
//! | `alter(InsertRow)` | `AfterCreateRow` |
//! | `alter(RemoveRow)` | `BeforeRemoveRow`, `AfterRemoveRow`, padding |
//! | `alter(InsertCol)` | `AfterCreateCol` |
//! | `alter(RemoveCol)` | `BeforeRemoveCol`, `AfterRemoveCol`, padding |
//! | `filter` / `sort` | `AfterFilter` / `AfterColumnSort` |
//! | `render` | `AfterRender` (deferrable) |
//!
//! Padding inserts empty rows/columns so that at least `min_spare_rows` /
//! `min_spare_cols` trailing ones exist; it runs `AfterCreateRow` /
//! `AfterCreateCol` flagged `automatic`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use undogrid_core::{
    AlterAction, CellChange, CellEdit, CellValue, ChangeSource, FilterColumn, Grid, GridError,
    GridResult, GridSettings, HookBus, HookEvent, Row, SortColumn,
};

struct GridState {
    source: Vec<Row>,
    cols: usize,
    settings: GridSettings,
    sort: Vec<SortColumn>,
    filter: Vec<FilterColumn>,
    row_map: Option<Vec<usize>>,
    defer: bool,
    renders: usize,
}

impl GridState {
    fn new(source: Vec<Row>, settings: GridSettings) -> Self {
        let mut state = Self {
            source,
            cols: 0,
            settings,
            sort: Vec::new(),
            filter: Vec::new(),
            row_map: None,
            defer: false,
            renders: 0,
        };
        state.normalise_width();
        state.pad_silently();
        state
    }

    fn visible_rows(&self) -> usize {
        self.row_map.as_ref().map_or(self.source.len(), Vec::len)
    }

    fn physical(&self, row: usize) -> usize {
        match &self.row_map {
            None => row,
            Some(map) => map
                .get(row)
                .copied()
                .unwrap_or_else(|| self.source.len() + (row - map.len())),
        }
    }

    fn empty_row(&self) -> Row {
        vec![CellValue::Empty; self.cols]
    }

    fn normalise_width(&mut self) {
        let widest = self.source.iter().map(Vec::len).max().unwrap_or(0);
        self.cols = self.cols.max(widest);
        let cols = self.cols;
        for row in &mut self.source {
            row.resize(cols, CellValue::Empty);
        }
    }

    fn visual_rows(&self) -> impl DoubleEndedIterator<Item = &Row> + '_ {
        (0..self.visible_rows()).filter_map(|v| self.source.get(self.physical(v)))
    }

    fn row_is_empty(row: &Row) -> bool {
        row.iter().all(CellValue::is_empty)
    }

    fn col_is_empty(&self, col: usize) -> bool {
        self.visual_rows()
            .all(|row| row.get(col).is_none_or(CellValue::is_empty))
    }

    fn empty_rows(&self, ending: bool) -> usize {
        if ending {
            self.visual_rows()
                .rev()
                .take_while(|row| Self::row_is_empty(row))
                .count()
        } else {
            self.visual_rows()
                .filter(|row| Self::row_is_empty(row))
                .count()
        }
    }

    fn empty_cols(&self, ending: bool) -> usize {
        if ending {
            (0..self.cols)
                .rev()
                .take_while(|&col| self.col_is_empty(col))
                .count()
        } else {
            (0..self.cols).filter(|&col| self.col_is_empty(col)).count()
        }
    }

    /// Missing spare rows and columns.
    fn spare_deficit(&self) -> (usize, usize) {
        let rows = self
            .settings
            .min_spare_rows
            .saturating_sub(self.empty_rows(true));
        let cols = self
            .settings
            .min_spare_cols
            .saturating_sub(self.empty_cols(true));
        (rows, cols)
    }

    /// Pad without hooks, for construction and data loads.
    fn pad_silently(&mut self) {
        let (rows, cols) = self.spare_deficit();
        if cols > 0 {
            let at = self.cols;
            self.insert_cols(at, cols);
        }
        for _ in 0..rows {
            let row = self.empty_row();
            self.source.push(row);
        }
        self.refresh_mapping();
    }

    fn insert_cols(&mut self, at: usize, amount: usize) -> usize {
        let at = at.min(self.cols);
        for row in &mut self.source {
            row.splice(at..at, std::iter::repeat_n(CellValue::Empty, amount));
        }
        self.cols += amount;
        if let Some(labels) = &mut self.settings.col_headers {
            let at = at.min(labels.len());
            labels.splice(at..at, std::iter::repeat_n(String::new(), amount));
        }
        at
    }

    fn refresh_mapping(&mut self) {
        if self.sort.is_empty() && self.filter.is_empty() {
            self.row_map = None;
            return;
        }

        let mut map: Vec<usize> = (0..self.source.len())
            .filter(|&p| {
                self.filter.iter().all(|f| {
                    self.source[p]
                        .get(f.column)
                        .is_some_and(|cell| cell.to_string().contains(&f.needle))
                })
            })
            .collect();

        if !self.sort.is_empty() {
            map.sort_by(|&a, &b| {
                self.sort
                    .iter()
                    .map(|key| {
                        compare_for_sort(
                            self.source[a].get(key.column),
                            self.source[b].get(key.column),
                            key.ascending,
                        )
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        self.row_map = Some(map);
    }
}

/// Numbers < text < booleans < empty.
fn type_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Number(_) => 0,
        CellValue::Text(_) => 1,
        CellValue::Bool(_) => 2,
        CellValue::Empty => 3,
    }
}

/// Order two cells for a sort key; empty cells always sort last.
fn compare_for_sort(a: Option<&CellValue>, b: Option<&CellValue>, ascending: bool) -> Ordering {
    let a_empty = a.is_none_or(CellValue::is_empty);
    let b_empty = b.is_none_or(CellValue::is_empty);
    match (a, b, a_empty, b_empty) {
        (_, _, true, true) => Ordering::Equal,
        (_, _, true, false) => Ordering::Greater,
        (_, _, false, true) => Ordering::Less,
        (Some(a), Some(b), false, false) => {
            let ord = match (a, b) {
                (CellValue::Number(x), CellValue::Number(y)) => {
                    x.partial_cmp(y).unwrap_or(Ordering::Equal)
                }
                (CellValue::Text(x), CellValue::Text(y)) => x.cmp(y),
                (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
                _ => type_rank(a).cmp(&type_rank(b)),
            };
            if ascending { ord } else { ord.reverse() }
        }
        _ => Ordering::Equal,
    }
}

fn signed(index: usize) -> isize {
    isize::try_from(index).unwrap_or(isize::MAX)
}

/// A grid backed by vectors, driving a [`HookBus`].
pub struct MemoryGrid {
    hooks: HookBus,
    state: RefCell<GridState>,
    deferred: RefCell<VecDeque<HookEvent>>,
}

impl fmt::Debug for MemoryGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryGrid")
            .field("rows", &state.visible_rows())
            .field("physical_rows", &state.source.len())
            .field("cols", &state.cols)
            .field("mapped", &state.row_map.is_some())
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}

impl MemoryGrid {
    /// A grid over `rows` with default settings.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Rc<Self> {
        Self::with_settings(rows, GridSettings::default())
    }

    /// A grid over `rows`. Rows are widened to a common width and spare
    /// padding is added without running hooks.
    #[must_use]
    pub fn with_settings(rows: Vec<Row>, settings: GridSettings) -> Rc<Self> {
        Rc::new(Self {
            hooks: HookBus::new(),
            state: RefCell::new(GridState::new(rows, settings)),
            deferred: RefCell::new(VecDeque::new()),
        })
    }

    /// A grid from a JSON array of row arrays.
    pub fn from_json(json: &str) -> Result<Rc<Self>, serde_json::Error> {
        let rows: Vec<Row> = serde_json::from_str(json)?;
        Ok(Self::new(rows))
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Announce that the grid finished initialising.
    pub fn init(&self) {
        self.hooks.run(HookEvent::AfterInit);
    }

    /// Replace the settings, pad to the new spare counts, and announce it.
    pub fn update_settings(&self, settings: GridSettings) {
        self.state.borrow_mut().settings = settings;
        self.pad_spares();
        self.hooks.run(HookEvent::AfterUpdateSettings);
    }

    /// Replace all data. Runs `AfterChange` with no changes and origin
    /// [`ChangeSource::LoadData`].
    pub fn load_data(&self, rows: Vec<Row>) {
        {
            let mut state = self.state.borrow_mut();
            state.source = rows;
            state.cols = 0;
            state.normalise_width();
            state.pad_silently();
        }
        trace!("grid data loaded");
        self.emit_or_defer(HookEvent::AfterChange {
            changes: Vec::new(),
            source: ChangeSource::LoadData,
        });
    }

    /// Write one cell as a user edit.
    pub fn set_data_at_cell(&self, row: usize, col: usize, value: impl Into<CellValue>) {
        self.set_data_at_cells(&[CellEdit::new(row, col, value)], ChangeSource::Edit);
    }

    /// Hold `AfterChange` and `AfterRender` back until
    /// [`flush_deferred`](Self::flush_deferred).
    pub fn set_deferred(&self, deferred: bool) {
        self.state.borrow_mut().defer = deferred;
    }

    /// Deliver held-back hooks, including any queued while delivering.
    /// Returns how many were delivered.
    pub fn flush_deferred(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.hooks.run(event);
            delivered += 1;
        }
        delivered
    }

    /// Hooks currently held back.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.deferred.borrow().len()
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Rows in display order.
    #[must_use]
    pub fn visual_data(&self) -> Vec<Row> {
        self.state.borrow().visual_rows().cloned().collect()
    }

    /// Display-order rows as JSON.
    #[must_use]
    pub fn snapshot_json(&self) -> String {
        let state = self.state.borrow();
        let rows: Vec<&Row> = state.visual_rows().collect();
        serde_json::json!({
            "rows": rows,
            "headers": state.settings.col_headers,
        })
        .to_string()
    }

    /// Stable fingerprint of what the grid displays.
    #[must_use]
    pub fn checksum(&self) -> String {
        let hash = blake3::hash(self.snapshot_json().as_bytes());
        format!("blake3:{}", hash.to_hex())
    }

    #[must_use]
    pub fn render_count(&self) -> usize {
        self.state.borrow().renders
    }

    #[must_use]
    pub fn active_sort(&self) -> Vec<SortColumn> {
        self.state.borrow().sort.clone()
    }

    #[must_use]
    pub fn active_filter(&self) -> Vec<FilterColumn> {
        self.state.borrow().filter.clone()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn emit_or_defer(&self, event: HookEvent) {
        if self.state.borrow().defer {
            trace!(hook = event.hook().as_str(), "hook deferred");
            self.deferred.borrow_mut().push_back(event);
        } else {
            self.hooks.run(event);
        }
    }

    fn pad_spares(&self) {
        let (rows, cols, at_row, at_col) = {
            let state = self.state.borrow();
            let (rows, cols) = state.spare_deficit();
            (rows, cols, state.visible_rows(), state.cols)
        };
        if cols > 0 {
            self.insert_cols(at_col, cols, true);
        }
        if rows > 0 {
            self.insert_rows(at_row, rows, true);
        }
    }

    fn insert_rows(&self, index: usize, amount: usize, automatic: bool) {
        let index = {
            let mut state = self.state.borrow_mut();
            let index = index.min(state.visible_rows());
            let at = if index < state.visible_rows() {
                state.physical(index)
            } else {
                state.source.len()
            };
            for _ in 0..amount {
                let row = state.empty_row();
                state.source.insert(at, row);
            }
            state.refresh_mapping();
            index
        };
        trace!(index, amount, automatic, "rows inserted");
        self.hooks.run(HookEvent::AfterCreateRow {
            index,
            amount,
            automatic,
        });
    }

    fn remove_rows(&self, index: usize, amount: usize) -> GridResult {
        let rows = self.state.borrow().visible_rows();
        if index >= rows {
            return Err(GridError::RowOutOfBounds { index, rows });
        }
        let amount = amount.min(rows - index);
        self.hooks.run(HookEvent::BeforeRemoveRow {
            index: signed(index),
            amount,
        });

        {
            let mut state = self.state.borrow_mut();
            let mut physical: Vec<usize> = (index..index + amount)
                .map(|row| state.physical(row))
                .filter(|&p| p < state.source.len())
                .collect();
            physical.sort_unstable_by(|a, b| b.cmp(a));
            physical.dedup();
            for p in physical {
                state.source.remove(p);
            }
            state.refresh_mapping();
        }
        trace!(index, amount, "rows removed");
        self.hooks
            .run(HookEvent::AfterRemoveRow { index, amount });
        self.pad_spares();
        Ok(())
    }

    fn insert_cols(&self, position: usize, amount: usize, automatic: bool) {
        let index = self.state.borrow_mut().insert_cols(position, amount);
        trace!(index, amount, automatic, "columns inserted");
        self.hooks.run(HookEvent::AfterCreateCol {
            index,
            amount,
            automatic,
        });
    }

    fn remove_cols(&self, index: usize, amount: usize) -> GridResult {
        let cols = self.state.borrow().cols;
        if index >= cols {
            return Err(GridError::ColumnOutOfBounds { index, cols });
        }
        let amount = amount.min(cols - index);
        self.hooks.run(HookEvent::BeforeRemoveCol {
            index: signed(index),
            amount,
        });

        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            for row in &mut state.source {
                let end = (index + amount).min(row.len());
                let start = index.min(end);
                row.drain(start..end);
            }
            state.cols -= amount;
            if let Some(labels) = &mut state.settings.col_headers {
                let end = (index + amount).min(labels.len());
                let start = index.min(end);
                labels.drain(start..end);
            }
            state.refresh_mapping();
        }
        trace!(index, amount, "columns removed");
        self.hooks
            .run(HookEvent::AfterRemoveCol { index, amount });
        self.pad_spares();
        Ok(())
    }
}

impl Grid for MemoryGrid {
    fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    fn data(&self) -> Vec<Row> {
        self.state.borrow().source.clone()
    }

    fn source_row(&self, physical: usize) -> Option<Row> {
        self.state.borrow().source.get(physical).cloned()
    }

    fn set_data_at_cells(&self, edits: &[CellEdit], source: ChangeSource) {
        self.hooks.run(HookEvent::BeforeChange {
            edits: edits.to_vec(),
            source: source.clone(),
        });

        let changes = {
            let mut state = self.state.borrow_mut();
            let mut changes = Vec::with_capacity(edits.len());
            for edit in edits {
                let physical = state.physical(edit.row);
                let before = state.source.len();
                while state.source.len() <= physical {
                    let row = state.empty_row();
                    state.source.push(row);
                }
                let after = state.source.len();
                if let Some(map) = &mut state.row_map {
                    map.extend(before..after);
                }
                if edit.col >= state.cols {
                    state.cols = edit.col + 1;
                    state.normalise_width();
                }

                let old = std::mem::replace(
                    &mut state.source[physical][edit.col],
                    edit.value.clone(),
                );
                changes.push(CellChange {
                    row: edit.row,
                    col: edit.col,
                    old,
                    new: edit.value.clone(),
                });
            }
            changes
        };

        trace!(cells = changes.len(), ?source, "cells written");
        self.pad_spares();
        self.emit_or_defer(HookEvent::AfterChange { changes, source });
    }

    fn data_at_cell(&self, row: usize, col: usize) -> Option<CellValue> {
        let state = self.state.borrow();
        state.source.get(state.physical(row))?.get(col).cloned()
    }

    fn count_rows(&self) -> usize {
        self.state.borrow().visible_rows()
    }

    fn count_cols(&self) -> usize {
        self.state.borrow().cols
    }

    fn count_empty_rows(&self, ending: bool) -> usize {
        self.state.borrow().empty_rows(ending)
    }

    fn count_empty_cols(&self, ending: bool) -> usize {
        self.state.borrow().empty_cols(ending)
    }

    fn alter(&self, action: AlterAction, index: usize, amount: usize) -> GridResult {
        if amount == 0 {
            return Err(GridError::InvalidAmount(amount));
        }
        match action {
            AlterAction::InsertRow => {
                self.insert_rows(index, amount, false);
                Ok(())
            }
            AlterAction::RemoveRow => self.remove_rows(index, amount),
            AlterAction::InsertCol => {
                self.insert_cols(index.saturating_sub(1), amount, false);
                Ok(())
            }
            AlterAction::RemoveCol => self.remove_cols(index, amount),
        }
    }

    fn splice_source_rows(&self, physical: usize, rows: Vec<Row>) -> GridResult {
        let mut state = self.state.borrow_mut();
        let len = state.source.len();
        if physical > len {
            return Err(GridError::RowOutOfBounds {
                index: physical,
                rows: len,
            });
        }
        state.source.splice(physical..physical, rows);
        state.normalise_width();
        state.refresh_mapping();
        Ok(())
    }

    fn splice_source_cells(
        &self,
        physical: usize,
        col: usize,
        cells: Vec<CellValue>,
    ) -> GridResult {
        let mut state = self.state.borrow_mut();
        let rows = state.source.len();
        let Some(row) = state.source.get_mut(physical) else {
            return Err(GridError::RowOutOfBounds {
                index: physical,
                rows,
            });
        };
        if col > row.len() {
            return Err(GridError::ColumnOutOfBounds {
                index: col,
                cols: row.len(),
            });
        }
        row.splice(col..col, cells);
        // Other rows catch up as their own cells are spliced back.
        let width = row.len();
        state.cols = state.cols.max(width);
        Ok(())
    }

    fn splice_col_headers(&self, index: usize, headers: Vec<String>) {
        let mut state = self.state.borrow_mut();
        let labels = state.settings.col_headers.get_or_insert_with(Vec::new);
        let at = index.min(labels.len());
        labels.splice(at..at, headers);
    }

    fn settings(&self) -> GridSettings {
        self.state.borrow().settings.clone()
    }

    fn to_physical_row(&self, row: usize) -> usize {
        self.state.borrow().physical(row)
    }

    fn filter(&self, columns: &[FilterColumn]) {
        let previous = {
            let mut state = self.state.borrow_mut();
            let previous = std::mem::replace(&mut state.filter, columns.to_vec());
            state.refresh_mapping();
            previous
        };
        self.hooks.run(HookEvent::AfterFilter {
            current: columns.to_vec(),
            previous,
        });
    }

    fn sort(&self, columns: &[SortColumn]) {
        let previous = {
            let mut state = self.state.borrow_mut();
            let previous = std::mem::replace(&mut state.sort, columns.to_vec());
            state.refresh_mapping();
            previous
        };
        self.hooks.run(HookEvent::AfterColumnSort {
            current: columns.to_vec(),
            previous,
        });
    }

    fn render(&self) {
        self.state.borrow_mut().renders += 1;
        self.emit_or_defer(HookEvent::AfterRender);
    }
}
