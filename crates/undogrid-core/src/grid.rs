#![forbid(unsafe_code)]

//! The host-grid collaborator surface.
//!
//! Anything that wants undo/redo implements [`Grid`]. The trait is
//! deliberately narrow: storage, rendering, sorting and filtering stay in
//! the host, and the undo machinery only reads snapshots and asks for
//! structural edits.
//!
//! # Contract
//!
//! - Every method takes `&self`. Implementations use interior mutability
//!   and must not hold a borrow of their own state while running a hook,
//!   because hook handlers call straight back into the grid.
//! - Structural edits announce themselves on [`Grid::hooks`]:
//!   `alter(InsertRow)` runs `AfterCreateRow`, `alter(RemoveRow)` runs
//!   `BeforeRemoveRow` then `AfterRemoveRow`, and so on for columns.
//! - `set_data_at_cells` runs `BeforeChange` and `AfterChange`. The
//!   `AfterChange` may arrive later than the call returns.
//! - `render` eventually runs `AfterRender`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cell::{CellEdit, CellValue, ChangeSource, Row};
use crate::hooks::HookBus;

/// Structural edit kinds accepted by [`Grid::alter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlterAction {
    /// New rows start at `index`.
    InsertRow,
    RemoveRow,
    /// `index` counts insertion points from 1: the new columns start at
    /// column `index - 1` (or 0). `AfterCreateCol` reports that 0-based
    /// start column, so re-inserting at a reported `index` means passing
    /// `index + 1`.
    InsertCol,
    RemoveCol,
}

impl AlterAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsertRow => "insert_row",
            Self::RemoveRow => "remove_row",
            Self::InsertCol => "insert_col",
            Self::RemoveCol => "remove_col",
        }
    }
}

/// One column condition of an active filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterColumn {
    pub column: usize,
    /// Rows are kept when the cell's text contains this needle.
    pub needle: String,
}

impl FilterColumn {
    pub fn new(column: usize, needle: impl Into<String>) -> Self {
        Self {
            column,
            needle: needle.into(),
        }
    }
}

/// One key of an active column sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortColumn {
    pub column: usize,
    pub ascending: bool,
}

impl SortColumn {
    #[must_use]
    pub const fn ascending(column: usize) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    #[must_use]
    pub const fn descending(column: usize) -> Self {
        Self {
            column,
            ascending: false,
        }
    }
}

/// Host settings the undo machinery reads.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GridSettings {
    /// Empty rows the grid keeps at the bottom.
    pub min_spare_rows: usize,
    /// Empty columns the grid keeps at the right.
    pub min_spare_cols: usize,
    /// Explicit header labels. `None` means generated headers.
    pub col_headers: Option<Vec<String>>,
    /// Undo toggle. `None` means enabled.
    pub undo: Option<bool>,
}

impl GridSettings {
    /// Whether undo/redo should be attached to the grid.
    #[must_use]
    pub fn undo_enabled(&self) -> bool {
        self.undo.unwrap_or(true)
    }
}

/// Errors a grid reports from structural operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Row index past the end of the data.
    RowOutOfBounds { index: usize, rows: usize },
    /// Column index past the end of the data.
    ColumnOutOfBounds { index: usize, cols: usize },
    /// Zero or otherwise unusable amount.
    InvalidAmount(usize),
    /// The grid refused the operation.
    Rejected(String),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowOutOfBounds { index, rows } => {
                write!(f, "row {index} out of bounds ({rows} rows)")
            }
            Self::ColumnOutOfBounds { index, cols } => {
                write!(f, "column {index} out of bounds ({cols} columns)")
            }
            Self::InvalidAmount(amount) => write!(f, "invalid amount {amount}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
        }
    }
}

impl std::error::Error for GridError {}

/// Result type for grid operations.
pub type GridResult<T = ()> = Result<T, GridError>;

/// A tabular data surface that can be observed and edited.
pub trait Grid {
    /// The bus this grid runs its hooks on.
    fn hooks(&self) -> &HookBus;

    /// Snapshot of the source data, in physical order.
    fn data(&self) -> Vec<Row>;

    /// One source row by physical index.
    fn source_row(&self, physical: usize) -> Option<Row>;

    /// Write a batch of cells (visual coordinates) tagged with an origin.
    fn set_data_at_cells(&self, edits: &[CellEdit], source: ChangeSource);

    /// Value at visual coordinates.
    fn data_at_cell(&self, row: usize, col: usize) -> Option<CellValue>;

    /// Visible row count.
    fn count_rows(&self) -> usize;

    /// Column count.
    fn count_cols(&self) -> usize;

    /// Empty rows, counted from the bottom when `ending` is set.
    fn count_empty_rows(&self, ending: bool) -> usize;

    /// Empty columns, counted from the right when `ending` is set.
    fn count_empty_cols(&self, ending: bool) -> usize;

    /// Insert or remove a row/column range.
    fn alter(&self, action: AlterAction, index: usize, amount: usize) -> GridResult;

    /// Splice rows straight into the source data at a physical index.
    ///
    /// Runs no hooks; callers announce the insertion themselves.
    fn splice_source_rows(&self, physical: usize, rows: Vec<Row>) -> GridResult;

    /// Splice cells into one source row at a column index. Runs no hooks.
    fn splice_source_cells(&self, physical: usize, col: usize, cells: Vec<CellValue>)
    -> GridResult;

    /// Explicit header labels, if the grid uses them.
    fn col_headers(&self) -> Option<Vec<String>> {
        self.settings().col_headers
    }

    /// Splice header labels at a column index.
    fn splice_col_headers(&self, index: usize, headers: Vec<String>);

    /// Current settings.
    fn settings(&self) -> GridSettings;

    /// Translate a visual row to the physical row under any active mapping.
    fn to_physical_row(&self, row: usize) -> usize {
        row
    }

    /// Replace the active filter conditions.
    fn filter(&self, columns: &[FilterColumn]);

    /// Replace the active sort keys.
    fn sort(&self, columns: &[SortColumn]);

    /// Request a render pass.
    fn render(&self);
}
