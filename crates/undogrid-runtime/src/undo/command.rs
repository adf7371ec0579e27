#![forbid(unsafe_code)]

//! Replayable history entries.
//!
//! A [`Command`] is a snapshot of one grid change, taken from the hook that
//! announced it, plus the knowledge of how to reverse and re-apply it
//! against a live [`Grid`]. The set of kinds is closed; replay dispatches
//! with an exhaustive `match`.
//!
//! # Invariants
//!
//! - `undo` after the change restores the observable grid state, and `redo`
//!   after `undo` restores the post-change state.
//! - Replay never records new history: the engine suspends recording while
//!   a returned [`Completion`] is pending.
//! - Every replay returns a [`Completion`], even when it finishes inline.
//!
//! # Failure Modes
//!
//! - **Malformed snapshot**: constructors reject data a replay could not
//!   use (no rows, zero width) with [`UndoError::MalformedCommand`].
//! - **Grid refusal**: a structural edit rejected by the grid fails the
//!   completion with [`UndoError::Grid`].
//! - **Partial composite**: a composite stops at its first failed member;
//!   the members replayed before it stay applied and are counted so the
//!   engine can split the entry.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use undogrid_core::{
    AlterAction, CellChange, CellEdit, CellValue, ChangeSource, FilterColumn, Grid, GridError,
    Hook, HookEvent, Row, SortColumn,
};

use super::completion::Completion;

/// Shared handle to the grid commands replay against.
pub type SharedGrid = Rc<dyn Grid>;

/// Errors raised while building or replaying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    /// The snapshot lacks data the replay needs.
    MalformedCommand(&'static str),
    /// The grid rejected a replay step.
    Grid(GridError),
}

impl fmt::Display for UndoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCommand(what) => write!(f, "malformed command: {what}"),
            Self::Grid(err) => write!(f, "grid error: {err}"),
        }
    }
}

impl std::error::Error for UndoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid(err) => Some(err),
            Self::MalformedCommand(_) => None,
        }
    }
}

impl From<GridError> for UndoError {
    fn from(err: GridError) -> Self {
        Self::Grid(err)
    }
}

/// Which way a command is being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Undo,
    Redo,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Run a structural edit and complete on the hook that confirms it.
fn alter_until(
    grid: &SharedGrid,
    action: AlterAction,
    index: usize,
    amount: usize,
    confirm: Hook,
) -> Completion {
    let (done, listener) = Completion::next_hook(grid.hooks(), confirm);
    if let Err(err) = grid.alter(action, index, amount) {
        grid.hooks().remove(listener);
        return Completion::failed(err);
    }
    done
}

/// Request a render and complete on `AfterRender`.
fn render_until_done(grid: &SharedGrid) -> Completion {
    let (done, _) = Completion::next_hook(grid.hooks(), Hook::AfterRender);
    grid.render();
    done
}

// ============================================================================
// Cell changes
// ============================================================================

/// A batch of cell writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    changes: Vec<CellChange>,
}

impl ChangeSet {
    /// Snapshot an `AfterChange` payload.
    pub fn new(changes: Vec<CellChange>) -> Result<Self, UndoError> {
        if changes.is_empty() {
            return Err(UndoError::MalformedCommand("change set without changes"));
        }
        Ok(Self { changes })
    }

    #[must_use]
    pub fn changes(&self) -> &[CellChange] {
        &self.changes
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        let edits: Vec<CellEdit> = self.changes.iter().map(CellChange::revert_edit).collect();
        let empty_rows_at_end = grid.count_empty_rows(true);
        let empty_cols_at_end = grid.count_empty_cols(true);

        let (changed, listener) = Completion::next_hook(grid.hooks(), Hook::AfterChange);
        grid.set_data_at_cells(&edits, ChangeSource::Undo);

        // Reverting a write into the spare area leaves an extra run of
        // padding behind it; drop it so the spare count matches again.
        for edit in &edits {
            let settings = grid.settings();
            let spare_rows = settings.min_spare_rows;
            if spare_rows > 0
                && edit.row + 1 + spare_rows == grid.count_rows()
                && empty_rows_at_end == spare_rows
            {
                if let Err(err) = grid.alter(AlterAction::RemoveRow, edit.row + 1, spare_rows) {
                    grid.hooks().remove(listener);
                    return Completion::failed(err);
                }
            }

            let spare_cols = settings.min_spare_cols;
            if spare_cols > 0
                && edit.col + 1 + spare_cols == grid.count_cols()
                && empty_cols_at_end == spare_cols
            {
                if let Err(err) = grid.alter(AlterAction::RemoveCol, edit.col + 1, spare_cols) {
                    grid.hooks().remove(listener);
                    return Completion::failed(err);
                }
            }
        }

        changed
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        let edits: Vec<CellEdit> = self.changes.iter().map(CellChange::apply_edit).collect();
        let (changed, _) = Completion::next_hook(grid.hooks(), Hook::AfterChange);
        grid.set_data_at_cells(&edits, ChangeSource::Redo);
        changed
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Empty rows inserted at a visual index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowInsertion {
    pub index: usize,
    pub amount: usize,
}

impl RowInsertion {
    #[must_use]
    pub const fn new(index: usize, amount: usize) -> Self {
        Self { index, amount }
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::RemoveRow,
            self.index,
            self.amount,
            Hook::AfterRemoveRow,
        )
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::InsertRow,
            self.index,
            self.amount,
            Hook::AfterCreateRow,
        )
    }
}

/// Rows removed from a visual index, with their contents.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRemoval {
    index: usize,
    /// Removed rows in display order.
    rows: Vec<Row>,
    /// `(physical position, row)` pairs in ascending position, when the
    /// rows were not displayed in physical order.
    physical: Option<Vec<(usize, Row)>>,
}

impl RowRemoval {
    /// Snapshot rows about to be removed from `index`.
    ///
    /// The physical position of every row is captured from the grid's
    /// current row mapping and kept with that row.
    pub fn new(index: usize, rows: Vec<Row>, grid: &dyn Grid) -> Result<Self, UndoError> {
        if rows.is_empty() {
            return Err(UndoError::MalformedCommand("row removal without rows"));
        }

        let positions: Vec<usize> = (index..index + rows.len())
            .map(|row| grid.to_physical_row(row))
            .collect();
        let identity = positions.iter().zip(index..).all(|(p, v)| *p == v);
        let physical = if identity {
            None
        } else {
            let mut pairs: Vec<(usize, Row)> =
                positions.into_iter().zip(rows.iter().cloned()).collect();
            pairs.sort_by_key(|(position, _)| *position);
            Some(pairs)
        };

        Ok(Self {
            index,
            rows,
            physical,
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Physical positions the rows return to, ascending.
    #[must_use]
    pub fn physical_indexes(&self) -> Option<Vec<usize>> {
        self.physical
            .as_ref()
            .map(|pairs| pairs.iter().map(|(position, _)| *position).collect())
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        match &self.physical {
            None => {
                if let Err(err) = grid.splice_source_rows(self.index, self.rows.clone()) {
                    return Completion::failed(err);
                }
                grid.hooks().run(HookEvent::AfterCreateRow {
                    index: self.index,
                    amount: self.rows.len(),
                    automatic: false,
                });
            }
            Some(physical) => {
                // Ascending positions, so each splice lands after the ones
                // before it.
                for (position, row) in physical {
                    let position = *position;
                    if let Err(err) = grid.splice_source_rows(position, vec![row.clone()]) {
                        return Completion::failed(err);
                    }
                    grid.hooks().run(HookEvent::AfterCreateRow {
                        index: position,
                        amount: 1,
                        automatic: false,
                    });
                }
            }
        }
        render_until_done(grid)
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::RemoveRow,
            self.index,
            self.rows.len(),
            Hook::AfterRemoveRow,
        )
    }
}

/// Rows with contents inserted at a source index by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDataInsertion {
    index: usize,
    rows: Vec<Row>,
}

impl RowDataInsertion {
    pub fn new(index: usize, rows: Vec<Row>) -> Result<Self, UndoError> {
        if rows.is_empty() {
            return Err(UndoError::MalformedCommand("row insertion without rows"));
        }
        Ok(Self { index, rows })
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::RemoveRow,
            self.index,
            self.rows.len(),
            Hook::AfterRemoveRow,
        )
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        if let Err(err) = grid.splice_source_rows(self.index, self.rows.clone()) {
            return Completion::failed(err);
        }
        let (rendered, _) = Completion::next_hook(grid.hooks(), Hook::AfterRender);
        grid.hooks().run(HookEvent::AfterCreateRow {
            index: self.index,
            amount: self.rows.len(),
            automatic: false,
        });
        grid.render();
        rendered
    }
}

// ============================================================================
// Columns
// ============================================================================

/// Empty columns inserted starting at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInsertion {
    pub index: usize,
    pub amount: usize,
}

impl ColumnInsertion {
    #[must_use]
    pub const fn new(index: usize, amount: usize) -> Self {
        Self { index, amount }
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::RemoveCol,
            self.index,
            self.amount,
            Hook::AfterRemoveCol,
        )
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        // InsertCol counts insertion points from 1.
        alter_until(
            grid,
            AlterAction::InsertCol,
            self.index + 1,
            self.amount,
            Hook::AfterCreateCol,
        )
    }
}

/// Columns removed at `index`, with each source row's cells and the
/// header labels when the grid had explicit ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRemoval {
    index: usize,
    amount: usize,
    cells: Vec<Vec<CellValue>>,
    headers: Option<Vec<String>>,
}

impl ColumnRemoval {
    /// `cells[i]` holds the removed cells of physical row `i`.
    pub fn new(
        index: usize,
        amount: usize,
        cells: Vec<Vec<CellValue>>,
        headers: Option<Vec<String>>,
    ) -> Result<Self, UndoError> {
        if amount == 0 {
            return Err(UndoError::MalformedCommand("column removal of zero columns"));
        }
        Ok(Self {
            index,
            amount,
            cells,
            headers,
        })
    }

    #[must_use]
    pub fn amount(&self) -> usize {
        self.amount
    }

    #[must_use]
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    fn undo(&self, grid: &SharedGrid) -> Completion {
        let rows = grid.data().len();
        for row in 0..rows {
            let cells = self
                .cells
                .get(row)
                .cloned()
                .unwrap_or_else(|| vec![CellValue::Empty; self.amount]);
            if let Err(err) = grid.splice_source_cells(row, self.index, cells) {
                return Completion::failed(err);
            }
        }
        if let Some(headers) = &self.headers {
            grid.splice_col_headers(self.index, headers.clone());
        }
        render_until_done(grid)
    }

    fn redo(&self, grid: &SharedGrid) -> Completion {
        alter_until(
            grid,
            AlterAction::RemoveCol,
            self.index,
            self.amount,
            Hook::AfterRemoveCol,
        )
    }
}

// ============================================================================
// View state
// ============================================================================

/// A filter change, reverted by re-applying the previous conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRevert {
    pub current: Vec<FilterColumn>,
    pub previous: Vec<FilterColumn>,
}

impl FilterRevert {
    #[must_use]
    pub fn new(current: Vec<FilterColumn>, previous: Vec<FilterColumn>) -> Self {
        Self { current, previous }
    }
}

/// A sort change, reverted by re-applying the previous sort keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SortRevert {
    pub current: Vec<SortColumn>,
    pub previous: Vec<SortColumn>,
}

impl SortRevert {
    #[must_use]
    pub fn new(current: Vec<SortColumn>, previous: Vec<SortColumn>) -> Self {
        Self { current, previous }
    }
}

// ============================================================================
// Composite
// ============================================================================

/// An ordered group of commands replayed as one history step.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    members: Rc<[Command]>,
}

impl Composite {
    /// Group `members` in order. Nested composites are flattened in place.
    #[must_use]
    pub fn new(members: Vec<Command>) -> Self {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match member {
                Command::Composite(inner) => flat.extend(inner.members.iter().cloned()),
                other => flat.push(other),
            }
        }
        Self {
            members: flat.into(),
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Command] {
        &self.members
    }

    /// Walk the members (backwards for undo).
    ///
    /// An asynchronous member holds the walk until it completes; the others
    /// start back to back. A member that fails stops the walk. `applied`
    /// counts the members replayed without failing. A render is requested
    /// once the walk ends.
    fn replay(
        &self,
        grid: &SharedGrid,
        direction: Direction,
        applied: &Rc<Cell<usize>>,
    ) -> Completion {
        replay_walk(
            Rc::clone(&self.members),
            direction,
            Rc::clone(grid),
            0,
            Rc::clone(applied),
        )
    }

    /// Split after a walk in `direction` replayed `applied` members.
    ///
    /// Returns the replayed members and the remaining ones, each grouped as
    /// one history step in their original order.
    #[must_use]
    pub fn split_replayed(
        &self,
        direction: Direction,
        applied: usize,
    ) -> (Option<Command>, Option<Command>) {
        let applied = applied.min(self.members.len());
        let cut = match direction {
            Direction::Undo => self.members.len() - applied,
            Direction::Redo => applied,
        };
        let (head, tail) = self.members.split_at(cut);
        let (head, tail) = (Command::group(head.to_vec()), Command::group(tail.to_vec()));
        match direction {
            Direction::Undo => (tail, head),
            Direction::Redo => (head, tail),
        }
    }
}

fn replay_walk(
    members: Rc<[Command]>,
    direction: Direction,
    grid: SharedGrid,
    mut step: usize,
    applied: Rc<Cell<usize>>,
) -> Completion {
    let mut started = Vec::new();
    while step < members.len() {
        let slot = match direction {
            Direction::Undo => members.len() - 1 - step,
            Direction::Redo => step,
        };
        step += 1;

        let member = &members[slot];
        let done = member.replay(&grid, direction);
        if let Some(Err(_)) = done.outcome() {
            started.push(done);
            grid.render();
            return Completion::all(started);
        }
        applied.set(applied.get() + 1);

        if member.is_async() {
            let members = Rc::clone(&members);
            let grid = Rc::clone(&grid);
            started.push(done.then(move || replay_walk(members, direction, grid, step, applied)));
            return Completion::all(started);
        }
        started.push(done);
    }
    grid.render();
    Completion::all(started)
}

// ============================================================================
// Command
// ============================================================================

/// One history entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ChangeSet(ChangeSet),
    RowInsertion(RowInsertion),
    RowRemoval(RowRemoval),
    RowDataInsertion(RowDataInsertion),
    ColumnInsertion(ColumnInsertion),
    ColumnRemoval(ColumnRemoval),
    FilterRevert(FilterRevert),
    SortRevert(SortRevert),
    Composite(Composite),
}

impl Command {
    /// Short kind label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ChangeSet(_) => "change_set",
            Self::RowInsertion(_) => "row_insertion",
            Self::RowRemoval(_) => "row_removal",
            Self::RowDataInsertion(_) => "row_data_insertion",
            Self::ColumnInsertion(_) => "column_insertion",
            Self::ColumnRemoval(_) => "column_removal",
            Self::FilterRevert(_) => "filter_revert",
            Self::SortRevert(_) => "sort_revert",
            Self::Composite(_) => "composite",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::ChangeSet(c) => format!("Edit {} cell(s)", c.changes.len()),
            Self::RowInsertion(c) => format!("Insert {} row(s) at {}", c.amount, c.index),
            Self::RowRemoval(c) => format!("Remove {} row(s) at {}", c.rows.len(), c.index),
            Self::RowDataInsertion(c) => {
                format!("Insert {} data row(s) at {}", c.rows.len(), c.index)
            }
            Self::ColumnInsertion(c) => format!("Insert {} column(s) at {}", c.amount, c.index),
            Self::ColumnRemoval(c) => format!("Remove {} column(s) at {}", c.amount, c.index),
            Self::FilterRevert(_) => "Filter".to_string(),
            Self::SortRevert(_) => "Sort".to_string(),
            Self::Composite(c) => format!("{} grouped change(s)", c.members.len()),
        }
    }

    /// Whether replay completes only after a later `AfterChange`.
    ///
    /// Composite replay waits for these before starting the next member.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::ChangeSet(_))
    }

    /// Number of leaf commands this entry replays.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Composite(c) => c.members.iter().map(Self::leaf_count).sum(),
            _ => 1,
        }
    }

    /// Group commands for one history step: nothing, the command itself,
    /// or a composite in the given order.
    #[must_use]
    pub fn group(mut commands: Vec<Command>) -> Option<Command> {
        match commands.len() {
            0 => None,
            1 => commands.pop(),
            _ => Some(Self::Composite(Composite::new(commands))),
        }
    }

    /// Reverse the change.
    pub fn undo(&self, grid: &SharedGrid) -> Completion {
        self.replay(grid, Direction::Undo)
    }

    /// Re-apply the change.
    pub fn redo(&self, grid: &SharedGrid) -> Completion {
        self.replay(grid, Direction::Redo)
    }

    /// Replay in `direction`.
    pub fn replay(&self, grid: &SharedGrid, direction: Direction) -> Completion {
        match (self, direction) {
            (Self::ChangeSet(c), Direction::Undo) => c.undo(grid),
            (Self::ChangeSet(c), Direction::Redo) => c.redo(grid),
            (Self::RowInsertion(c), Direction::Undo) => c.undo(grid),
            (Self::RowInsertion(c), Direction::Redo) => c.redo(grid),
            (Self::RowRemoval(c), Direction::Undo) => c.undo(grid),
            (Self::RowRemoval(c), Direction::Redo) => c.redo(grid),
            (Self::RowDataInsertion(c), Direction::Undo) => c.undo(grid),
            (Self::RowDataInsertion(c), Direction::Redo) => c.redo(grid),
            (Self::ColumnInsertion(c), Direction::Undo) => c.undo(grid),
            (Self::ColumnInsertion(c), Direction::Redo) => c.redo(grid),
            (Self::ColumnRemoval(c), Direction::Undo) => c.undo(grid),
            (Self::ColumnRemoval(c), Direction::Redo) => c.redo(grid),
            (Self::FilterRevert(c), Direction::Undo) => {
                grid.filter(&c.previous);
                Completion::ready()
            }
            (Self::FilterRevert(c), Direction::Redo) => {
                grid.filter(&c.current);
                Completion::ready()
            }
            (Self::SortRevert(c), Direction::Undo) => {
                grid.sort(&c.previous);
                Completion::ready()
            }
            (Self::SortRevert(c), Direction::Redo) => {
                grid.sort(&c.current);
                Completion::ready()
            }
            (Self::Composite(c), direction) => c.replay(grid, direction, &Rc::default()),
        }
    }

    /// Replay in `direction`, counting composite members into `applied` as
    /// they replay.
    pub fn replay_counted(
        &self,
        grid: &SharedGrid,
        direction: Direction,
        applied: &Rc<Cell<usize>>,
    ) -> Completion {
        match self {
            Self::Composite(c) => c.replay(grid, direction, applied),
            _ => self.replay(grid, direction),
        }
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(cmd: $variant) -> Self {
                    Self::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_variant!(
    ChangeSet,
    RowInsertion,
    RowRemoval,
    RowDataInsertion,
    ColumnInsertion,
    ColumnRemoval,
    FilterRevert,
    SortRevert,
    Composite,
);
