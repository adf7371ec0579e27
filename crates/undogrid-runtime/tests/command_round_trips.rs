#![forbid(unsafe_code)]

//! Round-trip tests: for every history entry kind, `undo` restores the grid
//! as it was before the change and `redo` restores it as it was after.
//!
//! Run:
//!   cargo test -p undogrid-runtime --test command_round_trips

use std::rc::Rc;

use undogrid_core::{
    AlterAction, CellValue, FilterColumn, Grid, GridError, GridSettings, Row, SortColumn, row,
};
use undogrid_harness::MemoryGrid;
use undogrid_runtime::undo::{Command, RowDataInsertion, RowInsertion, RowRemoval};
use undogrid_runtime::{UndoError, UndoRedo};

fn letters() -> Vec<Row> {
    ["a", "b", "x", "y", "c"]
        .into_iter()
        .map(|v| row([v, "1"]))
        .collect()
}

fn firsts(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r[0].to_string()).collect()
}

/// Apply `change`, then check undo/redo against the before and after state.
fn assert_round_trip(grid: &Rc<MemoryGrid>, engine: &UndoRedo, change: impl FnOnce()) {
    let before = grid.snapshot_json();
    change();
    let after = grid.snapshot_json();
    assert_ne!(before, after, "change had no effect");
    assert!(engine.is_undo_available());

    engine.undo().expect("undo");
    assert!(!engine.is_replaying());
    assert_eq!(grid.snapshot_json(), before, "undo did not restore");

    engine.redo().expect("redo");
    assert!(!engine.is_replaying());
    assert_eq!(grid.snapshot_json(), after, "redo did not re-apply");
}

// ============================================================================
// Cells
// ============================================================================

#[test]
fn change_set_round_trip() {
    let grid = MemoryGrid::new(vec![row(["a", "b"])]);
    let engine = UndoRedo::new(grid.clone());

    grid.set_data_at_cell(0, 0, "b");
    engine.undo().expect("undo");
    assert_eq!(grid.data_at_cell(0, 0), Some(CellValue::from("a")));
    assert_eq!(engine.redo_depth(), 1);

    engine.redo().expect("redo");
    assert_eq!(grid.data_at_cell(0, 0), Some(CellValue::from("b")));
}

#[test]
fn change_set_round_trip_with_spare_padding() {
    let grid = MemoryGrid::with_settings(
        vec![row(["a", "b"])],
        GridSettings {
            min_spare_rows: 1,
            min_spare_cols: 1,
            ..GridSettings::default()
        },
    );
    let engine = UndoRedo::new(grid.clone());
    assert_eq!((grid.count_rows(), grid.count_cols()), (2, 3));

    assert_round_trip(&grid, &engine, || grid.set_data_at_cell(1, 2, "corner"));
    assert_eq!((grid.count_rows(), grid.count_cols()), (3, 4));
}

// ============================================================================
// Rows
// ============================================================================

#[test]
fn row_insertion_round_trip() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    assert_round_trip(&grid, &engine, || {
        grid.alter(AlterAction::InsertRow, 1, 2).expect("insert");
    });
    assert_eq!(grid.count_rows(), 7);
}

#[test]
fn row_removal_reinserts_snapshot_at_index() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());

    grid.alter(AlterAction::RemoveRow, 2, 2).expect("remove");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "c"]);
    let Some(Command::RowRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a row removal");
    };
    assert_eq!(removal.index(), 2);
    assert_eq!(firsts(removal.rows()), vec!["x", "y"]);
    assert!(removal.physical_indexes().is_none());

    engine.undo().expect("undo");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "x", "y", "c"]);

    engine.redo().expect("redo");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "c"]);
}

#[test]
fn explicitly_recorded_row_removal_round_trips() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());

    let removal = RowRemoval::new(2, vec![row(["x", "1"]), row(["y", "1"])], &*grid)
        .expect("rows");
    grid.alter(AlterAction::RemoveRow, 2, 2).expect("remove");
    engine.clear();
    engine.record(removal);

    engine.undo().expect("undo");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "x", "y", "c"]);
    engine.redo().expect("redo");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "c"]);
}

#[test]
fn row_removal_under_sort_restores_physical_order() {
    let grid = MemoryGrid::new(["c", "a", "d", "b"].into_iter().map(|v| row([v])).collect());
    grid.sort(&[SortColumn::ascending(0)]);
    let engine = UndoRedo::new(grid.clone());
    let physical_before = grid.data();

    grid.alter(AlterAction::RemoveRow, 0, 2).expect("remove");
    assert_eq!(firsts(&grid.visual_data()), vec!["c", "d"]);
    let Some(Command::RowRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a row removal");
    };
    assert_eq!(removal.physical_indexes(), Some(vec![1, 3]));

    engine.undo().expect("undo");
    assert_eq!(grid.data(), physical_before);
    assert_eq!(firsts(&grid.visual_data()), vec!["a", "b", "c", "d"]);

    engine.redo().expect("redo");
    assert_eq!(firsts(&grid.visual_data()), vec!["c", "d"]);
}

#[test]
fn row_removal_under_descending_sort_returns_each_row_to_its_slot() {
    let grid = MemoryGrid::new(["c", "a", "d", "b"].into_iter().map(|v| row([v])).collect());
    let engine = UndoRedo::new(grid.clone());
    let before = grid.snapshot_json();
    let physical_before = grid.data();

    grid.sort(&[SortColumn::descending(0)]);
    assert_eq!(firsts(&grid.visual_data()), vec!["d", "c", "b", "a"]);
    grid.alter(AlterAction::RemoveRow, 0, 2).expect("remove");
    assert_eq!(firsts(&grid.visual_data()), vec!["b", "a"]);

    let Some(Command::RowRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a row removal");
    };
    assert_eq!(firsts(removal.rows()), vec!["d", "c"]);
    assert_eq!(removal.physical_indexes(), Some(vec![0, 2]));

    engine.undo().expect("undo removal");
    assert_eq!(grid.data(), physical_before);
    assert_eq!(firsts(&grid.visual_data()), vec!["d", "c", "b", "a"]);

    engine.undo().expect("undo sort");
    assert_eq!(firsts(&grid.visual_data()), vec!["c", "a", "d", "b"]);
    assert_eq!(grid.snapshot_json(), before);
}

#[test]
fn negative_removal_index_counts_from_the_end() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());

    grid.hooks().run(undogrid_core::HookEvent::BeforeRemoveRow {
        index: -1,
        amount: 1,
    });
    let Some(Command::RowRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a row removal");
    };
    assert_eq!(removal.index(), 4);
    assert_eq!(firsts(removal.rows()), vec!["c"]);
}

#[test]
fn oversized_removal_amount_is_clamped_to_the_data() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());

    grid.hooks().run(undogrid_core::HookEvent::BeforeRemoveRow {
        index: 3,
        amount: usize::MAX,
    });
    let Some(Command::RowRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a row removal");
    };
    assert_eq!(removal.index(), 3);
    assert_eq!(firsts(removal.rows()), vec!["y", "c"]);
}

#[test]
fn row_data_insertion_round_trip() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    let rows = vec![row(["n", "2"]), row(["m", "3"])];

    grid.splice_source_rows(1, rows.clone()).expect("splice");
    engine.record(RowDataInsertion::new(1, rows).expect("rows"));
    assert_eq!(grid.count_rows(), 7);

    engine.undo().expect("undo");
    assert_eq!(firsts(&grid.data()), vec!["a", "b", "x", "y", "c"]);
    engine.redo().expect("redo");
    assert_eq!(
        firsts(&grid.data()),
        vec!["a", "n", "m", "b", "x", "y", "c"]
    );
    assert_eq!(grid.render_count(), 1);
}

// ============================================================================
// Columns
// ============================================================================

#[test]
fn column_insertion_round_trip() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    assert_round_trip(&grid, &engine, || {
        grid.alter(AlterAction::InsertCol, 2, 2).expect("insert");
    });
    assert_eq!(grid.count_cols(), 4);
    assert_eq!(grid.data_at_cell(0, 3), Some(CellValue::from("1")));
}

#[test]
fn column_removal_round_trip_with_headers() {
    let grid = MemoryGrid::with_settings(
        vec![row(["a", "b", "c"]), row(["d", "e", "f"])],
        GridSettings {
            col_headers: Some(vec!["A".into(), "B".into(), "C".into()]),
            ..GridSettings::default()
        },
    );
    let engine = UndoRedo::new(grid.clone());
    assert_round_trip(&grid, &engine, || {
        grid.alter(AlterAction::RemoveCol, 1, 1).expect("remove");
    });
    assert_eq!(grid.col_headers(), Some(vec!["A".into(), "C".into()]));

    engine.undo().expect("undo");
    assert_eq!(
        grid.col_headers(),
        Some(vec!["A".into(), "B".into(), "C".into()])
    );
    assert_eq!(grid.data_at_cell(1, 1), Some(CellValue::from("e")));
}

#[test]
fn column_removal_without_headers_leaves_them_generated() {
    let grid = MemoryGrid::new(vec![row(["a", "b", "c"])]);
    let engine = UndoRedo::new(grid.clone());
    grid.alter(AlterAction::RemoveCol, 0, 2).expect("remove");

    let Some(Command::ColumnRemoval(removal)) = engine.peek_undo() else {
        panic!("expected a column removal");
    };
    assert_eq!(removal.amount(), 2);
    assert!(removal.headers().is_none());

    engine.undo().expect("undo");
    assert_eq!(grid.col_headers(), None);
    assert_eq!(grid.data(), vec![row(["a", "b", "c"])]);
}

// ============================================================================
// View state
// ============================================================================

#[test]
fn sort_round_trip() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    assert_round_trip(&grid, &engine, || grid.sort(&[SortColumn::descending(0)]));
    assert_eq!(grid.active_sort(), vec![SortColumn::descending(0)]);
}

#[test]
fn filter_round_trip() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    assert_round_trip(&grid, &engine, || grid.filter(&[FilterColumn::new(0, "y")]));
    assert_eq!(grid.count_rows(), 1);

    engine.undo().expect("undo");
    assert!(grid.active_filter().is_empty());
    assert_eq!(grid.count_rows(), 5);
}

// ============================================================================
// Failures and asynchronous completion
// ============================================================================

#[test]
fn rejected_replay_keeps_the_entry() {
    let grid = MemoryGrid::new(letters());
    let engine = UndoRedo::new(grid.clone());
    engine.record(RowInsertion::new(40, 1));

    let err = engine.undo().expect_err("out of bounds");
    assert_eq!(
        err,
        UndoError::Grid(GridError::RowOutOfBounds { index: 40, rows: 5 })
    );
    assert!(!engine.is_replaying());
    assert_eq!(engine.undo_depth(), 1);
    assert!(!engine.is_redo_available());
}

fn abc() -> Vec<Row> {
    ["a", "b", "c"].into_iter().map(|v| row([v])).collect()
}

#[test]
fn composite_failing_on_its_first_step_leaves_the_grid_alone() {
    let grid = MemoryGrid::new(abc());
    let engine = UndoRedo::new(grid.clone());
    engine.set_collecting(true);
    grid.alter(AlterAction::InsertRow, 0, 1).expect("insert");
    engine.record(RowInsertion::new(40, 1));
    engine.set_collecting(false);
    assert_eq!(engine.next_undo_kind(), Some("composite"));
    let after = grid.data();

    for _ in 0..2 {
        let err = engine.undo().expect_err("out of bounds");
        assert_eq!(
            err,
            UndoError::Grid(GridError::RowOutOfBounds { index: 40, rows: 4 })
        );
        assert_eq!(grid.data(), after);
        assert_eq!(engine.undo_depth(), 1);
        assert!(!engine.is_redo_available());
    }
}

#[test]
fn composite_failing_midway_splits_off_the_replayed_members() {
    let grid = MemoryGrid::new(abc());
    let engine = UndoRedo::new(grid.clone());
    engine.set_collecting(true);
    engine.record(RowInsertion::new(40, 1));
    grid.alter(AlterAction::InsertRow, 0, 1).expect("insert");
    engine.set_collecting(false);
    let after = grid.data();
    assert_eq!(engine.undo_depth(), 1);

    let err = engine.undo().expect_err("older member is out of bounds");
    assert_eq!(
        err,
        UndoError::Grid(GridError::RowOutOfBounds { index: 40, rows: 3 })
    );
    assert_eq!(grid.data(), abc());
    assert!(!engine.is_replaying());
    assert_eq!(engine.undo_depth(), 1);
    assert_eq!(engine.next_undo_kind(), Some("row_insertion"));
    assert_eq!(engine.redo_depth(), 1);

    engine.undo().expect_err("still out of bounds");
    assert_eq!(grid.data(), abc(), "a failed retry must not remove rows");

    engine.redo().expect("redo");
    assert_eq!(grid.data(), after);
    assert_eq!(engine.undo_depth(), 2);
    assert!(!engine.is_redo_available());
}

#[test]
fn snapshot_of_empty_data_is_not_recorded() {
    let grid = MemoryGrid::new(Vec::new());
    let engine = UndoRedo::new(grid.clone());
    grid.hooks().run(undogrid_core::HookEvent::BeforeRemoveRow {
        index: 0,
        amount: 1,
    });
    assert!(!engine.is_undo_available());
}

#[test]
fn deferred_composite_waits_for_each_change() {
    let grid = MemoryGrid::new(vec![row(["a", "b"])]);
    let engine = UndoRedo::new(grid.clone());
    engine.set_collecting(true);
    grid.set_data_at_cell(0, 0, "x");
    grid.set_data_at_cell(0, 1, "y");
    engine.set_collecting(false);

    grid.set_deferred(true);
    engine.undo().expect("undo");
    assert!(engine.is_replaying());
    assert_eq!(grid.data_at_cell(0, 1), Some(CellValue::from("b")));
    assert_eq!(
        grid.data_at_cell(0, 0),
        Some(CellValue::from("x")),
        "second member waits for the first AfterChange"
    );

    assert_eq!(grid.flush_deferred(), 3);
    assert!(!engine.is_replaying());
    assert_eq!(grid.data_at_cell(0, 0), Some(CellValue::from("a")));
    assert_eq!(engine.redo_depth(), 1);

    grid.set_deferred(false);
    engine.redo().expect("redo");
    assert_eq!(grid.data(), vec![row(["x", "y"])]);
}
