#![forbid(unsafe_code)]

//! Property tests for [`UndoRedo`] history invariants.
//!
//! Validates:
//! - Random edit/undo/redo sequences always leave the grid equal to the
//!   model state at the current history position.
//! - Undo is available iff recorded entries outnumber undos; redo is
//!   available iff an undo has not been overwritten by a new edit.
//! - A full undo run restores the initial data, a full redo run the final.
//! - The depth limit is never exceeded.

use proptest::prelude::*;

use undogrid_core::{Grid, Row, row};
use undogrid_harness::MemoryGrid;
use undogrid_runtime::{UndoConfig, UndoRedo};

const ROWS: usize = 3;
const COLS: usize = 3;

// ============================================================================
// Strategy helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Edit(usize, usize, &'static str),
    Undo,
    Redo,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..ROWS, 0..COLS, prop::sample::select(vec!["p", "q", "r", ""]))
            .prop_map(|(r, c, v)| Op::Edit(r, c, v)),
        2 => Just(Op::Undo),
        2 => Just(Op::Redo),
    ]
}

fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=max_len)
}

fn initial() -> Vec<Row> {
    (0..ROWS)
        .map(|r| row((0..COLS).map(|c| format!("{r}{c}"))))
        .collect()
}

/// Linear history of whole-grid states with a cursor, as the engine
/// should see it.
struct Model {
    states: Vec<Vec<Row>>,
    cursor: usize,
}

impl Model {
    fn new(start: Vec<Row>) -> Self {
        Self {
            states: vec![start],
            cursor: 0,
        }
    }

    fn edit(&mut self, r: usize, c: usize, value: &str) {
        let mut next = self.states[self.cursor].clone();
        next[r][c] = value.into();
        self.states.truncate(self.cursor + 1);
        self.states.push(next);
        self.cursor += 1;
    }

    fn undo(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn redo(&mut self) {
        if self.cursor + 1 < self.states.len() {
            self.cursor += 1;
        }
    }

    fn current(&self) -> &[Row] {
        &self.states[self.cursor]
    }
}

// ============================================================================
// Invariant 1: grid tracks the model at every step
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn grid_matches_model_after_every_op(ops in ops_strategy(40)) {
        let grid = MemoryGrid::new(initial());
        let engine = UndoRedo::new(grid.clone());
        let mut model = Model::new(initial());

        for op in ops {
            match op {
                Op::Edit(r, c, v) => {
                    grid.set_data_at_cell(r, c, v);
                    model.edit(r, c, v);
                }
                Op::Undo => {
                    engine.undo().expect("undo");
                    model.undo();
                }
                Op::Redo => {
                    engine.redo().expect("redo");
                    model.redo();
                }
            }
            prop_assert_eq!(grid.data(), model.current().to_vec());
            prop_assert_eq!(engine.is_undo_available(), model.cursor > 0);
            prop_assert_eq!(
                engine.is_redo_available(),
                model.cursor + 1 < model.states.len()
            );
            prop_assert!(!engine.is_replaying());
        }
    }
}

// ============================================================================
// Invariant 2: undo all / redo all
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn undo_all_then_redo_all_round_trips(
        edits in prop::collection::vec((0..ROWS, 0..COLS, "[a-z]{1,3}"), 1..30)
    ) {
        let grid = MemoryGrid::new(initial());
        let engine = UndoRedo::new(grid.clone());
        for (r, c, v) in &edits {
            grid.set_data_at_cell(*r, *c, v.as_str());
        }
        let last = grid.data();
        prop_assert_eq!(engine.undo_depth(), edits.len());

        while engine.is_undo_available() {
            engine.undo().expect("undo");
        }
        prop_assert_eq!(grid.data(), initial());
        prop_assert_eq!(engine.redo_depth(), edits.len());

        while engine.is_redo_available() {
            engine.redo().expect("redo");
        }
        prop_assert_eq!(grid.data(), last);
    }
}

// ============================================================================
// Invariant 3: depth limit
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn depth_never_exceeds_limit(
        limit in 1usize..8,
        ops in ops_strategy(60),
    ) {
        let grid = MemoryGrid::new(initial());
        let engine = UndoRedo::with_config(
            grid.clone(),
            UndoConfig::default().with_max_depth(limit),
        );

        for op in ops {
            match op {
                Op::Edit(r, c, v) => grid.set_data_at_cell(r, c, v),
                Op::Undo => engine.undo().expect("undo"),
                Op::Redo => engine.redo().expect("redo"),
            }
            prop_assert!(engine.undo_depth() <= limit);
        }
    }
}
