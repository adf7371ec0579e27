#![forbid(unsafe_code)]

//! Undo/redo for tabular grids.
//!
//! The engine listens to a grid's hook bus, snapshots every reversible
//! change into a [`Command`], and groups the commands produced by one user
//! gesture into a single history entry.
//!
//! # Architecture
//!
//! ```text
//!  grid hooks ──► BeforeHook/AfterHook ──► HookInterceptor ── boundaries ─┐
//!       │                                                                 ▼
//!       └──────► AfterChange, BeforeRemoveRow, ... ──► Command ──► ActionQueue
//!                                                                         │
//!                                        episode over: flush (bare or     │
//!                                        Composite) ◄─────────────────────┘
//!                                               │
//!                                               ▼
//!                              ┌────────────────────────────────┐
//!                              │ UndoRedo                       │
//!                              │   done  [c1 c2 c3] ── undo() ─►│
//!                              │   undone [c5 c4]  ◄── redo() ──│
//!                              └────────────────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - [`action_queue`]: priority buckets collecting one episode
//! - [`interceptor`]: bracket tracking and episode boundaries
//! - [`completion`]: single-threaded completion signals for replay
//! - [`command`]: the closed set of history entries and their replay
//! - [`history`]: the engine tying it together
//!
//! # Design Notes
//!
//! ## Why replays return completions
//!
//! Several replays finish only when the grid later reports back through a
//! hook (`AfterChange`, `AfterRender`). Recording stays suspended until the
//! completion settles, so hooks triggered by the replay itself never enter
//! history.

pub mod action_queue;
pub mod command;
pub mod completion;
pub mod history;
pub mod interceptor;

pub use action_queue::{ActionBucket, ActionQueue, Priority};
pub use command::{
    ChangeSet, ColumnInsertion, ColumnRemoval, Command, Composite, Direction, FilterRevert,
    RowDataInsertion, RowInsertion, RowRemoval, SharedGrid, SortRevert, UndoError,
};
pub use completion::{Completion, ReplayResult, Resolver};
pub use history::UndoRedo;
pub use interceptor::{HookInterceptor, RECOGNISED_HOOKS, Transition};
