#![forbid(unsafe_code)]

//! undogrid core types.
//!
//! The vocabulary shared by the undo runtime and any host grid:
//!
//! - [`cell`]: cell values, change records, write origins
//! - [`hooks`]: the named-hook notification bus a grid runs its events on
//! - [`grid`]: the [`Grid`] collaborator trait and its settings/errors

pub mod cell;
pub mod grid;
pub mod hooks;

pub use cell::{CellChange, CellEdit, CellValue, ChangeSource, Row, row};
pub use grid::{
    AlterAction, FilterColumn, Grid, GridError, GridResult, GridSettings, SortColumn,
};
pub use hooks::{HistoryKind, Hook, HookBus, HookEvent, HookId};
