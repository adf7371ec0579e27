#![forbid(unsafe_code)]

//! undogrid runtime
//!
//! The undo/redo engine and the plugin that wires it to a grid.
//!
//! # Key Components
//!
//! - [`UndoRedo`] - history engine: records, groups, and replays changes
//! - [`UndoRedoPlugin`] - attaches/detaches the engine per grid settings,
//!   pauses it, and clears it on data loads
//! - [`Command`] - the closed set of replayable history entries
//! - [`UndoConfig`] - depth limit, load behaviour, default priority
//!
//! # How it fits
//! A host grid implements [`undogrid_core::Grid`] and runs its hooks on an
//! [`undogrid_core::HookBus`]. Nothing here stores grid data; every change
//! is observed through hooks and replayed through the trait.

pub mod config;
pub mod plugin;
pub mod undo;

pub use config::{ConfigError, UndoConfig};
pub use plugin::UndoRedoPlugin;
pub use undo::{
    Command, Completion, Direction, Priority, ReplayResult, SharedGrid, UndoError, UndoRedo,
};
