#![forbid(unsafe_code)]

//! undogrid public facade crate.
//!
//! Re-exports the grid collaborator surface from `undogrid-core` and the
//! undo engine from `undogrid-runtime`, plus a prelude for day-to-day use.
//!
//! ```rust,ignore
//! use undogrid::prelude::*;
//!
//! let plugin = UndoRedoPlugin::install(grid.clone());
//! grid.set_data_at_cell(0, 0, "edited");
//! plugin.undo()?;
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use undogrid_core::{
    AlterAction, CellChange, CellEdit, CellValue, ChangeSource, FilterColumn, Grid, GridError,
    GridResult, GridSettings, HistoryKind, Hook, HookBus, HookEvent, HookId, Row, SortColumn, row,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use undogrid_runtime::{
    Command, ConfigError, Priority, SharedGrid, UndoConfig, UndoError, UndoRedo, UndoRedoPlugin,
};

#[cfg(feature = "harness")]
pub use undogrid_harness::MemoryGrid;

// --- Errors ---------------------------------------------------------------

/// Top-level error type for undogrid hosts.
#[derive(Debug)]
pub enum Error {
    /// A grid rejected a structural operation.
    Grid(GridError),
    /// Building or replaying a history entry failed.
    #[cfg(feature = "runtime")]
    Undo(UndoError),
    /// Loading the undo configuration failed.
    #[cfg(feature = "runtime")]
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Undo(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Undo(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Config(err) => Some(err),
        }
    }
}

impl From<GridError> for Error {
    fn from(err: GridError) -> Self {
        Self::Grid(err)
    }
}

#[cfg(feature = "runtime")]
impl From<UndoError> for Error {
    fn from(err: UndoError) -> Self {
        Self::Undo(err)
    }
}

#[cfg(feature = "runtime")]
impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Standard result type for undogrid APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        AlterAction, CellValue, ChangeSource, Error, Grid, GridSettings, Hook, HookEvent, Result,
        row,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{UndoConfig, UndoRedo, UndoRedoPlugin};

    pub use crate::core;
    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use undogrid_core as core;
#[cfg(feature = "runtime")]
pub use undogrid_runtime as runtime;
