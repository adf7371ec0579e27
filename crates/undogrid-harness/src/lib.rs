#![forbid(unsafe_code)]

//! Reference host grid for exercising undogrid.
//!
//! [`MemoryGrid`] keeps its rows in a `Vec`, runs every hook through an
//! [`undogrid_core::HookBus`] the way a real grid would, and supports the
//! features the undo engine has to cope with: sorting and filtering
//! (visual-to-physical row mapping), spare-row/column padding, explicit
//! column headers, and a deferred mode that holds `AfterChange` and
//! `AfterRender` back until [`MemoryGrid::flush_deferred`].

pub mod memory_grid;

pub use memory_grid::MemoryGrid;
