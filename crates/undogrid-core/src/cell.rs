#![forbid(unsafe_code)]

//! Cell values and change records exchanged between a grid and its listeners.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The value stored in one grid cell.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CellValue {
    /// No value (null).
    #[default]
    Empty,
    /// Boolean cell.
    Bool(bool),
    /// Numeric cell.
    Number(f64),
    /// Text cell.
    Text(String),
}

impl CellValue {
    /// Whether the cell holds no value.
    ///
    /// Empty strings count as empty, matching how spare-row padding decides
    /// whether a trailing row is still unused.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Text view of the value, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Empty, Into::into)
    }
}

/// One row of source data.
pub type Row = Vec<CellValue>;

/// Build a row from anything convertible into cell values.
pub fn row<I, T>(values: I) -> Row
where
    I: IntoIterator<Item = T>,
    T: Into<CellValue>,
{
    values.into_iter().map(Into::into).collect()
}

/// A value that was written to a cell, with the value it replaced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellChange {
    /// Visual row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
    /// Value before the write.
    pub old: CellValue,
    /// Value after the write.
    pub new: CellValue,
}

impl CellChange {
    /// Create a change record.
    pub fn new(
        row: usize,
        col: usize,
        old: impl Into<CellValue>,
        new: impl Into<CellValue>,
    ) -> Self {
        Self {
            row,
            col,
            old: old.into(),
            new: new.into(),
        }
    }

    /// The edit that puts the previous value back.
    #[must_use]
    pub fn revert_edit(&self) -> CellEdit {
        CellEdit::new(self.row, self.col, self.old.clone())
    }

    /// The edit that applies the new value again.
    #[must_use]
    pub fn apply_edit(&self) -> CellEdit {
        CellEdit::new(self.row, self.col, self.new.clone())
    }
}

/// A single write request against the grid.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellEdit {
    /// Visual row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
    /// Value to write.
    pub value: CellValue,
}

impl CellEdit {
    /// Create a write request.
    pub fn new(row: usize, col: usize, value: impl Into<CellValue>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// Origin tag attached to a batch of cell writes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChangeSource {
    /// Direct user edit.
    #[default]
    Edit,
    /// Paste from the clipboard.
    Paste,
    /// Drag-fill.
    Autofill,
    /// Whole-data replacement.
    LoadData,
    /// Written by an undo replay.
    Undo,
    /// Written by a redo replay.
    Redo,
    /// Any other producer.
    Other(String),
}
