#![forbid(unsafe_code)]

//! Undo history configuration.
//!
//! [`UndoConfig`] collects the engine's tunables in one plain struct that
//! can be built in code or, with the `config` feature, loaded from TOML or
//! JSON.
//!
//! ```toml
//! # undogrid.toml
//! max_depth = 200
//! clear_on_load = false
//! default_priority = "high"
//! ```
//!
//! ```rust,ignore
//! let config = UndoConfig::from_toml_file("undogrid.toml")?;
//! ```
//!
//! Whether undo is attached at all is a host setting
//! (`GridSettings::undo`), not part of this struct.

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::undo::Priority;

/// Tunables for the undo engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct UndoConfig {
    /// Maximum number of entries on the undo stack. The oldest entry is
    /// evicted first. `usize::MAX` keeps everything.
    pub max_depth: usize,
    /// Clear history when the grid reports a whole-data load.
    pub clear_on_load: bool,
    /// Priority for commands recorded without an explicit one.
    pub default_priority: Priority,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_depth: usize::MAX,
            clear_on_load: true,
            default_priority: Priority::Normal,
        }
    }
}

impl UndoConfig {
    /// Config with unlimited depth.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the maximum undo depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether a data load clears history.
    #[must_use]
    pub fn with_clear_on_load(mut self, clear: bool) -> Self {
        self.clear_on_load = clear;
        self
    }

    /// Set the priority used by [`UndoRedo::record`](crate::UndoRedo::record).
    #[must_use]
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Check the parameters. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_depth == 0 {
            errors.push("max_depth must be > 0".into());
        }
        errors
    }

    /// Validate and return `self`, or the collected errors.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load from a TOML string.
    #[cfg(feature = "config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Self>(s)
            .map_err(ConfigError::Toml)?
            .validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Self>(s)
            .map_err(ConfigError::Json)?
            .validated()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when loading an [`UndoConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config")]
    Toml(toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
