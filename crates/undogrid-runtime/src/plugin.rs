#![forbid(unsafe_code)]

//! Grid plugin wrapping the undo engine.
//!
//! [`UndoRedoPlugin`] owns the engine's lifecycle on one grid:
//!
//! - On install, `AfterInit` and `AfterUpdateSettings` it attaches or
//!   detaches the engine to match `GridSettings::undo`.
//! - While attached it clears history when the grid reports a whole-data
//!   load (`AfterChange` with [`ChangeSource::LoadData`]).
//! - [`UndoRedoPlugin::pause`] hides the public operations without
//!   detaching. Recording continues underneath.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use undogrid_core::{ChangeSource, HistoryKind, Hook, HookEvent, HookId};

use crate::config::UndoConfig;
use crate::undo::{SharedGrid, UndoError, UndoRedo};

#[derive(Default)]
struct PluginState {
    engine: Option<UndoRedo>,
    paused: bool,
    load_listener: Option<HookId>,
}

struct PluginShared {
    grid: SharedGrid,
    config: UndoConfig,
    state: RefCell<PluginState>,
    lifecycle: RefCell<Vec<HookId>>,
}

impl Drop for PluginShared {
    fn drop(&mut self) {
        let bus = self.grid.hooks();
        for id in self.lifecycle.get_mut().drain(..) {
            bus.remove(id);
        }
        if let Some(id) = self.state.get_mut().load_listener.take() {
            bus.remove(id);
        }
    }
}

/// Undo/redo as a pluggable grid feature.
pub struct UndoRedoPlugin {
    shared: Rc<PluginShared>,
}

impl fmt::Debug for UndoRedoPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("UndoRedoPlugin")
            .field("enabled", &state.engine.is_some())
            .field("paused", &state.paused)
            .finish()
    }
}

impl UndoRedoPlugin {
    /// Install on `grid` with the default configuration.
    #[must_use]
    pub fn install(grid: SharedGrid) -> Self {
        Self::install_with_config(grid, UndoConfig::default())
    }

    /// Install on `grid`, attaching right away if the grid's settings
    /// enable undo.
    #[must_use]
    pub fn install_with_config(grid: SharedGrid, config: UndoConfig) -> Self {
        let shared = Rc::new(PluginShared {
            grid,
            config,
            state: RefCell::new(PluginState::default()),
            lifecycle: RefCell::new(Vec::new()),
        });

        let ids = [Hook::AfterInit, Hook::AfterUpdateSettings]
            .into_iter()
            .map(|hook| {
                let weak: Weak<PluginShared> = Rc::downgrade(&shared);
                shared.grid.hooks().add(hook, move |_| {
                    if let Some(shared) = weak.upgrade() {
                        PluginShared::sync(&shared);
                    }
                })
            })
            .collect();
        *shared.lifecycle.borrow_mut() = ids;

        PluginShared::sync(&shared);
        Self { shared }
    }

    /// Whether the engine is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.state.borrow().engine.is_some()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.borrow().paused
    }

    /// The exposed engine: `None` while detached or paused.
    #[must_use]
    pub fn api(&self) -> Option<UndoRedo> {
        let state = self.shared.state.borrow();
        if state.paused {
            return None;
        }
        state.engine.clone()
    }

    /// The attached engine, paused or not.
    #[must_use]
    pub fn engine(&self) -> Option<UndoRedo> {
        self.shared.state.borrow().engine.clone()
    }

    pub fn undo(&self) -> Result<(), UndoError> {
        self.api().map_or(Ok(()), |engine| engine.undo())
    }

    pub fn redo(&self) -> Result<(), UndoError> {
        self.api().map_or(Ok(()), |engine| engine.redo())
    }

    #[must_use]
    pub fn is_undo_available(&self) -> bool {
        self.api().is_some_and(|engine| engine.is_undo_available())
    }

    #[must_use]
    pub fn is_redo_available(&self) -> bool {
        self.api().is_some_and(|engine| engine.is_redo_available())
    }

    pub fn clear(&self) {
        if let Some(engine) = self.api() {
            engine.clear();
        }
    }

    pub fn set_collecting(&self, collecting: bool) {
        if let Some(engine) = self.api() {
            engine.set_collecting(collecting);
        }
    }

    /// Hide (`true`) or re-expose (`false`) the public operations.
    ///
    /// Pausing also stops clearing on data loads and announces both stacks
    /// as unavailable; resuming announces the real availability.
    pub fn pause(&self, paused: bool) {
        let (engine, stale) = {
            let mut state = self.shared.state.borrow_mut();
            let Some(engine) = state.engine.clone() else {
                return;
            };
            if state.paused == paused {
                return;
            }
            state.paused = paused;
            let stale = if paused {
                state.load_listener.take()
            } else {
                None
            };
            (engine, stale)
        };

        debug!(paused, "undo pause toggled");
        let bus = self.shared.grid.hooks();
        if paused {
            if let Some(id) = stale {
                bus.remove(id);
            }
            for kind in [HistoryKind::Undo, HistoryKind::Redo] {
                bus.run(HookEvent::UndoRedoState {
                    kind,
                    available: false,
                });
            }
        } else {
            let id = PluginShared::listen_for_loads(&self.shared);
            self.shared.state.borrow_mut().load_listener = Some(id);
            engine.announce();
        }
    }
}

impl PluginShared {
    /// Attach or detach to match the grid's current settings.
    fn sync(this: &Rc<Self>) {
        let enabled = this.grid.settings().undo_enabled();
        let attached = this.state.borrow().engine.is_some();

        match (enabled, attached) {
            (true, false) => {
                let engine = UndoRedo::with_config(Rc::clone(&this.grid), this.config.clone());
                let listener = Self::listen_for_loads(this);
                let mut state = this.state.borrow_mut();
                state.engine = Some(engine);
                state.paused = false;
                state.load_listener = Some(listener);
                debug!("undo plugin enabled");
            }
            (false, true) => {
                let (engine, listener) = {
                    let mut state = this.state.borrow_mut();
                    state.paused = false;
                    (state.engine.take(), state.load_listener.take())
                };
                if let Some(id) = listener {
                    this.grid.hooks().remove(id);
                }
                drop(engine);
                debug!("undo plugin disabled");
            }
            _ => {}
        }
    }

    fn listen_for_loads(this: &Rc<Self>) -> HookId {
        let weak: Weak<Self> = Rc::downgrade(this);
        this.grid.hooks().add(Hook::AfterChange, move |event| {
            let HookEvent::AfterChange {
                source: ChangeSource::LoadData,
                ..
            } = event
            else {
                return;
            };
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if !shared.config.clear_on_load {
                return;
            }
            let engine = shared.state.borrow().engine.clone();
            if let Some(engine) = engine {
                debug!("data loaded; clearing undo history");
                engine.clear();
            }
        })
    }
}
