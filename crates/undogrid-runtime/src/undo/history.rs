#![forbid(unsafe_code)]

//! The undo/redo engine.
//!
//! [`UndoRedo`] attaches to a grid's hook bus, turns the grid's hooks into
//! [`Command`]s, groups them into episodes, and replays them on demand.
//!
//! # Invariants
//!
//! 1. Nothing is recorded while a replay is pending (`replaying`).
//! 2. Recording outside an episode clears the redo stack.
//! 3. `done.len() <= config.max_depth` after every push.
//! 4. At most one replay is in flight; `undo`/`redo` during a pending
//!    replay are no-ops.
//!
//! # State flow
//!
//! ```text
//! record(c5)
//!   done:   [c1, c2, c3, c4, c5]    undone: []
//!
//! undo() x2
//!   done:   [c1, c2, c3]            undone: [c5, c4]
//!
//! record(c6)   <-- new branch, clears undone
//!   done:   [c1, c2, c3, c6]        undone: []
//! ```
//!
//! # Re-entrancy
//!
//! The engine is reached from hook handlers through a `Weak` reference.
//! No borrow of engine state is held while calling into the grid or
//! running a hook, so replays may trigger hooks that re-enter the engine.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, error, warn};
use undogrid_core::{HistoryKind, Hook, HookEvent, HookId};

use super::action_queue::{ActionQueue, Priority};
use super::command::{
    ChangeSet, ColumnInsertion, ColumnRemoval, Command, Direction, FilterRevert, RowInsertion,
    RowRemoval, SharedGrid, SortRevert, UndoError,
};
use super::completion::ReplayResult;
use super::interceptor::HookInterceptor;
use crate::config::UndoConfig;

/// Hooks whose payload becomes a history entry.
const CAPTURED_HOOKS: [Hook; 7] = [
    Hook::AfterChange,
    Hook::AfterCreateRow,
    Hook::BeforeRemoveRow,
    Hook::AfterCreateCol,
    Hook::BeforeRemoveCol,
    Hook::AfterFilter,
    Hook::AfterColumnSort,
];

impl Direction {
    const fn source(self) -> HistoryKind {
        match self {
            Self::Undo => HistoryKind::Undo,
            Self::Redo => HistoryKind::Redo,
        }
    }

    const fn target(self) -> HistoryKind {
        match self {
            Self::Undo => HistoryKind::Redo,
            Self::Redo => HistoryKind::Undo,
        }
    }
}

struct EngineState {
    /// Newest at the back.
    done: VecDeque<Command>,
    /// Newest at the back.
    undone: Vec<Command>,
    replaying: bool,
    interceptor: HookInterceptor,
    queue: ActionQueue<Command>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            done: VecDeque::new(),
            undone: Vec::new(),
            replaying: false,
            interceptor: HookInterceptor::new(),
            queue: ActionQueue::new(),
        }
    }

    fn available(&self, kind: HistoryKind) -> bool {
        match kind {
            HistoryKind::Undo => !self.done.is_empty(),
            HistoryKind::Redo => !self.undone.is_empty(),
        }
    }

    fn push_done(&mut self, command: Command, max_depth: usize) {
        self.done.push_back(command);
        while self.done.len() > max_depth {
            if let Some(evicted) = self.done.pop_front() {
                debug!(command = evicted.kind(), "evicted oldest undo entry");
            }
        }
    }

    /// Push a command replayed in `direction` onto the opposite stack.
    fn land(&mut self, direction: Direction, command: Command, max_depth: usize) {
        match direction {
            Direction::Undo => self.undone.push(command),
            Direction::Redo => self.push_done(command, max_depth),
        }
    }
}

struct EngineInner {
    grid: SharedGrid,
    config: UndoConfig,
    state: RefCell<EngineState>,
    listeners: RefCell<Vec<HookId>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let bus = self.grid.hooks();
        for id in self.listeners.get_mut().drain(..) {
            bus.remove(id);
        }
    }
}

/// Undo/redo history attached to one grid.
///
/// Cloning yields another handle to the same engine. The engine detaches
/// from the grid when the last handle is dropped.
#[derive(Clone)]
pub struct UndoRedo {
    inner: Rc<EngineInner>,
}

impl fmt::Debug for UndoRedo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("UndoRedo")
            .field("undo_depth", &state.done.len())
            .field("redo_depth", &state.undone.len())
            .field("replaying", &state.replaying)
            .field("collecting", &state.interceptor.is_collecting())
            .finish()
    }
}

impl UndoRedo {
    /// Attach to `grid` with the default configuration.
    #[must_use]
    pub fn new(grid: SharedGrid) -> Self {
        Self::with_config(grid, UndoConfig::default())
    }

    /// Attach to `grid`.
    #[must_use]
    pub fn with_config(grid: SharedGrid, config: UndoConfig) -> Self {
        let inner = Rc::new(EngineInner {
            grid,
            config,
            state: RefCell::new(EngineState::new()),
            listeners: RefCell::new(Vec::new()),
        });
        EngineInner::attach(&inner);
        Self { inner }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Revert the newest entry. No-op when there is nothing to undo.
    ///
    /// Returns an error only when the replay failed before returning; a
    /// failure reported later is logged and the entry stays undoable.
    pub fn undo(&self) -> Result<(), UndoError> {
        self.inner.replay(Direction::Undo)
    }

    /// Re-apply the newest undone entry. No-op when there is nothing to redo.
    pub fn redo(&self) -> Result<(), UndoError> {
        self.inner.replay(Direction::Redo)
    }

    /// Record a command with the configured default priority.
    pub fn record(&self, command: impl Into<Command>) {
        self.inner
            .record(command.into(), self.inner.config.default_priority);
    }

    /// Record a command with an explicit priority inside an episode.
    pub fn record_with_priority(&self, command: impl Into<Command>, priority: Priority) {
        self.inner.record(command.into(), priority);
    }

    /// Open (`true`) or close (`false`) a manual episode.
    pub fn set_collecting(&self, collecting: bool) {
        if collecting {
            self.inner.enter(Hook::ManualCollection);
        } else {
            self.inner.exit(Hook::ManualCollection);
        }
    }

    /// Drop all history and any open episode.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.done.clear();
            state.undone.clear();
            state.interceptor.reset();
            state.queue.clear();
        }
        debug!("undo history cleared");
        self.inner.emit(HistoryKind::Undo, false);
        self.inner.emit(HistoryKind::Redo, false);
    }

    /// Emit the current availability of both stacks.
    pub fn announce(&self) {
        self.inner.emit_availability(HistoryKind::Undo);
        self.inner.emit_availability(HistoryKind::Redo);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn is_undo_available(&self) -> bool {
        self.inner.state.borrow().available(HistoryKind::Undo)
    }

    #[must_use]
    pub fn is_redo_available(&self) -> bool {
        self.inner.state.borrow().available(HistoryKind::Redo)
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.inner.state.borrow().done.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.inner.state.borrow().undone.len()
    }

    /// Kind label of the entry the next undo would revert.
    #[must_use]
    pub fn next_undo_kind(&self) -> Option<&'static str> {
        self.inner.state.borrow().done.back().map(Command::kind)
    }

    /// Kind label of the entry the next redo would re-apply.
    #[must_use]
    pub fn next_redo_kind(&self) -> Option<&'static str> {
        self.inner.state.borrow().undone.last().map(Command::kind)
    }

    /// Descriptions of the newest undo entries, newest first.
    #[must_use]
    pub fn undo_descriptions(&self, limit: usize) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .done
            .iter()
            .rev()
            .take(limit)
            .map(Command::description)
            .collect()
    }

    /// Clone of the newest undo entry.
    #[must_use]
    pub fn peek_undo(&self) -> Option<Command> {
        self.inner.state.borrow().done.back().cloned()
    }

    /// Whether an episode is collecting.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.inner.state.borrow().interceptor.is_collecting()
    }

    /// Whether a replay is in flight.
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.inner.state.borrow().replaying
    }

    #[must_use]
    pub fn config(&self) -> &UndoConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn grid(&self) -> &SharedGrid {
        &self.inner.grid
    }
}

impl EngineInner {
    fn attach(this: &Rc<Self>) {
        let mut ids = vec![
            Self::listen(this, Hook::BeforeHook, |engine, event| {
                if let HookEvent::BeforeHook(hook) = event {
                    engine.enter(*hook);
                }
            }),
            Self::listen(this, Hook::AfterHook, |engine, event| {
                if let HookEvent::AfterHook(hook) = event {
                    engine.exit(*hook);
                }
            }),
        ];
        for hook in CAPTURED_HOOKS {
            ids.push(Self::listen(this, hook, Self::capture));
        }
        debug!(listeners = ids.len(), "undo engine attached");
        *this.listeners.borrow_mut() = ids;
    }

    fn listen(this: &Rc<Self>, hook: Hook, handler: fn(&Self, &HookEvent)) -> HookId {
        let weak: Weak<Self> = Rc::downgrade(this);
        this.grid.hooks().add(hook, move |event| {
            if let Some(engine) = weak.upgrade() {
                handler(&engine, event);
            }
        })
    }

    fn is_replaying(&self) -> bool {
        self.state.borrow().replaying
    }

    // ------------------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------------------

    fn enter(&self, hook: Hook) {
        let mut state = self.state.borrow_mut();
        if state.replaying {
            return;
        }
        if state.interceptor.enter(hook).started {
            debug!(hook = hook.as_str(), "undo episode started");
        }
    }

    fn exit(&self, hook: Hook) {
        let items = {
            let mut state = self.state.borrow_mut();
            if state.replaying {
                return;
            }
            let transition = state.interceptor.exit(hook);
            if transition.boundary {
                state.queue.new_bucket();
            }
            if !transition.finished {
                return;
            }
            state.queue.drain()
        };

        let count = items.len();
        match Command::group(items) {
            Some(command) => {
                debug!(
                    hook = hook.as_str(),
                    items = count,
                    command = command.kind(),
                    "undo episode flushed"
                );
                self.record(command, self.config.default_priority);
            }
            None => debug!(hook = hook.as_str(), "undo episode ended empty"),
        }
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    fn capture(&self, event: &HookEvent) {
        if self.is_replaying() {
            return;
        }
        match self.snapshot(event) {
            Ok(Some(command)) => self.record(command, self.config.default_priority),
            Ok(None) => {}
            Err(err) => {
                error!(hook = event.hook().as_str(), %err, "undo snapshot rejected");
            }
        }
    }

    /// Build the command for a captured hook, if it produces one.
    fn snapshot(&self, event: &HookEvent) -> Result<Option<Command>, UndoError> {
        let grid = &*self.grid;
        let command = match event {
            HookEvent::AfterChange { changes, .. } => {
                if changes.is_empty() {
                    return Ok(None);
                }
                ChangeSet::new(changes.clone())?.into()
            }
            HookEvent::AfterCreateRow {
                index,
                amount,
                automatic,
            } => {
                if *automatic {
                    return Ok(None);
                }
                RowInsertion::new(*index, *amount).into()
            }
            HookEvent::BeforeRemoveRow { index, amount } => {
                let data = grid.data();
                if data.is_empty() {
                    return Err(UndoError::MalformedCommand("row removal from empty data"));
                }
                let index = normalise_index(*index, data.len());
                let end = index.saturating_add(*amount).min(data.len());
                let rows = (index..end)
                    .filter_map(|row| data.get(grid.to_physical_row(row)).cloned())
                    .collect();
                RowRemoval::new(index, rows, grid)?.into()
            }
            HookEvent::AfterCreateCol {
                index,
                amount,
                automatic,
            } => {
                if *automatic {
                    return Ok(None);
                }
                ColumnInsertion::new(*index, *amount).into()
            }
            HookEvent::BeforeRemoveCol { index, amount } => {
                let cols = grid.count_cols();
                if cols == 0 {
                    return Err(UndoError::MalformedCommand("column removal from empty grid"));
                }
                let index = normalise_index(*index, cols);
                let amount = (*amount).min(cols - index);
                let cells = grid
                    .data()
                    .iter()
                    .map(|row| slice_clamped(row, index, amount))
                    .collect();
                let headers = grid
                    .col_headers()
                    .map(|labels| slice_clamped(&labels, index, amount));
                ColumnRemoval::new(index, amount, cells, headers)?.into()
            }
            HookEvent::AfterFilter { current, previous } => {
                FilterRevert::new(current.clone(), previous.clone()).into()
            }
            HookEvent::AfterColumnSort { current, previous } => {
                SortRevert::new(current.clone(), previous.clone()).into()
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    fn record(&self, command: Command, priority: Priority) {
        {
            let mut state = self.state.borrow_mut();
            if state.replaying {
                return;
            }
            if state.interceptor.is_collecting() {
                state.queue.add(command, priority);
            } else {
                debug!(
                    command = command.kind(),
                    depth = state.done.len() + 1,
                    "undo entry recorded"
                );
                state.push_done(command, self.config.max_depth);
                state.undone.clear();
            }
        }
        self.emit_availability(HistoryKind::Undo);
        self.emit_availability(HistoryKind::Redo);
    }

    // ------------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------------

    fn replay(self: &Rc<Self>, direction: Direction) -> Result<(), UndoError> {
        let command = {
            let mut state = self.state.borrow_mut();
            if state.replaying {
                debug!(
                    direction = direction.as_str(),
                    "replay already in flight; ignored"
                );
                return Ok(());
            }
            let popped = match direction {
                Direction::Undo => state.done.pop_back(),
                Direction::Redo => state.undone.pop(),
            };
            let Some(command) = popped else {
                return Ok(());
            };
            state.replaying = true;
            command
        };
        self.emit_availability(direction.source());

        let span = debug_span!(
            "undogrid.replay",
            direction = direction.as_str(),
            command = command.kind()
        );
        let _guard = span.enter();
        debug!(description = %command.description(), "replay started");

        let applied = Rc::new(Cell::new(0));
        let completion = command.replay_counted(&self.grid, direction, &applied);
        let early = completion.outcome();
        let engine = Rc::clone(self);
        completion.on_settled(move |result| {
            engine.finish_replay(direction, command, result, applied.get());
        });

        match early {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Move the replayed entry to its target stack.
    ///
    /// A failed composite is split: the `applied` members that did replay
    /// move to the target stack, the rest go back where they came from.
    fn finish_replay(
        &self,
        direction: Direction,
        command: Command,
        result: ReplayResult,
        applied: usize,
    ) {
        let failed = {
            let mut state = self.state.borrow_mut();
            state.replaying = false;
            match result {
                Ok(()) => {
                    state.land(direction, command, self.config.max_depth);
                    None
                }
                Err(err) => {
                    let (replayed, remaining) = match command {
                        Command::Composite(group) => group.split_replayed(direction, applied),
                        other => (None, Some(other)),
                    };
                    if let Some(replayed) = replayed {
                        state.land(direction, replayed, self.config.max_depth);
                    }
                    if let Some(remaining) = remaining {
                        match direction {
                            Direction::Undo => state.done.push_back(remaining),
                            Direction::Redo => state.undone.push(remaining),
                        }
                    }
                    Some(err)
                }
            }
        };

        match failed {
            None => {
                debug!(direction = direction.as_str(), "replay finished");
                self.emit_availability(direction.target());
            }
            Some(err) => {
                warn!(direction = direction.as_str(), %err, "replay failed; entry kept");
                self.emit_availability(HistoryKind::Undo);
                self.emit_availability(HistoryKind::Redo);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    fn emit_availability(&self, kind: HistoryKind) {
        let available = self.state.borrow().available(kind);
        self.emit(kind, available);
    }

    fn emit(&self, kind: HistoryKind, available: bool) {
        self.grid
            .hooks()
            .run(HookEvent::UndoRedoState { kind, available });
    }
}

/// Map a possibly negative index into `0..len`.
fn normalise_index(index: isize, len: usize) -> usize {
    let len = isize::try_from(len).unwrap_or(isize::MAX);
    // rem_euclid with a positive modulus is never negative.
    usize::try_from(index.rem_euclid(len)).unwrap_or(0)
}

fn slice_clamped<T: Clone>(items: &[T], start: usize, amount: usize) -> Vec<T> {
    let start = start.min(items.len());
    let end = start.saturating_add(amount).min(items.len());
    items[start..end].to_vec()
}
