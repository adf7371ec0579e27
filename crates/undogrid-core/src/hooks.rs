#![forbid(unsafe_code)]

//! Named-hook notification bus.
//!
//! A grid announces everything that happens to it through a [`HookBus`].
//! Listeners register for one [`Hook`] either persistently ([`HookBus::add`])
//! or for a single delivery ([`HookBus::once`]).
//!
//! Every event emitted through [`HookBus::run`] is bracketed by a
//! [`HookEvent::BeforeHook`] / [`HookEvent::AfterHook`] pair carrying the
//! event's name. Because handlers may trigger further hooks, brackets nest,
//! and a listener on the bracket pair sees the full shape of a burst.
//!
//! # Re-entrancy
//!
//! Handlers are collected before they are called and no borrow of the bus
//! is held while a handler runs, so handlers may emit, add or remove hooks
//! freely. Handlers added while an event is being delivered do not receive
//! that event. A `once` handler is unregistered before it is invoked.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::cell::{CellChange, CellEdit, ChangeSource};
use crate::grid::{FilterColumn, SortColumn};

/// Names of the hooks a grid can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Opening bracket around another hook.
    BeforeHook,
    /// Closing bracket around another hook.
    AfterHook,
    /// The grid finished initialising.
    AfterInit,
    /// Grid settings were replaced.
    AfterUpdateSettings,
    /// Cell writes are about to be applied.
    BeforeChange,
    /// Cell writes were applied.
    AfterChange,
    /// Rows were inserted.
    AfterCreateRow,
    /// Rows are about to be removed.
    BeforeRemoveRow,
    /// Rows were removed.
    AfterRemoveRow,
    /// Columns were inserted.
    AfterCreateCol,
    /// Columns are about to be removed.
    BeforeRemoveCol,
    /// Columns were removed.
    AfterRemoveCol,
    /// A filter was applied.
    AfterFilter,
    /// A column sort was applied.
    AfterColumnSort,
    /// The grid finished a render pass.
    AfterRender,
    /// Undo or redo availability changed.
    UndoRedoState,
    /// Pseudo-operation for manually delimited edit batches. Never run on
    /// the bus; it only appears as a bracket name.
    ManualCollection,
}

impl Hook {
    /// Stable camel-case name, as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeHook => "beforeHook",
            Self::AfterHook => "afterHook",
            Self::AfterInit => "afterInit",
            Self::AfterUpdateSettings => "afterUpdateSettings",
            Self::BeforeChange => "beforeChange",
            Self::AfterChange => "afterChange",
            Self::AfterCreateRow => "afterCreateRow",
            Self::BeforeRemoveRow => "beforeRemoveRow",
            Self::AfterRemoveRow => "afterRemoveRow",
            Self::AfterCreateCol => "afterCreateCol",
            Self::BeforeRemoveCol => "beforeRemoveCol",
            Self::AfterRemoveCol => "afterRemoveCol",
            Self::AfterFilter => "afterFilter",
            Self::AfterColumnSort => "afterColumnSort",
            Self::AfterRender => "afterRender",
            Self::UndoRedoState => "undoRedoState",
            Self::ManualCollection => "_manualCollection",
        }
    }

    /// Whether this hook is one of the bracket notifications.
    #[must_use]
    pub const fn is_bracket(self) -> bool {
        matches!(self, Self::BeforeHook | Self::AfterHook)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which history an [`HookEvent::UndoRedoState`] notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryKind {
    /// The done stack.
    Undo,
    /// The undone stack.
    Redo,
}

/// A hook invocation with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    BeforeHook(Hook),
    AfterHook(Hook),
    AfterInit,
    AfterUpdateSettings,
    BeforeChange {
        edits: Vec<CellEdit>,
        source: ChangeSource,
    },
    AfterChange {
        changes: Vec<CellChange>,
        source: ChangeSource,
    },
    AfterCreateRow {
        index: usize,
        amount: usize,
        /// Padding rows added by the grid itself.
        automatic: bool,
    },
    /// `index` may be negative, counting from the end.
    BeforeRemoveRow {
        index: isize,
        amount: usize,
    },
    AfterRemoveRow {
        index: usize,
        amount: usize,
    },
    AfterCreateCol {
        index: usize,
        amount: usize,
        automatic: bool,
    },
    /// `index` may be negative, counting from the end.
    BeforeRemoveCol {
        index: isize,
        amount: usize,
    },
    AfterRemoveCol {
        index: usize,
        amount: usize,
    },
    AfterFilter {
        current: Vec<FilterColumn>,
        previous: Vec<FilterColumn>,
    },
    AfterColumnSort {
        current: Vec<SortColumn>,
        previous: Vec<SortColumn>,
    },
    AfterRender,
    UndoRedoState {
        kind: HistoryKind,
        available: bool,
    },
}

impl HookEvent {
    /// The hook this event is delivered to.
    #[must_use]
    pub fn hook(&self) -> Hook {
        match self {
            Self::BeforeHook(_) => Hook::BeforeHook,
            Self::AfterHook(_) => Hook::AfterHook,
            Self::AfterInit => Hook::AfterInit,
            Self::AfterUpdateSettings => Hook::AfterUpdateSettings,
            Self::BeforeChange { .. } => Hook::BeforeChange,
            Self::AfterChange { .. } => Hook::AfterChange,
            Self::AfterCreateRow { .. } => Hook::AfterCreateRow,
            Self::BeforeRemoveRow { .. } => Hook::BeforeRemoveRow,
            Self::AfterRemoveRow { .. } => Hook::AfterRemoveRow,
            Self::AfterCreateCol { .. } => Hook::AfterCreateCol,
            Self::BeforeRemoveCol { .. } => Hook::BeforeRemoveCol,
            Self::AfterRemoveCol { .. } => Hook::AfterRemoveCol,
            Self::AfterFilter { .. } => Hook::AfterFilter,
            Self::AfterColumnSort { .. } => Hook::AfterColumnSort,
            Self::AfterRender => Hook::AfterRender,
            Self::UndoRedoState { .. } => Hook::UndoRedoState,
        }
    }
}

/// Handle returned on registration, used to remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl HookId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

type PersistentFn = Rc<dyn Fn(&HookEvent)>;
type OnceFn = Box<dyn FnOnce(&HookEvent)>;

enum Handler {
    Persistent(PersistentFn),
    Once(OnceFn),
}

struct Entry {
    id: HookId,
    hook: Hook,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Registry of hook handlers for one grid instance.
#[derive(Default)]
pub struct HookBus {
    inner: RefCell<BusInner>,
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("HookBus")
            .field("handlers", &inner.entries.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}

impl HookBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler that runs on every delivery of `hook`.
    pub fn add(&self, hook: Hook, handler: impl Fn(&HookEvent) + 'static) -> HookId {
        self.register(hook, Handler::Persistent(Rc::new(handler)))
    }

    /// Register a handler that runs on the next delivery of `hook` only.
    pub fn once(&self, hook: Hook, handler: impl FnOnce(&HookEvent) + 'static) -> HookId {
        self.register(hook, Handler::Once(Box::new(handler)))
    }

    /// Unregister a handler. Returns `false` if it was already gone.
    pub fn remove(&self, id: HookId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != id);
        inner.entries.len() != before
    }

    /// Number of handlers currently registered for `hook`.
    #[must_use]
    pub fn handler_count(&self, hook: Hook) -> usize {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|e| e.hook == hook)
            .count()
    }

    /// Run a hook, bracketed by `BeforeHook`/`AfterHook` notifications.
    ///
    /// Bracket events passed in directly are delivered without a further
    /// bracket.
    pub fn run(&self, event: HookEvent) {
        let hook = event.hook();
        if hook.is_bracket() {
            self.deliver(&event);
            return;
        }
        self.deliver(&HookEvent::BeforeHook(hook));
        self.deliver(&event);
        self.deliver(&HookEvent::AfterHook(hook));
    }

    fn register(&self, hook: Hook, handler: Handler) -> HookId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = HookId(inner.next_id);
        inner.entries.push(Entry { id, hook, handler });
        id
    }

    fn deliver(&self, event: &HookEvent) {
        let hook = event.hook();
        let ready = self.take_ready(hook);
        trace!(hook = hook.as_str(), handlers = ready.len(), "hook delivered");
        for handler in ready {
            match handler {
                Handler::Persistent(f) => f(event),
                Handler::Once(f) => f(event),
            }
        }
    }

    /// Snapshot the handlers for `hook`, detaching the `once` ones.
    fn take_ready(&self, hook: Hook) -> Vec<Handler> {
        let mut inner = self.inner.borrow_mut();
        let mut ready = Vec::new();
        let mut kept = Vec::with_capacity(inner.entries.len());
        for entry in inner.entries.drain(..) {
            if entry.hook != hook {
                kept.push(entry);
                continue;
            }
            match entry.handler {
                Handler::Persistent(f) => {
                    ready.push(Handler::Persistent(Rc::clone(&f)));
                    kept.push(Entry {
                        id: entry.id,
                        hook: entry.hook,
                        handler: Handler::Persistent(f),
                    });
                }
                Handler::Once(f) => ready.push(Handler::Once(f)),
            }
        }
        inner.entries = kept;
        ready
    }
}
