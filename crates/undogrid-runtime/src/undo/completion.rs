#![forbid(unsafe_code)]

//! Single-threaded completion signals for replay steps.
//!
//! Some replays finish synchronously (re-applying a filter), others only
//! when the grid later runs a hook (`AfterChange`, `AfterRender`). Every
//! command therefore returns a [`Completion`]: a shared slot that settles
//! exactly once with `Ok(())` or an [`UndoError`], and runs its waiters when
//! it does.
//!
//! There is no executor. Waiters run inline, either immediately (when the
//! completion has already settled) or from inside [`Resolver::resolve`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use undogrid_core::{Hook, HookBus, HookId};

use super::command::UndoError;

/// Outcome of one replay step.
pub type ReplayResult = Result<(), UndoError>;

type Waiter = Box<dyn FnOnce(ReplayResult)>;

#[derive(Default)]
struct Slot {
    outcome: Option<ReplayResult>,
    waiters: Vec<Waiter>,
}

/// Handle to a replay step that settles once.
#[derive(Clone)]
pub struct Completion {
    slot: Rc<RefCell<Slot>>,
}

/// The write side of a pending [`Completion`].
pub struct Resolver {
    slot: Rc<RefCell<Slot>>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Completion")
            .field("outcome", &slot.outcome)
            .field("waiters", &slot.waiters.len())
            .finish()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Completion {
    fn settled(outcome: ReplayResult) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                outcome: Some(outcome),
                waiters: Vec::new(),
            })),
        }
    }

    /// An already successful completion.
    #[must_use]
    pub fn ready() -> Self {
        Self::settled(Ok(()))
    }

    /// An already failed completion.
    #[must_use]
    pub fn failed(error: impl Into<UndoError>) -> Self {
        Self::settled(Err(error.into()))
    }

    /// A completion settled later through the returned [`Resolver`].
    #[must_use]
    pub fn pending() -> (Self, Resolver) {
        let slot = Rc::new(RefCell::new(Slot::default()));
        (
            Self {
                slot: Rc::clone(&slot),
            },
            Resolver { slot },
        )
    }

    /// A completion that settles on the next delivery of `hook` on `bus`.
    ///
    /// Returns the listener id so a caller that fails before the hook runs
    /// can unregister it.
    pub fn next_hook(bus: &HookBus, hook: Hook) -> (Self, HookId) {
        let (completion, resolver) = Self::pending();
        let id = bus.once(hook, move |_| resolver.resolve(Ok(())));
        (completion, id)
    }

    /// The outcome, if settled.
    #[must_use]
    pub fn outcome(&self) -> Option<ReplayResult> {
        self.slot.borrow().outcome.clone()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    /// Run `waiter` with the outcome once settled (immediately if it is).
    pub fn on_settled(&self, waiter: impl FnOnce(ReplayResult) + 'static) {
        let outcome = {
            let mut slot = self.slot.borrow_mut();
            match &slot.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    slot.waiters.push(Box::new(waiter));
                    return;
                }
            }
        };
        waiter(outcome);
    }

    /// Start `next` after this completion succeeds.
    ///
    /// A failure skips `next` and is passed through.
    #[must_use]
    pub fn then(self, next: impl FnOnce() -> Completion + 'static) -> Completion {
        let (chained, resolver) = Self::pending();
        self.on_settled(move |outcome| match outcome {
            Ok(()) => next().on_settled(move |outcome| resolver.resolve(outcome)),
            Err(err) => resolver.resolve(Err(err)),
        });
        chained
    }

    /// Settle when every completion in `items` has settled.
    ///
    /// Fails with the first error observed, after all items are done.
    #[must_use]
    pub fn all(items: Vec<Completion>) -> Completion {
        if items.is_empty() {
            return Self::ready();
        }

        let (joined, resolver) = Self::pending();
        let join = Rc::new(RefCell::new(Join {
            remaining: items.len(),
            error: None,
            resolver: Some(resolver),
        }));
        for item in items {
            let join = Rc::clone(&join);
            item.on_settled(move |outcome| {
                let done = {
                    let mut join = join.borrow_mut();
                    join.remaining -= 1;
                    if let Err(err) = outcome {
                        join.error.get_or_insert(err);
                    }
                    if join.remaining == 0 {
                        let error = join.error.take();
                        join.resolver.take().map(|r| (r, error))
                    } else {
                        None
                    }
                };
                if let Some((resolver, error)) = done {
                    resolver.resolve(error.map_or(Ok(()), Err));
                }
            });
        }
        joined
    }
}

struct Join {
    remaining: usize,
    error: Option<UndoError>,
    resolver: Option<Resolver>,
}

impl Resolver {
    /// Settle the completion and run its waiters in registration order.
    pub fn resolve(self, outcome: ReplayResult) {
        let waiters = {
            let mut slot = self.slot.borrow_mut();
            if slot.outcome.is_some() {
                return;
            }
            slot.outcome = Some(outcome.clone());
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters {
            waiter(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use undogrid_core::{GridError, HookEvent};

    fn failure() -> UndoError {
        UndoError::Grid(GridError::Rejected("no".into()))
    }

    #[test]
    fn ready_runs_waiter_immediately() {
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        Completion::ready().on_settled(move |r| h.set(r.is_ok()));
        assert!(hit.get());
    }

    #[test]
    fn pending_runs_waiters_on_resolve() {
        let (c, resolver) = Completion::pending();
        let hits = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let h = Rc::clone(&hits);
            c.on_settled(move |_| h.set(h.get() + 1));
        }
        assert!(!c.is_settled());
        assert_eq!(hits.get(), 0);

        resolver.resolve(Ok(()));
        assert_eq!(hits.get(), 2);
        assert_eq!(c.outcome(), Some(Ok(())));
    }

    #[test]
    fn then_sequences_and_skips_on_error() {
        let (first, resolver) = Completion::pending();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let chained = first.then(move || {
            r.set(true);
            Completion::ready()
        });
        assert!(!ran.get());
        resolver.resolve(Ok(()));
        assert!(ran.get());
        assert_eq!(chained.outcome(), Some(Ok(())));

        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let chained = Completion::failed(failure()).then(move || {
            r.set(true);
            Completion::ready()
        });
        assert!(!ran.get());
        assert_eq!(chained.outcome(), Some(Err(failure())));
    }

    #[test]
    fn all_waits_for_every_item() {
        let (a, ra) = Completion::pending();
        let (b, rb) = Completion::pending();
        let joined = Completion::all(vec![a, Completion::ready(), b]);

        rb.resolve(Ok(()));
        assert!(!joined.is_settled());
        ra.resolve(Err(failure()));
        assert_eq!(joined.outcome(), Some(Err(failure())));
    }

    #[test]
    fn all_of_nothing_is_ready() {
        assert_eq!(Completion::all(Vec::new()).outcome(), Some(Ok(())));
    }

    #[test]
    fn next_hook_settles_on_delivery() {
        let bus = HookBus::new();
        let (c, _id) = Completion::next_hook(&bus, Hook::AfterRender);
        bus.run(HookEvent::AfterInit);
        assert!(!c.is_settled());
        bus.run(HookEvent::AfterRender);
        assert!(c.is_settled());
    }

    #[test]
    fn next_hook_listener_can_be_withdrawn() {
        let bus = HookBus::new();
        let (c, id) = Completion::next_hook(&bus, Hook::AfterRender);
        assert!(bus.remove(id));
        bus.run(HookEvent::AfterRender);
        assert!(!c.is_settled());
    }
}
