#![forbid(unsafe_code)]

//! Episode detection from bracketed hook notifications.
//!
//! The grid wraps every hook in a `BeforeHook(name)` / `AfterHook(name)`
//! pair. [`HookInterceptor`] watches those pairs for the hooks that produce
//! history entries and decides when a user-visible edit starts and when it
//! is over, so everything recorded in between can be replayed as one step.
//!
//! The interceptor is a plain state machine. It does not own the action
//! queue; each call returns a [`Transition`] telling the caller whether to
//! start collecting, open a new bucket, or flush.
//!
//! # State
//!
//! - `open`: recognised hooks entered and not yet matched by an exit.
//! - `pending_close`: exits seen out of order, waiting for their open entry
//!   to reach the top.
//! - `chain`: follow-up hooks an entered hook obliges to come. Entering
//!   `BeforeChange` pushes `AfterChange`, keeping the episode open across
//!   the gap between the two brackets.
//!
//! An episode starts on an enter while both `open` and `chain` are empty,
//! and ends on the exit that leaves them both empty again.

use tracing::trace;
use undogrid_core::Hook;

/// Hooks whose brackets delimit episodes.
pub const RECOGNISED_HOOKS: [Hook; 9] = [
    Hook::AfterChange,
    Hook::AfterCreateRow,
    Hook::BeforeRemoveRow,
    Hook::AfterCreateCol,
    Hook::BeforeRemoveCol,
    Hook::AfterFilter,
    Hook::AfterColumnSort,
    Hook::BeforeChange,
    Hook::ManualCollection,
];

/// Whether brackets of `hook` take part in episode detection.
#[must_use]
pub fn is_recognised(hook: Hook) -> bool {
    RECOGNISED_HOOKS.contains(&hook)
}

/// The hook that must follow `hook` before an episode can end.
#[must_use]
pub const fn chained_hook(hook: Hook) -> Option<Hook> {
    match hook {
        Hook::BeforeChange => Some(Hook::AfterChange),
        _ => None,
    }
}

/// What the caller should do after an enter or exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    /// Collection started with this enter.
    pub started: bool,
    /// A bracket closed; start a new bucket.
    pub boundary: bool,
    /// The episode is over; flush the collected actions.
    pub finished: bool,
}

/// Tracks open brackets and decides episode boundaries.
#[derive(Debug, Default)]
pub struct HookInterceptor {
    open: Vec<Hook>,
    pending_close: Vec<Hook>,
    chain: Vec<Hook>,
    collecting: bool,
}

impl HookInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an episode is currently collecting.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Whether no bracket is open and no follow-up hook is owed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.open.is_empty() && self.chain.is_empty()
    }

    /// Number of recognised brackets currently open.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Handle `BeforeHook(hook)`.
    pub fn enter(&mut self, hook: Hook) -> Transition {
        let mut transition = Transition::default();
        if !is_recognised(hook) {
            return transition;
        }

        if self.is_idle() {
            self.collecting = true;
            transition.started = true;
        }

        self.open.push(hook);
        if self.chain.last() == Some(&hook) {
            self.chain.pop();
        }
        if let Some(next) = chained_hook(hook) {
            self.chain.push(next);
        }

        trace!(
            hook = hook.as_str(),
            open = self.open.len(),
            chain = self.chain.len(),
            "interceptor enter"
        );
        transition
    }

    /// Handle `AfterHook(hook)`.
    pub fn exit(&mut self, hook: Hook) -> Transition {
        let mut transition = Transition::default();
        if !is_recognised(hook) {
            return transition;
        }

        if self.open.is_empty() {
            trace!(hook = hook.as_str(), "interceptor exit without open entry");
            return transition;
        }

        if self.open.last() == Some(&hook) {
            self.open.pop();
            transition.boundary = true;
        } else {
            self.pending_close.push(hook);
        }
        while let (Some(closing), Some(opened)) = (self.pending_close.last(), self.open.last()) {
            if closing != opened {
                break;
            }
            self.pending_close.pop();
            self.open.pop();
            transition.boundary = true;
        }

        if self.is_idle() {
            self.pending_close.clear();
            transition.finished = std::mem::take(&mut self.collecting);
        }

        trace!(
            hook = hook.as_str(),
            open = self.open.len(),
            pending = self.pending_close.len(),
            chain = self.chain.len(),
            "interceptor exit"
        );
        transition
    }

    /// Forget every open bracket and stop collecting.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_hooks_are_ignored() {
        let mut icp = HookInterceptor::new();
        assert_eq!(icp.enter(Hook::AfterRender), Transition::default());
        assert_eq!(icp.exit(Hook::AfterRender), Transition::default());
        assert!(!icp.is_collecting());
        assert!(icp.is_idle());
    }

    #[test]
    fn single_bracket_is_one_episode() {
        let mut icp = HookInterceptor::new();
        let t = icp.enter(Hook::AfterCreateRow);
        assert!(t.started);
        assert!(icp.is_collecting());

        let t = icp.exit(Hook::AfterCreateRow);
        assert!(t.boundary);
        assert!(t.finished);
        assert!(!icp.is_collecting());
    }

    #[test]
    fn before_change_keeps_episode_open_until_after_change() {
        let mut icp = HookInterceptor::new();
        assert!(icp.enter(Hook::BeforeChange).started);
        let t = icp.exit(Hook::BeforeChange);
        assert!(t.boundary);
        assert!(!t.finished);
        assert!(icp.is_collecting());

        // Padding rows arrive between the two halves of the chain.
        assert!(!icp.enter(Hook::AfterCreateRow).started);
        assert!(!icp.exit(Hook::AfterCreateRow).finished);

        assert!(!icp.enter(Hook::AfterChange).started);
        let t = icp.exit(Hook::AfterChange);
        assert!(t.finished);
        assert!(icp.is_idle());
    }

    #[test]
    fn nested_brackets_finish_on_outermost_exit() {
        let mut icp = HookInterceptor::new();
        icp.enter(Hook::ManualCollection);
        icp.enter(Hook::AfterChange);
        let t = icp.exit(Hook::AfterChange);
        assert!(t.boundary);
        assert!(!t.finished);

        assert!(icp.exit(Hook::ManualCollection).finished);
    }

    #[test]
    fn out_of_order_exit_waits_for_its_entry() {
        let mut icp = HookInterceptor::new();
        icp.enter(Hook::AfterCreateRow);
        icp.enter(Hook::AfterChange);

        let t = icp.exit(Hook::AfterCreateRow);
        assert!(!t.boundary);
        assert!(!t.finished);
        assert_eq!(icp.depth(), 2);

        let t = icp.exit(Hook::AfterChange);
        assert!(t.boundary);
        assert!(t.finished);
        assert_eq!(icp.depth(), 0);
    }

    #[test]
    fn exit_without_enter_does_not_flush() {
        let mut icp = HookInterceptor::new();
        let t = icp.exit(Hook::AfterFilter);
        assert!(!t.finished);
        assert!(!t.boundary);
        assert!(icp.is_idle());
    }

    #[test]
    fn stray_exit_between_chain_halves_is_ignored() {
        let mut icp = HookInterceptor::new();
        icp.enter(Hook::BeforeChange);
        icp.exit(Hook::BeforeChange);

        assert_eq!(icp.exit(Hook::AfterFilter), Transition::default());
        assert!(icp.is_collecting());

        icp.enter(Hook::AfterChange);
        assert!(icp.exit(Hook::AfterChange).finished);
    }

    #[test]
    fn reset_drops_open_episode() {
        let mut icp = HookInterceptor::new();
        icp.enter(Hook::BeforeChange);
        icp.reset();
        assert!(icp.is_idle());
        assert!(!icp.is_collecting());
        assert!(icp.enter(Hook::AfterChange).started);
    }

    #[test]
    fn chain_table() {
        assert_eq!(chained_hook(Hook::BeforeChange), Some(Hook::AfterChange));
        assert_eq!(chained_hook(Hook::AfterChange), None);
        assert!(is_recognised(Hook::ManualCollection));
        assert!(!is_recognised(Hook::AfterRemoveRow));
    }
}
