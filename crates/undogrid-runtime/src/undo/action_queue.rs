#![forbid(unsafe_code)]

//! Episode collector: priority buckets grouped into one replayable unit.
//!
//! While an edit episode is open, every command that would normally land in
//! history is parked here instead. The queue is a list of
//! [`ActionBucket`]s; the interceptor asks for a new bucket whenever a
//! sub-burst of hooks closes, so unrelated sibling operations inside one
//! episode keep their own ordering group.
//!
//! # Flattening order
//!
//! ```text
//! buckets:   [ b0 ]            [ b1 ]
//! lanes:     low normal high   low normal high
//! items:     -   c1 c2   c3    c5  c4    -
//!
//! flattened: c1 c2 c3 c5 c4
//! ```
//!
//! Buckets in list order, lanes low to high, items in insertion order.
//!
//! # Invariants
//!
//! 1. The list always holds at least one bucket; the last is current.
//! 2. A new bucket is appended only when the current one is non-empty.
//! 3. `len()` equals the sum of all bucket counts.

use std::fmt;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Ordering rank of a collected item inside its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    const LANES: usize = 3;

    const fn lane(self) -> usize {
        self as usize
    }
}

/// Items collected during one sub-span of an episode.
pub struct ActionBucket<T> {
    lanes: [Vec<T>; Priority::LANES],
    count: usize,
}

impl<T> Default for ActionBucket<T> {
    fn default() -> Self {
        Self {
            lanes: [Vec::new(), Vec::new(), Vec::new()],
            count: 0,
        }
    }
}

impl<T> fmt::Debug for ActionBucket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBucket")
            .field("low", &self.lanes[0].len())
            .field("normal", &self.lanes[1].len())
            .field("high", &self.lanes[2].len())
            .finish()
    }
}

impl<T> ActionBucket<T> {
    /// Add an item to the lane for `priority`.
    pub fn add(&mut self, item: T, priority: Priority) {
        self.lanes[priority.lane()].push(item);
        self.count += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn drain_into(self, out: &mut Vec<T>) {
        for lane in self.lanes {
            out.extend(lane);
        }
    }
}

/// Ordered list of buckets making up the current episode.
pub struct ActionQueue<T> {
    buckets: Vec<ActionBucket<T>>,
    count: usize,
}

impl<T> Default for ActionQueue<T> {
    fn default() -> Self {
        Self {
            buckets: vec![ActionBucket::default()],
            count: 0,
        }
    }
}

impl<T> fmt::Debug for ActionQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("buckets", &self.buckets.len())
            .field("count", &self.count)
            .finish()
    }
}

impl<T> ActionQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current bucket, unless it is still empty.
    pub fn new_bucket(&mut self) {
        if self.current().is_empty() {
            return;
        }
        self.buckets.push(ActionBucket::default());
    }

    /// Add an item to the current bucket.
    pub fn add(&mut self, item: T, priority: Priority) {
        self.current_mut().add(item, priority);
        self.count += 1;
    }

    /// Total items across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of buckets, including the current one.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop everything and start over with one empty bucket.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Take every item in flattened order and reset the queue.
    pub fn drain(&mut self) -> Vec<T> {
        let buckets = std::mem::take(&mut self.buckets);
        let mut items = Vec::with_capacity(self.count);
        for bucket in buckets {
            bucket.drain_into(&mut items);
        }
        self.clear();
        items
    }

    fn current(&self) -> &ActionBucket<T> {
        // Invariant 1: never empty.
        &self.buckets[self.buckets.len() - 1]
    }

    fn current_mut(&mut self) -> &mut ActionBucket<T> {
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_empty_bucket() {
        let queue: ActionQueue<u8> = ActionQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.bucket_count(), 1);
    }

    #[test]
    fn empty_bucket_is_reused() {
        let mut queue: ActionQueue<u8> = ActionQueue::new();
        queue.new_bucket();
        queue.new_bucket();
        assert_eq!(queue.bucket_count(), 1);

        queue.add(1, Priority::Normal);
        queue.new_bucket();
        queue.new_bucket();
        assert_eq!(queue.bucket_count(), 2);
    }

    #[test]
    fn drain_orders_by_bucket_then_lane() {
        let mut queue = ActionQueue::new();
        queue.add("c1", Priority::Normal);
        queue.add("c3", Priority::High);
        queue.add("c0", Priority::Low);
        queue.add("c2", Priority::Normal);
        queue.new_bucket();
        queue.add("c5", Priority::Normal);
        queue.add("c4", Priority::Low);

        assert_eq!(queue.len(), 6);
        assert_eq!(queue.drain(), vec!["c0", "c1", "c2", "c3", "c4", "c5"]);
    }

    #[test]
    fn drain_resets() {
        let mut queue = ActionQueue::new();
        queue.add(1, Priority::Normal);
        queue.new_bucket();
        queue.add(2, Priority::Normal);
        let _ = queue.drain();

        assert!(queue.is_empty());
        assert_eq!(queue.bucket_count(), 1);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn clear_discards_items() {
        let mut queue = ActionQueue::new();
        queue.add(1, Priority::High);
        queue.clear();
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::Low < Priority::High);
    }
}
