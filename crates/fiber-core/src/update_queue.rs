#![forbid(unsafe_code)]

//! Pending state transitions tagged with a priority lane.
//!
//! Every stateful cell (the root element, each `use_state` hook) owns a
//! [`SharedQueue`]. Both generations of a work node point at the same queue,
//! so an update enqueued while a render pass is in flight is never lost.
//!
//! # Invariants
//!
//! 1. Enqueue is O(1) and preserves insertion order.
//! 2. [`process_update_queue`] applies exactly the updates whose lane is part
//!    of the render lanes, in order.
//! 3. Skipped updates are retained: the first skipped update fixes the next
//!    base state, and it and every later update form the next base queue.
//!    An update that was applied but follows a skipped one is kept with the
//!    empty lane so the rebase re-applies it on top of the skipped one.
//! 4. [`discard_lanes`] never removes an update tagged with the empty lane.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::lane::{Lane, Lanes, NO_LANE, is_subset_of_lanes, merge_lanes};

/// How an update computes the next state.
pub enum Action<S> {
    /// Replace the state outright.
    Replace(S),
    /// Compute the next state from the accumulated one.
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(value) => Self::Replace(value.clone()),
            Self::Reduce(f) => Self::Reduce(Rc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(_) => f.write_str("Action::Replace"),
            Self::Reduce(_) => f.write_str("Action::Reduce"),
        }
    }
}

impl<S: Clone> Action<S> {
    /// Apply the action to `state`.
    #[must_use]
    pub fn apply(&self, state: &S) -> S {
        match self {
            Self::Replace(value) => value.clone(),
            Self::Reduce(f) => f(state),
        }
    }
}

/// A state transition and its priority.
#[derive(Debug)]
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lane,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

/// Build an update.
#[must_use]
pub fn create_update<S>(action: Action<S>, lane: Lane) -> Update<S> {
    Update { action, lane }
}

/// FIFO of updates not yet folded into any render pass.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    pending: VecDeque<Update<S>>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<S> UpdateQueue<S> {
    /// Number of pending updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Union of the lanes of all pending updates.
    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.pending
            .iter()
            .fold(NO_LANE, |acc, u| merge_lanes(acc, u.lane))
    }

    /// Detach every pending update, leaving the queue empty.
    pub fn take_pending(&mut self) -> VecDeque<Update<S>> {
        std::mem::take(&mut self.pending)
    }
}

/// Queue shared by both generations of a node and by its dispatchers.
pub type SharedQueue<S> = Rc<RefCell<UpdateQueue<S>>>;

/// Create an empty shared queue.
#[must_use]
pub fn create_update_queue<S>() -> SharedQueue<S> {
    Rc::new(RefCell::new(UpdateQueue::default()))
}

/// Append `update` to `queue`.
pub fn enqueue_update<S>(queue: &SharedQueue<S>, update: Update<S>) {
    queue.borrow_mut().pending.push_back(update);
}

/// Remove the updates tagged with any of `lanes` from a base queue.
///
/// Updates re-tagged with the empty lane were already applied by a committed
/// pass and are kept. Returns the number of updates removed.
pub fn discard_lanes<S>(queue: &mut Vec<Update<S>>, lanes: Lanes) -> usize {
    let before = queue.len();
    queue.retain(|u| u.lane.is_empty() || !u.lane.intersects(lanes));
    before - queue.len()
}

/// Result of folding a queue for one render pass.
#[derive(Debug)]
pub struct ProcessedUpdates<S> {
    /// State to expose to this render.
    pub memoized_state: S,
    /// State future passes rebase from.
    pub base_state: S,
    /// Updates future passes must re-apply on top of `base_state`.
    pub base_queue: Vec<Update<S>>,
    /// Lanes of the updates that were skipped.
    pub skipped_lanes: Lanes,
}

/// Fold `updates` on top of `base_state`, applying only updates whose lane is
/// part of `render_lanes`.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    updates: impl IntoIterator<Item = Update<S>>,
    render_lanes: Lanes,
) -> ProcessedUpdates<S> {
    let mut state = base_state;
    let mut rebase_from: Option<S> = None;
    let mut base_queue = Vec::new();
    let mut skipped_lanes = NO_LANE;

    for update in updates {
        if !is_subset_of_lanes(render_lanes, update.lane) {
            if rebase_from.is_none() {
                rebase_from = Some(state.clone());
            }
            skipped_lanes = merge_lanes(skipped_lanes, update.lane);
            base_queue.push(update);
            continue;
        }
        if rebase_from.is_some() {
            base_queue.push(Update {
                action: update.action.clone(),
                lane: NO_LANE,
            });
        }
        state = update.action.apply(&state);
    }

    let base_state = match rebase_from {
        Some(s) => s,
        None => state.clone(),
    };
    ProcessedUpdates {
        memoized_state: state,
        base_state,
        base_queue,
        skipped_lanes,
    }
}
