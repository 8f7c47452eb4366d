#![forbid(unsafe_code)]

//! Seams to the outside world: the host tree and the batch scheduler.
//!
//! The engine never touches a host tree directly. Instances are created during
//! the complete phase (detached) and attached to the live tree only during
//! commit, so an abandoned render pass needs no host cleanup.

use std::fmt;

use crate::element::Props;

/// Primitive operations on a host tree.
pub trait Host {
    /// Handle to a host node. Cloned freely; must identify the same node.
    type Instance: Clone + fmt::Debug + 'static;

    fn create_instance(&mut self, tag: &str, props: &Props) -> Self::Instance;

    fn create_text_instance(&mut self, content: &str) -> Self::Instance;

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached.
    fn append_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Insert `child` into `parent` immediately before `before`, moving it if
    /// it is already attached.
    fn insert_before(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    );

    fn remove_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Apply changed attributes. Children are reconciled separately.
    fn update_instance(&mut self, instance: &Self::Instance, old: &Props, new: &Props);

    fn update_text(&mut self, instance: &Self::Instance, content: &str);
}

/// Deferred unit of work handed to a [`BatchScheduler`].
pub type Task = Box<dyn FnOnce()>;

/// "Run this later, possibly batched with everything else scheduled in the
/// same tick." A microtask queue is the canonical implementation.
pub trait BatchScheduler {
    fn schedule_batch(&self, task: Task);
}
