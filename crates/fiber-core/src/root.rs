#![forbid(unsafe_code)]

//! Public handle to a reconciler root.

use std::fmt;
use std::rc::Rc;

use crate::commit_work::CommitReport;
use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::fiber::FiberTree;
use crate::host::{BatchScheduler, Host};
use crate::lane::{Lane, Lanes};
use crate::update_queue::{Action, create_update, enqueue_update};
use crate::work_loop::{ExecutionStatus, RenderStats, RootInner};

/// A reconciler root bound to one host container.
///
/// Cloning yields another handle to the same root.
pub struct Root<H: Host + 'static> {
    inner: Rc<RootInner<H>>,
}

impl<H: Host + 'static> Clone for Root<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host + 'static> fmt::Debug for Root<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("container", &self.inner.container)
            .field("status", &self.inner.status.get())
            .field("pending_lanes", &self.inner.pending_lanes.get())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}

/// Create a root rendering into `container` with the default configuration.
pub fn create_root<H: Host + 'static>(
    host: H,
    container: H::Instance,
    scheduler: Rc<dyn BatchScheduler>,
) -> Root<H> {
    create_root_with_config(host, container, scheduler, ReconcilerConfig::default())
}

pub fn create_root_with_config<H: Host + 'static>(
    host: H,
    container: H::Instance,
    scheduler: Rc<dyn BatchScheduler>,
    config: ReconcilerConfig,
) -> Root<H> {
    tracing::debug!(?container, ?config, "root created");
    let inner = Rc::new_cyclic(|this| RootInner::new(this, host, container, scheduler, config));
    Root { inner }
}

impl<H: Host + 'static> Root<H> {
    /// Replace the root's element. The render runs in the next sync batch.
    pub fn render(&self, element: impl Into<Node>) {
        let update = create_update(Action::Replace(element.into()), Lanes::SYNC);
        enqueue_update(&self.inner.root_queue, update);
        self.inner.mark_root_updated(Lanes::SYNC);
        self.inner.ensure_root_is_scheduled();
    }

    /// Render nothing, deleting every host node the root created.
    pub fn unmount(&self) {
        self.render(Node::Empty);
    }

    /// Run `f` with state updates tagged `lane`.
    pub fn with_priority<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> R {
        let previous = self.inner.update_priority.replace(lane);
        let _restore = RestorePriority {
            cell: &self.inner.update_priority,
            previous,
        };
        f()
    }

    /// Render and commit pending synchronous work now instead of waiting for
    /// the scheduled batch.
    pub fn flush_sync(&self) {
        self.inner.flush_sync_callbacks();
    }

    /// Run pending passive effects now. Returns whether any ran.
    pub fn flush_passive_effects(&self) -> bool {
        if self.inner.status.get() != ExecutionStatus::Idle {
            return false;
        }
        self.inner.flush_passive_effects()
    }

    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.inner.stats.get()
    }

    /// Report of the most recent commit.
    #[must_use]
    pub fn last_commit(&self) -> Option<CommitReport> {
        self.inner.last_commit.borrow().clone()
    }

    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.inner.pending_lanes.get()
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.inner.status.get()
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn container(&self) -> &H::Instance {
        &self.inner.container
    }

    /// Number of fibers held by the root, both generations included.
    #[must_use]
    pub fn fiber_count(&self) -> usize {
        self.inner.tree.borrow().len()
    }

    /// Borrow the host.
    ///
    /// # Panics
    ///
    /// Panics if called while the root is committing.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&*self.inner.host.borrow())
    }

    /// Borrow the host mutably.
    ///
    /// # Panics
    ///
    /// Panics if called while the root is rendering or committing.
    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut *self.inner.host.borrow_mut())
    }

    /// Inspect the fiber tree.
    ///
    /// # Panics
    ///
    /// Panics if called while a pass is in progress.
    pub fn inspect<R>(&self, f: impl FnOnce(&FiberTree<H::Instance>) -> R) -> R {
        f(&*self.inner.tree.borrow())
    }
}

struct RestorePriority<'a> {
    cell: &'a std::cell::Cell<Lane>,
    previous: Lane,
}

impl Drop for RestorePriority<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;
    use crate::element::{Component, Element, Props};
    use crate::error::RenderError;
    use crate::hooks::Hooks;
    use crate::host::Task;

    #[derive(Default)]
    struct Tasks(RefCell<VecDeque<Task>>);

    impl BatchScheduler for Tasks {
        fn schedule_batch(&self, task: Task) {
            self.0.borrow_mut().push_back(task);
        }
    }

    impl Tasks {
        fn run(&self) {
            loop {
                let task = self.0.borrow_mut().pop_front();
                let Some(task) = task else {
                    return;
                };
                task();
            }
        }
    }

    /// Flat host: a list of (parent, child) edges.
    #[derive(Default)]
    struct EdgeHost {
        next: u32,
        edges: Vec<(u32, u32)>,
        text: Vec<(u32, String)>,
    }

    impl Host for EdgeHost {
        type Instance = u32;

        fn create_instance(&mut self, _tag: &str, _props: &Props) -> u32 {
            self.next += 1;
            self.next
        }

        fn create_text_instance(&mut self, content: &str) -> u32 {
            self.next += 1;
            self.text.push((self.next, content.to_owned()));
            self.next
        }

        fn append_child(&mut self, parent: &u32, child: &u32) {
            self.edges.retain(|(_, c)| c != child);
            self.edges.push((*parent, *child));
        }

        fn insert_before(&mut self, parent: &u32, child: &u32, before: &u32) {
            self.edges.retain(|(_, c)| c != child);
            let at = self
                .edges
                .iter()
                .position(|(p, c)| p == parent && c == before)
                .unwrap_or(self.edges.len());
            self.edges.insert(at, (*parent, *child));
        }

        fn remove_child(&mut self, parent: &u32, child: &u32) {
            self.edges.retain(|e| *e != (*parent, *child));
        }

        fn update_instance(&mut self, _instance: &u32, _old: &Props, _new: &Props) {}

        fn update_text(&mut self, instance: &u32, content: &str) {
            if let Some(entry) = self.text.iter_mut().find(|(id, _)| id == instance) {
                entry.1 = content.to_owned();
            }
        }
    }

    fn root() -> (Root<EdgeHost>, Rc<Tasks>) {
        let tasks = Rc::new(Tasks::default());
        let root = create_root(EdgeHost::default(), 0, Rc::clone(&tasks) as Rc<dyn BatchScheduler>);
        (root, tasks)
    }

    #[test]
    fn render_is_deferred_to_the_batch() {
        let (root, tasks) = root();
        root.render(Element::host("div"));
        assert_eq!(root.stats().commits, 0);
        assert_eq!(root.pending_lanes(), Lanes::SYNC);
        tasks.run();
        assert_eq!(root.stats().commits, 1);
        assert!(root.pending_lanes().is_empty());
        root.with_host(|h| assert_eq!(h.edges, vec![(0, 1)]));
    }

    #[test]
    fn flush_sync_commits_without_the_scheduler() {
        let (root, tasks) = root();
        root.render(Element::host("div").child("hi"));
        root.flush_sync();
        assert_eq!(root.stats().commits, 1);
        root.with_host(|h| assert_eq!(h.text, vec![(1, "hi".to_owned())]));
        // The scheduled flush finds nothing left to do.
        tasks.run();
        assert_eq!(root.stats().commits, 1);
    }

    #[test]
    fn priority_is_scoped() {
        let (root, _tasks) = root();
        let seen = root.with_priority(Lanes::TRANSITION, || root.inner.update_priority.get());
        assert_eq!(seen, Lanes::TRANSITION);
        assert_eq!(root.inner.update_priority.get(), Lanes::SYNC);
    }

    #[test]
    fn failed_render_keeps_current() {
        let (root, tasks) = root();
        let fail = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fail);
        let component = Component::named("Maybe", move |_h: &mut Hooks, _p: &Props| {
            if flag.get() {
                Err(RenderError::component("Maybe", "boom"))
            } else {
                Ok(Node::from(Element::host("p")))
            }
        });
        root.render(Element::component(component.clone()));
        tasks.run();
        let fibers = root.fiber_count();

        fail.set(true);
        root.render(Element::component(component));
        tasks.run();
        let stats = root.stats();
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.aborted, 1);
        assert!(root.pending_lanes().is_empty());
        assert!(root.fiber_count() <= fibers * 2);
        root.with_host(|h| assert_eq!(h.edges, vec![(0, 1)]));
    }

    #[test]
    fn unmount_clears_the_container() {
        let (root, tasks) = root();
        root.render(Element::host("ul").children([Element::host("li"), Element::host("li")]));
        tasks.run();
        root.unmount();
        tasks.run();
        root.with_host(|h| assert!(h.edges.iter().all(|(p, _)| *p != 0)));
        let report = root.last_commit().expect("commit report");
        assert_eq!(report.deletions, 1);
        assert_eq!(report.removed_host_nodes, 1);
    }
}
