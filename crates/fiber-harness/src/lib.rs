#![forbid(unsafe_code)]

//! Test harness for FrankenFiber.
//!
//! This crate provides:
//! - [`MemoryHost`], an in-memory host tree that logs every [`HostOp`]
//! - [`MicrotaskQueue`], a batch scheduler drained by the test
//! - [`LogCapture`], a `tracing` layer for asserting on log output
//! - [`TestRoot`], a root bundled with both, and [`assert_html!`]
//! - [`strategies`], `proptest` generators for keyed child lists

pub mod host;
pub mod log_capture;
pub mod scheduler;
pub mod strategies;

pub use host::{HostNode, HostOp, MemoryHost};
pub use log_capture::{CapturedEvent, LogCapture};
pub use scheduler::MicrotaskQueue;

use fiber_core::{
    CommitReport, Node, ReconcilerConfig, RenderStats, Root, create_root_with_config,
};

/// Call the `event` handler of `node`. Returns whether one was attached.
///
/// The handler runs with the host released, so it may update state freely.
pub fn fire(root: &Root<MemoryHost>, node: HostNode, event: &str) -> bool {
    let handler = root.with_host(|host| host.handler(node, event));
    match handler {
        Some(handler) => {
            handler.call();
            true
        }
        None => false,
    }
}

/// A root over a fresh [`MemoryHost`] driven by its own [`MicrotaskQueue`].
#[derive(Debug, Clone)]
pub struct TestRoot {
    pub root: Root<MemoryHost>,
    pub queue: MicrotaskQueue,
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRoot {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ReconcilerConfig) -> Self {
        let queue = MicrotaskQueue::new();
        let host = MemoryHost::new();
        let container = host.container();
        let root = create_root_with_config(host, container, queue.scheduler(), config);
        Self { root, queue }
    }

    /// Render `node` and drain the queue.
    pub fn render(&self, node: impl Into<Node>) {
        self.root.render(node);
        self.settle();
    }

    /// Run `f`, then drain the queue.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> R {
        let out = f();
        self.settle();
        out
    }

    /// Drain the queue. Returns the number of tasks run.
    pub fn settle(&self) -> usize {
        self.queue.run_until_idle()
    }

    /// Fire `event` on the first attached element with `tag`, then drain.
    ///
    /// # Panics
    ///
    /// Panics if there is no such element or it has no handler for `event`.
    pub fn fire(&self, tag: &str, event: &str) {
        let node = self
            .find(tag)
            .unwrap_or_else(|| panic!("no <{tag}> in {}", self.html()));
        self.fire_on(node, event);
    }

    /// Fire `event` on `node`, then drain.
    ///
    /// # Panics
    ///
    /// Panics if `node` has no handler for `event`.
    pub fn fire_on(&self, node: HostNode, event: &str) {
        assert!(fire(&self.root, node, event), "{node:?} has no `{event}` handler");
        self.settle();
    }

    #[must_use]
    pub fn html(&self) -> String {
        self.root.with_host(MemoryHost::to_html)
    }

    #[must_use]
    pub fn find(&self, tag: &str) -> Option<HostNode> {
        self.root.with_host(|h| h.find_by_tag(tag).first().copied())
    }

    #[must_use]
    pub fn find_all(&self, tag: &str) -> Vec<HostNode> {
        self.root.with_host(|h| h.find_by_tag(tag))
    }

    #[must_use]
    pub fn ops(&self) -> Vec<HostOp> {
        self.root.with_host(|h| h.ops().to_vec())
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.root.with_host_mut(MemoryHost::take_ops)
    }

    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.root.stats()
    }

    #[must_use]
    pub fn last_commit(&self) -> Option<CommitReport> {
        self.root.last_commit()
    }

    #[must_use]
    pub fn fiber_count(&self) -> usize {
        self.root.fiber_count()
    }
}

/// Assert that a [`TestRoot`]'s host markup equals `expected`.
#[macro_export]
macro_rules! assert_html {
    ($root:expr, $expected:expr $(,)?) => {{
        let actual = $root.html();
        assert_eq!(
            actual, $expected,
            "host markup mismatch\n  actual: {actual}\nexpected: {}",
            $expected
        );
    }};
}

#[cfg(test)]
mod tests {
    use fiber_core::Element;

    use super::*;

    #[test]
    fn render_drains_and_commits() {
        let t = TestRoot::new();
        t.render(Element::host("p").prop("id", "a").child("hi"));
        assert_html!(t, r#"<p id="a">hi</p>"#);
        assert_eq!(t.stats().commits, 1);
        assert!(t.queue.is_empty());
    }

    #[test]
    fn fire_reports_missing_handlers() {
        let t = TestRoot::new();
        t.render(Element::host("button"));
        let button = t.find("button").expect("button");
        assert!(!fire(&t.root, button, "onclick"));
    }
}
