#![forbid(unsafe_code)]

//! Render scheduling: which lane renders next, the unit-of-work loop, and the
//! hand-off to commit.
//!
//! A root moves through `Idle -> Rendering -> Committing -> Idle`. Work is
//! never started inline by an update; it is always queued through the
//! root's [`BatchScheduler`](crate::BatchScheduler), so updates issued in the
//! same tick coalesce into one pass.
//!
//! # Invariants
//!
//! 1. At most one pass is in flight per root.
//! 2. A pass renders exactly one lane; the lane is removed from the pending
//!    set when the pass starts and re-added if the pass is interrupted.
//! 3. `current` changes only at the end of a successful commit.
//! 4. After every commit or abandoned pass the arena holds only the current
//!    tree and its alternates.
//!
//! # Failure Modes
//!
//! - A render error abandons the pass. The updates it folded at that lane are
//!   dropped from every base queue, and the lane is not retried until a new
//!   update arrives.
//! - More than `max_nested_updates` consecutive synchronous commits caused by
//!   render-phase updates drop all pending work with an error log.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::begin_work::begin_work;
use crate::commit_work::{CommitReport, Committer, PassiveEffects, flush_passive_effects};
use crate::complete_work::complete_work;
use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::error::RenderError;
use crate::fiber::{FiberId, FiberKind, FiberProps, FiberTree, Flags};
use crate::hooks::UpdateSink;
use crate::host::{BatchScheduler, Host, Task};
use crate::lane::{
    Lane, Lanes, LanesDisplay, NO_LANE, get_highest_priority_lane, is_higher_priority,
    lane_name, merge_lanes, remove_lanes,
};
use crate::update_queue::SharedQueue;

/// Phase a root is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Rendering,
    Committing,
}

/// Counters accumulated over the life of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub passes_started: u64,
    pub commits: u64,
    /// Passes abandoned because a render failed.
    pub aborted: u64,
    /// Passes abandoned for more urgent work.
    pub interrupted: u64,
    /// Fibers begun across all passes.
    pub units_of_work: u64,
}

/// State shared by the traversal of one render pass.
pub(crate) struct RenderContext<'a, H: Host> {
    pub tree: &'a mut FiberTree<H::Instance>,
    pub host: &'a RefCell<H>,
    pub lanes: Lanes,
    pub sink: Weak<dyn UpdateSink>,
    pub config: &'a ReconcilerConfig,
    pub units_of_work: u64,
}

pub(crate) enum RenderOutcome {
    Completed(FiberId),
    Interrupted,
    Failed(RenderError),
}

/// Render a fresh work-in-progress clone of the current root until the tree
/// is complete, `should_yield` reports more urgent work, or a component fails.
pub(crate) fn run_work_loop<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    should_yield: impl Fn() -> bool,
) -> RenderOutcome {
    let current = ctx.tree.current();
    let root = ctx.tree.create_work_in_progress(current, FiberProps::None);
    let mut next = Some(root);
    while let Some(unit) = next {
        if should_yield() {
            return RenderOutcome::Interrupted;
        }
        match perform_unit_of_work(ctx, unit, root) {
            Ok(n) => next = n,
            Err(e) => return RenderOutcome::Failed(e),
        }
    }
    RenderOutcome::Completed(root)
}

fn perform_unit_of_work<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    unit: FiberId,
    root: FiberId,
) -> Result<Option<FiberId>, RenderError> {
    ctx.units_of_work += 1;
    let child = begin_work(ctx, unit)?;
    let fiber = &mut ctx.tree[unit];
    fiber.memoized_props = fiber.pending_props.clone();
    if child.is_some() {
        return Ok(child);
    }
    Ok(complete_unit_of_work(ctx, unit, root))
}

/// Complete `unit` and its ancestors until one has an unvisited sibling.
fn complete_unit_of_work<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    unit: FiberId,
    root: FiberId,
) -> Option<FiberId> {
    let mut node = unit;
    loop {
        complete_work(ctx, node);
        if node == root {
            return None;
        }
        let fiber = &ctx.tree[node];
        if let Some(sibling) = fiber.sibling {
            return Some(sibling);
        }
        node = fiber.parent?;
    }
}

/// Scheduling state of one root.
pub(crate) struct RootInner<H: Host + 'static> {
    pub this: Weak<Self>,
    pub tree: RefCell<FiberTree<H::Instance>>,
    pub host: RefCell<H>,
    pub scheduler: Rc<dyn BatchScheduler>,
    pub config: ReconcilerConfig,
    pub root_queue: SharedQueue<Node>,
    pub container: H::Instance,

    pub pending_lanes: Cell<Lanes>,
    /// Lane of the queued, not yet started, render task.
    pub callback_lane: Cell<Lane>,
    pub status: Cell<ExecutionStatus>,
    pub render_lane: Cell<Lane>,
    pub update_priority: Cell<Lane>,

    pub sync_queue: RefCell<VecDeque<Task>>,
    pub sync_flush_scheduled: Cell<bool>,
    pub flushing_sync: Cell<bool>,
    pub passive: RefCell<PassiveEffects>,
    pub passive_scheduled: Cell<bool>,

    pub nested_updates: Cell<u32>,
    pub updated_during_render: Cell<bool>,
    pub stats: Cell<RenderStats>,
    pub last_commit: RefCell<Option<CommitReport>>,
}

impl<H: Host + 'static> RootInner<H> {
    pub(crate) fn new(
        this: &Weak<Self>,
        host: H,
        container: H::Instance,
        scheduler: Rc<dyn BatchScheduler>,
        config: ReconcilerConfig,
    ) -> Self {
        let tree = FiberTree::new(container.clone());
        let root_queue = tree.root_queue();
        let update_priority = Cell::new(config.default_lane);
        Self {
            this: Weak::clone(this),
            tree: RefCell::new(tree),
            host: RefCell::new(host),
            scheduler,
            config,
            root_queue,
            container,
            pending_lanes: Cell::new(NO_LANE),
            callback_lane: Cell::new(NO_LANE),
            status: Cell::new(ExecutionStatus::Idle),
            render_lane: Cell::new(NO_LANE),
            update_priority,
            sync_queue: RefCell::new(VecDeque::new()),
            sync_flush_scheduled: Cell::new(false),
            flushing_sync: Cell::new(false),
            passive: RefCell::new(PassiveEffects::default()),
            passive_scheduled: Cell::new(false),
            nested_updates: Cell::new(0),
            updated_during_render: Cell::new(false),
            stats: Cell::new(RenderStats::default()),
            last_commit: RefCell::new(None),
        }
    }

    fn sink(&self) -> Weak<dyn UpdateSink> {
        Weak::clone(&self.this) as Weak<dyn UpdateSink>
    }

    pub(crate) fn mark_root_updated(&self, lane: Lane) {
        self.pending_lanes.set(merge_lanes(self.pending_lanes.get(), lane));
    }

    fn update_stats(&self, f: impl FnOnce(&mut RenderStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Queue a render task for the most urgent pending lane unless one is
    /// already queued for it.
    pub(crate) fn ensure_root_is_scheduled(&self) {
        let lane = get_highest_priority_lane(self.pending_lanes.get());
        if lane.is_empty() {
            self.callback_lane.set(NO_LANE);
            return;
        }
        if lane == self.callback_lane.get() {
            return;
        }
        self.callback_lane.set(lane);
        tracing::debug!(lane = lane_name(lane), "root scheduled");

        let this = Weak::clone(&self.this);
        let task: Task = Box::new(move || {
            if let Some(root) = this.upgrade() {
                root.perform_work_on_root(lane);
            }
        });
        if lane == Lanes::SYNC {
            self.sync_queue.borrow_mut().push_back(task);
            if !self.sync_flush_scheduled.replace(true) {
                let this = Weak::clone(&self.this);
                self.scheduler.schedule_batch(Box::new(move || {
                    if let Some(root) = this.upgrade() {
                        root.sync_flush_scheduled.set(false);
                        root.flush_sync_callbacks();
                    }
                }));
            }
        } else {
            self.scheduler.schedule_batch(task);
        }
    }

    /// Run queued synchronous render tasks, including any they queue.
    pub(crate) fn flush_sync_callbacks(&self) {
        if self.flushing_sync.replace(true) {
            return;
        }
        let _guard = ResetOnDrop(&self.flushing_sync);
        loop {
            let task = self.sync_queue.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task();
        }
    }

    pub(crate) fn perform_work_on_root(&self, lane: Lane) {
        if self.callback_lane.get() == lane {
            self.callback_lane.set(NO_LANE);
        }
        if self.status.get() != ExecutionStatus::Idle {
            tracing::debug!(lane = lane_name(lane), "root busy; render deferred");
            return;
        }
        self.flush_passive_effects();

        let highest = get_highest_priority_lane(self.pending_lanes.get());
        if highest != lane {
            self.ensure_root_is_scheduled();
            return;
        }
        if lane == Lanes::SYNC && self.nested_updates.get() > self.config.max_nested_updates {
            tracing::error!(
                limit = self.config.max_nested_updates,
                "maximum update depth exceeded: a component keeps updating state during render; pending work dropped"
            );
            self.pending_lanes.set(NO_LANE);
            self.nested_updates.set(0);
            self.callback_lane.set(NO_LANE);
            self.sync_queue.borrow_mut().clear();
            return;
        }
        self.render_root(lane);
    }

    fn render_root(&self, lane: Lane) {
        let _span = tracing::debug_span!("render_root", lane = lane_name(lane)).entered();
        self.status.set(ExecutionStatus::Rendering);
        self.render_lane.set(lane);
        self.pending_lanes.set(remove_lanes(self.pending_lanes.get(), lane));
        self.updated_during_render.set(false);
        self.update_stats(|s| s.passes_started += 1);

        let (outcome, units) = {
            let mut tree = self.tree.borrow_mut();
            let mut ctx = RenderContext {
                tree: &mut *tree,
                host: &self.host,
                lanes: lane,
                sink: self.sink(),
                config: &self.config,
                units_of_work: 0,
            };
            let should_yield =
                || is_higher_priority(get_highest_priority_lane(self.pending_lanes.get()), lane);
            let outcome = run_work_loop(&mut ctx, should_yield);
            (outcome, ctx.units_of_work)
        };
        self.update_stats(|s| s.units_of_work += units);
        self.render_lane.set(NO_LANE);

        match outcome {
            RenderOutcome::Completed(finished) => self.commit_root(finished, lane),
            RenderOutcome::Interrupted => {
                self.update_stats(|s| s.interrupted += 1);
                tracing::warn!(
                    lane = lane_name(lane),
                    pending = %LanesDisplay(self.pending_lanes.get()),
                    "render interrupted by more urgent work"
                );
                self.mark_root_updated(lane);
                self.abandon_pass();
            }
            RenderOutcome::Failed(error) => {
                self.update_stats(|s| s.aborted += 1);
                // The batch that failed is not replayed by later passes.
                let dropped = self.tree.borrow_mut().discard_updates(lane);
                tracing::error!(
                    lane = lane_name(lane),
                    %error,
                    dropped,
                    "render failed; pass discarded"
                );
                self.abandon_pass();
            }
        }
    }

    fn abandon_pass(&self) {
        let released = self.tree.borrow_mut().collect_garbage();
        tracing::trace!(released, "work-in-progress released");
        self.status.set(ExecutionStatus::Idle);
        self.ensure_root_is_scheduled();
    }

    fn commit_root(&self, finished: FiberId, lane: Lane) {
        let _span = tracing::debug_span!("commit_root", lane = lane_name(lane)).entered();
        self.status.set(ExecutionStatus::Committing);

        let mut report = CommitReport::new(lane);
        let mut passive = PassiveEffects::default();
        {
            let mut tree = self.tree.borrow_mut();
            let fiber = &tree[finished];
            let mask = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;
            if (fiber.flags | fiber.subtree_flags).intersects(mask) {
                let mut host = self.host.borrow_mut();
                Committer::new(&mut *tree, &mut *host, &mut report, &mut passive)
                    .commit_mutation_effects(finished);
            }
            tree.set_current(finished);
            let released = tree.collect_garbage();
            tracing::trace!(released, fibers = tree.len(), "committed");
        }
        report.passive_effects = passive.len();
        tracing::debug!(
            placements = report.placements.len(),
            updates = report.updates,
            deletions = report.deletions,
            passive = report.passive_effects,
            "commit finished"
        );
        self.update_stats(|s| s.commits += 1);
        *self.last_commit.borrow_mut() = Some(report);

        if !passive.is_empty() {
            self.passive.borrow_mut().append(&mut passive);
            if self.config.defer_passive_effects {
                self.schedule_passive_flush();
            } else {
                self.flush_passive_effects();
            }
        }

        if self.updated_during_render.get() && self.pending_lanes.get().contains(Lanes::SYNC) {
            self.nested_updates.set(self.nested_updates.get() + 1);
        } else {
            self.nested_updates.set(0);
        }
        self.status.set(ExecutionStatus::Idle);
        self.ensure_root_is_scheduled();
    }

    fn schedule_passive_flush(&self) {
        if self.passive_scheduled.replace(true) {
            return;
        }
        let this = Weak::clone(&self.this);
        self.scheduler.schedule_batch(Box::new(move || {
            if let Some(root) = this.upgrade() {
                root.flush_passive_effects();
            }
        }));
    }

    /// Run pending passive effects. Returns whether any ran.
    pub(crate) fn flush_passive_effects(&self) -> bool {
        self.passive_scheduled.set(false);
        let effects = std::mem::take(&mut *self.passive.borrow_mut());
        if effects.is_empty() {
            return false;
        }
        flush_passive_effects(effects);
        true
    }

    /// Whether `fiber` still hangs off a root. A tree that is locked by a pass
    /// in progress is assumed to contain it.
    fn is_mounted(&self, fiber: FiberId) -> bool {
        let Ok(tree) = self.tree.try_borrow() else {
            return true;
        };
        let mut next = Some(fiber);
        while let Some(id) = next {
            let Some(f) = tree.get(id) else {
                return false;
            };
            if matches!(f.kind, FiberKind::Root) {
                return true;
            }
            next = f.parent;
        }
        false
    }
}

impl<H: Host + 'static> UpdateSink for RootInner<H> {
    fn request_update_lane(&self) -> Lane {
        self.update_priority.get()
    }

    fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lane) {
        if !self.is_mounted(fiber) {
            tracing::warn!(?fiber, "state update on an unmounted component; ignored");
            return;
        }
        if self.status.get() != ExecutionStatus::Idle {
            self.updated_during_render.set(true);
        }
        self.mark_root_updated(lane);
        self.ensure_root_is_scheduled();
    }
}

/// Clears a flag when dropped.
pub(crate) struct ResetOnDrop<'a>(pub &'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
