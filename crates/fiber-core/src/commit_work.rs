#![forbid(unsafe_code)]

//! Commit phase: apply the flags of a finished tree to the host.
//!
//! A single depth-first walk visits only subtrees whose `subtree_flags`
//! intersect the mutation or passive masks. Children are committed before
//! their parent and siblings in order.
//!
//! # Invariants
//!
//! 1. A placed fiber's host nodes are inserted before the next host sibling
//!    that is not itself being placed, or appended when there is none.
//! 2. Deleting a subtree removes only its outermost host nodes, each exactly
//!    once.
//! 3. Every fiber of a deleted subtree, and its alternate, leaves the commit
//!    with no `parent` or `child` link.
//! 4. Every flag handled here is cleared on the fiber, so a committed tree
//!    carries no stale work.
//!
//! # Failure Modes
//!
//! A placement or deletion with no host ancestor is logged and skipped.

use smallvec::SmallVec;

use crate::fiber::{FiberId, FiberKind, FiberState, FiberTree, Flags};
use crate::hooks::{EffectInstance, PendingEffect, effect_instances, take_scheduled_effects};
use crate::host::Host;
use crate::lane::{Lane, NO_LANE};

/// A fiber inserted by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedNode {
    /// Tag, component name, or `#text`/`#fragment`.
    pub label: String,
    pub key: Option<String>,
}

/// What one commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub lane: Lane,
    pub placements: Vec<PlacedNode>,
    /// Host nodes whose attributes or text were updated.
    pub updates: usize,
    /// Subtrees deleted.
    pub deletions: usize,
    /// Host nodes detached from their parents by deletions.
    pub removed_host_nodes: usize,
    /// Passive effects queued by this commit (cleanups and creates).
    pub passive_effects: usize,
}

impl CommitReport {
    #[must_use]
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            placements: Vec::new(),
            updates: 0,
            deletions: 0,
            removed_host_nodes: 0,
            passive_effects: 0,
        }
    }

    /// Whether the commit changed nothing in the host tree.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.placements.is_empty() && self.updates == 0 && self.deletions == 0
    }
}

impl Default for CommitReport {
    fn default() -> Self {
        Self::new(NO_LANE)
    }
}

/// Effects waiting for the passive flush.
#[derive(Default)]
pub(crate) struct PassiveEffects {
    /// Cleanups of effects whose component was deleted.
    pub unmount: Vec<EffectInstance>,
    /// Effects to re-run: cleanup first, then create.
    pub update: Vec<PendingEffect>,
}

impl PassiveEffects {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }

    pub fn len(&self) -> usize {
        self.unmount.len() + self.update.len()
    }

    pub fn append(&mut self, other: &mut Self) {
        self.unmount.append(&mut other.unmount);
        self.update.append(&mut other.update);
    }
}

pub(crate) struct Committer<'a, H: Host> {
    tree: &'a mut FiberTree<H::Instance>,
    host: &'a mut H,
    report: &'a mut CommitReport,
    passive: &'a mut PassiveEffects,
}

impl<'a, H: Host> Committer<'a, H> {
    pub(crate) fn new(
        tree: &'a mut FiberTree<H::Instance>,
        host: &'a mut H,
        report: &'a mut CommitReport,
        passive: &'a mut PassiveEffects,
    ) -> Self {
        Self {
            tree,
            host,
            report,
            passive,
        }
    }

    pub(crate) fn commit_mutation_effects(&mut self, finished: FiberId) {
        let mask = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;
        let mut next = Some(finished);
        while let Some(id) = next {
            let fiber = &self.tree[id];
            if fiber.subtree_flags.intersects(mask)
                && let Some(child) = fiber.child
            {
                next = Some(child);
                continue;
            }
            let mut node = id;
            next = loop {
                self.commit_mutation_effects_on_fiber(node);
                if node == finished {
                    break None;
                }
                if let Some(sibling) = self.tree[node].sibling {
                    break Some(sibling);
                }
                match self.tree[node].parent {
                    Some(p) => node = p,
                    None => break None,
                }
            };
        }
    }

    fn commit_mutation_effects_on_fiber(&mut self, id: FiberId) {
        let flags = self.tree[id].flags;
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id);
            self.tree[id].flags.remove(Flags::PLACEMENT);
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(id);
            self.tree[id].flags.remove(Flags::UPDATE);
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.tree[id].deletions);
            for child in deletions {
                self.commit_deletion(child, id);
            }
            self.tree[id].flags.remove(Flags::CHILD_DELETION);
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            if let FiberState::Hooks(hooks) = &mut self.tree[id].memoized_state {
                take_scheduled_effects(hooks, &mut self.passive.update);
            }
            self.tree[id].flags.remove(Flags::PASSIVE_EFFECT);
        }
        self.tree[id].subtree_flags = Flags::empty();
    }

    fn commit_placement(&mut self, id: FiberId) {
        let fiber = &self.tree[id];
        self.report.placements.push(PlacedNode {
            label: fiber.kind.label().to_owned(),
            key: fiber.key.as_deref().map(str::to_owned),
        });
        let Some(parent) = fiber.parent.and_then(|p| self.host_parent(p)) else {
            tracing::warn!(fiber = fiber.kind.label(), "placement without a host parent skipped");
            return;
        };
        let before = self.host_sibling(id);
        self.insert_or_append(id, &parent, before.as_ref());
    }

    fn insert_or_append(&mut self, id: FiberId, parent: &H::Instance, before: Option<&H::Instance>) {
        let fiber = &self.tree[id];
        if fiber.kind.is_host() {
            if let Some(instance) = &fiber.state_node {
                match before {
                    Some(before) => self.host.insert_before(parent, instance, before),
                    None => self.host.append_child(parent, instance),
                }
            }
            return;
        }
        let mut next = fiber.child;
        while let Some(child) = next {
            self.insert_or_append(child, parent, before);
            next = self.tree[child].sibling;
        }
    }

    /// Host node of the nearest host-parent fiber at or above `start`.
    fn host_parent(&self, start: FiberId) -> Option<H::Instance> {
        let mut next = Some(start);
        while let Some(id) = next {
            let fiber = self.tree.get(id)?;
            if fiber.kind.is_host_parent() {
                return fiber.state_node.clone();
            }
            next = fiber.parent;
        }
        None
    }

    /// First host node after `id` in host order that is already attached.
    fn host_sibling(&self, id: FiberId) -> Option<H::Instance> {
        let tree = &*self.tree;
        let mut node = id;
        'siblings: loop {
            while tree[node].sibling.is_none() {
                match tree[node].parent {
                    Some(p) if !tree[p].kind.is_host_parent() => node = p,
                    _ => return None,
                }
            }
            node = tree[node].sibling?;
            while !tree[node].kind.is_host() {
                if tree[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match tree[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !tree[node].flags.contains(Flags::PLACEMENT) {
                return tree[node].state_node.clone();
            }
        }
    }

    fn commit_update(&mut self, id: FiberId) {
        let fiber = &self.tree[id];
        let Some(instance) = &fiber.state_node else {
            return;
        };
        match &fiber.kind {
            FiberKind::Host(_) => {
                let old = fiber
                    .alternate
                    .and_then(|alt| self.tree.get(alt))
                    .and_then(|alt| alt.memoized_props.as_props())
                    .cloned()
                    .unwrap_or_default();
                let new = fiber.memoized_props.as_props().cloned().unwrap_or_default();
                self.host.update_instance(instance, &old, &new);
            }
            FiberKind::Text => {
                let content = fiber.memoized_props.as_text().unwrap_or_default();
                self.host.update_text(instance, content);
            }
            FiberKind::Root | FiberKind::Component(_) | FiberKind::Fragment => return,
        }
        self.report.updates += 1;
    }

    /// Remove the subtree rooted at `child`, staged on `owner`.
    fn commit_deletion(&mut self, child: FiberId, owner: FiberId) {
        let mut outermost: SmallVec<[H::Instance; 4]> = SmallVec::new();
        let mut visited: SmallVec<[FiberId; 16]> = SmallVec::new();
        let mut stack: SmallVec<[(FiberId, bool); 16]> = SmallVec::new();
        stack.push((child, false));
        while let Some((id, covered)) = stack.pop() {
            let Some(fiber) = self.tree.get(id) else {
                continue;
            };
            visited.push(id);
            let mut covered_below = covered;
            match &fiber.kind {
                FiberKind::Host(_) | FiberKind::Text => {
                    if !covered && let Some(instance) = &fiber.state_node {
                        outermost.push(instance.clone());
                    }
                    covered_below = true;
                }
                FiberKind::Component(_) => {
                    if let FiberState::Hooks(hooks) = &fiber.memoized_state {
                        effect_instances(hooks, &mut self.passive.unmount);
                    }
                }
                FiberKind::Root | FiberKind::Fragment => {}
            }
            let children = self.tree.children(id);
            for &c in children.iter().rev() {
                stack.push((c, covered_below));
            }
        }

        if !outermost.is_empty() {
            match self.host_parent(owner) {
                Some(parent) => {
                    for instance in &outermost {
                        self.host.remove_child(&parent, instance);
                    }
                }
                None => {
                    tracing::warn!(
                        fiber = self.tree[child].kind.label(),
                        "deletion without a host parent; host nodes left in place"
                    );
                }
            }
        }
        self.report.deletions += 1;
        self.report.removed_host_nodes += outermost.len();

        for id in visited {
            let alternate = self.tree[id].alternate;
            for id in std::iter::once(id).chain(alternate) {
                if let Some(fiber) = self.tree.get_mut(id) {
                    fiber.parent = None;
                    fiber.child = None;
                }
            }
        }
    }
}

/// Run queued passive effects: every unmount cleanup, then the cleanups of
/// re-running effects, then their creates.
pub(crate) fn flush_passive_effects(effects: PassiveEffects) {
    let _span = tracing::debug_span!(
        "flush_passive_effects",
        unmount = effects.unmount.len(),
        update = effects.update.len()
    )
    .entered();
    for instance in &effects.unmount {
        let destroy = instance.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
    for effect in &effects.update {
        let destroy = effect.instance.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
    for effect in effects.update {
        let destroy = (effect.create)();
        *effect.instance.borrow_mut() = destroy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use crate::fiber::{Fiber, FiberProps};
    use std::rc::Rc;

    #[derive(Default)]
    struct RemoveLog {
        removed: Vec<(u32, u32)>,
    }

    impl Host for RemoveLog {
        type Instance = u32;

        fn create_instance(&mut self, _tag: &str, _props: &Props) -> u32 {
            0
        }

        fn create_text_instance(&mut self, _content: &str) -> u32 {
            0
        }

        fn append_child(&mut self, _parent: &u32, _child: &u32) {}

        fn insert_before(&mut self, _parent: &u32, _child: &u32, _before: &u32) {}

        fn remove_child(&mut self, parent: &u32, child: &u32) {
            self.removed.push((*parent, *child));
        }

        fn update_instance(&mut self, _instance: &u32, _old: &Props, _new: &Props) {}

        fn update_text(&mut self, _instance: &u32, _content: &str) {}
    }

    fn attach(tree: &mut FiberTree<u32>, kind: FiberKind, node: u32, parent: FiberId) -> FiberId {
        let mut f = Fiber::new(kind, FiberProps::None, None);
        f.state_node = Some(node);
        f.parent = Some(parent);
        let id = tree.insert(f);
        tree[parent].child = Some(id);
        id
    }

    #[test]
    fn deletion_detaches_the_whole_subtree() {
        let mut tree = FiberTree::new(0_u32);
        let root = tree.current();
        let div = attach(&mut tree, FiberKind::Host(Rc::from("div")), 1, root);
        let span = attach(&mut tree, FiberKind::Host(Rc::from("span")), 2, div);
        let text = attach(&mut tree, FiberKind::Text, 3, span);
        tree[root].child = None;
        tree[root].deletions.push(div);
        tree[root].flags |= Flags::CHILD_DELETION;

        let mut host = RemoveLog::default();
        let mut report = CommitReport::default();
        let mut passive = PassiveEffects::default();
        Committer::new(&mut tree, &mut host, &mut report, &mut passive)
            .commit_mutation_effects(root);

        assert_eq!(host.removed, vec![(0, 1)]);
        assert_eq!(report.deletions, 1);
        assert_eq!(report.removed_host_nodes, 1);
        for id in [div, span, text] {
            assert_eq!(tree[id].parent, None);
            assert_eq!(tree[id].child, None);
        }
        assert!(tree[root].deletions.is_empty());
    }
}
