#![forbid(unsafe_code)]

//! Child reconciliation: diff a parent's previous children against a new
//! description and produce the new child chain.
//!
//! Reuse goes through [`FiberTree::create_work_in_progress`], so a reused
//! child keeps its alternate pairing and host node. Fibers that cannot be
//! reused are staged in the parent's `deletions`.
//!
//! # Invariants
//!
//! 1. When effects are not tracked (first mount of the parent) no flags are
//!    set; the nearest tracked ancestor inserts the whole subtree.
//! 2. In keyed lists a reused child is placed only if its old index falls
//!    behind the highest old index kept in place so far.
//! 3. Every previous child is either reused exactly once or deleted.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::element::{Element, ElementKind, Node};
use crate::fiber::{Fiber, FiberId, FiberKind, FiberProps, FiberTree, Flags};

/// Key used to match a new child against the previous children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Rc<str>),
    Index(usize),
}

pub(crate) struct ChildReconciler<'a, I> {
    tree: &'a mut FiberTree<I>,
    track_effects: bool,
    warn_on_duplicate_keys: bool,
}

impl<'a, I: Clone> ChildReconciler<'a, I> {
    pub(crate) fn new(
        tree: &'a mut FiberTree<I>,
        track_effects: bool,
        warn_on_duplicate_keys: bool,
    ) -> Self {
        Self {
            tree,
            track_effects,
            warn_on_duplicate_keys,
        }
    }

    /// Reconcile `parent`'s children, previously starting at `current_first`,
    /// against `new_child`. Returns the new first child.
    pub(crate) fn reconcile(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        let new_child = match new_child {
            Node::Element(el) if el.is_unkeyed_fragment() => el.props.children(),
            other => other,
        };
        match new_child {
            Node::Element(el) => {
                let fiber = self.reconcile_single_element(parent, current_first, el);
                Some(self.place_single_child(fiber))
            }
            Node::Text(content) => {
                let fiber = self.reconcile_single_text(parent, current_first, content);
                Some(self.place_single_child(fiber))
            }
            Node::List(items) => self.reconcile_children_array(parent, current_first, items),
            Node::Empty => {
                self.delete_remaining_children(parent, current_first);
                None
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut current = current_first;
        while let Some(cur) = current {
            let fiber = &self.tree[cur];
            let sibling = fiber.sibling;
            if fiber.key != element.key {
                self.delete_child(parent, cur);
                current = sibling;
                continue;
            }
            if matches_element(&fiber.kind, element) {
                let existing = self.use_fiber(cur, element_props(element));
                self.tree[existing].parent = Some(parent);
                self.delete_remaining_children(parent, sibling);
                return existing;
            }
            // Same key, different type: nothing after it can match either.
            self.delete_remaining_children(parent, Some(cur));
            break;
        }
        self.create_from_element(parent, element)
    }

    fn reconcile_single_text(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        content: &Rc<str>,
    ) -> FiberId {
        let mut current = current_first;
        while let Some(cur) = current {
            let fiber = &self.tree[cur];
            let sibling = fiber.sibling;
            if !matches!(fiber.kind, FiberKind::Text) {
                self.delete_child(parent, cur);
                current = sibling;
                continue;
            }
            let existing = self.use_fiber(cur, FiberProps::Text(Rc::clone(content)));
            self.tree[existing].parent = Some(parent);
            self.delete_remaining_children(parent, sibling);
            return existing;
        }
        self.create_fiber(parent, FiberKind::Text, FiberProps::Text(Rc::clone(content)), None)
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        if self.track_effects && self.tree[fiber].alternate.is_none() {
            self.tree[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn reconcile_children_array(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        items: &[Node],
    ) -> Option<FiberId> {
        let old_children = self.sibling_chain(current_first);
        let mut existing: AHashMap<ChildKey, FiberId> =
            AHashMap::with_capacity(old_children.len());
        for &old in &old_children {
            let fiber = &self.tree[old];
            let key = match &fiber.key {
                Some(k) => ChildKey::Key(Rc::clone(k)),
                None => ChildKey::Index(fiber.index),
            };
            if let Some(shadowed) = existing.insert(key, old) {
                // Two previous children shared a key; only the last one can be
                // matched, so the other one goes away now.
                self.delete_child(parent, shadowed);
            }
        }

        let mut seen_keys: AHashSet<Rc<str>> = AHashSet::new();
        let mut first_new: Option<FiberId> = None;
        let mut last_new: Option<FiberId> = None;
        let mut last_placed_index = 0;

        for (index, item) in items.iter().enumerate() {
            if self.warn_on_duplicate_keys
                && let Node::Element(Element { key: Some(key), .. }) = item
                && !seen_keys.insert(Rc::clone(key))
            {
                tracing::warn!(
                    key = %key,
                    parent = self.tree[parent].kind.label(),
                    "siblings share a key; later duplicates are recreated"
                );
            }

            let Some(new_fiber) = self.update_from_map(parent, &mut existing, index, item) else {
                continue;
            };
            {
                let f = &mut self.tree[new_fiber];
                f.index = index;
                f.parent = Some(parent);
                f.sibling = None;
            }
            match last_new {
                Some(prev) => self.tree[prev].sibling = Some(new_fiber),
                None => first_new = Some(new_fiber),
            }
            last_new = Some(new_fiber);

            if !self.track_effects {
                continue;
            }
            match self.tree[new_fiber].alternate {
                Some(cur) => {
                    let old_index = self.tree[cur].index;
                    if old_index < last_placed_index {
                        self.tree[new_fiber].flags |= Flags::PLACEMENT;
                    } else {
                        last_placed_index = old_index;
                    }
                }
                None => self.tree[new_fiber].flags |= Flags::PLACEMENT,
            }
        }

        let leftover: AHashSet<FiberId> = existing.into_values().collect();
        for old in old_children {
            if leftover.contains(&old) {
                self.delete_child(parent, old);
            }
        }
        first_new
    }

    fn update_from_map(
        &mut self,
        parent: FiberId,
        existing: &mut AHashMap<ChildKey, FiberId>,
        index: usize,
        item: &Node,
    ) -> Option<FiberId> {
        match item {
            Node::Empty => None,
            Node::Text(content) => {
                let key = ChildKey::Index(index);
                let props = FiberProps::Text(Rc::clone(content));
                match existing.get(&key).copied() {
                    Some(before) if matches!(self.tree[before].kind, FiberKind::Text) => {
                        existing.remove(&key);
                        Some(self.use_fiber(before, props))
                    }
                    _ => Some(self.create_fiber(parent, FiberKind::Text, props, None)),
                }
            }
            Node::Element(el) => {
                let key = match &el.key {
                    Some(k) => ChildKey::Key(Rc::clone(k)),
                    None => ChildKey::Index(index),
                };
                if el.kind == ElementKind::Fragment {
                    let children = FiberProps::Children(el.props.children().clone());
                    return Some(self.update_fragment(parent, existing, key, children, el.key.clone()));
                }
                match existing.get(&key).copied() {
                    Some(before) if matches_element(&self.tree[before].kind, el) => {
                        existing.remove(&key);
                        Some(self.use_fiber(before, element_props(el)))
                    }
                    _ => Some(self.create_from_element(parent, el)),
                }
            }
            Node::List(nested) => {
                let children = FiberProps::Children(Node::List(nested.clone()));
                Some(self.update_fragment(parent, existing, ChildKey::Index(index), children, None))
            }
        }
    }

    fn update_fragment(
        &mut self,
        parent: FiberId,
        existing: &mut AHashMap<ChildKey, FiberId>,
        key: ChildKey,
        children: FiberProps,
        fiber_key: Option<Rc<str>>,
    ) -> FiberId {
        match existing.get(&key).copied() {
            Some(before) if matches!(self.tree[before].kind, FiberKind::Fragment) => {
                existing.remove(&key);
                self.use_fiber(before, children)
            }
            _ => self.create_fiber(parent, FiberKind::Fragment, children, fiber_key),
        }
    }

    fn use_fiber(&mut self, current: FiberId, pending_props: FiberProps) -> FiberId {
        let wip = self.tree.create_work_in_progress(current, pending_props);
        let f = &mut self.tree[wip];
        f.index = 0;
        f.sibling = None;
        wip
    }

    fn create_from_element(&mut self, parent: FiberId, element: &Element) -> FiberId {
        let kind = match &element.kind {
            ElementKind::Host(tag) => FiberKind::Host(Rc::clone(tag)),
            ElementKind::Component(c) => FiberKind::Component(c.clone()),
            ElementKind::Fragment => FiberKind::Fragment,
        };
        self.create_fiber(parent, kind, element_props(element), element.key.clone())
    }

    fn create_fiber(
        &mut self,
        parent: FiberId,
        kind: FiberKind,
        pending_props: FiberProps,
        key: Option<Rc<str>>,
    ) -> FiberId {
        let mut fiber = Fiber::new(kind, pending_props, key);
        fiber.parent = Some(parent);
        self.tree.insert(fiber)
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) {
        if !self.track_effects {
            return;
        }
        let p = &mut self.tree[parent];
        p.deletions.push(child);
        p.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, parent: FiberId, first: Option<FiberId>) {
        if !self.track_effects {
            return;
        }
        for child in self.sibling_chain(first) {
            self.delete_child(parent, child);
        }
    }

    fn sibling_chain(&self, first: Option<FiberId>) -> SmallVec<[FiberId; 8]> {
        let mut out = SmallVec::new();
        let mut next = first;
        while let Some(id) = next {
            out.push(id);
            next = self.tree[id].sibling;
        }
        out
    }
}

fn matches_element(kind: &FiberKind, element: &Element) -> bool {
    match (kind, &element.kind) {
        (FiberKind::Host(a), ElementKind::Host(b)) => a == b,
        (FiberKind::Component(a), ElementKind::Component(b)) => a.same_type(b),
        (FiberKind::Fragment, ElementKind::Fragment) => true,
        _ => false,
    }
}

fn element_props(element: &Element) -> FiberProps {
    match element.kind {
        ElementKind::Fragment => FiberProps::Children(element.props.children().clone()),
        _ => FiberProps::Props(element.props.clone()),
    }
}
