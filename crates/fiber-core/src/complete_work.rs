#![forbid(unsafe_code)]

//! Bottom-up phase: build detached host instances for new fibers, detect
//! attribute and text changes, and bubble flags.
//!
//! # Invariants
//!
//! After `complete_work(f)`, `f.subtree_flags` is the union of the flags and
//! subtree flags of every child of `f`.

use std::rc::Rc;

use crate::fiber::{FiberId, FiberKind, FiberTree, Flags};
use crate::host::Host;
use crate::work_loop::RenderContext;

pub(crate) fn complete_work<H: Host>(ctx: &mut RenderContext<'_, H>, wip: FiberId) {
    let fiber = &ctx.tree[wip];
    let current = fiber.alternate;
    let has_instance = fiber.state_node.is_some();
    match &fiber.kind {
        FiberKind::Host(tag) => {
            if current.is_some() && has_instance {
                let changed = match (
                    current.and_then(|c| ctx.tree.get(c)).and_then(|c| c.memoized_props.as_props()),
                    fiber.memoized_props.as_props(),
                ) {
                    (Some(old), Some(new)) => !old.attrs_eq(new),
                    _ => true,
                };
                if changed {
                    ctx.tree[wip].flags |= Flags::UPDATE;
                }
            } else {
                let tag = Rc::clone(tag);
                let props = fiber.memoized_props.as_props().cloned().unwrap_or_default();
                let instance = ctx.host.borrow_mut().create_instance(&tag, &props);
                append_all_children(ctx.tree, &mut *ctx.host.borrow_mut(), &instance, wip);
                ctx.tree[wip].state_node = Some(instance);
            }
        }
        FiberKind::Text => {
            let content: Rc<str> = Rc::from(fiber.memoized_props.as_text().unwrap_or_default());
            if current.is_some() && has_instance {
                let old = current
                    .and_then(|c| ctx.tree.get(c))
                    .and_then(|c| c.memoized_props.as_text());
                if old != Some(&*content) {
                    ctx.tree[wip].flags |= Flags::UPDATE;
                }
            } else {
                let instance = ctx.host.borrow_mut().create_text_instance(&content);
                ctx.tree[wip].state_node = Some(instance);
            }
        }
        FiberKind::Root | FiberKind::Component(_) | FiberKind::Fragment => {}
    }
    bubble_properties(ctx.tree, wip);
}

/// Append the top-level host descendants of `wip` to `parent`, descending
/// through component and fragment fibers.
fn append_all_children<H: Host>(
    tree: &FiberTree<H::Instance>,
    host: &mut H,
    parent: &H::Instance,
    wip: FiberId,
) {
    let mut next = tree[wip].child;
    while let Some(id) = next {
        let fiber = &tree[id];
        if fiber.kind.is_host() {
            if let Some(instance) = &fiber.state_node {
                host.append_child(parent, instance);
            }
        } else if let Some(child) = fiber.child {
            next = Some(child);
            continue;
        }

        let mut node = id;
        next = loop {
            if let Some(sibling) = tree[node].sibling {
                break Some(sibling);
            }
            match tree[node].parent {
                Some(p) if p != wip => node = p,
                _ => break None,
            }
        };
    }
}

fn bubble_properties<I: Clone>(tree: &mut FiberTree<I>, wip: FiberId) {
    let mut subtree = Flags::empty();
    let mut next = tree[wip].child;
    while let Some(id) = next {
        let child = &mut tree[id];
        subtree |= child.subtree_flags | child.flags;
        child.parent = Some(wip);
        next = child.sibling;
    }
    tree[wip].subtree_flags |= subtree;
}
