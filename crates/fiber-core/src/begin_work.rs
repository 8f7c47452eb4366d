#![forbid(unsafe_code)]

//! Top-down phase: compute each fiber's new children.

use crate::child_fiber::ChildReconciler;
use crate::element::{Node, Props};
use crate::error::RenderError;
use crate::fiber::{FiberId, FiberKind, FiberProps, FiberState, Flags, RootState, WorkTag};
use crate::hooks::Hooks;
use crate::host::Host;
use crate::update_queue::process_update_queue;
use crate::work_loop::RenderContext;

/// Reconcile the children of `wip` and return its first child.
pub(crate) fn begin_work<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    wip: FiberId,
) -> Result<Option<FiberId>, RenderError> {
    tracing::trace!(fiber = ctx.tree[wip].kind.label(), "begin_work");
    match ctx.tree[wip].tag() {
        WorkTag::Root => Ok(update_host_root(ctx, wip)),
        WorkTag::FunctionComponent => update_function_component(ctx, wip),
        WorkTag::HostComponent => {
            let pending = std::mem::take(&mut ctx.tree[wip].pending_props);
            let children = match &pending {
                FiberProps::Props(props) => reconcile_children(ctx, wip, props.children()),
                _ => reconcile_children(ctx, wip, &Node::Empty),
            };
            ctx.tree[wip].pending_props = pending;
            Ok(children)
        }
        WorkTag::HostText => Ok(None),
        WorkTag::Fragment => {
            let pending = std::mem::take(&mut ctx.tree[wip].pending_props);
            let children = match &pending {
                FiberProps::Children(node) => reconcile_children(ctx, wip, node),
                _ => reconcile_children(ctx, wip, &Node::Empty),
            };
            ctx.tree[wip].pending_props = pending;
            Ok(children)
        }
    }
}

fn update_host_root<H: Host>(ctx: &mut RenderContext<'_, H>, wip: FiberId) -> Option<FiberId> {
    let queue = match &ctx.tree[wip].update_queue {
        Some(q) => q.clone(),
        None => ctx.tree.root_queue(),
    };
    let pending = queue.borrow_mut().take_pending();

    // Pending updates join the committed base queue first, so they survive an
    // abandoned pass.
    let committed = ctx.tree[wip]
        .alternate
        .and_then(|cur| ctx.tree.get_mut(cur))
        .and_then(|cur| match &mut cur.memoized_state {
            FiberState::Root(state) => {
                state.base_queue.extend(pending.iter().cloned());
                Some((state.base_state.clone(), state.base_queue.clone()))
            }
            _ => None,
        });
    let (base_state, base_queue) = committed.unwrap_or_else(|| (Node::Empty, pending.into()));

    let out = process_update_queue(base_state, base_queue, ctx.lanes);
    let element = out.memoized_state.clone();
    ctx.tree[wip].memoized_state = FiberState::Root(RootState {
        element: out.memoized_state,
        base_state: out.base_state,
        base_queue: out.base_queue,
    });
    reconcile_children(ctx, wip, &element)
}

fn update_function_component<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    wip: FiberId,
) -> Result<Option<FiberId>, RenderError> {
    let FiberKind::Component(component) = &ctx.tree[wip].kind else {
        return Ok(None);
    };
    let component = component.clone();
    let props = match std::mem::take(&mut ctx.tree[wip].pending_props) {
        FiberProps::Props(p) => p,
        _ => Props::default(),
    };
    let current = ctx.tree[wip].alternate;
    let prev = current
        .and_then(|cur| ctx.tree.get_mut(cur))
        .map(|cur| match &mut cur.memoized_state {
            FiberState::Hooks(hooks) => std::mem::take(hooks),
            _ => Vec::new(),
        });

    let mut hooks = Hooks::new(prev, wip, ctx.sink.clone(), ctx.lanes);
    let result = {
        let _span = tracing::trace_span!("render_component", component = component.name()).entered();
        component.render(&mut hooks, &props)
    };
    let rendered = hooks.finish();

    if let (Some(cur), Some(prev)) = (current, rendered.prev)
        && let Some(cur) = ctx.tree.get_mut(cur)
    {
        cur.memoized_state = FiberState::Hooks(prev);
    }
    let fiber = &mut ctx.tree[wip];
    fiber.pending_props = FiberProps::Props(props);
    fiber.memoized_state = FiberState::Hooks(rendered.hooks);
    if rendered.has_passive_effects {
        fiber.flags |= Flags::PASSIVE_EFFECT;
    }

    if let Some(e) = rendered.error {
        return Err(e.into());
    }
    let children = result?;
    Ok(reconcile_children(ctx, wip, &children))
}

fn reconcile_children<H: Host>(
    ctx: &mut RenderContext<'_, H>,
    wip: FiberId,
    children: &Node,
) -> Option<FiberId> {
    let current = ctx.tree[wip].alternate;
    let current_first = current.and_then(|cur| ctx.tree.get(cur)).and_then(|cur| cur.child);
    let child = ChildReconciler::new(ctx.tree, current.is_some(), ctx.config.warn_on_duplicate_keys)
        .reconcile(wip, current_first, children);
    ctx.tree[wip].child = child;
    child
}
