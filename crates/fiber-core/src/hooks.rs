#![forbid(unsafe_code)]

//! Per-component local state.
//!
//! A component receives a [`Hooks`] context for the duration of one render.
//! On mount the context builds a fresh hook list; on update it walks the list
//! committed by the previous render cell by cell and produces the next one.
//!
//! # Invariants
//!
//! 1. The n-th hook call of a render binds to the n-th cell of the previous
//!    render. Kind and state type must match; the count must match at the
//!    end of the render.
//! 2. Pending state updates are moved into the base queue of the committed
//!    cell before folding, so an abandoned render loses nothing.
//! 3. An effect's cleanup slot is shared by every generation of its cell.
//!
//! # Failure Modes
//!
//! The first misuse records a [`HookError`] that fails every later hook call
//! and the render pass itself, even if the component discards it.

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::error::{HookError, HookKind};
use crate::fiber::FiberId;
use crate::lane::{Lane, Lanes};
use crate::update_queue::{
    Action, SharedQueue, Update, create_update, create_update_queue, discard_lanes,
    enqueue_update, process_update_queue,
};

/// Type-erased hook state.
pub(crate) type AnyState = Rc<dyn Any>;

/// Cleanup returned by an effect.
pub type Destroy = Box<dyn FnOnce()>;

pub(crate) type EffectCreate = Box<dyn FnOnce() -> Option<Destroy>>;

/// Cleanup slot shared by both generations of an effect hook.
pub(crate) type EffectInstance = Rc<RefCell<Option<Destroy>>>;

/// Wrap a closure as an effect cleanup.
pub fn cleanup(f: impl FnOnce() + 'static) -> Option<Destroy> {
    Some(Box::new(f))
}

/// Receiver of state updates: the root that owns the fiber.
pub(crate) trait UpdateSink {
    fn request_update_lane(&self) -> Lane;
    fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lane);
}

pub(crate) struct StateHook {
    memoized: AnyState,
    base_state: AnyState,
    base_queue: Vec<Update<AnyState>>,
    queue: SharedQueue<AnyState>,
    type_id: TypeId,
    type_name: &'static str,
}

pub(crate) struct EffectHook {
    deps: Option<Rc<dyn Any>>,
    instance: EffectInstance,
    create: Option<EffectCreate>,
    has_effect: bool,
}

pub(crate) enum HookCell {
    State(StateHook),
    Effect(EffectHook),
    Ref(Rc<dyn Any>),
}

/// One cell of a component's hook list.
pub struct Hook(pub(crate) HookCell);

impl Hook {
    #[must_use]
    pub fn kind(&self) -> HookKind {
        match &self.0 {
            HookCell::State(_) => HookKind::State,
            HookCell::Effect(_) => HookKind::Effect,
            HookCell::Ref(_) => HookKind::Ref,
        }
    }

    /// Committed value of a `use_state` cell.
    #[must_use]
    pub fn state<T: Clone + 'static>(&self) -> Option<T> {
        match &self.0 {
            HookCell::State(s) => s.memoized.downcast_ref::<T>().cloned(),
            _ => None,
        }
    }

    /// Drop retained updates at `lanes`. Returns how many were dropped.
    pub(crate) fn discard_updates(&mut self, lanes: Lanes) -> usize {
        match &mut self.0 {
            HookCell::State(s) => discard_lanes(&mut s.base_queue, lanes),
            _ => 0,
        }
    }

    /// Number of updates retained for rebasing by a `use_state` cell.
    #[must_use]
    pub fn base_queue_len(&self) -> usize {
        match &self.0 {
            HookCell::State(s) => s.base_queue.len(),
            _ => 0,
        }
    }
}

impl Clone for Hook {
    fn clone(&self) -> Self {
        Self(match &self.0 {
            HookCell::State(s) => HookCell::State(StateHook {
                memoized: Rc::clone(&s.memoized),
                base_state: Rc::clone(&s.base_state),
                base_queue: s.base_queue.clone(),
                queue: Rc::clone(&s.queue),
                type_id: s.type_id,
                type_name: s.type_name,
            }),
            // The create closure belongs to the render that produced it.
            HookCell::Effect(e) => HookCell::Effect(EffectHook {
                deps: e.deps.clone(),
                instance: Rc::clone(&e.instance),
                create: None,
                has_effect: false,
            }),
            HookCell::Ref(r) => HookCell::Ref(Rc::clone(r)),
        })
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            HookCell::State(s) => f
                .debug_struct("State")
                .field("type", &s.type_name)
                .field("base_queue", &s.base_queue.len())
                .finish(),
            HookCell::Effect(e) => f
                .debug_struct("Effect")
                .field("has_effect", &e.has_effect)
                .finish(),
            HookCell::Ref(_) => f.write_str("Ref"),
        }
    }
}

/// Effect scheduled by a render and run after its commit.
pub(crate) struct PendingEffect {
    pub instance: EffectInstance,
    pub create: EffectCreate,
}

/// Detach the effects a committed render scheduled.
pub(crate) fn take_scheduled_effects(hooks: &mut [Hook], out: &mut Vec<PendingEffect>) {
    for hook in hooks {
        if let HookCell::Effect(e) = &mut hook.0 {
            if !e.has_effect {
                continue;
            }
            e.has_effect = false;
            if let Some(create) = e.create.take() {
                out.push(PendingEffect {
                    instance: Rc::clone(&e.instance),
                    create,
                });
            }
        }
    }
}

/// Cleanup slots of every effect in `hooks`.
pub(crate) fn effect_instances(hooks: &[Hook], out: &mut Vec<EffectInstance>) {
    for hook in hooks {
        if let HookCell::Effect(e) = &hook.0 {
            out.push(Rc::clone(&e.instance));
        }
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct Dispatch<T> {
    queue: SharedQueue<AnyState>,
    fiber: FiberId,
    sink: Weak<dyn UpdateSink>,
    _state: PhantomData<fn(T) -> T>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            fiber: self.fiber,
            sink: Weak::clone(&self.sink),
            _state: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("fiber", &self.fiber)
            .field("state", &type_name::<T>())
            .finish()
    }
}

impl<T: 'static> Dispatch<T> {
    /// Replace the state.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(Rc::new(value)));
    }

    /// Derive the next state from the accumulated one.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Reduce(Rc::new(move |state: &AnyState| {
            match state.downcast_ref::<T>() {
                Some(value) => Rc::new(f(value)) as AnyState,
                None => Rc::clone(state),
            }
        })));
    }

    fn dispatch(&self, action: Action<AnyState>) {
        let Some(sink) = self.sink.upgrade() else {
            tracing::warn!(fiber = ?self.fiber, "state update after the root was dropped; ignored");
            return;
        };
        let lane = sink.request_update_lane();
        enqueue_update(&self.queue, create_update(action, lane));
        sink.schedule_update_on_fiber(self.fiber, lane);
    }
}

/// Result of one component render as seen by the work loop.
pub(crate) struct RenderedHooks {
    /// The committed list, with pending updates moved into base queues.
    pub prev: Option<Vec<Hook>>,
    pub hooks: Vec<Hook>,
    pub error: Option<HookError>,
    pub has_passive_effects: bool,
}

/// Hook context of one component render.
pub struct Hooks {
    prev: Option<Vec<Hook>>,
    work: Vec<Hook>,
    cursor: usize,
    fiber: FiberId,
    sink: Weak<dyn UpdateSink>,
    render_lanes: Lanes,
    error: Option<HookError>,
    has_passive_effects: bool,
}

impl Hooks {
    pub(crate) fn new(
        prev: Option<Vec<Hook>>,
        fiber: FiberId,
        sink: Weak<dyn UpdateSink>,
        render_lanes: Lanes,
    ) -> Self {
        let capacity = prev.as_ref().map_or(0, Vec::len);
        Self {
            prev,
            work: Vec::with_capacity(capacity),
            cursor: 0,
            fiber,
            sink,
            render_lanes,
            error: None,
            has_passive_effects: false,
        }
    }

    /// Whether this render mounts the component.
    #[must_use]
    pub fn is_mount(&self) -> bool {
        self.prev.is_none()
    }

    /// Lanes of the render pass in progress.
    #[must_use]
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Local state initialised to `initial` on mount.
    pub fn use_state<T: Clone + 'static>(
        &mut self,
        initial: T,
    ) -> Result<(T, Dispatch<T>), HookError> {
        self.use_state_with(move || initial)
    }

    /// Local state initialised lazily on mount.
    pub fn use_state_with<T, F>(&mut self, init: F) -> Result<(T, Dispatch<T>), HookError>
    where
        T: Clone + 'static,
        F: FnOnce() -> T,
    {
        let index = self.advance(HookKind::State)?;
        let lanes = self.render_lanes;
        let folded = match self.prev.as_mut().and_then(|p| p.get_mut(index)) {
            Some(Hook(HookCell::State(prev))) => fold_state::<T>(prev, index, lanes),
            _ => Ok(mount_state(init())),
        };
        let (cell, value) = match folded {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let dispatch = Dispatch {
            queue: Rc::clone(&cell.queue),
            fiber: self.fiber,
            sink: Weak::clone(&self.sink),
            _state: PhantomData,
        };
        self.work.push(Hook(HookCell::State(cell)));
        Ok((value, dispatch))
    }

    /// Passive effect run after every commit of this component.
    pub fn use_effect<F>(&mut self, create: F) -> Result<(), HookError>
    where
        F: FnOnce() -> Option<Destroy> + 'static,
    {
        self.effect(None, |_| false, Box::new(create))
    }

    /// Passive effect run after commits where `deps` changed.
    pub fn use_effect_with<D, F>(&mut self, deps: D, create: F) -> Result<(), HookError>
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Destroy> + 'static,
    {
        let deps = Rc::new(deps);
        let probe = Rc::clone(&deps);
        self.effect(
            Some(deps as Rc<dyn Any>),
            move |old: &dyn Any| old.downcast_ref::<D>() == Some(&*probe),
            Box::new(create),
        )
    }

    /// Mutable cell that keeps its identity across renders.
    pub fn use_ref<T: 'static>(&mut self, initial: T) -> Result<Rc<RefCell<T>>, HookError> {
        let index = self.advance(HookKind::Ref)?;
        let existing = match self.prev.as_ref().and_then(|p| p.get(index)) {
            Some(Hook(HookCell::Ref(cell))) => Some(Rc::clone(cell).downcast::<RefCell<T>>()),
            _ => None,
        };
        let cell = match existing {
            Some(Ok(cell)) => cell,
            Some(Err(_)) => {
                return self.fail(HookError::StateTypeMismatch {
                    index,
                    found: type_name::<T>(),
                });
            }
            None => Rc::new(RefCell::new(initial)),
        };
        let erased: Rc<dyn Any> = Rc::clone(&cell) as Rc<dyn Any>;
        self.work.push(Hook(HookCell::Ref(erased)));
        Ok(cell)
    }

    fn effect(
        &mut self,
        deps: Option<Rc<dyn Any>>,
        same_deps: impl FnOnce(&dyn Any) -> bool,
        create: EffectCreate,
    ) -> Result<(), HookError> {
        let index = self.advance(HookKind::Effect)?;
        let (instance, has_effect) = match self.prev.as_ref().and_then(|p| p.get(index)) {
            Some(Hook(HookCell::Effect(prev))) => {
                let unchanged = match (&prev.deps, &deps) {
                    (Some(old), Some(_)) => same_deps(old.as_ref()),
                    _ => false,
                };
                (Rc::clone(&prev.instance), !unchanged)
            }
            _ => (Rc::new(RefCell::new(None)), true),
        };
        self.has_passive_effects |= has_effect;
        self.work.push(Hook(HookCell::Effect(EffectHook {
            deps,
            instance,
            create: has_effect.then_some(create),
            has_effect,
        })));
        Ok(())
    }

    fn advance(&mut self, kind: HookKind) -> Result<usize, HookError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let index = self.cursor;
        self.cursor += 1;
        let Some(prev) = &self.prev else {
            return Ok(index);
        };
        let expected = prev.len();
        let found = prev.get(index).map(Hook::kind);
        match found {
            None => self.fail(HookError::MoreHooks { expected }),
            Some(found) if found != kind => self.fail(HookError::OrderChanged {
                index,
                expected: found,
                found: kind,
            }),
            Some(_) => Ok(index),
        }
    }

    fn fail<T>(&mut self, e: HookError) -> Result<T, HookError> {
        if self.error.is_none() {
            self.error = Some(e.clone());
        }
        Err(e)
    }

    pub(crate) fn finish(mut self) -> RenderedHooks {
        if self.error.is_none()
            && let Some(prev) = &self.prev
            && self.cursor < prev.len()
        {
            self.error = Some(HookError::FewerHooks {
                expected: prev.len(),
                rendered: self.cursor,
            });
        }
        RenderedHooks {
            prev: self.prev,
            hooks: self.work,
            error: self.error,
            has_passive_effects: self.has_passive_effects,
        }
    }
}

fn mount_state<T: Clone + 'static>(value: T) -> (StateHook, T) {
    let state: AnyState = Rc::new(value.clone());
    let cell = StateHook {
        memoized: Rc::clone(&state),
        base_state: state,
        base_queue: Vec::new(),
        queue: create_update_queue(),
        type_id: TypeId::of::<T>(),
        type_name: type_name::<T>(),
    };
    (cell, value)
}

fn fold_state<T: Clone + 'static>(
    prev: &mut StateHook,
    index: usize,
    lanes: Lanes,
) -> Result<(StateHook, T), HookError> {
    let mismatch = HookError::StateTypeMismatch {
        index,
        found: type_name::<T>(),
    };
    if prev.type_id != TypeId::of::<T>() {
        return Err(mismatch);
    }
    let pending = prev.queue.borrow_mut().take_pending();
    prev.base_queue.extend(pending);
    let out = process_update_queue(
        Rc::clone(&prev.base_state),
        prev.base_queue.iter().cloned(),
        lanes,
    );
    let value = out
        .memoized_state
        .downcast_ref::<T>()
        .cloned()
        .ok_or(mismatch)?;
    let cell = StateHook {
        memoized: out.memoized_state,
        base_state: out.base_state,
        base_queue: out.base_queue,
        queue: Rc::clone(&prev.queue),
        type_id: prev.type_id,
        type_name: prev.type_name,
    };
    Ok((cell, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingSink {
        lane: Cell<Lanes>,
        scheduled: RefCell<Vec<(FiberId, Lane)>>,
    }

    impl UpdateSink for RecordingSink {
        fn request_update_lane(&self) -> Lane {
            let lane = self.lane.get();
            if lane.is_empty() { Lanes::SYNC } else { lane }
        }

        fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lane) {
            self.scheduled.borrow_mut().push((fiber, lane));
        }
    }

    fn sink() -> (Rc<RecordingSink>, Weak<dyn UpdateSink>) {
        let sink = Rc::new(RecordingSink::default());
        let weak: Weak<dyn UpdateSink> = Rc::downgrade(&sink) as Weak<dyn UpdateSink>;
        (sink, weak)
    }

    fn render(
        prev: Option<Vec<Hook>>,
        sink: &Weak<dyn UpdateSink>,
        lanes: Lanes,
        f: impl FnOnce(&mut Hooks),
    ) -> RenderedHooks {
        let mut hooks = Hooks::new(prev, FiberId::default(), Weak::clone(sink), lanes);
        f(&mut hooks);
        hooks.finish()
    }

    #[test]
    fn state_mounts_then_folds_dispatched_updates() {
        let (recorder, weak) = sink();
        let mut setter = None;
        let first = render(None, &weak, Lanes::SYNC, |h| {
            let (n, set) = h.use_state(1_i32).unwrap();
            assert_eq!(n, 1);
            assert!(h.is_mount());
            setter = Some(set);
        });
        assert!(first.error.is_none());
        assert_eq!(first.hooks[0].state::<i32>(), Some(1));

        let set = setter.unwrap();
        set.update(|n| n + 1);
        set.update(|n| n * 10);
        assert_eq!(recorder.scheduled.borrow().len(), 2);

        let second = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            let (n, _) = h.use_state(1_i32).unwrap();
            assert_eq!(n, 20);
        });
        assert!(second.error.is_none());
        assert_eq!(second.hooks[0].state::<i32>(), Some(20));
        // The committed cell keeps the drained updates until it is replaced.
        assert_eq!(second.prev.as_ref().unwrap()[0].base_queue_len(), 2);
    }

    #[test]
    fn lower_priority_updates_wait_for_their_lane() {
        let (recorder, weak) = sink();
        let mut setter = None;
        let first = render(None, &weak, Lanes::SYNC, |h| {
            setter = Some(h.use_state(0_i32).unwrap().1);
        });
        let set = setter.unwrap();
        recorder.lane.set(Lanes::DEFAULT);
        set.set(5);
        recorder.lane.set(Lanes::SYNC);
        set.update(|n| n + 1);

        let sync = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            assert_eq!(h.use_state(0_i32).unwrap().0, 1);
        });
        let default = render(Some(sync.hooks), &weak, Lanes::DEFAULT, |h| {
            assert_eq!(h.use_state(0_i32).unwrap().0, 6);
        });
        assert_eq!(default.hooks[0].base_queue_len(), 0);
    }

    #[test]
    fn more_hooks_than_before_fails() {
        let (_recorder, weak) = sink();
        let first = render(None, &weak, Lanes::SYNC, |_| {});
        let second = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            assert!(h.use_state(0_u8).is_err());
            // Sticky for the rest of the render.
            assert!(h.use_ref(()).is_err());
        });
        assert_eq!(second.error, Some(HookError::MoreHooks { expected: 0 }));
    }

    #[test]
    fn fewer_hooks_than_before_fails_at_finish() {
        let (_recorder, weak) = sink();
        let first = render(None, &weak, Lanes::SYNC, |h| {
            h.use_state(0_u8).unwrap();
            h.use_ref(0_u8).unwrap();
        });
        let second = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            h.use_state(0_u8).unwrap();
        });
        assert_eq!(
            second.error,
            Some(HookError::FewerHooks {
                expected: 2,
                rendered: 1
            })
        );
    }

    #[test]
    fn changed_kind_or_type_fails() {
        let (_recorder, weak) = sink();
        let first = render(None, &weak, Lanes::SYNC, |h| {
            h.use_state(0_u8).unwrap();
        });
        let kinds = render(Some(first.hooks.clone()), &weak, Lanes::SYNC, |h| {
            h.use_ref(0_u8).unwrap_err();
        });
        assert_eq!(
            kinds.error,
            Some(HookError::OrderChanged {
                index: 0,
                expected: HookKind::State,
                found: HookKind::Ref
            })
        );
        let types = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            h.use_state(String::new()).unwrap_err();
        });
        assert!(matches!(
            types.error,
            Some(HookError::StateTypeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn effects_fire_when_deps_change() {
        let (_recorder, weak) = sink();
        let first = render(None, &weak, Lanes::SYNC, |h| {
            h.use_effect_with(1_u32, || None).unwrap();
        });
        assert!(first.has_passive_effects);
        let mut hooks = first.hooks;
        let mut scheduled = Vec::new();
        take_scheduled_effects(&mut hooks, &mut scheduled);
        assert_eq!(scheduled.len(), 1);

        let same = render(Some(hooks), &weak, Lanes::SYNC, |h| {
            h.use_effect_with(1_u32, || None).unwrap();
        });
        assert!(!same.has_passive_effects);
        let changed = render(Some(same.hooks), &weak, Lanes::SYNC, |h| {
            h.use_effect_with(2_u32, || None).unwrap();
        });
        assert!(changed.has_passive_effects);
        let always = render(Some(changed.hooks), &weak, Lanes::SYNC, |h| {
            h.use_effect(|| None).unwrap();
        });
        assert!(always.has_passive_effects);
    }

    #[test]
    fn refs_keep_identity() {
        let (_recorder, weak) = sink();
        let mut first_cell = None;
        let first = render(None, &weak, Lanes::SYNC, |h| {
            let cell = h.use_ref(Vec::<u8>::new()).unwrap();
            cell.borrow_mut().push(7);
            first_cell = Some(cell);
        });
        let _second = render(Some(first.hooks), &weak, Lanes::SYNC, |h| {
            let cell = h.use_ref(Vec::<u8>::new()).unwrap();
            assert!(Rc::ptr_eq(&cell, first_cell.as_ref().unwrap()));
            assert_eq!(*cell.borrow(), vec![7]);
        });
    }

    #[test]
    fn dispatch_after_root_drop_is_ignored() {
        let (recorder, weak) = sink();
        let mut setter = None;
        render(None, &weak, Lanes::SYNC, |h| {
            setter = Some(h.use_state(0_i32).unwrap().1);
        });
        drop(recorder);
        setter.unwrap().set(3);
    }
}
