#![forbid(unsafe_code)]

//! Work nodes and the arena that owns them.
//!
//! Every logical UI node is represented by up to two [`Fiber`]s: the one in
//! the committed ("current") tree and its `alternate` in the tree being
//! built. Links between fibers are [`FiberId`]s into a [`FiberTree`] arena;
//! `parent` is a non-owning back reference.
//!
//! # Invariants
//!
//! 1. `a.alternate == Some(b)` implies `b.alternate == Some(a)`.
//! 2. Exactly one root fiber is current; the other is its alternate.
//! 3. After [`FiberTree::collect_garbage`] every live fiber is reachable from
//!    the current root through `child`/`sibling` links, or is the alternate of
//!    such a fiber.

use std::rc::Rc;

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::element::{Component, Node, Props};
use crate::hooks::Hook;
use crate::lane::Lanes;
use crate::update_queue::{SharedQueue, Update, create_update_queue, discard_lanes};

slotmap::new_key_type! {
    /// Generational id of a fiber. A stale id never aliases a reused slot.
    pub struct FiberId;
}

bitflags::bitflags! {
    /// Commit-time actions recorded on a fiber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Insert (or move) the fiber's host nodes.
        const PLACEMENT = 1 << 0;
        /// Apply changed attributes or text.
        const UPDATE = 1 << 1;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 2;
        /// A hook scheduled a passive effect.
        const PASSIVE_EFFECT = 1 << 3;

        const MUTATION_MASK = Self::PLACEMENT.bits() | Self::UPDATE.bits() | Self::CHILD_DELETION.bits();
        const PASSIVE_MASK = Self::PASSIVE_EFFECT.bits() | Self::CHILD_DELETION.bits();
    }
}

/// What a fiber stands for.
#[derive(Debug, Clone)]
pub enum FiberKind {
    Root,
    Component(Component),
    Host(Rc<str>),
    Text,
    Fragment,
}

/// Plain tag of a [`FiberKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    Root,
    FunctionComponent,
    HostComponent,
    HostText,
    Fragment,
}

impl FiberKind {
    #[must_use]
    pub fn tag(&self) -> WorkTag {
        match self {
            Self::Root => WorkTag::Root,
            Self::Component(_) => WorkTag::FunctionComponent,
            Self::Host(_) => WorkTag::HostComponent,
            Self::Text => WorkTag::HostText,
            Self::Fragment => WorkTag::Fragment,
        }
    }

    /// Whether the fiber owns a host node.
    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host(_) | Self::Text)
    }

    /// Whether host children of this fiber attach directly to its node.
    #[must_use]
    pub fn is_host_parent(&self) -> bool {
        matches!(self, Self::Host(_) | Self::Root)
    }

    /// Display name for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Root => "#root",
            Self::Component(c) => c.name(),
            Self::Host(tag) => tag,
            Self::Text => "#text",
            Self::Fragment => "#fragment",
        }
    }
}

/// Input of a fiber, shaped by its kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FiberProps {
    #[default]
    None,
    /// Host and component fibers.
    Props(Props),
    /// Text fibers.
    Text(Rc<str>),
    /// Fragment fibers: the children themselves.
    Children(Node),
}

impl FiberProps {
    #[must_use]
    pub fn as_props(&self) -> Option<&Props> {
        match self {
            Self::Props(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// State of the root fiber.
#[derive(Debug, Clone, Default)]
pub struct RootState {
    /// The element rendered by the last pass.
    pub element: Node,
    pub base_state: Node,
    pub base_queue: Vec<Update<Node>>,
}

/// Persistent state of a fiber.
#[derive(Debug, Clone, Default)]
pub enum FiberState {
    #[default]
    None,
    Root(RootState),
    Hooks(Vec<Hook>),
}

impl FiberState {
    #[must_use]
    pub fn hooks(&self) -> Option<&[Hook]> {
        match self {
            Self::Hooks(h) => Some(h),
            _ => None,
        }
    }
}

/// A work node.
#[derive(Debug)]
pub struct Fiber<I> {
    pub kind: FiberKind,
    pub key: Option<Rc<str>>,
    /// Host node owned by this fiber (host and text fibers, and the root's
    /// container).
    pub state_node: Option<I>,
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among the parent's children in the last description.
    pub index: usize,
    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub memoized_state: FiberState,
    /// Root only; hook queues live in their hooks.
    pub update_queue: Option<SharedQueue<Node>>,
    pub alternate: Option<FiberId>,
    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: SmallVec<[FiberId; 2]>,
}

impl<I> Fiber<I> {
    #[must_use]
    pub fn new(kind: FiberKind, pending_props: FiberProps, key: Option<Rc<str>>) -> Self {
        Self {
            kind,
            key,
            state_node: None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::None,
            memoized_state: FiberState::None,
            update_queue: None,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> WorkTag {
        self.kind.tag()
    }
}

/// Arena of fibers plus the current root pointer.
#[derive(Debug)]
pub struct FiberTree<I> {
    fibers: slotmap::SlotMap<FiberId, Fiber<I>>,
    current: FiberId,
    root_queue: SharedQueue<Node>,
}

impl<I: Clone> FiberTree<I> {
    /// Create a tree whose root fiber owns `container`.
    #[must_use]
    pub fn new(container: I) -> Self {
        let mut fibers = slotmap::SlotMap::with_key();
        let mut root = Fiber::new(FiberKind::Root, FiberProps::None, None);
        root.state_node = Some(container);
        root.memoized_state = FiberState::Root(RootState::default());
        let root_queue = create_update_queue();
        root.update_queue = Some(Rc::clone(&root_queue));
        let current = fibers.insert(root);
        Self {
            fibers,
            current,
            root_queue,
        }
    }

    /// Queue of root element updates, shared by both root fibers.
    #[must_use]
    pub fn root_queue(&self) -> SharedQueue<Node> {
        Rc::clone(&self.root_queue)
    }

    /// The committed root fiber.
    #[must_use]
    pub fn current(&self) -> FiberId {
        self.current
    }

    pub fn set_current(&mut self, root: FiberId) {
        self.current = root;
    }

    #[must_use]
    pub fn get(&self, id: FiberId) -> Option<&Fiber<I>> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<I>> {
        self.fibers.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn insert(&mut self, fiber: Fiber<I>) -> FiberId {
        self.fibers.insert(fiber)
    }

    /// Number of live fibers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Ids of `parent`'s children in sibling order.
    #[must_use]
    pub fn children(&self, parent: FiberId) -> SmallVec<[FiberId; 8]> {
        let mut out = SmallVec::new();
        let mut next = self.fibers.get(parent).and_then(|f| f.child);
        while let Some(id) = next {
            out.push(id);
            next = self.fibers.get(id).and_then(|f| f.sibling);
        }
        out
    }

    /// Clone `current` into its alternate for a new pass, reusing the
    /// alternate's slot when one exists.
    pub fn create_work_in_progress(&mut self, current: FiberId, pending_props: FiberProps) -> FiberId {
        let cur = &self.fibers[current];
        let kind = cur.kind.clone();
        let key = cur.key.clone();
        let state_node = cur.state_node.clone();
        let child = cur.child;
        let index = cur.index;
        let memoized_props = cur.memoized_props.clone();
        let memoized_state = cur.memoized_state.clone();
        let update_queue = cur.update_queue.clone();

        let wip = match cur.alternate.filter(|alt| self.fibers.contains_key(*alt)) {
            Some(alt) => {
                let w = &mut self.fibers[alt];
                w.pending_props = pending_props;
                w.flags = Flags::empty();
                w.subtree_flags = Flags::empty();
                w.deletions.clear();
                alt
            }
            None => {
                let mut w = Fiber::new(kind.clone(), pending_props, key.clone());
                w.alternate = Some(current);
                let alt = self.fibers.insert(w);
                self.fibers[current].alternate = Some(alt);
                alt
            }
        };

        let w = &mut self.fibers[wip];
        w.kind = kind;
        w.key = key;
        w.state_node = state_node;
        w.child = child;
        w.sibling = None;
        w.index = index;
        w.memoized_props = memoized_props;
        w.memoized_state = memoized_state;
        w.update_queue = update_queue;
        wip
    }

    /// Drop the updates at `lanes` that state cells retained for rebasing.
    /// Returns the number dropped.
    pub fn discard_updates(&mut self, lanes: Lanes) -> usize {
        let mut dropped = 0;
        for fiber in self.fibers.values_mut() {
            match &mut fiber.memoized_state {
                FiberState::Root(state) => dropped += discard_lanes(&mut state.base_queue, lanes),
                FiberState::Hooks(hooks) => {
                    dropped += hooks.iter_mut().map(|h| h.discard_updates(lanes)).sum::<usize>();
                }
                FiberState::None => {}
            }
        }
        dropped
    }

    /// Release every fiber that is neither reachable from the current root nor
    /// the alternate of a reachable fiber. Returns the number released.
    pub fn collect_garbage(&mut self) -> usize {
        let mut live: AHashSet<FiberId> = AHashSet::with_capacity(self.fibers.len());
        let mut stack: SmallVec<[FiberId; 32]> = SmallVec::new();
        stack.push(self.current);
        while let Some(id) = stack.pop() {
            let Some(f) = self.fibers.get(id) else {
                continue;
            };
            if !live.insert(id) {
                continue;
            }
            if let Some(alt) = f.alternate {
                live.insert(alt);
            }
            if let Some(c) = f.child {
                stack.push(c);
            }
            if let Some(s) = f.sibling {
                stack.push(s);
            }
        }
        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains(&id));
        before - self.fibers.len()
    }
}

impl<I> std::ops::Index<FiberId> for FiberTree<I> {
    type Output = Fiber<I>;

    fn index(&self, id: FiberId) -> &Fiber<I> {
        &self.fibers[id]
    }
}

impl<I> std::ops::IndexMut<FiberId> for FiberTree<I> {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber<I> {
        &mut self.fibers[id]
    }
}
