#![forbid(unsafe_code)]

//! Incremental tree reconciliation for FrankenFiber.
//!
//! This crate provides:
//! - [`Root`] for rendering [`Element`] descriptions into a [`Host`] tree
//! - [`Hooks`] for component-local state and passive effects
//! - [`Lanes`] for update priorities, with batched synchronous flushing
//!
//! Each render pass builds a work-in-progress twin of the committed fiber
//! tree, diffs children by key, and commits host mutations in one walk.

mod begin_work;
mod child_fiber;
mod commit_work;
mod complete_work;
mod work_loop;

pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod lane;
pub mod root;
pub mod update_queue;

pub use commit_work::{CommitReport, PlacedNode};
pub use config::{ConfigError, ReconcilerConfig};
pub use element::{Component, Element, ElementKind, Handler, Node, PropValue, Props, RenderFn};
pub use error::{HookError, HookKind, RenderError};
pub use fiber::{Fiber, FiberId, FiberKind, FiberTree, Flags, WorkTag};
pub use hooks::{Destroy, Dispatch, Hook, Hooks, cleanup};
pub use host::{BatchScheduler, Host, Task};
pub use lane::{Lane, Lanes, LanesDisplay, NO_LANE};
pub use root::{Root, create_root, create_root_with_config};
pub use work_loop::{ExecutionStatus, RenderStats};
