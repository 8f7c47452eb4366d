#![forbid(unsafe_code)]

//! Error types for render passes.
//!
//! # Failure Modes
//!
//! - [`HookError`] is programmer misuse: the hook sequence of a component
//!   changed between renders. It is raised on the first offending call and
//!   stays raised for the rest of that render.
//! - [`RenderError`] aborts the whole render pass. The in-progress tree is
//!   discarded and `current` is left untouched; nothing is retried.

use std::fmt;

/// Kind of a hook cell, used to detect order changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Effect,
    Ref,
}

impl HookKind {
    /// Name of the hook call that creates this kind of cell.
    #[must_use]
    pub const fn call_name(self) -> &'static str {
        match self {
            Self::State => "use_state",
            Self::Effect => "use_effect",
            Self::Ref => "use_ref",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.call_name())
    }
}

/// A component's hook sequence differs from its previous render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The render called fewer hooks than the previous one.
    FewerHooks { expected: usize, rendered: usize },
    /// The render called more hooks than the previous one.
    MoreHooks { expected: usize },
    /// A different hook kind was called at `index`.
    OrderChanged {
        index: usize,
        expected: HookKind,
        found: HookKind,
    },
    /// `use_state` or `use_ref` at `index` was called with a different type.
    StateTypeMismatch {
        index: usize,
        found: &'static str,
    },
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FewerHooks { expected, rendered } => write!(
                f,
                "rendered fewer hooks than expected: {rendered} of {expected}"
            ),
            Self::MoreHooks { expected } => write!(
                f,
                "rendered more hooks than during the previous render (expected {expected})"
            ),
            Self::OrderChanged {
                index,
                expected,
                found,
            } => write!(
                f,
                "hook {index} changed from {expected} to {found} between renders"
            ),
            Self::StateTypeMismatch { index, found } => {
                write!(f, "hook {index} changed its state type (now {found})")
            }
        }
    }
}

impl std::error::Error for HookError {}

/// Why a render pass was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A hook was misused.
    Hook(HookError),
    /// A component returned an error from its render function.
    Component {
        component: &'static str,
        message: String,
    },
}

impl RenderError {
    /// Build a component error.
    #[must_use]
    pub fn component(component: &'static str, message: impl Into<String>) -> Self {
        Self::Component {
            component,
            message: message.into(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hook(e) => write!(f, "hook misuse: {e}"),
            Self::Component { component, message } => {
                write!(f, "component {component} failed to render: {message}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hook(e) => Some(e),
            Self::Component { .. } => None,
        }
    }
}

impl From<HookError> for RenderError {
    fn from(e: HookError) -> Self {
        Self::Hook(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_messages() {
        let e = HookError::OrderChanged {
            index: 1,
            expected: HookKind::State,
            found: HookKind::Effect,
        };
        assert_eq!(
            e.to_string(),
            "hook 1 changed from use_state to use_effect between renders"
        );
        let e = HookError::FewerHooks {
            expected: 3,
            rendered: 2,
        };
        assert!(e.to_string().contains("2 of 3"));
    }

    #[test]
    fn render_error_wraps_hook_error() {
        let e: RenderError = HookError::MoreHooks { expected: 1 }.into();
        assert!(matches!(e, RenderError::Hook(_)));
        assert!(e.source().is_some());
        let c = RenderError::component("App", "boom");
        assert!(c.source().is_none());
        assert_eq!(c.to_string(), "component App failed to render: boom");
    }
}
