#![forbid(unsafe_code)]

//! Immutable descriptions of the desired tree.
//!
//! An [`Element`] names a host tag, a [`Component`] or a fragment, carries an
//! optional key and a [`Props`] map. Children live in `props.children` as a
//! [`Node`]. Descriptions are cheap to clone: strings are `Rc<str>`, while props
//! and components are reference counted.
//!
//! # Invariants
//!
//! 1. Two components are the same type iff their render functions have the
//!    same Rust type.
//! 2. [`Props::attrs_eq`] ignores children; host updates are decided on
//!    attributes only.
//! 3. Handler values compare by identity, so passing a fresh closure on
//!    every render marks the host node for update.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::RenderError;
use crate::hooks::Hooks;

/// Event handler attached to a host node.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn()>);

impl Handler {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self) {
        (self.0)();
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Handler(Handler),
}

impl PropValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(h) => Some(h),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for PropValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Handler> for PropValue {
    fn from(h: Handler) -> Self {
        Self::Handler(h)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PropsInner {
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Node,
}

/// Attributes plus children. Cloning is O(1); mutation copies on write.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsInner>);

impl Props {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Replace the children.
    #[must_use]
    pub fn with_children(mut self, children: impl Into<Node>) -> Self {
        self.set_children(children);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<PropValue>) {
        Rc::make_mut(&mut self.0)
            .attrs
            .insert(Rc::from(name), value.into());
    }

    pub fn set_children(&mut self, children: impl Into<Node>) {
        Rc::make_mut(&mut self.0).children = children.into();
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.attrs.get(name)
    }

    /// Attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.attrs.iter().map(|(k, v)| (&**k, v))
    }

    #[must_use]
    pub fn children(&self) -> &Node {
        &self.0.children
    }

    /// Compare attributes, ignoring children.
    #[must_use]
    pub fn attrs_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.attrs == other.0.attrs
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.0.attrs)
            .field("children", &self.0.children)
            .finish()
    }
}

/// Render function signature of a [`Component`].
pub type RenderFn = dyn Fn(&mut Hooks, &Props) -> Result<Node, RenderError>;

/// A function component.
#[derive(Clone)]
pub struct Component {
    id: TypeId,
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    /// Wrap a render function. Its Rust type is the component's identity.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&mut Hooks, &Props) -> Result<Node, RenderError> + 'static,
    {
        Self {
            id: TypeId::of::<F>(),
            name: short_type_name(std::any::type_name::<F>()),
            render: Rc::new(render),
        }
    }

    /// Same as [`Component::new`] with an explicit display name.
    pub fn named<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut Hooks, &Props) -> Result<Node, RenderError> + 'static,
    {
        Self {
            name,
            ..Self::new(render)
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        self.id == other.id
    }

    pub(crate) fn render(&self, hooks: &mut Hooks, props: &Props) -> Result<Node, RenderError> {
        (self.render)(hooks, props)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // Closures are named `crate::module::function::{{closure}}`; keep the enclosing
    // item name for those.
    let trimmed = full.trim_end_matches("::{{closure}}");
    trimmed.rsplit("::").next().unwrap_or(trimmed)
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

/// What an element instantiates.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Host(Rc<str>),
    Component(Component),
    Fragment,
}

/// One node of a description.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<Rc<str>>,
    pub props: Props,
}

impl Element {
    /// A host element such as `div`.
    #[must_use]
    pub fn host(tag: &str) -> Self {
        Self::with_kind(ElementKind::Host(Rc::from(tag)))
    }

    #[must_use]
    pub fn component(component: Component) -> Self {
        Self::with_kind(ElementKind::Component(component))
    }

    /// A fragment grouping `children` without a host node of its own.
    #[must_use]
    pub fn fragment(children: impl Into<Node>) -> Self {
        Self::with_kind(ElementKind::Fragment).child(children)
    }

    fn with_kind(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::default(),
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(Rc::from(key.to_string()));
        self
    }

    #[must_use]
    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.set(name, value);
        self
    }

    /// Attach an event handler under `name`.
    #[must_use]
    pub fn on(self, name: &str, f: impl Fn() + 'static) -> Self {
        self.prop(name, Handler::new(f))
    }

    /// Set the children to a single node (or a list).
    #[must_use]
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.props.set_children(child);
        self
    }

    /// Set the children to a list.
    #[must_use]
    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.props
            .set_children(Node::List(children.into_iter().map(Into::into).collect()));
        self
    }

    /// Whether this element is an unkeyed fragment, which reconciles as its
    /// children directly.
    #[must_use]
    pub fn is_unkeyed_fragment(&self) -> bool {
        self.key.is_none() && self.kind == ElementKind::Fragment
    }
}

/// A child description.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    /// A sequence of children. A list nested in a list is an unkeyed fragment.
    List(Vec<Node>),
}

impl Node {
    #[must_use]
    pub fn text(content: impl fmt::Display) -> Self {
        Self::Text(Rc::from(content.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Self::Element(e)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Self::text(n)
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Self::text(n)
    }
}

impl From<Vec<Node>> for Node {
    fn from(v: Vec<Node>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<Element>> for Node {
    fn from(v: Vec<Element>) -> Self {
        Self::List(v.into_iter().map(Node::Element).collect())
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Empty, Into::into)
    }
}
