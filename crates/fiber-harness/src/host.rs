#![forbid(unsafe_code)]

//! In-memory host tree that records every primitive it receives.
//!
//! Misuse that a correct reconciler never produces (inserting before a node
//! that is not a child, removing a node from the wrong parent) panics, so a
//! test fails at the offending commit rather than at a later assertion.

use std::fmt::Write as _;

use fiber_core::{Handler, Host, PropValue, Props};

/// Handle to a node of a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(pub usize);

/// One primitive call received by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Create { node: HostNode, tag: String },
    CreateText { node: HostNode, content: String },
    Append { parent: HostNode, child: HostNode },
    Insert { parent: HostNode, child: HostNode, before: HostNode },
    Remove { parent: HostNode, child: HostNode },
    /// Attributes of `node` changed; `changed` lists the attribute names.
    Update { node: HostNode, changed: Vec<String> },
    UpdateText { node: HostNode, content: String },
}

impl HostOp {
    /// Whether the op changes the shape of the attached tree.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Append { .. } | Self::Insert { .. } | Self::Remove { .. })
    }
}

#[derive(Debug)]
enum NodeKind {
    Element { tag: String, props: Props },
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

/// A host tree held in memory. Node `0` is the container.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: Vec<NodeData>,
    ops: Vec<HostOp>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub const CONTAINER_TAG: &'static str = "#root";

    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Element {
                    tag: Self::CONTAINER_TAG.to_owned(),
                    props: Props::new(),
                },
                parent: None,
                children: Vec::new(),
            }],
            ops: Vec::new(),
        }
    }

    #[must_use]
    pub fn container(&self) -> HostNode {
        HostNode(0)
    }

    /// Number of nodes ever created, the container included.
    #[must_use]
    pub fn created(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    #[must_use]
    pub fn children(&self, node: HostNode) -> &[HostNode] {
        &self.nodes[node.0].children
    }

    #[must_use]
    pub fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.nodes[node.0].parent
    }

    /// Element tag, or `None` for text nodes.
    #[must_use]
    pub fn tag(&self, node: HostNode) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Text of a text node.
    #[must_use]
    pub fn text(&self, node: HostNode) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(content) => Some(content),
            NodeKind::Element { .. } => None,
        }
    }

    #[must_use]
    pub fn prop(&self, node: HostNode, name: &str) -> Option<&PropValue> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { props, .. } => props.get(name),
            NodeKind::Text(_) => None,
        }
    }

    #[must_use]
    pub fn handler(&self, node: HostNode, event: &str) -> Option<Handler> {
        self.prop(node, event).and_then(PropValue::as_handler).cloned()
    }

    /// Concatenated text of every attached text node under `node`.
    #[must_use]
    pub fn text_content(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.walk(node, &mut |id| {
            if let Some(t) = self.text(id) {
                out.push_str(t);
            }
        });
        out
    }

    /// Markup of the container's children, e.g. `<p id="a">hi</p>`.
    /// Attributes appear sorted by name; handlers are omitted.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in self.children(self.container()) {
            self.write_html(child, &mut out);
        }
        out
    }

    /// Markup of `node` and its subtree.
    #[must_use]
    pub fn render_to_string(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    /// Attached elements with `tag`, in document order.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<HostNode> {
        let mut found = Vec::new();
        self.walk(self.container(), &mut |id| {
            if id != HostNode(0) && self.tag(id) == Some(tag) {
                found.push(id);
            }
        });
        found
    }

    /// Attached elements whose `name` attribute displays as `value`.
    #[must_use]
    pub fn find_by_prop(&self, name: &str, value: &str) -> Vec<HostNode> {
        let mut found = Vec::new();
        self.walk(self.container(), &mut |id| {
            if self.prop(id, name).is_some_and(|v| v.to_string() == value) {
                found.push(id);
            }
        });
        found
    }

    fn walk(&self, node: HostNode, visit: &mut impl FnMut(HostNode)) {
        visit(node);
        for &child in &self.nodes[node.0].children {
            self.walk(child, visit);
        }
    }

    fn write_html(&self, node: HostNode, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(content) => out.push_str(content),
            NodeKind::Element { tag, props } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in props.attrs() {
                    if value.as_handler().is_none() {
                        let _ = write!(out, " {name}=\"{value}\"");
                    }
                }
                out.push('>');
                for &child in &self.nodes[node.0].children {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> HostNode {
        let id = HostNode(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn detach(&mut self, child: HostNode) {
        if let Some(old) = self.nodes[child.0].parent.take() {
            self.nodes[old.0].children.retain(|c| *c != child);
        }
    }
}

impl Host for MemoryHost {
    type Instance = HostNode;

    fn create_instance(&mut self, tag: &str, props: &Props) -> HostNode {
        let node = self.push_node(NodeKind::Element {
            tag: tag.to_owned(),
            props: props.clone(),
        });
        self.ops.push(HostOp::Create {
            node,
            tag: tag.to_owned(),
        });
        node
    }

    fn create_text_instance(&mut self, content: &str) -> HostNode {
        let node = self.push_node(NodeKind::Text(content.to_owned()));
        self.ops.push(HostOp::CreateText {
            node,
            content: content.to_owned(),
        });
        node
    }

    fn append_child(&mut self, parent: &HostNode, child: &HostNode) {
        self.detach(*child);
        self.nodes[parent.0].children.push(*child);
        self.nodes[child.0].parent = Some(*parent);
        self.ops.push(HostOp::Append {
            parent: *parent,
            child: *child,
        });
    }

    fn insert_before(&mut self, parent: &HostNode, child: &HostNode, before: &HostNode) {
        self.detach(*child);
        let Some(at) = self.nodes[parent.0].children.iter().position(|c| c == before) else {
            panic!("insert_before: {before:?} is not a child of {parent:?}");
        };
        self.nodes[parent.0].children.insert(at, *child);
        self.nodes[child.0].parent = Some(*parent);
        self.ops.push(HostOp::Insert {
            parent: *parent,
            child: *child,
            before: *before,
        });
    }

    fn remove_child(&mut self, parent: &HostNode, child: &HostNode) {
        assert_eq!(
            self.nodes[child.0].parent,
            Some(*parent),
            "remove_child: {child:?} is not a child of {parent:?}"
        );
        self.detach(*child);
        self.ops.push(HostOp::Remove {
            parent: *parent,
            child: *child,
        });
    }

    fn update_instance(&mut self, instance: &HostNode, old: &Props, new: &Props) {
        let mut changed: Vec<String> = Vec::new();
        for (name, value) in new.attrs() {
            if old.get(name) != Some(value) {
                changed.push(name.to_owned());
            }
        }
        for (name, _) in old.attrs() {
            if new.get(name).is_none() {
                changed.push(name.to_owned());
            }
        }
        changed.sort();
        if let NodeKind::Element { props, .. } = &mut self.nodes[instance.0].kind {
            *props = new.clone();
        }
        self.ops.push(HostOp::Update {
            node: *instance,
            changed,
        });
    }

    fn update_text(&mut self, instance: &HostNode, content: &str) {
        if let NodeKind::Text(text) = &mut self.nodes[instance.0].kind {
            content.clone_into(text);
        }
        self.ops.push(HostOp::UpdateText {
            node: *instance,
            content: content.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_sorts_attributes_and_skips_handlers() {
        let mut host = MemoryHost::new();
        let props = Props::new()
            .with("id", "x")
            .with("class", "c")
            .with("onclick", Handler::new(|| {}));
        let div = host.create_instance("div", &props);
        let text = host.create_text_instance("hi");
        host.append_child(&div, &text);
        let root = host.container();
        host.append_child(&root, &div);
        assert_eq!(host.to_html(), r#"<div class="c" id="x">hi</div>"#);
        assert!(host.handler(div, "onclick").is_some());
        assert_eq!(host.find_by_tag("div"), vec![div]);
    }

    #[test]
    fn insert_before_moves_attached_nodes() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");
        host.append_child(&root, &a);
        host.append_child(&root, &b);
        host.insert_before(&root, &b, &a);
        assert_eq!(host.children(root), &[b, a]);
        assert_eq!(host.text_content(root), "ba");
    }

    #[test]
    #[should_panic(expected = "not a child")]
    fn removing_a_detached_node_panics() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let a = host.create_text_instance("a");
        host.remove_child(&root, &a);
    }
}
