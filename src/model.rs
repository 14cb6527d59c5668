//! The document tree: blocks, inlines, marks, positions and selections
//! (§3). Documents are conceptually immutable — every mutation in
//! `ops::apply` returns a new `Document` value; nothing here mutates a
//! `Document` in place from outside the crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ops::Op;

/// JSON-scalar-or-object attribute map, as used by `attrs` throughout the
/// wire format.
pub type Attrs = BTreeMap<String, serde_json::Value>;

/// A path of child indices, walked from a node's `children`. An empty path
/// addresses the node itself.
pub type NodePath = Vec<usize>;

/// An inline annotation attached to a `TextNode`. Two marks are equal iff
/// their type and attrs match structurally (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
}

impl Mark {
    pub fn new(mark_type: impl Into<String>) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: None,
        }
    }

    pub fn with_attrs(mark_type: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: Some(attrs),
        }
    }
}

impl PartialEq for Mark {
    fn eq(&self, other: &Self) -> bool {
        self.mark_type == other.mark_type && self.attrs == other.attrs
    }
}
impl Eq for Mark {}

/// A block or inline node in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Node {
    #[serde(rename = "element")]
    Element(ElementNode),
    #[serde(rename = "text")]
    Text(TextNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Element(e) => &e.id,
            Node::Text(t) => &t.id,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    /// Concatenated text of every `TextNode` reachable below (and
    /// including) this node, in document order.
    pub fn concatenated_text(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(e) => e.children.iter().map(Node::concatenated_text).collect(),
        }
    }

    /// Every id in this subtree, including this node's own id.
    pub fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id().to_string());
        if let Node::Element(e) = self {
            for child in &e.children {
                child.collect_ids(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            attrs: Attrs::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

impl TextNode {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn has_mark(&self, mark: &Mark) -> bool {
        self.marks.contains(mark)
    }
}

/// A caret or endpoint inside a document. For flat documents `path` is
/// empty and `block_index`/`offset` identify a character offset across
/// the `block_index`-th block's concatenated text (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub block_index: usize,
    #[serde(default)]
    pub path: NodePath,
    pub offset: usize,
}

impl Position {
    pub fn new(block_index: usize, offset: usize) -> Self {
        Self {
            block_index,
            path: Vec::new(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Position,
    pub focus: Position,
}

impl Selection {
    pub fn collapsed(pos: Position) -> Self {
        Self {
            anchor: pos.clone(),
            focus: pos,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// An ordered sequence of block nodes plus a monotonically increasing
/// version (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u64,
    pub children: Vec<ElementNode>,
}

impl Document {
    pub fn new(children: Vec<ElementNode>) -> Self {
        Self {
            version: 0,
            children,
        }
    }

    pub fn empty() -> Self {
        Self {
            version: 0,
            children: Vec::new(),
        }
    }

    /// Concatenated text of block `index`, across all descendant text
    /// nodes in document order (invariant 4).
    pub fn block_text(&self, index: usize) -> Option<String> {
        self.children
            .get(index)
            .map(|b| Node::Element(b.clone()).concatenated_text())
    }

    /// All ids present in the document. Used by invariant checks and the
    /// delta generator's id-keyed block matching.
    pub fn all_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        for child in &self.children {
            Node::Element(child.clone()).collect_ids(&mut out);
        }
        out
    }

    /// Invariant 1: every node has a non-empty id, unique within the
    /// document.
    pub fn ids_are_unique(&self) -> bool {
        let ids = self.all_ids();
        if ids.iter().any(String::is_empty) {
            return false;
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.len() == ids.len()
    }
}

/// The editor's observable state: the document plus an optional selection
/// (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentState {
    pub doc: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

impl ContentState {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            selection: None,
        }
    }
}

/// A batch of changes submitted to `Editor::dispatch` (§3): `operations`
/// to apply, optionally a whole-document replacement and/or a selection
/// update, tagged with `origin` so listeners and plugins can tell a local
/// edit from a remote one or from history playback (§5.3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub operations: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    pub origin: String,
    pub timestamp: u64,
}

impl Transaction {
    pub fn new(operations: Vec<Op>, origin: impl Into<String>, timestamp: u64) -> Self {
        Self {
            operations,
            doc: None,
            selection: None,
            origin: origin.into(),
            timestamp,
        }
    }

    pub fn with_doc(mut self, doc: Document) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Shorthand for the common local-edit case: origin `"local"`.
    pub fn local(operations: Vec<Op>, timestamp: u64) -> Self {
        Self::new(operations, "local", timestamp)
    }

    /// Shorthand for a remote delta applied via `dispatch`: origin
    /// `"remote"`, which callers use to skip local-echo outbound diffing
    /// (§5.3).
    pub fn remote(operations: Vec<Op>, timestamp: u64) -> Self {
        Self::new(operations, "remote", timestamp)
    }
}
