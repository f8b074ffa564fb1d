//! The node tree: an arena of nodes addressed by integer id.
//!
//! An arena of elements indexed by integer id sidesteps Rust's usual cyclic-ownership
//! problem for tree structures (node→parent, attribute→node back-references) without
//! `Rc`/`RefCell` bookkeeping anywhere in the tree itself — `parent`/`children` are
//! plain [`NodeId`]s rather than owning pointers.

use std::fmt;

use crate::attributes::Attributes;
use crate::position::Range;
use crate::tag::Tag;
use crate::token::HtmlString;

/// An index into a [`NodeTree`]'s arena. `0` is always the tree's document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Quirks-mode flag set by DOCTYPE recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuirksMode {
    #[default]
    NoQuirks,
    Quirks,
    LimitedQuirks,
}

/// The kind-specific payload of a [`Node`].
#[derive(Debug, Clone)]
pub enum NodeKind {
    Document {
        quirks_mode: QuirksMode,
    },
    Element {
        tag: Tag,
        attributes: Attributes,
    },
    Text {
        data: String,
    },
    CData {
        data: String,
    },
    /// A leaf node whose single "core value" is compressed into a scalar until a
    /// second attribute forces it to inflate into a full bag.
    Data {
        core_value: LeafValue,
    },
    Comment {
        data: String,
    },
    DocumentType {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    XmlDeclaration {
        name: String,
        attributes: Attributes,
        is_declaration: bool,
    },
}

/// The compressed-or-inflated storage for a leaf node's attribute(s).
#[derive(Debug, Clone)]
pub enum LeafValue {
    Scalar(String),
    Bag(Attributes),
}

impl LeafValue {
    /// The implicit key a leaf's scalar core value is stored under once it has been
    /// forced to inflate into a full bag; this crate's `Data` leaf kind doesn't carry
    /// a tag-name-shaped node name of its own, so it uses the same fixed key jsoup's
    /// `DataNode` does.
    pub const CORE_KEY: &'static str = "data";

    /// Reads `name`, whether still compressed (only [`Self::CORE_KEY`] resolves) or
    /// already inflated into a bag.
    #[must_use]
    pub fn get(&self, name: &[u8]) -> Option<String> {
        match self {
            LeafValue::Scalar(s) if name == Self::CORE_KEY.as_bytes() => Some(s.clone()),
            LeafValue::Scalar(_) => None,
            LeafValue::Bag(attrs) => attrs.get(name).map(HtmlString::to_string_lossy),
        }
    }

    /// Writes `name`; inflates a `Scalar` into a `Bag` first if `name` isn't the core
    /// key, copying the former scalar in under [`Self::CORE_KEY`].
    pub fn set(&mut self, name: &str, value: &str) {
        if let LeafValue::Scalar(s) = self {
            if name == Self::CORE_KEY {
                *s = value.to_owned();
                return;
            }
            let mut bag = Attributes::new();
            bag.push(HtmlString::from(Self::CORE_KEY), HtmlString::from(s.as_str()));
            *self = LeafValue::Bag(bag);
        }
        if let LeafValue::Bag(attrs) = self {
            attrs.set(HtmlString::from(name), HtmlString::from(value));
        }
    }
}

/// An XML element's resolved namespace identity, for elements whose namespace isn't
/// one of the three [`Tag::namespace`] tracks coarsely for HTML's foreign-content
/// rules (Html/MathMl/Svg). `uri` is always the fully resolved namespace URI;
/// `prefix` is the literal prefix the element's tag name carried, if any.
#[derive(Debug, Clone)]
pub struct XmlNamespace {
    pub prefix: Option<String>,
    pub uri: String,
}

/// One node in the tree: common header fields plus a [`NodeKind`] payload.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    // Cached index of this node within `parent`'s children; invalidated (via the
    // parent's `sibling_index_dirty` flag) rather than eagerly maintained.
    sibling_index: usize,
    sibling_index_dirty_children: bool,
    pub kind: NodeKind,
    pub range: Range,
    /// For a `FormElement`-flavored `Element`, the ids of its submittable associates;
    /// reconciled on read since entries may have been detached into a different owner
    /// document.
    pub linked_controls: Vec<NodeId>,
    /// Set only by [`crate::xml_tree_builder::XmlTreeBuilder`] for a prefixed or
    /// non-default-namespaced element; `None` for every HTML-path node and for
    /// unprefixed, unbound XML elements.
    pub xml_namespace: Option<XmlNamespace>,
}

/// An arena of [`Node`]s plus the document-root convenience accessors.
///
/// `NodeTree` is the sole owner of every node in it; `parent`/`children` are indices,
/// never owning references.
pub struct NodeTree {
    nodes: Vec<Node>,
    pub base_uri: String,
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree").field("len", &self.nodes.len()).finish()
    }
}

impl NodeTree {
    /// A fresh tree with only the document root (`#root`, a null-named root element).
    #[must_use]
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            sibling_index: 0,
            sibling_index_dirty_children: false,
            kind: NodeKind::Document {
                quirks_mode: QuirksMode::NoQuirks,
            },
            range: Range::UNTRACKED,
            linked_controls: Vec::new(),
            xml_namespace: None,
        };
        NodeTree {
            nodes: vec![root],
            base_uri: String::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Allocate a fresh, unattached node.
    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            sibling_index: 0,
            sibling_index_dirty_children: false,
            kind,
            range: Range::UNTRACKED,
            linked_controls: Vec::new(),
            xml_namespace: None,
        });
        id
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.index()].children.push(child);
        self.nodes[parent.index()].sibling_index_dirty_children = true;
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Insert `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.index()].children.insert(0, child);
        self.nodes[parent.index()].sibling_index_dirty_children = true;
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Insert `child` immediately before `before_this` (both must share a parent, or
    /// `before_this` just have one — used by foster parenting).
    pub fn insert_before(&mut self, parent: NodeId, before_this: NodeId, child: NodeId) {
        self.detach(child);
        let siblings = &mut self.nodes[parent.index()].children;
        let idx = siblings.iter().position(|&n| n == before_this).unwrap_or(siblings.len());
        siblings.insert(idx, child);
        self.nodes[parent.index()].sibling_index_dirty_children = true;
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Remove `node` from its parent's child list, if any.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.index()].parent.take() {
            let siblings = &mut self.nodes[parent.index()].children;
            if let Some(idx) = siblings.iter().position(|&n| n == node) {
                siblings.remove(idx);
            }
            self.nodes[parent.index()].sibling_index_dirty_children = true;
        }
    }

    /// Remove all children of `node`, detaching each.
    pub fn empty(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.nodes[node.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.index()].children
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].children.first().copied()
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].children.last().copied()
    }

    /// `siblingIndex` for `node`: its position within its parent's child list.
    /// Recomputes and caches all siblings' indices in one O(n) pass if the parent's
    /// cache is dirty, amortizing bulk structural edits.
    pub fn sibling_index(&mut self, node: NodeId) -> usize {
        if let Some(parent) = self.nodes[node.index()].parent {
            if self.nodes[parent.index()].sibling_index_dirty_children {
                self.reindex_children(parent);
            }
        }
        self.nodes[node.index()].sibling_index
    }

    fn reindex_children(&mut self, parent: NodeId) {
        let children = self.nodes[parent.index()].children.clone();
        for (i, child) in children.into_iter().enumerate() {
            self.nodes[child.index()].sibling_index = i;
        }
        self.nodes[parent.index()].sibling_index_dirty_children = false;
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.index()].parent?;
        let siblings = &self.nodes[parent.index()].children;
        let idx = siblings.iter().position(|&n| n == node)?;
        siblings.get(idx + 1).copied()
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.index()].parent?;
        let siblings = &self.nodes[parent.index()].children;
        let idx = siblings.iter().position(|&n| n == node)?;
        idx.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }

    pub fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = self.next_sibling(node);
        while let Some(id) = cur {
            if self.is_element(id) {
                return Some(id);
            }
            cur = self.next_sibling(id);
        }
        None
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = self.previous_sibling(node);
        while let Some(id) = cur {
            if self.is_element(id) {
                return Some(id);
            }
            cur = self.previous_sibling(id);
        }
        None
    }

    pub fn first_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()]
            .children
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    pub fn last_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()]
            .children
            .iter()
            .copied()
            .rev()
            .find(|&c| self.is_element(c))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.index()].kind, NodeKind::Element { .. })
    }

    /// Walks up from `node` to the tree root.
    pub fn root_of(&self, node: NodeId) -> NodeId {
        let mut cur = node;
        while let Some(p) = self.nodes[cur.index()].parent {
            cur = p;
        }
        cur
    }

    /// Concatenated text content of `node` and its descendants.
    pub fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.index()].kind {
            NodeKind::Text { data } | NodeKind::CData { data } => out.push_str(data),
            _ => {
                for &child in &self.nodes[node.index()].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Replace all children of `node` with a single text node containing `text`.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.empty(node);
        let text_node = self.alloc(NodeKind::Text { data: text.to_owned() });
        self.append_child(node, text_node);
    }

    /// Case-sensitive attribute lookup. Reads an `Element`'s attribute
    /// bag, or a `Data` leaf's compressed core value / inflated bag when `name` is [`LeafValue::CORE_KEY`].
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &[u8]) -> Option<String> {
        match &self.nodes[node.index()].kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(HtmlString::to_string_lossy),
            NodeKind::Data { core_value } => core_value.get(name),
            _ => None,
        }
    }

    /// Whether `node` carries `name`.
    #[must_use]
    pub fn has_attr(&self, node: NodeId, name: &[u8]) -> bool {
        self.attr(node, name).is_some()
    }

    /// Set (insert or overwrite) an attribute. On a `Data` leaf this may inflate the
    /// compressed scalar into a full bag.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        match &mut self.nodes[node.index()].kind {
            NodeKind::Element { attributes, .. } => {
                attributes.set(HtmlString::from(name), HtmlString::from(value));
            }
            NodeKind::Data { core_value } => core_value.set(name, value),
            _ => {}
        }
    }

    /// Remove an attribute by case-sensitive name.
    pub fn remove_attr(&mut self, node: NodeId, name: &[u8]) -> bool {
        match &mut self.nodes[node.index()].kind {
            NodeKind::Element { attributes, .. } => attributes.remove(name).is_some(),
            _ => false,
        }
    }

    /// Resolves `attr_name`'s value against [`NodeTree::base_uri`].
    ///
    /// This is a plain string-join resolver rather than a full RFC 3986 implementation,
    /// since CSS-selector/URL-handling layers sit outside this crate's core scope:
    /// an absolute value (containing `://`) is returned as-is; otherwise it is joined
    /// onto `base_uri` after trimming exactly one of each side's overlapping slash.
    #[must_use]
    pub fn abs_url(&self, node: NodeId, attr_name: &[u8]) -> String {
        let Some(value) = self.attr(node, attr_name) else {
            return String::new();
        };
        if value.contains("://") {
            return value;
        }
        if self.base_uri.is_empty() {
            return String::new();
        }
        if let Some(rest) = value.strip_prefix('/') {
            // Absolute-path reference: keep the base's scheme+authority, replace its path.
            if let Some(idx) = self.base_uri.find("://").and_then(|i| self.base_uri[i + 3..].find('/').map(|j| i + 3 + j)) {
                return format!("{}/{}", &self.base_uri[..idx], rest);
            }
            return format!("{}/{}", self.base_uri.trim_end_matches('/'), rest);
        }
        format!("{}/{}", self.base_uri.trim_end_matches('/'), value)
    }

    /// Insert `new_node` as `node`'s previous sibling.
    pub fn insert_node_before(&mut self, node: NodeId, new_node: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.insert_before(parent, node, new_node);
        }
    }

    /// Insert `new_node` as `node`'s next sibling.
    pub fn insert_node_after(&mut self, node: NodeId, new_node: NodeId) {
        match self.next_sibling(node) {
            Some(next) => {
                if let Some(parent) = self.parent(node) {
                    self.insert_before(parent, next, new_node);
                }
            }
            None => {
                if let Some(parent) = self.parent(node) {
                    self.append_child(parent, new_node);
                }
            }
        }
    }

    /// Wraps `node` in `wrapper` — `wrapper` takes `node`'s place among its siblings
    /// and `node` becomes `wrapper`'s (first) child. `wrapper` must be
    /// detached and childless.
    pub fn wrap(&mut self, node: NodeId, wrapper: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.insert_before(parent, node, wrapper);
        }
        self.append_child(wrapper, node);
    }

    /// Replaces `node` with its children in `node`'s parent's child list, then detaches
    /// `node`. Returns the former first child, if any, for callers
    /// that want to keep navigating.
    pub fn unwrap(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let children = std::mem::take(&mut self.nodes[node.index()].children);
        let first = children.first().copied();
        let mut at = node;
        for child in children {
            self.insert_before(parent, at, child);
            at = child;
        }
        self.detach(node);
        first
    }

    /// Replaces `node` with `replacement` at the same position among its siblings
    ///. `replacement` must be detached.
    pub fn replace_with(&mut self, node: NodeId, replacement: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.insert_before(parent, node, replacement);
        }
        self.detach(node);
    }

    /// Shallow clone: `node`'s own kind and range, detached, with no children.
    #[must_use]
    pub fn shallow_clone(&self, node: NodeId) -> NodeTree {
        let mut out = NodeTree {
            nodes: Vec::new(),
            base_uri: self.base_uri.clone(),
        };
        let clone = out.alloc(self.nodes[node.index()].kind.clone());
        out.nodes[clone.index()].range = self.nodes[node.index()].range;
        out
    }

    /// Deep clone of the subtree rooted at `node`, returned detached (no parent),
    /// using an explicit BFS worklist rather than recursion.
    #[must_use]
    pub fn clone_subtree(&self, node: NodeId) -> NodeTree {
        let mut out = NodeTree {
            nodes: Vec::new(),
            base_uri: self.base_uri.clone(),
        };
        let root_clone = out.alloc(self.nodes[node.index()].kind.clone());
        out.nodes[root_clone.index()].range = self.nodes[node.index()].range;

        let mut queue = std::collections::VecDeque::new();
        queue.push_back((node, root_clone));

        while let Some((src, dst)) = queue.pop_front() {
            for &child in &self.nodes[src.index()].children {
                let child_clone = out.alloc(self.nodes[child.index()].kind.clone());
                out.nodes[child_clone.index()].range = self.nodes[child.index()].range;
                out.append_child(dst, child_clone);
                queue.push_back((child, child_clone));
            }
        }

        out
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the tree in document order; tolerant of structural mutation during
/// iteration: if the last-emitted node
/// has been detached since the previous step, the cursor rewinds to its former
/// sibling position and continues from there instead of panicking or skipping.
pub struct NodeIterator<'a> {
    tree: &'a NodeTree,
    root: NodeId,
    // Last node emitted, and its parent/sibling-position at the time, so we can
    // recover if it gets detached before the next `next()` call.
    last: Option<(NodeId, Option<NodeId>, usize)>,
    started: bool,
    done: bool,
}

impl<'a> NodeIterator<'a> {
    #[must_use]
    pub fn new(tree: &'a NodeTree, root: NodeId) -> Self {
        NodeIterator {
            tree,
            root,
            last: None,
            started: false,
            done: false,
        }
    }

    fn node_still_in_place(&self, id: NodeId, parent: Option<NodeId>) -> bool {
        self.tree.nodes[id.index()].parent == parent
    }
}

impl<'a> Iterator for NodeIterator<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            let parent = self.tree.parent(self.root);
            self.last = Some((self.root, parent, 0));
            return Some(self.root);
        }

        let (mut cur, mut parent, mut sib_pos) = self.last?;

        // If `cur` has been detached since we emitted it, recover by resuming from
        // where it used to sit among its former siblings.
        if !self.node_still_in_place(cur, parent) {
            if let Some(p) = parent {
                let siblings = self.tree.children(p);
                // Resume just after the former position; clamp into range.
                let resume_idx = sib_pos.min(siblings.len());
                if let Some(&next) = siblings.get(resume_idx) {
                    self.last = Some((next, Some(p), resume_idx));
                    return Some(next);
                }
                // fall through to "pop to parent and continue" below by pretending
                // we are sitting at the parent with no children left.
                cur = p;
                parent = self.tree.parent(p);
                sib_pos = self
                    .tree
                    .parent(p)
                    .map(|gp| self.tree.children(gp).iter().position(|&n| n == p).unwrap_or(0))
                    .unwrap_or(0);
            } else {
                self.done = true;
                return None;
            }
        }

        // Descend into first child if any.
        if let Some(child) = self.tree.first_child(cur) {
            self.last = Some((child, Some(cur), 0));
            return Some(child);
        }

        // Else walk up, taking the next sibling at the first ancestor that has one.
        let mut node = cur;
        loop {
            if node == self.root {
                self.done = true;
                return None;
            }
            let p = match self.tree.parent(node) {
                Some(p) => p,
                None => {
                    self.done = true;
                    return None;
                }
            };
            let siblings = self.tree.children(p);
            let idx = siblings.iter().position(|&n| n == node).unwrap_or(0);
            if let Some(&next) = siblings.get(idx + 1) {
                self.last = Some((next, Some(p), idx + 1));
                return Some(next);
            }
            node = p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tree: &mut NodeTree, parent: NodeId, s: &str) -> NodeId {
        let n = tree.alloc(NodeKind::Text { data: s.to_owned() });
        tree.append_child(parent, n);
        n
    }

    #[test]
    fn sibling_index_tracks_mutation() {
        let mut tree = NodeTree::new();
        let root = tree.root();
        let a = text(&mut tree, root, "a");
        let b = text(&mut tree, root, "b");
        let c = text(&mut tree, root, "c");
        assert_eq!(tree.sibling_index(a), 0);
        assert_eq!(tree.sibling_index(b), 1);
        assert_eq!(tree.sibling_index(c), 2);

        tree.detach(b);
        assert_eq!(tree.sibling_index(c), 1);
    }

    #[test]
    fn iterator_visits_in_document_order() {
        let mut tree = NodeTree::new();
        let root = tree.root();
        let a = text(&mut tree, root, "a");
        let b = text(&mut tree, root, "b");
        let visited: Vec<_> = NodeIterator::new(&tree, root).collect();
        assert_eq!(visited, vec![root, a, b]);
    }

    #[test]
    fn iterator_recovers_when_emitted_node_is_detached() {
        // Build root -> [a, b, c], simulate having already emitted `b` (sibling
        // position 1), then detach it — root's children become [a, c] — before
        // resuming the walk. The recovery branch in `Iterator::next` must notice
        // `b` is no longer in place and continue from its former sibling slot,
        // landing on `c`, rather than panicking or silently skipping the rest of
        // the tree.
        let mut tree = NodeTree::new();
        let root = tree.root();
        let a = text(&mut tree, root, "a");
        let b = text(&mut tree, root, "b");
        let c = text(&mut tree, root, "c");
        let _ = a;

        tree.detach(b);

        let mut it = NodeIterator {
            tree: &tree,
            root,
            last: Some((b, Some(root), 1)),
            started: true,
            done: false,
        };
        assert_eq!(it.next(), Some(c));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn clone_subtree_is_detached_copy() {
        let mut tree = NodeTree::new();
        let root = tree.root();
        text(&mut tree, root, "hello");
        let clone = tree.clone_subtree(root);
        assert_eq!(clone.text(clone.root()), "hello");
    }
}
