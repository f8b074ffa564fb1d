//! XML tree construction: namespace-scope-stack tree building with no
//! insertion modes, no adoption agency, and no foster parenting.
//!
//! html5gum has no XML mode, so this is grounded instead on the shape of
//! `src/trees/construction_dispatcher.rs`'s element/attribute handling
//! (`Document`/`Node` bookkeeping, stack-based construction) simplified down to
//! namespace resolution with no insertion modes, and on this crate's own
//! [`crate::tag::Tag`]/[`crate::tree::NodeTree`] APIs already established by
//! [`crate::html_tree_builder`].

use std::collections::HashMap;

use crate::attributes::Attributes;
use crate::error::Error;
use crate::tag::{Namespace, TagSet};
use crate::token::{HtmlString, Token};
use crate::tree::{NodeId, NodeKind, NodeTree, QuirksMode, XmlNamespace};

const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// One level of the namespace-scope stack: `prefix → URI`, including the empty
/// prefix for the default namespace.
#[derive(Clone, Default)]
struct NamespaceScope {
    bindings: HashMap<String, String>,
}

impl NamespaceScope {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }
}

struct OpenElement {
    node: NodeId,
    name: HtmlString,
}

/// The XML tree builder.
pub struct XmlTreeBuilder {
    pub tree: NodeTree,
    pub tags: TagSet,
    scopes: Vec<NamespaceScope>,
    open_elements: Vec<OpenElement>,
    pub max_depth: usize,
    pub errors: Vec<Error>,
    done: bool,
}

impl XmlTreeBuilder {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        let mut root_scope = NamespaceScope::default();
        root_scope.bindings.insert("xml".to_owned(), XML_NAMESPACE_URI.to_owned());
        root_scope.bindings.insert(String::new(), String::new());

        let mut tree = NodeTree::new();
        tree.node_mut(tree.root()).kind = NodeKind::Document {
            quirks_mode: QuirksMode::NoQuirks,
        };

        XmlTreeBuilder {
            tree,
            tags: TagSet::empty(),
            scopes: vec![root_scope],
            open_elements: Vec::new(),
            max_depth: max_depth.max(1),
            errors: Vec::new(),
            done: false,
        }
    }

    fn error(&mut self, e: Error) {
        self.errors.push(e);
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.done
    }

    fn current_parent(&self) -> NodeId {
        self.open_elements.last().map(|e| e.node).unwrap_or_else(|| self.tree.root())
    }

    /// The innermost open element, exposed for the orchestrator's position stamping.
    #[must_use]
    pub fn current_node_id(&self) -> Option<NodeId> {
        self.open_elements.last().map(|e| e.node)
    }

    fn current_scope(&self) -> &NamespaceScope {
        self.scopes.last().expect("namespace scope stack is never empty")
    }

    /// Split `a:b` into `(Some("a"), "b")`, or `(None, "a")` for an unprefixed name.
    fn split_prefix(name: &str) -> (Option<&str>, &str) {
        match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        }
    }

    /// Resolves `prefix` against the current scope to both a URI (the full resolved
    /// identity, kept verbatim for [`crate::tree::XmlNamespace`]) and a coarse
    /// [`Namespace`] ([`Tag`] only distinguishes Html/MathMl/Svg, the three namespaces
    /// HTML's foreign-content rules care about; every other URI collapses to `Html`
    /// there, but the verbatim URI survives separately).
    fn resolve_namespace(&self, prefix: Option<&str>) -> Option<(Namespace, &str)> {
        let uri = self.current_scope().resolve(prefix.unwrap_or(""))?;
        let namespace = match uri {
            "http://www.w3.org/1998/Math/MathML" => Namespace::MathMl,
            "http://www.w3.org/2000/svg" => Namespace::Svg,
            _ => Namespace::Html,
        };
        Some((namespace, uri))
    }

    fn push_scope_from_attributes(&mut self, attrs: &Attributes) -> NamespaceScope {
        let mut scope = self.current_scope().clone();
        for attr in attrs.iter() {
            let name = attr.name.to_string_lossy();
            if name == "xmlns" {
                scope.bindings.insert(String::new(), attr.value.to_string_lossy());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                scope.bindings.insert(prefix.to_owned(), attr.value.to_string_lossy());
            }
        }
        scope
    }

    fn enforce_depth_cap(&mut self) {
        while self.open_elements.len() >= self.max_depth {
            self.open_elements.pop();
        }
    }

    /// Feed one token through the builder.
    pub fn process(&mut self, token: Token) {
        if self.done {
            return;
        }
        match token {
            Token::Eof => {
                self.open_elements.clear();
                self.done = true;
            }
            Token::Doctype(d, _) => {
                let name = d.name.to_string_lossy();
                let doctype_node = self.tree.alloc(NodeKind::DocumentType {
                    name,
                    public_id: d.public_id.map(|s| s.to_string_lossy()),
                    system_id: d.system_id.map(|s| s.to_string_lossy()),
                });
                let root = self.tree.root();
                self.tree.append_child(root, doctype_node);
            }
            Token::Comment(c, _) => {
                let node = self.tree.alloc(NodeKind::Comment { data: c.data.to_string_lossy() });
                let parent = self.current_parent();
                self.tree.append_child(parent, node);
            }
            Token::XmlDecl(decl, _) => {
                let node = self.tree.alloc(NodeKind::XmlDeclaration {
                    name: decl.name.to_string_lossy(),
                    attributes: decl.attributes,
                    is_declaration: decl.is_declaration,
                });
                let parent = self.current_parent();
                self.tree.append_child(parent, node);
            }
            Token::Character(c, _) => {
                let parent = self.current_parent();
                if let Some(last) = self.tree.last_child(parent) {
                    if let NodeKind::Text { data } = &mut self.tree.node_mut(last).kind {
                        data.push_str(&c.data);
                        return;
                    }
                }
                let node = self.tree.alloc(NodeKind::Text { data: c.data });
                self.tree.append_child(parent, node);
            }
            Token::StartTag(t, _) => {
                self.enforce_depth_cap();
                let new_scope = self.push_scope_from_attributes(&t.attributes);
                self.scopes.push(new_scope);

                let full_name = t.name.to_string_lossy();
                let (prefix, local) = Self::split_prefix(&full_name);
                let (namespace, resolved_uri) = match self.resolve_namespace(prefix) {
                    Some((ns, uri)) => (ns, Some(uri.to_owned())),
                    None => {
                        if prefix.is_some() {
                            self.error(Error::UnboundNamespacePrefix);
                        }
                        (Namespace::Html, None)
                    }
                };

                let tag = self.tags.value_of(local, local, namespace, true);
                let mut attributes = Attributes::new();
                for attr in t.attributes.iter() {
                    let attr_name = attr.name.to_string_lossy();
                    if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
                        continue;
                    }
                    attributes.push(attr.name.clone(), attr.value.clone());
                }

                let node = self.tree.alloc(NodeKind::Element { tag, attributes });
                // `namespace` on `Tag` only distinguishes Html/MathMl/Svg (HTML's
                // foreign-content categories); record the verbatim resolved URI here
                // whenever it's not the trivial no-namespace case, so a prefixed or
                // xmlns-defaulted element's real namespace URI isn't lost.
                if let Some(uri) = resolved_uri {
                    if prefix.is_some() || !uri.is_empty() {
                        self.tree.node_mut(node).xml_namespace = Some(XmlNamespace {
                            prefix: prefix.map(str::to_owned),
                            uri,
                        });
                    }
                }
                let parent = self.current_parent();
                self.tree.append_child(parent, node);

                if t.self_closing {
                    self.scopes.pop();
                } else {
                    self.open_elements.push(OpenElement {
                        node,
                        name: HtmlString::from(full_name),
                    });
                }
            }
            Token::EndTag(t, _) => {
                let target = t.name.to_string_lossy();
                if let Some(idx) = self
                    .open_elements
                    .iter()
                    .rposition(|e| e.name.to_string_lossy() == target)
                {
                    while self.open_elements.len() > idx {
                        self.open_elements.pop();
                        self.scopes.pop();
                    }
                } else {
                    self.error(Error::MismatchedEndTag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{StartTag, TokenSpan};

    fn start(name: &str, attrs: &[(&str, &str)]) -> Token {
        let mut t = StartTag::default();
        t.set_name(HtmlString::from(name));
        for (n, v) in attrs {
            t.attributes.push(HtmlString::from(*n), HtmlString::from(*v));
        }
        Token::StartTag(t, TokenSpan::default())
    }

    fn end(name: &str) -> Token {
        let mut t = crate::token::EndTag::default();
        t.push_name(name);
        Token::EndTag(t, TokenSpan::default())
    }

    #[test]
    fn resolves_prefixed_namespace() {
        let mut b = XmlTreeBuilder::new(512);
        b.process(start("root", &[("a", "1"), ("xmlns:x", "urn:x")]));
        b.process(start("x:a", &[]));
        b.process(end("x:a"));
        b.process(end("root"));
        b.process(Token::Eof);

        let root = b.tree.root();
        let root_el = b.tree.first_child(root).unwrap();
        let child = b.tree.first_child(root_el).unwrap();
        match &b.tree.node(child).kind {
            NodeKind::Element { tag, .. } => assert_eq!(tag.name(), "a"),
            _ => panic!("expected element"),
        }
        let ns = b.tree.node(child).xml_namespace.as_ref().expect("prefixed element keeps its namespace");
        assert_eq!(ns.prefix.as_deref(), Some("x"));
        assert_eq!(ns.uri, "urn:x");
        assert!(b.tree.node(root_el).xml_namespace.is_none());
    }

    #[test]
    fn mismatched_end_tag_is_ignored() {
        let mut b = XmlTreeBuilder::new(512);
        b.process(start("root", &[]));
        b.process(end("bogus"));
        b.process(Token::Eof);
        assert_eq!(b.errors.len(), 1);
    }
}
