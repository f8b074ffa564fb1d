//! Output serialization: Raw/Pretty/Outline printers, escape modes, and
//! whitespace-normalization rules.
//!
//! html5gum is tokenizer/tree-builder only and leaves serialization to its consumers,
//! so this module is modeled on jsoup's own `Entities`/`Document.OutputSettings`
//! serializer, following the crate's existing hand-rolled `Display`-impl style
//! (`error.rs`) rather than pulling in a templating crate.

use std::fmt::Write as _;

use crate::tag::TagOptions;
use crate::tree::{NodeId, NodeKind, NodeTree};

/// Output syntax: controls void-element/attribute-quote/DOCTYPE conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Html,
    Xml,
}

/// Text escaping table selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    Xhtml,
    Base,
    Extended,
}

bitflags_lite::bitflags_lite! {
    /// Escape-option flags composing how a text run is escaped.
    pub struct EscapeOptions: u8 {
        const FOR_TEXT = 1 << 0;
        const FOR_ATTRIBUTE = 1 << 1;
        const NORMALISE = 1 << 2;
        const TRIM_LEADING = 1 << 3;
        const TRIM_TRAILING = 1 << 4;
    }
}

mod bitflags_lite {
    macro_rules! bitflags_lite {
        (
            $(#[$outer:meta])*
            pub struct $name:ident: $ty:ty {
                $(const $flag:ident = $value:expr;)*
            }
        ) => {
            $(#[$outer])*
            #[derive(Clone, Copy, PartialEq, Eq, Default)]
            pub struct $name($ty);

            #[allow(missing_docs)]
            impl $name {
                $(pub const $flag: $name = $name($value);)*

                #[must_use]
                pub const fn empty() -> Self { $name(0) }

                #[must_use]
                pub const fn contains(&self, other: Self) -> bool {
                    (self.0 & other.0) == other.0
                }
            }

            impl std::ops::BitOr for $name {
                type Output = Self;
                fn bitor(self, rhs: Self) -> Self { $name(self.0 | rhs.0) }
            }
        };
    }
    pub(crate) use bitflags_lite;
}

/// Output settings attached to a [`crate::parser::Document`].
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub syntax: Syntax,
    pub escape_mode: EscapeMode,
    pub charset: &'static str,
    pub pretty_print: bool,
    pub outline: bool,
    pub indent_amount: usize,
    /// `-1` (represented as `None`) means unbounded.
    pub max_padding_width: Option<usize>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            syntax: Syntax::Html,
            escape_mode: EscapeMode::Base,
            charset: "UTF-8",
            pretty_print: true,
            outline: false,
            indent_amount: 1,
            max_padding_width: Some(30),
        }
    }
}

/// Escapes `s` into `out` per `mode`/`options`.
///
/// The five flags compose: `NORMALISE` collapses whitespace runs before `TRIM_LEADING`/
/// `TRIM_TRAILING` strip the ends, then each remaining char is escaped per
/// `FOR_TEXT`/`FOR_ATTRIBUTE`.
pub fn escape_into(out: &mut String, s: &str, mode: EscapeMode, options: EscapeOptions) {
    let for_attribute = options.contains(EscapeOptions::FOR_ATTRIBUTE);
    let for_text = options.contains(EscapeOptions::FOR_TEXT);

    let normalised;
    let mut data = if options.contains(EscapeOptions::NORMALISE) {
        normalised = normalise(s);
        normalised.as_str()
    } else {
        s
    };
    if options.contains(EscapeOptions::TRIM_LEADING) {
        data = data.trim_start();
    }
    if options.contains(EscapeOptions::TRIM_TRAILING) {
        data = data.trim_end();
    }

    for c in data.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if for_attribute => out.push_str("&quot;"),
            '\'' if for_text && for_attribute => out.push_str("&#x27;"),
            '\u{00A0}' => {
                if mode == EscapeMode::Xhtml {
                    out.push_str("&#xa0;");
                } else {
                    out.push_str("&nbsp;");
                }
            }
            c if mode == EscapeMode::Xhtml && is_xml_invalid(c) => {
                // XML-invalid codepoints are dropped silently in XHTML mode.
            }
            c => out.push(c),
        }
    }
}

fn is_xml_invalid(c: char) -> bool {
    let cp = c as u32;
    !(cp == 0x9
        || cp == 0xA
        || cp == 0xD
        || (0x20..=0xD7FF).contains(&cp)
        || (0xE000..=0xFFFD).contains(&cp)
        || (0x10000..=0x10FFFF).contains(&cp))
}

/// Collapse runs of HTML whitespace to single spaces.
fn normalise(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c') {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Which output layout a document renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Printer {
    Raw,
    Pretty,
    Outline,
}

/// Serializes `node` and its descendants to `out` per `settings`, backing
/// `Document::serialize`/`serialize_node`.
pub fn serialize(out: &mut String, tree: &NodeTree, node: NodeId, settings: &OutputSettings) {
    let printer = match (settings.pretty_print, settings.outline) {
        (false, _) => Printer::Raw,
        (true, false) => Printer::Pretty,
        (true, true) => Printer::Outline,
    };
    let mut ctx = SerializeCtx {
        tree,
        settings,
        printer,
        depth: 0,
        preserve_whitespace_depth: 0,
    };
    ctx.write_node(out, node, true);
}

struct SerializeCtx<'a> {
    tree: &'a NodeTree,
    settings: &'a OutputSettings,
    printer: Printer,
    depth: usize,
    preserve_whitespace_depth: usize,
}

impl<'a> SerializeCtx<'a> {
    fn indent(&self, out: &mut String) {
        if self.printer == Printer::Raw || self.preserve_whitespace_depth > 0 {
            return;
        }
        out.push('\n');
        let width = self.depth * self.settings.indent_amount;
        let width = match self.settings.max_padding_width {
            Some(max) => width.min(max),
            None => width,
        };
        for _ in 0..width {
            out.push(' ');
        }
    }

    fn is_block(&self, tag: &crate::tag::Tag) -> bool {
        self.printer == Printer::Outline || tag.is(TagOptions::BLOCK)
    }

    fn write_node(&mut self, out: &mut String, id: NodeId, is_root_call: bool) {
        match &self.tree.node(id).kind {
            NodeKind::Document { .. } => {
                for &child in self.tree.children(id) {
                    self.write_node(out, child, false);
                }
            }
            NodeKind::DocumentType { name, public_id, system_id } => {
                self.write_doctype(out, name, public_id.as_deref(), system_id.as_deref());
            }
            NodeKind::XmlDeclaration { name, attributes, is_declaration } => {
                out.push_str(if *is_declaration { "<!" } else { "<?" });
                out.push_str(name);
                for attr in attributes.iter() {
                    let _ = write!(out, " {}=\"{}\"", attr.name.to_string_lossy(), attr.value.to_string_lossy());
                }
                out.push_str(if *is_declaration { ">" } else { "?>" });
            }
            NodeKind::Comment { data } => {
                out.push_str("<!--");
                out.push_str(data);
                out.push_str("-->");
            }
            NodeKind::Text { .. } | NodeKind::CData { .. } => {
                self.write_text(out, id);
            }
            NodeKind::Data { core_value } => match core_value {
                crate::tree::LeafValue::Scalar(s) => out.push_str(s),
                crate::tree::LeafValue::Bag(attrs) => {
                    for attr in attrs.iter() {
                        out.push_str(&attr.value.to_string_lossy());
                    }
                }
            },
            NodeKind::Element { .. } => {
                self.write_element(out, id, is_root_call);
            }
        }
    }

    fn write_doctype(&self, out: &mut String, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        out.push_str("<!doctype ");
        out.push_str(name);
        match (public_id, system_id) {
            (Some(p), Some(s)) if !p.is_empty() => {
                let _ = write!(out, " public \"{p}\" \"{s}\"");
            }
            (Some(p), None) if !p.is_empty() => {
                let _ = write!(out, " public \"{p}\"");
            }
            (_, Some(s)) if !s.is_empty() => {
                let _ = write!(out, " system \"{s}\"");
            }
            _ => {}
        }
        out.push('>');
    }

    fn write_text(&self, out: &mut String, id: NodeId) {
        let data = match &self.tree.node(id).kind {
            NodeKind::Text { data } | NodeKind::CData { data } => data.as_str(),
            _ => unreachable!(),
        };
        let mut options = EscapeOptions::FOR_TEXT;
        if self.printer != Printer::Raw && self.preserve_whitespace_depth == 0 {
            options = options | EscapeOptions::NORMALISE;
            if self.adjacent_is_block_or_absent(self.tree.previous_sibling(id)) {
                options = options | EscapeOptions::TRIM_LEADING;
            }
            if self.adjacent_is_block_or_absent(self.tree.next_sibling(id)) {
                options = options | EscapeOptions::TRIM_TRAILING;
            }
        }
        escape_into(out, data, self.settings.escape_mode, options);
    }

    /// A boundary trims against: no sibling on that side, or a block-level one.
    fn adjacent_is_block_or_absent(&self, sibling: Option<NodeId>) -> bool {
        match sibling {
            None => true,
            Some(id) => match &self.tree.node(id).kind {
                NodeKind::Element { tag, .. } => self.is_block(tag),
                _ => false,
            },
        }
    }

    fn write_element(&mut self, out: &mut String, id: NodeId, is_root_call: bool) {
        let (tag, indents) = {
            let NodeKind::Element { tag, .. } = &self.tree.node(id).kind else {
                unreachable!()
            };
            // Indent whenever something has already been written, not merely when a
            // previous sibling exists: the first child of a block parent still sits on
            // its own line, since the parent's own opening tag already started one.
            let should_indent =
                !is_root_call && self.is_block(tag) && self.preserve_whitespace_depth == 0 && !out.is_empty();
            (tag.clone(), should_indent)
        };

        if indents {
            self.indent(out);
        }

        out.push('<');
        out.push_str(tag.name());
        if let NodeKind::Element { attributes, .. } = &self.tree.node(id).kind {
            for attr in attributes.iter() {
                let mut escaped_value = String::new();
                escape_into(
                    &mut escaped_value,
                    &attr.value.to_string_lossy(),
                    self.settings.escape_mode,
                    EscapeOptions::FOR_ATTRIBUTE,
                );
                let _ = write!(out, " {}=\"{}\"", attr.name.to_string_lossy(), escaped_value);
            }
        }

        let is_void = self.settings.syntax == Syntax::Html && tag.is(TagOptions::VOID);
        let has_children = !self.tree.children(id).is_empty();

        if is_void {
            if self.settings.syntax == Syntax::Xml {
                out.push_str(" />");
            } else {
                out.push('>');
            }
            return;
        }
        if self.settings.syntax == Syntax::Xml && !has_children {
            out.push_str("/>");
            return;
        }
        out.push('>');

        if tag.is(TagOptions::PRESERVE_WHITESPACE) {
            self.preserve_whitespace_depth += 1;
        }
        self.depth += 1;
        for &child in self.tree.children(id) {
            self.write_node(out, child, false);
        }
        self.depth -= 1;
        if tag.is(TagOptions::PRESERVE_WHITESPACE) {
            self.preserve_whitespace_depth -= 1;
        }

        if has_children
            && self.is_block(&tag)
            && self.preserve_whitespace_depth == 0
            && !self.trailing_child_is_inline(id)
        {
            self.indent(out);
        }
        out.push_str("</");
        out.push_str(tag.name());
        out.push('>');
    }

    /// Whether `id`'s last child is text or an inline element — in which case the
    /// closing tag stays on the same line rather than being pushed onto its own.
    fn trailing_child_is_inline(&self, id: NodeId) -> bool {
        match self.tree.children(id).last() {
            None => true,
            Some(&last) => match &self.tree.node(last).kind {
                NodeKind::Text { .. } | NodeKind::CData { .. } => true,
                NodeKind::Element { tag, .. } => !self.is_block(tag),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::tag::{Namespace, TagSet};

    fn el(tree: &mut NodeTree, tags: &mut TagSet, parent: NodeId, name: &str) -> NodeId {
        let tag = tags.value_of(name, name, Namespace::Html, false);
        let node = tree.alloc(NodeKind::Element { tag, attributes: Attributes::new() });
        tree.append_child(parent, node);
        node
    }

    fn text(tree: &mut NodeTree, parent: NodeId, s: &str) {
        let node = tree.alloc(NodeKind::Text { data: s.to_owned() });
        tree.append_child(parent, node);
    }

    #[test]
    fn void_element_no_closing_tag_in_html() {
        let mut tree = NodeTree::new();
        let mut tags = TagSet::with_builtin_html();
        let root = tree.root();
        el(&mut tree, &mut tags, root, "br");
        let mut out = String::new();
        let settings = OutputSettings { pretty_print: false, ..Default::default() };
        serialize(&mut out, &tree, root, &settings);
        assert_eq!(out, "<br>");
    }

    #[test]
    fn raw_mode_has_no_indentation() {
        let mut tree = NodeTree::new();
        let mut tags = TagSet::with_builtin_html();
        let root = tree.root();
        let p = el(&mut tree, &mut tags, root, "p");
        text(&mut tree, p, "One ");
        el(&mut tree, &mut tags, p, "b");
        let mut out = String::new();
        let settings = OutputSettings { pretty_print: false, ..Default::default() };
        serialize(&mut out, &tree, root, &settings);
        assert!(!out.contains('\n'));
        assert!(out.starts_with("<p>One <b>"));
    }

    #[test]
    fn whitespace_only_text_trims_at_block_boundaries() {
        // <div>  <p>x</p>  </div>: the leading/trailing whitespace-only text nodes
        // sit directly against a block element on every side (previous-absent,
        // next-is-block / previous-is-block, next-absent), so both trim away
        // entirely rather than leaving stray spaces around the pretty-printed `<p>`.
        let mut tree = NodeTree::new();
        let mut tags = TagSet::with_builtin_html();
        let root = tree.root();
        let div = el(&mut tree, &mut tags, root, "div");
        text(&mut tree, div, "  ");
        let p = el(&mut tree, &mut tags, div, "p");
        text(&mut tree, p, "x");
        text(&mut tree, div, "  ");

        let mut out = String::new();
        let settings = OutputSettings { pretty_print: true, ..Default::default() };
        serialize(&mut out, &tree, root, &settings);
        // The trailing whitespace-only text node trims away to nothing rather than
        // leaving a stray `  ` before `</div>`; `<p>` still gets its own indented
        // line since it follows a block-starting `<div>` with no rendered content yet.
        assert_eq!(out, "<div>\n <p>x</p></div>");
    }

    #[test]
    fn xml_declaration_and_processing_instruction_use_distinct_brackets() {
        let mut tree = NodeTree::new();
        let root = tree.root();
        let decl = tree.alloc(NodeKind::XmlDeclaration {
            name: "FOO".to_owned(),
            attributes: Attributes::new(),
            is_declaration: true,
        });
        tree.append_child(root, decl);
        let pi = tree.alloc(NodeKind::XmlDeclaration {
            name: "php echo 1".to_owned(),
            attributes: Attributes::new(),
            is_declaration: false,
        });
        tree.append_child(root, pi);

        let mut out = String::new();
        let settings = OutputSettings { pretty_print: false, syntax: Syntax::Xml, ..Default::default() };
        serialize(&mut out, &tree, root, &settings);
        assert_eq!(out, "<!FOO><?php echo 1?>");
    }

    #[test]
    fn escapes_ampersand_and_angle_brackets() {
        let mut out = String::new();
        escape_into(&mut out, "a & b < c > d", EscapeMode::Base, EscapeOptions::FOR_TEXT);
        assert_eq!(out, "a &amp; b &lt; c &gt; d");
    }

    #[test]
    fn normalise_collapses_whitespace() {
        assert_eq!(normalise("a   b\n\tc"), "a b c");
    }
}
