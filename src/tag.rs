//! Per-namespace tag descriptor table.
//!
//! html5gum's tokenizer is tag-name-agnostic, so this module's category tables are
//! grounded on html5gum's tree-builder scope predicates (`src/trees/scopes.rs`) —
//! which encode block/void/special-element category membership as `matches!` lists
//! over tag names — generalized here into a data-driven `TagSet` rather than a
//! handful of free functions, since the tree builder needs a shared, mutable,
//! lookup-or-insert table rather than hardcoded predicates.

use std::collections::HashMap;
use std::sync::Arc;

/// The namespace an element (and its `Tag` descriptor) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    MathMl,
    Svg,
}

bitflags_lite::bitflags_lite! {
    /// Per-tag option bitset.
    pub struct TagOptions: u16 {
        const KNOWN = 1 << 0;
        const VOID = 1 << 1;
        const BLOCK = 1 << 2;
        const INLINE_CONTAINER = 1 << 3;
        const SELF_CLOSE = 1 << 4;
        const SEEN_SELF_CLOSE = 1 << 5;
        const PRESERVE_WHITESPACE = 1 << 6;
        const RCDATA = 1 << 7;
        const DATA = 1 << 8;
        const FORM_SUBMITTABLE = 1 << 9;
    }
}

/// A descriptor for one element type within one namespace.
///
/// Two elements with identical `(namespace, name, options)` obtained through the same
/// [`TagSet`] share the same `Arc<TagData>`, so `Tag` is cheap to clone
/// and compare by pointer identity when that matters (e.g. active-formatting-list
/// bookkeeping).
#[derive(Clone)]
pub struct Tag {
    data: Arc<TagData>,
}

struct TagData {
    name: String,
    namespace: Namespace,
    options: TagOptions,
}

impl Tag {
    fn new(name: &str, namespace: Namespace, options: TagOptions) -> Self {
        Tag {
            data: Arc::new(TagData {
                name: name.to_owned(),
                namespace,
                options,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.data.name
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.data.namespace
    }

    #[must_use]
    pub fn options(&self) -> TagOptions {
        self.data.options
    }

    #[must_use]
    pub fn is(&self, opt: TagOptions) -> bool {
        self.data.options.contains(opt)
    }

    /// Clone this `Tag` with a case-preserved display name but the same option set —
    /// used when `preserveCase` is on but the set's canonical entry was found by
    /// normalized name.
    #[must_use]
    pub fn with_name(&self, name: &str) -> Self {
        Tag::new(name, self.data.namespace, self.data.options)
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("name", &self.data.name)
            .field("namespace", &self.data.namespace)
            .field("options", &self.data.options)
            .finish()
    }
}

/// `namespace → (tagName → Tag)` lookup-or-insert table.
///
/// Looking up an unknown name creates a new `Tag` on demand, marked not-[`TagOptions::KNOWN`]
///. A callback may be registered via [`TagSet::on_new_tag`] to customize
/// every newly materialized `Tag` (e.g. "all unknown tags self-close").
pub struct TagSet {
    tables: HashMap<Namespace, HashMap<String, Tag>>,
    on_new_tag: Option<Box<dyn Fn(&mut Tag) + Send + Sync>>,
}

impl Default for TagSet {
    fn default() -> Self {
        Self::with_builtin_html()
    }
}

impl Clone for TagSet {
    /// Copies the table contents only; a registered `on_new_tag` callback is not
    /// carried over, since `Box<dyn Fn>` isn't `Clone`.
    fn clone(&self) -> Self {
        TagSet {
            tables: self.tables.clone(),
            on_new_tag: None,
        }
    }
}

impl TagSet {
    /// An empty set with no namespaces seeded.
    #[must_use]
    pub fn empty() -> Self {
        TagSet {
            tables: HashMap::new(),
            on_new_tag: None,
        }
    }

    /// Seeds the built-in HTML, MathML, and SVG tag categories.
    #[must_use]
    pub fn with_builtin_html() -> Self {
        let mut set = TagSet::empty();
        for (name, opts) in HTML_BUILTIN {
            set.insert_builtin(Namespace::Html, name, *opts);
        }
        for name in MATHML_ELEMENTS {
            set.insert_builtin(Namespace::MathMl, name, TagOptions::KNOWN);
        }
        for name in SVG_ELEMENTS {
            set.insert_builtin(Namespace::Svg, name, TagOptions::KNOWN);
        }
        set
    }

    fn insert_builtin(&mut self, ns: Namespace, name: &str, options: TagOptions) {
        self.tables
            .entry(ns)
            .or_default()
            .insert(name.to_owned(), Tag::new(name, ns, options));
    }

    /// Register a callback invoked whenever a new `Tag` is materialized by
    /// [`TagSet::value_of`].
    pub fn on_new_tag(&mut self, f: impl Fn(&mut Tag) + Send + Sync + 'static) {
        self.on_new_tag = Some(Box::new(f));
    }

    /// Exact lookup; does not create an entry.
    #[must_use]
    pub fn get(&self, name: &str, ns: Namespace) -> Option<Tag> {
        self.tables.get(&ns).and_then(|t| t.get(name)).cloned()
    }

    /// Lookup-or-insert. If `preserve_case` is set and the match was
    /// found via `normal_name` rather than `name` directly, the returned `Tag` is a
    /// clone with the case-preserving display name, leaving the canonical shared
    /// record untouched.
    pub fn value_of(&mut self, name: &str, normal_name: &str, ns: Namespace, preserve_case: bool) -> Tag {
        if let Some(tag) = self.tables.get(&ns).and_then(|t| t.get(name)) {
            return tag.clone();
        }
        if let Some(tag) = self.tables.get(&ns).and_then(|t| t.get(normal_name)) {
            return if preserve_case && name != normal_name {
                tag.with_name(name)
            } else {
                tag.clone()
            };
        }
        let mut tag = Tag::new(name, ns, TagOptions::empty());
        if let Some(cb) = &self.on_new_tag {
            cb(&mut tag);
        }
        self.tables.entry(ns).or_default().insert(name.to_owned(), tag.clone());
        tag
    }
}

// Category data for the built-in HTML namespace. Grounded on the category
// lists implicit in html5gum's scope predicates (`trees/scopes.rs`) plus the
// standard WHATWG "void elements" / "special" / content-model lists.
const fn o(bits: u16) -> TagOptions {
    TagOptions::from_bits_truncate(bits)
}

const VOID: u16 = TagOptions::VOID.bits() | TagOptions::KNOWN.bits();
const BLOCK: u16 = TagOptions::BLOCK.bits() | TagOptions::KNOWN.bits();
const INLINE: u16 = TagOptions::INLINE_CONTAINER.bits() | TagOptions::KNOWN.bits();
const RCDATA: u16 = TagOptions::RCDATA.bits() | TagOptions::KNOWN.bits();
const RAWTEXT: u16 = TagOptions::DATA.bits() | TagOptions::KNOWN.bits();
const PRE: u16 = BLOCK | TagOptions::PRESERVE_WHITESPACE.bits();
const FORM: u16 = TagOptions::FORM_SUBMITTABLE.bits() | TagOptions::KNOWN.bits();

static HTML_BUILTIN: &[(&str, TagOptions)] = &[
    ("area", o(VOID)),
    ("base", o(VOID)),
    ("br", o(VOID)),
    ("col", o(VOID)),
    ("embed", o(VOID)),
    ("hr", o(VOID)),
    ("img", o(VOID)),
    ("input", o(VOID | FORM)),
    ("link", o(VOID)),
    ("meta", o(VOID)),
    ("param", o(VOID)),
    ("source", o(VOID)),
    ("track", o(VOID)),
    ("wbr", o(VOID)),
    ("address", o(BLOCK)),
    ("article", o(BLOCK)),
    ("aside", o(BLOCK)),
    ("blockquote", o(BLOCK)),
    ("body", o(BLOCK)),
    ("details", o(BLOCK)),
    ("dialog", o(BLOCK)),
    ("dd", o(BLOCK)),
    ("div", o(BLOCK)),
    ("dl", o(BLOCK)),
    ("dt", o(BLOCK)),
    ("fieldset", o(BLOCK | FORM)),
    ("figcaption", o(BLOCK)),
    ("figure", o(BLOCK)),
    ("footer", o(BLOCK)),
    ("form", o(BLOCK | FORM)),
    ("h1", o(BLOCK)),
    ("h2", o(BLOCK)),
    ("h3", o(BLOCK)),
    ("h4", o(BLOCK)),
    ("h5", o(BLOCK)),
    ("h6", o(BLOCK)),
    ("head", o(BLOCK)),
    ("header", o(BLOCK)),
    ("hgroup", o(BLOCK)),
    ("html", o(BLOCK)),
    ("li", o(BLOCK)),
    ("main", o(BLOCK)),
    ("nav", o(BLOCK)),
    ("ol", o(BLOCK)),
    ("p", o(BLOCK)),
    ("pre", o(PRE)),
    ("section", o(BLOCK)),
    ("table", o(BLOCK)),
    ("tbody", o(BLOCK)),
    ("td", o(BLOCK)),
    ("tfoot", o(BLOCK)),
    ("th", o(BLOCK)),
    ("thead", o(BLOCK)),
    ("tr", o(BLOCK)),
    ("ul", o(BLOCK)),
    ("a", o(INLINE)),
    ("b", o(INLINE)),
    ("big", o(INLINE)),
    ("code", o(INLINE)),
    ("em", o(INLINE)),
    ("font", o(INLINE)),
    ("i", o(INLINE)),
    ("nobr", o(INLINE)),
    ("s", o(INLINE)),
    ("small", o(INLINE)),
    ("span", o(INLINE)),
    ("strike", o(INLINE)),
    ("strong", o(INLINE)),
    ("tt", o(INLINE)),
    ("u", o(INLINE)),
    ("button", o(INLINE | FORM)),
    ("select", o(INLINE | FORM)),
    ("textarea", o(RCDATA | FORM)),
    ("title", o(RCDATA)),
    ("script", o(RAWTEXT)),
    ("style", o(RAWTEXT)),
    ("noscript", o(RAWTEXT)),
    ("noframes", o(RAWTEXT)),
    ("xmp", o(RAWTEXT)),
    ("iframe", o(RAWTEXT)),
    ("plaintext", o(RAWTEXT)),
];

static MATHML_ELEMENTS: &[&str] = &["math", "mi", "mo", "mn", "ms", "mtext", "annotation-xml"];

static SVG_ELEMENTS: &[&str] = &["svg", "foreignObject", "desc", "title", "script"];

mod bitflags_lite {
    macro_rules! bitflags_lite {
        (
            $(#[$outer:meta])*
            pub struct $name:ident: $ty:ty {
                $(const $flag:ident = $value:expr;)*
            }
        ) => {
            $(#[$outer])*
            #[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
            pub struct $name($ty);

            #[allow(missing_docs)]
            impl $name {
                $(pub const $flag: $name = $name($value);)*

                #[must_use]
                pub const fn empty() -> Self {
                    $name(0)
                }

                #[must_use]
                pub const fn bits(&self) -> $ty {
                    self.0
                }

                #[must_use]
                pub const fn from_bits_truncate(bits: $ty) -> Self {
                    $name(bits)
                }

                #[must_use]
                pub const fn contains(&self, other: Self) -> bool {
                    (self.0 & other.0) == other.0
                }

                #[must_use]
                pub const fn union(self, other: Self) -> Self {
                    $name(self.0 | other.0)
                }
            }

            impl std::ops::BitOr for $name {
                type Output = Self;
                fn bitor(self, rhs: Self) -> Self {
                    self.union(rhs)
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}(0b{:b})", stringify!($name), self.0)
                }
            }
        };
    }

    pub(crate) use bitflags_lite;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_elements_known() {
        let set = TagSet::with_builtin_html();
        let br = set.get("br", Namespace::Html).unwrap();
        assert!(br.is(TagOptions::VOID));
        assert!(br.is(TagOptions::KNOWN));
    }

    #[test]
    fn unknown_tag_created_on_demand() {
        let mut set = TagSet::with_builtin_html();
        let custom = set.value_of("x-widget", "x-widget", Namespace::Html, false);
        assert!(!custom.is(TagOptions::KNOWN));
    }

    #[test]
    fn shared_tag_identity() {
        let mut set = TagSet::with_builtin_html();
        let a = set.value_of("div", "div", Namespace::Html, false);
        let b = set.value_of("div", "div", Namespace::Html, false);
        assert!(Arc::ptr_eq(&a.data, &b.data));
    }
}
