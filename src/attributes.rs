//! Ordered attribute store with an internal-key convention.
//!
//! Modeled on html5gum's attribute handling in `emitter.rs` (a `BTreeMap<HtmlString,
//! HtmlString>` keyed map) but insertion-ordered rather than sorted, since attribute
//! order must be preserved through to serialization.
//! Internal (non-user) slots — source ranges and, in the tree builder, reserved
//! bookkeeping keys — are kept in a side table rather than smuggled into the ordered
//! list as fake entries: Rust lets a co-located user-data slot be a real typed field
//! instead of an encoding trick over the attribute list, so there's no need for an
//! internal-key prefix convention at all.

use std::fmt;

use crate::position::AttributeRange;
use crate::token::HtmlString;

/// A single ordered attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// The attribute name, already normalized per [`crate::parser::ParserConfig::preserve_attribute_case`].
    pub name: HtmlString,
    /// The attribute value, entity-decoded.
    pub value: HtmlString,
}

/// Ordered key→value attribute bag with case-sensitive and case-insensitive lookup.
///
/// Duplicate attribute names are rejected at insertion time (first write wins), per
/// the WHATWG tokenizer's `DuplicateAttribute` handling — `push` reports whether the
/// attribute was newly inserted so callers can log that error.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<Attribute>,
    ranges: Option<Box<std::collections::HashMap<HtmlString, AttributeRange>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes::default()
    }

    /// Number of attributes (internal bookkeeping, i.e. [`Attributes::ranges`], is
    /// never counted — it isn't stored in `entries` at all).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-sensitive lookup.
    #[must_use]
    pub fn get(&self, name: &[u8]) -> Option<&HtmlString> {
        self.entries.iter().find(|a| &*a.name == name).map(|a| &a.value)
    }

    /// Case-insensitive (ASCII) lookup, used for e.g. `xmlns`/`XMLNS` handling.
    #[must_use]
    pub fn get_ignore_case(&self, name: &[u8]) -> Option<&HtmlString> {
        self.entries
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| &a.value)
    }

    #[must_use]
    pub fn contains(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    /// Insert a fresh attribute. Per WHATWG `init_attribute`/duplicate handling: if
    /// `name` is already present, the new value is dropped and `false` is returned so
    /// the caller can emit `Error::DuplicateAttribute`; otherwise the attribute is
    /// appended (preserving insertion order) and `true` is returned.
    pub fn push(&mut self, name: HtmlString, value: HtmlString) -> bool {
        if self.contains(&name) {
            return false;
        }
        self.entries.push(Attribute { name, value });
        true
    }

    /// Remove an attribute by case-sensitive name, returning its value if present.
    pub fn remove(&mut self, name: &[u8]) -> Option<HtmlString> {
        let idx = self.entries.iter().position(|a| &*a.name == name)?;
        Some(self.entries.remove(idx).value)
    }

    /// Upsert: overwrite `name`'s value in place (keeping its position) if present,
    /// else append a fresh entry. Unlike [`Attributes::push`], this always wins over
    /// an existing value rather than being dropped as a duplicate.
    pub fn set(&mut self, name: HtmlString, value: HtmlString) {
        if let Some(existing) = self.entries.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            self.entries.push(Attribute { name, value });
        }
    }

    /// Iterate attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.entries.iter_mut()
    }

    /// Attach the `(nameRange, valueRange)` pair for `name`. No-ops if a range is
    /// already recorded for this name — duplicate attributes retain the first-seen
    /// range.
    pub(crate) fn set_range(&mut self, name: &HtmlString, range: AttributeRange) {
        let map = self.ranges.get_or_insert_with(Default::default);
        map.entry(name.clone()).or_insert(range);
    }

    /// The source range recorded for `name`, or the untracked sentinel if position
    /// tracking was off or `name` has no attribute.
    #[must_use]
    pub fn range_of(&self, name: &[u8]) -> AttributeRange {
        self.ranges
            .as_ref()
            .and_then(|m| m.iter().find(|(k, _)| &***k == name).map(|(_, v)| *v))
            .unwrap_or_default()
    }

    /// Merge in attributes from `other` whose names are absent from `self`, keeping
    /// `self`'s existing values and source ranges.
    pub(crate) fn merge_missing_from(&mut self, other: &Attributes) {
        for attr in &other.entries {
            if !self.contains(&attr.name) {
                self.entries.push(attr.clone());
                if let Some(ranges) = &other.ranges {
                    if let Some(r) = ranges.get(&attr.name) {
                        self.set_range(&attr.name, *r);
                    }
                }
            }
        }
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in &self.entries {
            write!(f, " {}=\"{}\"", attr.name.to_string_lossy(), attr.value.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_attribute_keeps_first() {
        let mut attrs = Attributes::new();
        assert!(attrs.push("href".into(), "a".into()));
        assert!(!attrs.push("href".into(), "b".into()));
        assert_eq!(attrs.get(b"href").unwrap().to_string_lossy(), "a");
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn case_insensitive_lookup() {
        let mut attrs = Attributes::new();
        attrs.push("Href".into(), "x".into());
        assert_eq!(attrs.get_ignore_case(b"href").unwrap().to_string_lossy(), "x");
        assert!(attrs.get(b"href").is_none());
    }

    #[test]
    fn source_ranges_are_not_user_visible_but_survive_clone() {
        // This crate keeps source ranges in a side table rather than behind an
        // internal-key-prefix convention (see the module doc), but the invariant
        // spec.md §8 #5 states for that convention still applies to the side table:
        // it must never surface through the ordinary attribute-iteration surface,
        // yet it must survive a clone of the bag.
        let mut attrs = Attributes::new();
        attrs.push("href".into(), "/x".into());
        attrs.set_range(&"href".into(), AttributeRange::default());

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.iter().count(), 1);

        let cloned = attrs.clone();
        assert_eq!(cloned.len(), 1);
        assert_eq!(cloned.iter().count(), 1);
        assert_eq!(cloned.range_of(b"href"), attrs.range_of(b"href"));
    }

    #[test]
    fn insertion_order_preserved() {
        let mut attrs = Attributes::new();
        attrs.push("b".into(), "2".into());
        attrs.push("a".into(), "1".into());
        let names: Vec<_> = attrs.iter().map(|a| a.name.to_string_lossy()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
