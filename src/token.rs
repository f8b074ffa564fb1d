//! The token data model and reusable pending-token machinery.
//!
//! `HtmlString` is carried over from html5gum's `emitter.rs` almost verbatim (a
//! `Vec<u8>`-backed newtype with a terse escaped `Debug`); here it additionally grows a
//! couple of `From`/`Deref` conveniences for working with `&str`, since this crate's
//! reader already hands the tokenizer decoded `char`s rather than bytes.

use std::borrow::{Borrow, BorrowMut};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::attributes::Attributes;
use crate::position::Range;

/// A byte-string newtype, kept for the same reason html5gum keeps one: a nicer
/// `Debug` impl than a bare `Vec<u8>`, and a stable place to hang `Borrow<[u8]>`.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HtmlString(pub Vec<u8>);

impl Deref for HtmlString {
    type Target = Vec<u8>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for HtmlString {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for HtmlString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for &byte in &self.0 {
            for ch in std::ascii::escape_default(byte) {
                write!(f, "{}", ch as char)?;
            }
        }
        write!(f, "\"")
    }
}

impl Borrow<[u8]> for HtmlString {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl BorrowMut<[u8]> for HtmlString {
    fn borrow_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl From<Vec<u8>> for HtmlString {
    fn from(vec: Vec<u8>) -> HtmlString {
        HtmlString(vec)
    }
}

impl From<String> for HtmlString {
    fn from(s: String) -> HtmlString {
        HtmlString(s.into_bytes())
    }
}

impl From<&str> for HtmlString {
    fn from(s: &str) -> HtmlString {
        HtmlString(s.as_bytes().to_vec())
    }
}

impl From<HtmlString> for Vec<u8> {
    fn from(other: HtmlString) -> Vec<u8> {
        other.0
    }
}

impl HtmlString {
    /// Lossy conversion to a displayable string, for error messages and serialization.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        self.0.extend_from_slice(s.as_bytes());
    }
}

/// The literal keyword that introduced a DOCTYPE's external id, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubSysKeyword {
    Public,
    System,
}

/// A DOCTYPE token.
#[derive(Debug, Clone, Default)]
pub struct Doctype {
    pub name: HtmlString,
    pub public_id: Option<HtmlString>,
    pub system_id: Option<HtmlString>,
    pub pub_sys_key: Option<PubSysKeyword>,
    pub force_quirks: bool,
}

/// A start tag token. `name` preserves input case; `normal_name` is the
/// lower-cased form, recomputed on every mutation to `name`.
#[derive(Debug, Clone, Default)]
pub struct StartTag {
    pub name: HtmlString,
    pub normal_name: HtmlString,
    pub attributes: Attributes,
    pub self_closing: bool,
}

impl StartTag {
    pub(crate) fn set_name(&mut self, name: HtmlString) {
        self.normal_name = HtmlString(name.to_ascii_lowercase());
        self.name = name;
    }

    pub(crate) fn push_name(&mut self, s: &str) {
        self.name.push_str(s);
        self.normal_name = HtmlString(self.name.to_ascii_lowercase());
    }
}

/// An end tag token.
#[derive(Debug, Clone, Default)]
pub struct EndTag {
    pub name: HtmlString,
    pub normal_name: HtmlString,
}

impl EndTag {
    pub(crate) fn push_name(&mut self, s: &str) {
        self.name.push_str(s);
        self.normal_name = HtmlString(self.name.to_ascii_lowercase());
    }
}

/// A comment token. `bogus` marks comments synthesized from malformed markup
/// declarations (e.g. `<!weird`) rather than `<!--...-->`.
#[derive(Debug, Clone, Default)]
pub struct Comment {
    pub data: HtmlString,
    pub bogus: bool,
}

/// A run of character data. Consecutive `emit`s are coalesced into one
/// `Character` token until a non-character token is about to be emitted.
#[derive(Debug, Clone, Default)]
pub struct Character {
    pub data: String,
    pub is_cdata: bool,
}

/// Either an XML declaration (`<!...>`) or a processing instruction (`<?...?>`) in XML
/// mode.
#[derive(Debug, Clone, Default)]
pub struct XmlDecl {
    pub name: HtmlString,
    pub attributes: Attributes,
    pub is_declaration: bool,
}

/// A single token offset pair, `[startPos, endPos)` in character offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

/// One emitted token, tagged by variant, each carrying its [`TokenSpan`].
#[derive(Debug, Clone)]
pub enum Token {
    Doctype(Doctype, TokenSpan),
    StartTag(StartTag, TokenSpan),
    EndTag(EndTag, TokenSpan),
    Comment(Comment, TokenSpan),
    Character(Character, TokenSpan),
    XmlDecl(XmlDecl, TokenSpan),
    Eof,
}

impl Token {
    #[must_use]
    pub fn span(&self) -> Option<TokenSpan> {
        match self {
            Token::Doctype(_, s)
            | Token::StartTag(_, s)
            | Token::EndTag(_, s)
            | Token::Comment(_, s)
            | Token::Character(_, s)
            | Token::XmlDecl(_, s) => Some(*s),
            Token::Eof => None,
        }
    }
}

/// Per-attribute `(nameRange, valueRange)` recorded when tracking is enabled, keyed by
/// the attribute name, surfaced through [`crate::position::AttributeRange`].
pub type AttributeRangeMap = std::collections::HashMap<HtmlString, crate::position::AttributeRange>;

/// Reusable pending-token slots.
///
/// One slot per concrete variant plus the running `Character` accumulator. `reset_*`
/// re-initializes a slot for a new token of that kind; `take_*` hands ownership of the
/// slot's contents to the caller (who must not retain a reference past the next
/// tokenizer step).
#[derive(Debug, Default)]
pub struct PendingTokens {
    pub start_tag: StartTag,
    pub end_tag: EndTag,
    pub comment: Comment,
    pub doctype: Doctype,
    pub xml_decl: XmlDecl,
    character: String,
    character_is_cdata: bool,
    /// Working buffer for the attribute currently being scanned. Committed into `start_tag.attributes` by
    /// [`PendingTokens::commit_attribute`] once a full `name=value` pair (or a
    /// name-only attribute) has been scanned.
    pub cur_attr_name: String,
    pub cur_attr_value: String,
    pub attr_name_start: usize,
    pub attr_name_end: usize,
    pub attr_val_start: usize,
    pub attr_val_end: usize,
    pub attr_ranges: AttributeRangeMap,
}

impl PendingTokens {
    pub(crate) fn reset_start_tag(&mut self) {
        self.start_tag = StartTag::default();
    }

    pub(crate) fn reset_end_tag(&mut self) {
        self.end_tag = EndTag::default();
    }

    pub(crate) fn reset_comment(&mut self) {
        self.comment = Comment::default();
    }

    pub(crate) fn reset_doctype(&mut self) {
        self.doctype = Doctype::default();
    }

    pub(crate) fn reset_xml_decl(&mut self) {
        self.xml_decl = XmlDecl::default();
    }

    pub(crate) fn start_attribute(&mut self) {
        self.cur_attr_name.clear();
        self.cur_attr_value.clear();
    }

    /// Commit the in-progress attribute into `start_tag.attributes`, recording a
    /// `DuplicateAttribute` condition via the returned `bool` (`false` if dropped) so
    /// the caller can log the error.
    pub(crate) fn commit_attribute(&mut self) -> bool {
        let name = HtmlString::from(std::mem::take(&mut self.cur_attr_name));
        let value = HtmlString::from(std::mem::take(&mut self.cur_attr_value));
        self.start_tag.attributes.push(name, value)
    }

    /// Commit the in-progress attribute only if a name was actually scanned, for call
    /// sites that may run with no attribute pending (e.g. a tag with zero attributes).
    pub(crate) fn commit_pending_attribute_if_any(&mut self) -> Option<bool> {
        if self.cur_attr_name.is_empty() {
            None
        } else {
            Some(self.commit_attribute())
        }
    }

    /// Append to the running, coalesced character buffer.
    pub(crate) fn push_char(&mut self, s: &str, is_cdata: bool) {
        self.character.push_str(s);
        self.character_is_cdata = is_cdata;
    }

    pub(crate) fn has_pending_char(&self) -> bool {
        !self.character.is_empty()
    }

    /// Drain the coalesced character buffer into a `Character` token. Called right
    /// before any non-character token is emitted, or at EOF.
    pub(crate) fn take_character(&mut self) -> Option<Character> {
        if self.character.is_empty() {
            return None;
        }
        Some(Character {
            data: std::mem::take(&mut self.character),
            is_cdata: std::mem::take(&mut self.character_is_cdata),
        })
    }
}
