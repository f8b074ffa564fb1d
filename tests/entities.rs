//! Character-reference resolution and the escape/unescape round-trip property
//! (spec.md §8: "escape(unescape(s)) equals the base-normalized form of s", and the
//! Windows-1252 remap invariant: "fires exactly for numeric references in
//! [0x80, 0x9F] and only then").

use markup_core::entities::{resolve_named, resolve_numeric, Resolved};
use markup_core::serializer::{escape_into, EscapeMode, EscapeOptions};
use markup_core::Parser;

#[test]
fn named_reference_resolves_with_trailing_semicolon() {
    let (resolved, consumed) = resolve_named("amp", true, None).unwrap();
    assert_eq!(resolved, Resolved::One('&'));
    assert_eq!(consumed, 3);
}

#[test]
fn named_reference_in_base_set_resolves_without_semicolon() {
    let (resolved, _) = resolve_named("amp", false, None).unwrap();
    assert_eq!(resolved, Resolved::One('&'));
}

#[test]
fn numeric_reference_zero_is_replacement_character() {
    let mut errors = Vec::new();
    assert_eq!(resolve_numeric(0, &mut errors), '\u{FFFD}');
}

#[test]
fn numeric_reference_out_of_unicode_range_is_replacement_character() {
    let mut errors = Vec::new();
    assert_eq!(resolve_numeric(0x110000, &mut errors), '\u{FFFD}');
}

#[test]
fn windows_1252_fixup_applies_only_inside_0x80_to_0x9f() {
    let mut errors = Vec::new();
    // Boundary endpoints of the remapped range.
    assert_eq!(resolve_numeric(0x80, &mut errors), '\u{20AC}'); // EURO SIGN
    assert_eq!(resolve_numeric(0x9F, &mut errors), '\u{0178}'); // LATIN CAPITAL LETTER Y WITH DIAERESIS
    // Just outside the range on either side: passed through unmapped.
    assert_eq!(resolve_numeric(0x7F, &mut errors), '\u{7F}');
    assert_eq!(resolve_numeric(0xA0, &mut errors), '\u{A0}');
}

#[test]
fn escape_of_unescaped_text_round_trips() {
    let parser = Parser::html();
    let doc = parser.parse("<p>Hello &amp; &lt;tag&gt; &#65; world</p>").unwrap();
    let html = doc.tree.first_element_child(doc.tree.root()).unwrap();
    let body = doc.tree.last_element_child(html).unwrap();
    let p = doc.tree.first_element_child(body).unwrap();

    let unescaped = doc.tree.text(p);
    assert_eq!(unescaped, "Hello & <tag> A world");

    let mut escaped = String::new();
    escape_into(&mut escaped, &unescaped, EscapeMode::Base, EscapeOptions::FOR_TEXT);
    // Re-escaping the decoded text reproduces the base-normalized markup: named
    // references that denote syntax characters come back, but `&#65;`'s plain `A`
    // needed no entity in the first place.
    assert_eq!(escaped, "Hello &amp; &lt;tag&gt; A world");
}
