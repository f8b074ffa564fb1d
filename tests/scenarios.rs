//! End-to-end scenarios exercising the public `Parser`/`Document` API: the
//! concrete parse-then-serialize shapes a consumer actually depends on.

use markup_core::Parser;

fn body_of(doc: &markup_core::Document) -> markup_core::NodeId {
    let html = doc.tree.first_element_child(doc.tree.root()).expect("html element");
    doc.tree.last_element_child(html).expect("body element")
}

#[test]
fn simple_inline_formatting_round_trips() {
    let parser = Parser::html();
    let doc = parser.parse("<p>One <b>Two</b> Three</p>").unwrap();
    let body = body_of(&doc);
    let p = doc.tree.first_element_child(body).unwrap();
    assert_eq!(doc.serialize_node(p), "<p>One <b>Two</b> Three</p>");
}

#[test]
fn abs_url_resolves_relative_href_against_base() {
    let parser = Parser::html();
    let mut doc = parser.parse(r#"<a href="/x">y</a>"#).unwrap();
    doc.tree.base_uri = "http://h/".to_owned();
    let body = body_of(&doc);
    let a = doc.tree.first_element_child(body).unwrap();
    assert_eq!(doc.tree.abs_url(a, b"href"), "http://h/x");
}

#[test]
fn numeric_and_named_character_references_resolve_in_text() {
    let parser = Parser::html();
    let doc = parser.parse("<p>Hello &amp; world &#x26; you</p>").unwrap();
    let body = body_of(&doc);
    let p = doc.tree.first_element_child(body).unwrap();
    assert_eq!(doc.tree.text(p), "Hello & world & you");
}

#[test]
fn mismatched_inline_formatting_runs_adoption_agency() {
    let parser = Parser::html();
    let doc = parser.parse("<b><p>Bold para</b> tail</p>").unwrap();
    let body = body_of(&doc);
    let children: Vec<_> = doc.tree.children(body).to_vec();
    let elements: Vec<_> = children.into_iter().filter(|&c| doc.tree.is_element(c)).collect();
    assert_eq!(elements.len(), 2);
    let rendered: String = elements.iter().map(|&n| doc.serialize_node(n)).collect();
    assert_eq!(rendered, "<b></b><p><b>Bold para</b> tail</p>");
}

#[test]
fn doctype_plus_unclosed_paragraph_pretty_prints_with_implied_structure() {
    let parser = Parser::html();
    let doc = parser.parse("<!DOCTYPE html><p>x").unwrap();
    let expected = "<!doctype html>\n<html>\n <head></head>\n <body>\n  <p>x</p>\n </body>\n</html>";
    assert_eq!(doc.serialize(), expected);
}

#[test]
fn xml_parse_resolves_prefixed_namespace() {
    let parser = Parser::html();
    let doc = parser.parse_xml(r#"<root a="1" xmlns:x="urn:x"><x:a/></root>"#).unwrap();
    let root_el = doc.tree.first_element_child(doc.tree.root()).unwrap();
    assert_eq!(doc.tree.attr(root_el, b"a").as_deref(), Some("1"));

    let child = doc.tree.first_element_child(root_el).unwrap();
    let markup_core::NodeKind::Element { tag, .. } = &doc.tree.node(child).kind else {
        panic!("expected element");
    };
    assert_eq!(tag.name(), "a");
    let ns = doc.tree.node(child).xml_namespace.as_ref().expect("prefixed element carries its namespace");
    assert_eq!(ns.prefix.as_deref(), Some("x"));
    assert_eq!(ns.uri, "urn:x");
}

#[test]
fn empty_input_yields_implied_html_head_body_shell() {
    let parser = Parser::html();
    let doc = parser.parse("").unwrap();
    let html = doc.tree.first_element_child(doc.tree.root()).unwrap();
    let markup_core::NodeKind::Element { tag, .. } = &doc.tree.node(html).kind else {
        panic!("expected html element");
    };
    assert_eq!(tag.name(), "html");
    let head = doc.tree.first_element_child(html).unwrap();
    let body = doc.tree.last_element_child(html).unwrap();
    assert!(doc.tree.children(head).is_empty());
    assert!(doc.tree.children(body).is_empty());
}

#[test]
fn unclosed_comment_emits_parse_error_and_recovers() {
    let parser = Parser::html();
    let doc = parser.parse("<!-- foo").unwrap();
    assert!(!parser.errors().is_empty());
    // Seen before any `<html>` tag, so per the "initial" insertion mode the comment
    // attaches directly to the document rather than being moved into the implied
    // `<html>`/`<body>` shell that EOF still triggers afterwards.
    let comment = doc.tree.first_child(doc.tree.root()).unwrap();
    match &doc.tree.node(comment).kind {
        markup_core::NodeKind::Comment { data } => assert_eq!(data, " foo"),
        other => panic!("expected a comment node, got {other:?}"),
    }
}

#[test]
fn numeric_reference_zero_resolves_to_replacement_character() {
    let parser = Parser::html();
    let doc = parser.parse("<p>&#0;</p>").unwrap();
    let body = body_of(&doc);
    let p = doc.tree.first_element_child(body).unwrap();
    assert_eq!(doc.tree.text(p), "\u{FFFD}");
}

#[test]
fn depth_cap_limits_open_elements_stack() {
    let mut config = markup_core::ParserConfig::default();
    config.max_depth = 16;
    let parser = Parser::new(config);
    let input: String = "<div>".repeat(1000);
    let doc = parser.parse(&input).unwrap();

    fn max_depth(tree: &markup_core::NodeTree, node: markup_core::NodeId, depth: usize) -> usize {
        tree.children(node)
            .iter()
            .filter(|&&c| tree.is_element(c))
            .map(|&c| max_depth(tree, c, depth + 1))
            .max()
            .unwrap_or(depth)
    }
    let depth = max_depth(&doc.tree, doc.tree.root(), 0);
    assert!(depth <= 16, "tree depth {depth} exceeded configured cap");
}
