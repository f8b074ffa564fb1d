//! The orchestrator: wires [`crate::reader::CharReader`] through
//! [`crate::tokenizer::Tokenizer`] into a tree builder, and is the crate's primary
//! public entry point.
//!
//! No single teacher file plays this role — html5gum stops at the tokenizer and
//! leaves driving it to the caller's [`crate::token::PendingTokens`]. This follows the
//! same "poll `next_token` in a loop, feed the result onward" shape html5gum's own
//! `Tokenizer::next`-based consumers use, generalized to hand tokens to a tree builder
//! and to switch the tokenizer's state when the builder asks for it.

use std::sync::Mutex;

use crate::error::{Failure, ParseError};
use crate::html_tree_builder::{HtmlTreeBuilder, TreeBuilderAction};
use crate::position::{Position, Range};
use crate::reader::StringSource;
use crate::serializer::{self, OutputSettings};
use crate::tag::TagSet;
use crate::token::Token;
use crate::tokenizer::Tokenizer;
use crate::tree::{NodeId, NodeKind, NodeTree};

#[cfg(feature = "xml")]
use crate::xml_tree_builder::XmlTreeBuilder;

pub use crate::tree::QuirksMode;

/// Configuration envelope passed into a [`Parser`].
#[derive(Clone)]
pub struct ParserConfig {
    /// Keep start/end tag names as written instead of lower-casing them. Off by default, matching HTML's own case-insensitivity.
    pub preserve_tag_case: bool,
    /// Keep attribute names as written instead of lower-casing them.
    pub preserve_attribute_case: bool,
    /// Cap on how many [`ParseError`]s a single parse accumulates; `None` disables the
    /// cap. Guards long-running embedders against unbounded memory growth on
    /// pathological input.
    pub track_errors: Option<usize>,
    /// Stamp [`crate::tree::Node::range`] with source positions as elements open and
    /// close. Requires the `position-tracking` feature to produce anything other than
    /// [`Range::UNTRACKED`].
    pub track_position: bool,
    /// Open-elements stack depth at which the tree builder starts discarding instead
    /// of growing further, guarding against unbounded-depth input.
    pub max_depth: usize,
    /// Caller-supplied tag table, e.g. to register custom void elements. `None` uses
    /// [`TagSet::with_builtin_html`].
    pub tag_set: Option<TagSet>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            preserve_tag_case: false,
            preserve_attribute_case: false,
            track_errors: Some(1000),
            track_position: cfg!(feature = "position-tracking"),
            max_depth: 512,
            tag_set: None,
        }
    }
}

/// The parsed output of [`Parser::parse`] / [`Parser::parse_xml`].
pub struct Document {
    /// The parsed arena.
    pub tree: NodeTree,
    /// Controls how [`Self::serialize`] renders the tree.
    pub output_settings: OutputSettings,
}

impl Document {
    /// The document's quirks mode, as decided by the DOCTYPE seen during parsing.
    #[must_use]
    pub fn quirks_mode(&self) -> QuirksMode {
        match &self.tree.node(self.tree.root()).kind {
            NodeKind::Document { quirks_mode } => *quirks_mode,
            _ => QuirksMode::NoQuirks,
        }
    }

    /// Serializes the whole document per [`Self::output_settings`].
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        serializer::serialize(&mut out, &self.tree, self.tree.root(), &self.output_settings);
        out
    }

    /// Serializes a single node's subtree, e.g. an element's `outerHTML`.
    #[must_use]
    pub fn serialize_node(&self, node: NodeId) -> String {
        let mut out = String::new();
        serializer::serialize(&mut out, &self.tree, node, &self.output_settings);
        out
    }
}

struct ParserState {
    errors: Vec<ParseError>,
}

/// The reusable entry point. A `Parser` can run many parses over its lifetime;
/// concurrent calls on the same instance serialize on an internal mutex rather than
/// racing.
pub struct Parser {
    config: ParserConfig,
    state: Mutex<ParserState>,
}

impl Parser {
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Parser {
            config,
            state: Mutex::new(ParserState { errors: Vec::new() }),
        }
    }

    /// A parser with [`ParserConfig::default`].
    #[must_use]
    pub fn html() -> Self {
        Self::new(ParserConfig::default())
    }

    /// A fresh, independent `Parser` carrying the same configuration but none of
    /// `self`'s accumulated error log.
    #[must_use]
    pub fn new_instance(&self) -> Self {
        Self::new(self.config.clone())
    }

    /// Errors accumulated by the most recent [`Self::parse`]/[`Self::parse_xml`]/
    /// [`Self::parse_fragment`] call, up to [`ParserConfig::track_errors`].
    #[must_use]
    pub fn errors(&self) -> Vec<ParseError> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).errors.clone()
    }

    fn record_errors(&self, state: &mut ParserState, new: impl IntoIterator<Item = ParseError>) {
        for e in new {
            if let Some(max) = self.config.track_errors {
                if state.errors.len() >= max {
                    break;
                }
            }
            state.errors.push(e);
        }
    }

    /// Builds the range a freshly opened element is stamped with, from its start
    /// tag's token span.
    fn span_range(tokenizer: &Tokenizer<StringSource<'_>>, start: usize, end: usize) -> Range {
        let start_pos = Position::new(start, tokenizer.reader.line_number(start), tokenizer.reader.column_number(start));
        let end_pos = Position::new(end, tokenizer.reader.line_number(end), tokenizer.reader.column_number(end));
        Range::new(start_pos, end_pos)
    }

    /// Parses `input` as HTML and returns the resulting
    /// [`Document`]. Never fails on malformed markup — only [`Failure`] (I/O faults)
    /// abort the parse; recoverable defects are logged to [`Self::errors`] instead.
    pub fn parse(&self, input: &str) -> Result<Document, Failure> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.errors.clear();

        let source = StringSource::new(input);
        let mut tokenizer = Tokenizer::new(source, self.config.track_position);
        let mut builder = HtmlTreeBuilder::new(self.config.max_depth);
        if let Some(tag_set) = &self.config.tag_set {
            builder.tags = tag_set.clone();
        }

        self.drive_html(&mut tokenizer, &mut builder)?;

        self.record_errors(&mut state, std::mem::take(&mut tokenizer.errors));
        // Tree-construction errors
        // are stamped with the reader's final position: close enough for a log, since
        // by the time the builder notices e.g. a mismatched end tag the reader has
        // already moved past the token that caused it.
        let offset = tokenizer.reader.pos();
        let line = tokenizer.reader.line_number(offset);
        let column = tokenizer.reader.column_number(offset);
        let builder_errors: Vec<ParseError> = builder
            .errors
            .iter()
            .map(|kind| ParseError { kind: *kind, offset, line, column })
            .collect();
        self.record_errors(&mut state, builder_errors);

        Ok(Document {
            tree: builder.tree,
            output_settings: OutputSettings::default(),
        })
    }

    fn drive_html(&self, tokenizer: &mut Tokenizer<StringSource<'_>>, builder: &mut HtmlTreeBuilder) -> Result<(), Failure> {
        loop {
            let Some(token) = tokenizer.next_token()? else {
                break;
            };
            let is_eof = matches!(token, Token::Eof);
            let is_start = matches!(token, Token::StartTag(..));
            let is_end = matches!(token, Token::EndTag(..));
            let span = token.span();
            let previous_top = builder.current_node_id();

            let action = builder.process(token);

            if self.config.track_position {
                if let Some(span) = span {
                    if is_start {
                        if let Some(node) = builder.current_node_id() {
                            builder.tree.node_mut(node).range = Self::span_range(tokenizer, span.start, span.end);
                        }
                    } else if is_end {
                        if let Some(node) = previous_top {
                            let end_pos =
                                Position::new(span.end, tokenizer.reader.line_number(span.end), tokenizer.reader.column_number(span.end));
                            builder.tree.node_mut(node).range.end = end_pos;
                        }
                    }
                }
            }

            if let TreeBuilderAction::SwitchTokenizerState(s) = action {
                tokenizer.switch_to(s);
            }

            if is_eof || builder.finished() {
                break;
            }
        }
        Ok(())
    }

    /// Parses `input` as XML: a namespace-scope stack with no insertion modes,
    /// no adoption agency, and no foster parenting.
    #[cfg(feature = "xml")]
    pub fn parse_xml(&self, input: &str) -> Result<Document, Failure> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.errors.clear();

        let source = StringSource::new(input);
        let mut tokenizer = Tokenizer::new(source, self.config.track_position);
        tokenizer.set_xml_mode(true);
        let mut builder = XmlTreeBuilder::new(self.config.max_depth);

        loop {
            let Some(token) = tokenizer.next_token()? else {
                break;
            };
            let is_eof = matches!(token, Token::Eof);
            builder.process(token);
            if is_eof || builder.finished() {
                break;
            }
        }

        self.record_errors(&mut state, std::mem::take(&mut tokenizer.errors));
        let offset = tokenizer.reader.pos();
        let builder_errors: Vec<ParseError> = builder
            .errors
            .iter()
            .map(|kind| ParseError {
                kind: *kind,
                offset,
                line: tokenizer.reader.line_number(offset),
                column: tokenizer.reader.column_number(offset),
            })
            .collect();
        self.record_errors(&mut state, builder_errors);

        Ok(Document {
            tree: builder.tree,
            output_settings: OutputSettings {
                syntax: crate::serializer::Syntax::Xml,
                ..OutputSettings::default()
            },
        })
    }

    /// Parses `input` as an HTML fragment in the context of `context_tag`. There is no implied `<html>`/`<head>`/`<body>` wrapper in
    /// the *semantics* of the result — callers read the fragment's own top-level
    /// content from `tree.children(context_node)` rather than from the tree's root —
    /// but the synthetic context element itself stays in the returned tree, since
    /// arenas aren't mergeable across [`NodeTree`] instances.
    pub fn parse_fragment(&self, input: &str, context_tag: &str) -> Result<(NodeTree, NodeId), Failure> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.errors.clear();

        let source = StringSource::new(input);
        let mut tokenizer = Tokenizer::new(source, self.config.track_position);
        let mut builder = HtmlTreeBuilder::new(self.config.max_depth);
        if let Some(tag_set) = &self.config.tag_set {
            builder.tags = tag_set.clone();
        }
        let context_node = builder.seed_fragment_context(context_tag);

        self.drive_html(&mut tokenizer, &mut builder)?;

        self.record_errors(&mut state, std::mem::take(&mut tokenizer.errors));
        let offset = tokenizer.reader.pos();
        let builder_errors: Vec<ParseError> = builder
            .errors
            .iter()
            .map(|kind| ParseError {
                kind: *kind,
                offset,
                line: tokenizer.reader.line_number(offset),
                column: tokenizer.reader.column_number(offset),
            })
            .collect();
        self.record_errors(&mut state, builder_errors);

        Ok((builder.tree, context_node))
    }
}
