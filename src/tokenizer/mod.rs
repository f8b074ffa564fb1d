//! The HTML tokenizer. Grounded on html5gum's `tokenizer.rs` +
//! `machine.rs` + `machine_helper.rs`: a state-enum-driven loop feeding a reusable
//! token sink, switched here from html5gum's byte-oriented `fast_read_char!`
//! scanning to this crate's `char`-oriented [`crate::reader::CharReader`], and from
//! html5gum's `Emitter` trait to this crate's concrete [`crate::token::PendingTokens`].
//!
//! `state.rs` holds the ~75-variant [`State`] enum; `states.rs` holds one method per
//! state implementing its transition. html5gum splits each state into its own
//! macro-generated module for `#[inline(always)]` control over codegen; this crate
//! keeps the same one-state-one-function shape as plain `impl` methods, since the
//! char-based reader doesn't need html5gum's byte-slice fast-path specialization.

pub mod state;
mod states;

use std::collections::VecDeque;

use crate::error::{Error, Failure, ParseError};
use crate::reader::{CharReader, Source};
use crate::token::{PendingTokens, Token, TokenSpan};

pub use state::State;

/// What a single tokenizer step produced, internally. States that finish a
/// token call [`Tokenizer::emit_token`] themselves and then return `Continue`; this
/// enum only carries control flow the driver loop needs to act on directly.
pub(crate) enum Step {
    Continue,
    Reconsume(char, State),
    Eof,
}

pub(crate) type StepResult = Result<Step, Failure>;

/// The HTML tokenizer.
///
/// Drives [`crate::reader::CharReader`] through the WHATWG tokenization state machine,
/// emitting [`Token`]s through an internal queue fed by [`crate::token::PendingTokens`].
/// Construct through [`crate::parser::Parser`] rather than directly in ordinary use;
/// this type is public so embedders who only want tokenization (no tree construction)
/// can use it standalone.
pub struct Tokenizer<S: Source> {
    pub(crate) reader: CharReader<S>,
    pub(crate) state: State,
    pub(crate) return_state: Option<State>,
    pub(crate) pending: PendingTokens,
    pub(crate) temp_buffer: String,
    pub(crate) char_ref_code: i64,
    last_start_tag_name: Option<Vec<u8>>,
    eof_emitted: bool,
    token_start: usize,
    /// Parse errors accumulated since construction; the orchestrator drains this after
    /// each parse.
    pub errors: Vec<ParseError>,
    queue: VecDeque<Token>,
    /// Set by the tree builder via [`Tokenizer::acknowledge_self_closing`]; read by `SelfClosingStartTag`
    /// only for the `EndTagWithTrailingSolidus`/`NonVoidSelfClosing` diagnostics, never
    /// to change tokenization.
    self_closing_acknowledged: bool,
    /// Whether the token currently under construction in `TagName` (and friends) is an
    /// end tag rather than a start tag.
    pub(crate) building_end_tag: bool,
    /// XML entry point selection for `<?`/`<!...>`. Set once
    /// via [`Tokenizer::set_xml_mode`] before the first `next_token` call.
    pub(crate) xml_mode: bool,
}

impl<S: Source> Tokenizer<S> {
    #[must_use]
    pub fn new(source: S, track_positions: bool) -> Self {
        let mut reader = CharReader::new(source);
        if track_positions {
            reader.track_lines();
        }
        Tokenizer {
            reader,
            state: State::Data,
            return_state: None,
            pending: PendingTokens::default(),
            temp_buffer: String::new(),
            char_ref_code: 0,
            last_start_tag_name: None,
            eof_emitted: false,
            token_start: 0,
            errors: Vec::new(),
            queue: VecDeque::new(),
            self_closing_acknowledged: true,
            building_end_tag: false,
            xml_mode: false,
        }
    }

    /// Route `<?`/`<!...>` through the XML declaration/processing-instruction states
    /// instead of HTML's bogus-comment recovery. Must be
    /// called before the first [`Tokenizer::next_token`].
    pub fn set_xml_mode(&mut self, xml: bool) {
        self.xml_mode = xml;
    }

    /// Force the state machine into a specific state.
    pub fn switch_to(&mut self, state: State) {
        self.state = state;
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Remember the tag name of the most recently emitted start tag, used to decide
    /// whether a `</name>` sequence inside `RcData`/`RawText`/`ScriptData` is an
    /// "appropriate end tag token".
    pub fn set_last_start_tag(&mut self, name: Option<&[u8]>) {
        self.last_start_tag_name = name.map(|n| n.to_ascii_lowercase());
    }

    pub(crate) fn is_appropriate_end_tag(&self) -> bool {
        match &self.last_start_tag_name {
            Some(last) => self.pending.end_tag.normal_name.as_slice() == last.as_slice(),
            None => false,
        }
    }

    /// The tree builder calls this after processing a self-closing start tag on an
    /// element that doesn't permit it.
    pub fn acknowledge_self_closing(&mut self) {
        self.self_closing_acknowledged = true;
    }

    pub(crate) fn self_closing_unacknowledged(&self) -> bool {
        !self.self_closing_acknowledged
    }

    pub(crate) fn enter_state(&mut self, state: State) {
        debug_assert!(self.return_state.is_none());
        self.return_state = Some(self.state);
        self.state = state;
    }

    pub(crate) fn exit_state(&mut self) {
        self.state = self.return_state.take().expect("exit_state without enter_state");
    }

    pub(crate) fn consumed_as_part_of_attribute(&self) -> bool {
        matches!(
            self.return_state,
            Some(
                State::AttributeValueDoubleQuoted
                    | State::AttributeValueSingleQuoted
                    | State::AttributeValueUnquoted
            )
        )
    }

    pub(crate) fn error(&mut self, kind: Error) {
        let offset = self.reader.pos();
        self.errors.push(ParseError {
            kind,
            offset,
            line: self.reader.line_number(offset),
            column: self.reader.column_number(offset),
        });
    }

    fn flush_pending_character(&mut self) {
        if let Some(character) = self.pending.take_character() {
            let span = self.pending_span();
            self.queue.push_back(Token::Character(character, span));
        }
    }

    fn pending_span(&self) -> TokenSpan {
        TokenSpan {
            start: self.token_start,
            end: self.reader.pos(),
        }
    }

    pub(crate) fn mark_token_start(&mut self) {
        self.token_start = self.reader.pos();
    }

    /// Queue a completed non-character token, first flushing any coalesced character
    /// data ahead of it.
    pub(crate) fn emit_token(&mut self, token: Token) {
        self.flush_pending_character();
        self.queue.push_back(token);
    }

    pub(crate) fn emit_start_tag(&mut self) {
        if let Some(false) = self.pending.commit_pending_attribute_if_any() {
            self.error(Error::DuplicateAttribute);
        }
        let tag = std::mem::take(&mut self.pending.start_tag);
        self.set_last_start_tag(Some(tag.normal_name.as_slice()));
        let span = self.pending_span();
        self.emit_token(Token::StartTag(tag, span));
    }

    pub(crate) fn emit_end_tag(&mut self) {
        let tag = std::mem::take(&mut self.pending.end_tag);
        let span = self.pending_span();
        self.emit_token(Token::EndTag(tag, span));
    }

    pub(crate) fn emit_comment(&mut self) {
        let comment = std::mem::take(&mut self.pending.comment);
        let span = self.pending_span();
        self.emit_token(Token::Comment(comment, span));
    }

    pub(crate) fn emit_doctype(&mut self) {
        let doctype = std::mem::take(&mut self.pending.doctype);
        let span = self.pending_span();
        self.emit_token(Token::Doctype(doctype, span));
    }

    pub(crate) fn emit_xml_decl(&mut self) {
        let decl = std::mem::take(&mut self.pending.xml_decl);
        let span = self.pending_span();
        self.emit_token(Token::XmlDecl(decl, span));
    }

    /// Pull the next token out of the tokenizer, running the state machine until a
    /// token is ready or the source is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>, Failure> {
        loop {
            if let Some(token) = self.queue.pop_front() {
                return Ok(Some(token));
            }
            if self.eof_emitted {
                return Ok(None);
            }
            match self.step()? {
                Step::Continue => continue,
                Step::Reconsume(_c, state) => {
                    self.reader.unconsume();
                    self.state = state;
                }
                Step::Eof => {
                    self.eof_emitted = true;
                    self.flush_pending_character();
                    self.queue.push_back(Token::Eof);
                }
            }
        }
    }
}
