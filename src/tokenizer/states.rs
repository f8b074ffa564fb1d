//! One method per [`State`], implementing the WHATWG state
//! transition table against [`crate::reader::CharReader`] and [`crate::token::PendingTokens`].
//!
//! Grounded on the shape of html5gum's `machine.rs`/`machine_helper.rs` (one state,
//! one function, reconsume modeled as "unconsume then switch"), adapted from the
//! teacher's byte-oriented, macro-heavy dispatch to plain methods over the char-based
//! reader. States that can finish a token in more than one place share a handful of
//! small helpers (`commit_current_attribute`, `emit_current_tag`, the `generic_*`
//! trio for the RCDATA/RAWTEXT/ScriptData end-tag sub-dialect) rather than repeating
//! the bookkeeping at every call site.

use crate::entities::{self, Resolved};
use crate::error::{Error, Failure};
use crate::reader::Source;
use crate::token::HtmlString;

use super::state::State;
use super::{Step, StepResult, Tokenizer};

const WHITESPACE: [char; 4] = ['\t', '\n', '\x0c', ' '];

fn is_whitespace(c: char) -> bool {
    WHITESPACE.contains(&c)
}

impl<S: Source> Tokenizer<S> {
    /// Scan a just-consumed run of ordinary data characters for noncharacters and
    /// control characters. Lone surrogates can't
    /// occur here: `char` only ever holds valid Unicode scalar values, so the
    /// `SurrogateInInputStream` condition WHATWG describes for UTF-16-ish hosts is
    /// structurally unreachable in this reader — see DESIGN.md.
    fn validate_run(&mut self, run: &str) {
        for c in run.chars() {
            let cp = c as u32;
            if matches!(cp, 0xFDD0..=0xFDEF) || (cp & 0xFFFE) == 0xFFFE {
                self.error(Error::NoncharacterInInputStream);
            } else if matches!(cp, 0x0001..=0x0008 | 0x000B | 0x000E..=0x001F | 0x007F..=0x009F) {
                self.error(Error::ControlCharacterInInputStream);
            }
        }
    }

    pub(crate) fn step(&mut self) -> StepResult {
        match self.state {
            State::Data => self.data_state(),
            State::RcData => self.rcdata_state(),
            State::RawText => self.rawtext_state(),
            State::ScriptData => self.script_data_state(),
            State::PlainText => self.plaintext_state(),
            State::CdataSection => self.cdata_section_state(),
            State::CdataSectionBracket => self.cdata_section_bracket_state(),
            State::CdataSectionEnd => self.cdata_section_end_state(),

            State::TagOpen => self.tag_open_state(),
            State::EndTagOpen => self.end_tag_open_state(),
            State::TagName => self.tag_name_state(),
            State::RcDataLessThanSign => self.generic_less_than_sign(State::RcDataEndTagOpen, State::RcData),
            State::RcDataEndTagOpen => self.generic_end_tag_open(State::RcDataEndTagName, State::RcData),
            State::RcDataEndTagName => self.generic_end_tag_name(State::RcData),
            State::RawTextLessThanSign => {
                self.generic_less_than_sign(State::RawTextEndTagOpen, State::RawText)
            }
            State::RawTextEndTagOpen => self.generic_end_tag_open(State::RawTextEndTagName, State::RawText),
            State::RawTextEndTagName => self.generic_end_tag_name(State::RawText),
            State::BeforeAttributeName => self.before_attribute_name_state(),
            State::AttributeName => self.attribute_name_state(),
            State::AfterAttributeName => self.after_attribute_name_state(),
            State::BeforeAttributeValue => self.before_attribute_value_state(),
            State::AttributeValueDoubleQuoted => self.attribute_value_quoted_state('"'),
            State::AttributeValueSingleQuoted => self.attribute_value_quoted_state('\''),
            State::AttributeValueUnquoted => self.attribute_value_unquoted_state(),
            State::AfterAttributeValueQuoted => self.after_attribute_value_quoted_state(),
            State::SelfClosingStartTag => self.self_closing_start_tag_state(),
            State::BogusComment => self.bogus_comment_state(),

            State::MarkupDeclarationOpen => self.markup_declaration_open_state(),
            State::CommentStart => self.comment_start_state(),
            State::CommentStartDash => self.comment_start_dash_state(),
            State::Comment => self.comment_state(),
            State::CommentLessThanSign => self.comment_less_than_sign_state(),
            State::CommentLessThanSignBang => self.comment_less_than_sign_bang_state(),
            State::CommentLessThanSignBangDash => self.comment_less_than_sign_bang_dash_state(),
            State::CommentLessThanSignBangDashDash => self.comment_less_than_sign_bang_dash_dash_state(),
            State::CommentEndDash => self.comment_end_dash_state(),
            State::CommentEnd => self.comment_end_state(),
            State::CommentEndBang => self.comment_end_bang_state(),
            State::Doctype => self.doctype_state(),
            State::BeforeDoctypeName => self.before_doctype_name_state(),
            State::DoctypeName => self.doctype_name_state(),
            State::AfterDoctypeName => self.after_doctype_name_state(),
            State::AfterDoctypePublicKeyword => self.after_doctype_public_keyword_state(),
            State::BeforeDoctypePublicIdentifier => self.before_doctype_public_identifier_state(),
            State::DoctypePublicIdentifierDoubleQuoted => self.doctype_public_identifier_quoted_state('"'),
            State::DoctypePublicIdentifierSingleQuoted => self.doctype_public_identifier_quoted_state('\''),
            State::AfterDoctypePublicIdentifier => self.after_doctype_public_identifier_state(),
            State::BetweenDoctypePublicAndSystemIdentifiers => {
                self.between_doctype_public_and_system_identifiers_state()
            }
            State::AfterDoctypeSystemKeyword => self.after_doctype_system_keyword_state(),
            State::BeforeDoctypeSystemIdentifier => self.before_doctype_system_identifier_state(),
            State::DoctypeSystemIdentifierDoubleQuoted => self.doctype_system_identifier_quoted_state('"'),
            State::DoctypeSystemIdentifierSingleQuoted => self.doctype_system_identifier_quoted_state('\''),
            State::AfterDoctypeSystemIdentifier => self.after_doctype_system_identifier_state(),
            State::BogusDoctype => self.bogus_doctype_state(),

            State::ScriptDataLessThanSign => self.script_data_less_than_sign_state(),
            State::ScriptDataEndTagOpen => {
                self.generic_end_tag_open(State::ScriptDataEndTagName, State::ScriptData)
            }
            State::ScriptDataEndTagName => self.generic_end_tag_name(State::ScriptData),
            State::ScriptDataEscapeStart => self.script_data_escape_start_state(),
            State::ScriptDataEscapeStartDash => self.script_data_escape_start_dash_state(),
            State::ScriptDataEscaped => self.script_data_escaped_state(),
            State::ScriptDataEscapedDash => self.script_data_escaped_dash_state(),
            State::ScriptDataEscapedDashDash => self.script_data_escaped_dash_dash_state(),
            State::ScriptDataEscapedLessThanSign => self.script_data_escaped_less_than_sign_state(),
            State::ScriptDataEscapedEndTagOpen => {
                self.generic_end_tag_open(State::ScriptDataEscapedEndTagName, State::ScriptDataEscaped)
            }
            State::ScriptDataEscapedEndTagName => self.generic_end_tag_name(State::ScriptDataEscaped),
            State::ScriptDataDoubleEscapeStart => self.script_data_double_escape_start_state(),
            State::ScriptDataDoubleEscaped => self.script_data_double_escaped_state(),
            State::ScriptDataDoubleEscapedDash => self.script_data_double_escaped_dash_state(),
            State::ScriptDataDoubleEscapedDashDash => self.script_data_double_escaped_dash_dash_state(),
            State::ScriptDataDoubleEscapedLessThanSign => {
                self.script_data_double_escaped_less_than_sign_state()
            }
            State::ScriptDataDoubleEscapeEnd => self.script_data_double_escape_end_state(),

            State::CharacterReference => self.character_reference_state(),
            State::NamedCharacterReference => self.named_character_reference_state(),
            State::AmbiguousAmpersand => self.ambiguous_ampersand_state(),
            State::NumericCharacterReference => self.numeric_character_reference_state(),
            State::HexadecimalCharacterReferenceStart => self.hexadecimal_character_reference_start_state(),
            State::HexadecimalCharacterReference => self.hexadecimal_character_reference_state(),
            State::DecimalCharacterReference => self.decimal_character_reference_state(),
            State::NumericCharacterReferenceEnd => self.numeric_character_reference_end_state(),

            State::XmlDeclarationOpen => self.xml_declaration_open_state(),
            State::XmlDeclarationContent => self.xml_declaration_content_state(),
            State::ProcessingInstructionContent => self.processing_instruction_content_state(),
        }
    }

    // --- Data-level states -------------------------------------------------------

    fn data_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '&' && c != '<' && c != '\0', None)?;
        if !run.is_empty() {
            self.validate_run(&run);
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.current()? {
            Some('&') => {
                self.reader.advance()?;
                self.return_state = Some(State::Data);
                self.state = State::CharacterReference;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.token_start = self.reader.pos();
                self.reader.advance()?;
                self.state = State::TagOpen;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.reader.advance()?;
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\0", false);
                Ok(Step::Continue)
            }
            None => Ok(Step::Eof),
            Some(_) => unreachable!(),
        }
    }

    fn rcdata_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '&' && c != '<' && c != '\0', None)?;
        if !run.is_empty() {
            self.validate_run(&run);
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('&') => {
                self.return_state = Some(State::RcData);
                self.state = State::CharacterReference;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.state = State::RcDataLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => Ok(Step::Eof),
            Some(_) => unreachable!(),
        }
    }

    fn rawtext_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '<' && c != '\0', None)?;
        if !run.is_empty() {
            self.validate_run(&run);
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('<') => {
                self.state = State::RawTextLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => Ok(Step::Eof),
            Some(_) => unreachable!(),
        }
    }

    fn script_data_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '<' && c != '\0', None)?;
        if !run.is_empty() {
            self.validate_run(&run);
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('<') => {
                self.state = State::ScriptDataLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => Ok(Step::Eof),
            Some(_) => unreachable!(),
        }
    }

    fn plaintext_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '\0', None)?;
        if !run.is_empty() {
            self.validate_run(&run);
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => Ok(Step::Eof),
            Some(_) => unreachable!(),
        }
    }

    fn cdata_section_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != ']', None)?;
        if !run.is_empty() {
            self.pending.push_char(&run, true);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(']') => {
                self.state = State::CdataSectionBracket;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInCdata);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn cdata_section_bracket_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(']') => {
                self.state = State::CdataSectionEnd;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char("]", true);
                Ok(Step::Reconsume(c, State::CdataSection))
            }
            None => {
                self.pending.push_char("]", true);
                self.error(Error::EofInCdata);
                Ok(Step::Eof)
            }
        }
    }

    fn cdata_section_end_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(']') => {
                self.pending.push_char("]", true);
                Ok(Step::Continue)
            }
            Some('>') => {
                self.state = State::Data;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char("]]", true);
                Ok(Step::Reconsume(c, State::CdataSection))
            }
            None => {
                self.pending.push_char("]]", true);
                self.error(Error::EofInCdata);
                Ok(Step::Eof)
            }
        }
    }

    // --- Tag-construct states -----------------------------------------------------

    fn tag_open_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('!') => {
                self.state = State::MarkupDeclarationOpen;
                Ok(Step::Continue)
            }
            Some('/') => {
                self.state = State::EndTagOpen;
                Ok(Step::Continue)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.pending.reset_start_tag();
                self.building_end_tag = false;
                Ok(Step::Reconsume(c, State::TagName))
            }
            Some('?') if self.xml_mode => {
                self.pending.reset_xml_decl();
                self.pending.xml_decl.is_declaration = false;
                self.state = State::ProcessingInstructionContent;
                Ok(Step::Continue)
            }
            Some('?') => {
                self.error(Error::UnexpectedQuestionMarkInsteadOfTagName);
                self.pending.reset_comment();
                self.pending.comment.bogus = true;
                Ok(Step::Reconsume('?', State::BogusComment))
            }
            Some(c) => {
                self.error(Error::InvalidFirstCharacterOfTagName);
                self.pending.push_char("<", false);
                Ok(Step::Reconsume(c, State::Data))
            }
            None => {
                self.error(Error::EofBeforeTagName);
                self.pending.push_char("<", false);
                Ok(Step::Eof)
            }
        }
    }

    fn end_tag_open_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if c.is_ascii_alphabetic() => {
                self.pending.reset_end_tag();
                self.building_end_tag = true;
                Ok(Step::Reconsume(c, State::TagName))
            }
            Some('>') => {
                self.error(Error::MissingEndTagName);
                self.state = State::Data;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.error(Error::InvalidFirstCharacterOfTagName);
                self.pending.reset_comment();
                self.pending.comment.bogus = true;
                Ok(Step::Reconsume(c, State::BogusComment))
            }
            None => {
                self.error(Error::EofBeforeTagName);
                self.pending.push_char("</", false);
                Ok(Step::Eof)
            }
        }
    }

    fn push_tag_name_chars(&mut self, s: &str) {
        if self.building_end_tag {
            self.pending.end_tag.push_name(s);
        } else {
            self.pending.start_tag.push_name(s);
        }
    }

    fn emit_current_tag(&mut self) {
        if self.building_end_tag {
            self.emit_end_tag();
        } else {
            self.emit_start_tag();
        }
    }

    fn tag_name_state(&mut self) -> StepResult {
        let run = self
            .reader
            .consume_matching(|c| !matches!(c, '\t' | '\n' | '\x0c' | ' ' | '/' | '>' | '\0'), None)?;
        if !run.is_empty() {
            self.push_tag_name_chars(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BeforeAttributeName;
                Ok(Step::Continue)
            }
            Some('/') => {
                self.state = State::SelfClosingStartTag;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.push_tag_name_chars("\u{FFFD}");
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    /// Shared by RCDATA/RAWTEXT/ScriptData's `<` sub-state: `/` commits to an end tag
    /// attempt, anything else is literal data.
    fn generic_less_than_sign(&mut self, end_tag_open: State, fallback: State) -> StepResult {
        match self.reader.consume()? {
            Some('/') => {
                self.temp_buffer.clear();
                self.state = end_tag_open;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char("<", false);
                Ok(Step::Reconsume(c, fallback))
            }
            None => {
                self.pending.push_char("<", false);
                self.state = fallback;
                Ok(Step::Continue)
            }
        }
    }

    fn generic_end_tag_open(&mut self, end_tag_name: State, fallback: State) -> StepResult {
        match self.reader.consume()? {
            Some(c) if c.is_ascii_alphabetic() => {
                self.pending.reset_end_tag();
                self.building_end_tag = true;
                Ok(Step::Reconsume(c, end_tag_name))
            }
            Some(c) => {
                self.pending.push_char("</", false);
                Ok(Step::Reconsume(c, fallback))
            }
            None => {
                self.pending.push_char("</", false);
                self.state = fallback;
                Ok(Step::Continue)
            }
        }
    }

    fn abandon_end_tag_as_text(&mut self, fallback: State) {
        let text = format!("</{}", self.temp_buffer);
        self.pending.push_char(&text, false);
        self.building_end_tag = false;
        self.state = fallback;
    }

    fn generic_end_tag_name(&mut self, fallback: State) -> StepResult {
        match self.reader.consume()? {
            Some(c) if c.is_ascii_alphabetic() => {
                self.temp_buffer.push(c);
                self.pending.end_tag.push_name(&c.to_string());
                Ok(Step::Continue)
            }
            Some(c) if is_whitespace(c) => {
                if self.is_appropriate_end_tag() {
                    self.state = State::BeforeAttributeName;
                } else {
                    self.abandon_end_tag_as_text(fallback);
                }
                Ok(Step::Continue)
            }
            Some('/') => {
                if self.is_appropriate_end_tag() {
                    self.state = State::SelfClosingStartTag;
                } else {
                    self.abandon_end_tag_as_text(fallback);
                }
                Ok(Step::Continue)
            }
            Some('>') => {
                if self.is_appropriate_end_tag() {
                    self.state = State::Data;
                    self.emit_end_tag();
                } else {
                    self.abandon_end_tag_as_text(fallback);
                }
                Ok(Step::Continue)
            }
            Some(c) => {
                self.abandon_end_tag_as_text(fallback);
                Ok(Step::Reconsume(c, fallback))
            }
            None => {
                self.abandon_end_tag_as_text(fallback);
                Ok(Step::Continue)
            }
        }
    }

    fn commit_current_attribute(&mut self) {
        if self.pending.cur_attr_name.is_empty() {
            return;
        }
        if self.building_end_tag {
            self.error(Error::EndTagWithAttributes);
            self.pending.start_attribute();
            return;
        }
        if !self.pending.commit_attribute() {
            self.error(Error::DuplicateAttribute);
        }
    }

    fn before_attribute_name_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some(c @ ('/' | '>')) => Ok(Step::Reconsume(c, State::AfterAttributeName)),
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some('=') => {
                self.error(Error::UnexpectedEqualsSignBeforeAttributeName);
                self.pending.start_attribute();
                self.pending.cur_attr_name.push('=');
                self.state = State::AttributeName;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.start_attribute();
                Ok(Step::Reconsume(c, State::AttributeName))
            }
        }
    }

    fn attribute_name_state(&mut self) -> StepResult {
        let run = self
            .reader
            .consume_matching(|c| !matches!(c, '\t' | '\n' | '\x0c' | ' ' | '/' | '>' | '=' | '\0'), None)?;
        if !run.is_empty() {
            if run.contains(['"', '\'', '<']) {
                self.error(Error::UnexpectedCharacterInAttributeName);
            }
            self.pending.cur_attr_name.push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::AfterAttributeName;
                Ok(Step::Continue)
            }
            Some(c @ ('/' | '>')) => Ok(Step::Reconsume(c, State::AfterAttributeName)),
            Some('=') => {
                self.state = State::BeforeAttributeValue;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.cur_attr_name.push('\u{FFFD}');
                Ok(Step::Continue)
            }
            None => {
                self.state = State::AfterAttributeName;
                Ok(Step::Continue)
            }
            Some(_) => unreachable!(),
        }
    }

    fn after_attribute_name_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('/') => {
                self.commit_current_attribute();
                self.state = State::SelfClosingStartTag;
                Ok(Step::Continue)
            }
            Some('=') => {
                self.state = State::BeforeAttributeValue;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.commit_current_attribute();
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(c) => {
                self.commit_current_attribute();
                self.pending.start_attribute();
                Ok(Step::Reconsume(c, State::AttributeName))
            }
        }
    }

    fn before_attribute_value_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('"') => {
                self.state = State::AttributeValueDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.state = State::AttributeValueSingleQuoted;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingAttributeValue);
                self.commit_current_attribute();
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(c) => Ok(Step::Reconsume(c, State::AttributeValueUnquoted)),
        }
    }

    fn attribute_value_quoted_state(&mut self, quote: char) -> StepResult {
        let run = self.reader.consume_matching(|c| c != quote && c != '&' && c != '\0', None)?;
        if !run.is_empty() {
            self.pending.cur_attr_value.push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if c == quote => {
                self.commit_current_attribute();
                self.state = State::AfterAttributeValueQuoted;
                Ok(Step::Continue)
            }
            Some('&') => {
                self.return_state = Some(self.state);
                self.state = State::CharacterReference;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.cur_attr_value.push('\u{FFFD}');
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn attribute_value_unquoted_state(&mut self) -> StepResult {
        let run = self
            .reader
            .consume_matching(|c| !matches!(c, '\t' | '\n' | '\x0c' | ' ' | '&' | '>' | '\0'), None)?;
        if !run.is_empty() {
            if run.contains(['"', '\'', '<', '=', '`']) {
                self.error(Error::UnexpectedCharacterInUnquotedAttributeValue);
            }
            self.pending.cur_attr_value.push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.commit_current_attribute();
                self.state = State::BeforeAttributeName;
                Ok(Step::Continue)
            }
            Some('&') => {
                self.return_state = Some(State::AttributeValueUnquoted);
                self.state = State::CharacterReference;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.commit_current_attribute();
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.cur_attr_value.push('\u{FFFD}');
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn after_attribute_value_quoted_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BeforeAttributeName;
                Ok(Step::Continue)
            }
            Some('/') => {
                self.state = State::SelfClosingStartTag;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingWhitespaceBetweenAttributes);
                Ok(Step::Reconsume(c, State::BeforeAttributeName))
            }
        }
    }

    fn self_closing_start_tag_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('>') => {
                if self.building_end_tag {
                    self.error(Error::EndTagWithTrailingSolidus);
                } else {
                    self.pending.start_tag.self_closing = true;
                }
                self.state = State::Data;
                self.emit_current_tag();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInTag);
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::UnexpectedSolidusInTag);
                Ok(Step::Reconsume(c, State::BeforeAttributeName))
            }
        }
    }

    fn bogus_comment_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '>' && c != '\0', None)?;
        if !run.is_empty() {
            self.pending.comment.data.push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('>') => {
                self.state = State::Data;
                self.emit_comment();
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.comment.data.push_str("\u{FFFD}");
                Ok(Step::Continue)
            }
            None => {
                self.emit_comment();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    // --- Markup-declaration states -------------------------------------------------

    fn markup_declaration_open_state(&mut self) -> StepResult {
        if self.reader.matches_str("--")? {
            self.reader.advance()?;
            self.reader.advance()?;
            self.pending.reset_comment();
            self.state = State::CommentStart;
            return Ok(Step::Continue);
        }
        if self.reader.matches_str_ignore_case("DOCTYPE")? {
            for _ in 0..7 {
                self.reader.advance()?;
            }
            self.pending.reset_doctype();
            self.state = State::Doctype;
            return Ok(Step::Continue);
        }
        if self.reader.matches_str("[CDATA[")? {
            for _ in 0..7 {
                self.reader.advance()?;
            }
            self.state = State::CdataSection;
            return Ok(Step::Continue);
        }
        if self.xml_mode {
            self.pending.reset_xml_decl();
            self.pending.xml_decl.is_declaration = true;
            self.state = State::XmlDeclarationOpen;
            return Ok(Step::Continue);
        }
        self.error(Error::IncorrectlyOpenedComment);
        self.pending.reset_comment();
        self.pending.comment.bogus = true;
        self.state = State::BogusComment;
        Ok(Step::Continue)
    }

    fn comment_start_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.state = State::CommentStartDash;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::AbruptClosingOfEmptyComment);
                self.state = State::Data;
                self.emit_comment();
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::Comment)),
            None => {
                self.state = State::Comment;
                Ok(Step::Continue)
            }
        }
    }

    fn comment_start_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.state = State::CommentEnd;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::AbruptClosingOfEmptyComment);
                self.state = State::Data;
                self.emit_comment();
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.comment.data.push_str("-");
                Ok(Step::Reconsume(c, State::Comment))
            }
            None => {
                self.error(Error::EofInComment);
                self.emit_comment();
                Ok(Step::Eof)
            }
        }
    }

    fn comment_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| !matches!(c, '<' | '-' | '\0'), None)?;
        if !run.is_empty() {
            self.pending.comment.data.push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('<') => {
                self.pending.comment.data.push_str("<");
                self.state = State::CommentLessThanSign;
                Ok(Step::Continue)
            }
            Some('-') => {
                self.state = State::CommentEndDash;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.comment.data.push_str("\u{FFFD}");
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInComment);
                self.emit_comment();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn comment_less_than_sign_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('!') => {
                self.pending.comment.data.push_str("!");
                self.state = State::CommentLessThanSignBang;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.pending.comment.data.push_str("<");
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::Comment)),
            None => {
                self.state = State::Comment;
                Ok(Step::Continue)
            }
        }
    }

    fn comment_less_than_sign_bang_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.state = State::CommentLessThanSignBangDash;
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::Comment)),
            None => {
                self.state = State::Comment;
                Ok(Step::Continue)
            }
        }
    }

    fn comment_less_than_sign_bang_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.state = State::CommentLessThanSignBangDashDash;
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::CommentEndDash)),
            None => {
                self.state = State::CommentEndDash;
                Ok(Step::Continue)
            }
        }
    }

    fn comment_less_than_sign_bang_dash_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) => Ok(Step::Reconsume(c, State::CommentEnd)),
            None => {
                self.state = State::CommentEnd;
                Ok(Step::Continue)
            }
        }
    }

    fn comment_end_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.state = State::CommentEnd;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.comment.data.push_str("-");
                Ok(Step::Reconsume(c, State::Comment))
            }
            None => {
                self.error(Error::EofInComment);
                self.emit_comment();
                Ok(Step::Eof)
            }
        }
    }

    fn comment_end_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('>') => {
                self.state = State::Data;
                self.emit_comment();
                Ok(Step::Continue)
            }
            Some('!') => {
                self.state = State::CommentEndBang;
                Ok(Step::Continue)
            }
            Some('-') => {
                self.pending.comment.data.push_str("-");
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.comment.data.push_str("--");
                Ok(Step::Reconsume(c, State::Comment))
            }
            None => {
                self.error(Error::EofInComment);
                self.emit_comment();
                Ok(Step::Eof)
            }
        }
    }

    fn comment_end_bang_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.comment.data.push_str("--!");
                self.state = State::CommentEndDash;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::IncorrectlyClosedComment);
                self.state = State::Data;
                self.emit_comment();
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.comment.data.push_str("--!");
                Ok(Step::Reconsume(c, State::Comment))
            }
            None => {
                self.error(Error::EofInComment);
                self.emit_comment();
                Ok(Step::Eof)
            }
        }
    }

    fn doctype_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BeforeDoctypeName;
                Ok(Step::Continue)
            }
            Some('>') => Ok(Step::Reconsume('>', State::BeforeDoctypeName)),
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingWhitespaceBeforeDoctypeName);
                Ok(Step::Reconsume(c, State::BeforeDoctypeName))
            }
        }
    }

    fn before_doctype_name_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some(c) if c.is_ascii_uppercase() => {
                self.pending.doctype.name.push_str(&c.to_ascii_lowercase().to_string());
                self.state = State::DoctypeName;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.doctype.name.push_str("\u{FFFD}");
                self.state = State::DoctypeName;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingDoctypeName);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.pending.doctype.name.push_str(&c.to_string());
                self.state = State::DoctypeName;
                Ok(Step::Continue)
            }
        }
    }

    fn doctype_name_state(&mut self) -> StepResult {
        let run = self
            .reader
            .consume_matching(|c| !matches!(c, '\t' | '\n' | '\x0c' | ' ' | '>' | '\0'), None)?;
        if !run.is_empty() {
            self.pending.doctype.name.push_str(&run.to_ascii_lowercase());
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::AfterDoctypeName;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.doctype.name.push_str("\u{FFFD}");
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn after_doctype_name_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.current()? {
            Some('>') => {
                self.reader.advance()?;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(_) => {
                if self.reader.match_consume_ignore_case("PUBLIC")? {
                    self.pending.doctype.pub_sys_key = Some(crate::token::PubSysKeyword::Public);
                    self.state = State::AfterDoctypePublicKeyword;
                } else if self.reader.match_consume_ignore_case("SYSTEM")? {
                    self.pending.doctype.pub_sys_key = Some(crate::token::PubSysKeyword::System);
                    self.state = State::AfterDoctypeSystemKeyword;
                } else {
                    self.error(Error::InvalidCharacterSequenceAfterDoctypeName);
                    self.pending.doctype.force_quirks = true;
                    self.state = State::BogusDoctype;
                }
                Ok(Step::Continue)
            }
        }
    }

    fn after_doctype_public_keyword_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BeforeDoctypePublicIdentifier;
                Ok(Step::Continue)
            }
            Some('"') => {
                self.error(Error::MissingWhitespaceAfterDoctypePublicKeyword);
                self.pending.doctype.public_id = Some(HtmlString::default());
                self.state = State::DoctypePublicIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.error(Error::MissingWhitespaceAfterDoctypePublicKeyword);
                self.pending.doctype.public_id = Some(HtmlString::default());
                self.state = State::DoctypePublicIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingDoctypePublicIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypePublicIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn before_doctype_public_identifier_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('"') => {
                self.pending.doctype.public_id = Some(HtmlString::default());
                self.state = State::DoctypePublicIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.pending.doctype.public_id = Some(HtmlString::default());
                self.state = State::DoctypePublicIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingDoctypePublicIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypePublicIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn doctype_public_identifier_quoted_state(&mut self, quote: char) -> StepResult {
        let run = self.reader.consume_matching(|c| c != quote && c != '>' && c != '\0', None)?;
        if !run.is_empty() {
            self.pending.doctype.public_id.get_or_insert_with(HtmlString::default).push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if c == quote => {
                self.state = State::AfterDoctypePublicIdentifier;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending
                    .doctype
                    .public_id
                    .get_or_insert_with(HtmlString::default)
                    .push_str("\u{FFFD}");
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::AbruptDoctypePublicIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn after_doctype_public_identifier_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BetweenDoctypePublicAndSystemIdentifiers;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            Some('"') => {
                self.error(Error::MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers);
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.error(Error::MissingWhitespaceBetweenDoctypePublicAndSystemIdentifiers);
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn between_doctype_public_and_system_identifiers_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('>') => {
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            Some('"') => {
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn after_doctype_system_keyword_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if is_whitespace(c) => {
                self.state = State::BeforeDoctypeSystemIdentifier;
                Ok(Step::Continue)
            }
            Some('"') => {
                self.error(Error::MissingWhitespaceAfterDoctypeSystemKeyword);
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.error(Error::MissingWhitespaceAfterDoctypeSystemKeyword);
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn before_doctype_system_identifier_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('"') => {
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierDoubleQuoted;
                Ok(Step::Continue)
            }
            Some('\'') => {
                self.pending.doctype.system_id = Some(HtmlString::default());
                self.state = State::DoctypeSystemIdentifierSingleQuoted;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::MissingDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::MissingQuoteBeforeDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn doctype_system_identifier_quoted_state(&mut self, quote: char) -> StepResult {
        let run = self.reader.consume_matching(|c| c != quote && c != '>' && c != '\0', None)?;
        if !run.is_empty() {
            self.pending.doctype.system_id.get_or_insert_with(HtmlString::default).push_str(&run);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some(c) if c == quote => {
                self.state = State::AfterDoctypeSystemIdentifier;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending
                    .doctype
                    .system_id
                    .get_or_insert_with(HtmlString::default)
                    .push_str("\u{FFFD}");
                Ok(Step::Continue)
            }
            Some('>') => {
                self.error(Error::AbruptDoctypeSystemIdentifier);
                self.pending.doctype.force_quirks = true;
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn after_doctype_system_identifier_state(&mut self) -> StepResult {
        loop {
            match self.reader.current()? {
                Some(c) if is_whitespace(c) => {
                    self.reader.advance()?;
                }
                _ => break,
            }
        }
        match self.reader.consume()? {
            Some('>') => {
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInDoctype);
                self.pending.doctype.force_quirks = true;
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(c) => {
                self.error(Error::UnexpectedCharacterAfterDoctypeSystemIdentifier);
                Ok(Step::Reconsume(c, State::BogusDoctype))
            }
        }
    }

    fn bogus_doctype_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| c != '>' && c != '\0', None)?;
        if !run.is_empty() {
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('>') => {
                self.state = State::Data;
                self.emit_doctype();
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                Ok(Step::Continue)
            }
            None => {
                self.emit_doctype();
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    // --- Script-escape bookkeeping states ------------------------------------------

    fn script_data_less_than_sign_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('/') => {
                self.temp_buffer.clear();
                self.state = State::ScriptDataEndTagOpen;
                Ok(Step::Continue)
            }
            Some('!') => {
                self.pending.push_char("<!", false);
                self.state = State::ScriptDataEscapeStart;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char("<", false);
                Ok(Step::Reconsume(c, State::ScriptData))
            }
            None => {
                self.pending.push_char("<", false);
                self.state = State::ScriptData;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_escape_start_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataEscapeStartDash;
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::ScriptData)),
            None => {
                self.state = State::ScriptData;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_escape_start_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataEscapedDashDash;
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::ScriptData)),
            None => {
                self.state = State::ScriptData;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_escaped_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| !matches!(c, '-' | '<' | '\0'), None)?;
        if !run.is_empty() {
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataEscapedDash;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.state = State::ScriptDataEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn script_data_escaped_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataEscapedDashDash;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.state = State::ScriptDataEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char(&c.to_string(), false);
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
        }
    }

    fn script_data_escaped_dash_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                Ok(Step::Continue)
            }
            Some('<') => {
                self.state = State::ScriptDataEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.pending.push_char(">", false);
                self.state = State::ScriptData;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char(&c.to_string(), false);
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
        }
    }

    fn script_data_escaped_less_than_sign_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('/') => {
                self.temp_buffer.clear();
                self.state = State::ScriptDataEscapedEndTagOpen;
                Ok(Step::Continue)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.temp_buffer.clear();
                self.pending.push_char("<", false);
                Ok(Step::Reconsume(c, State::ScriptDataDoubleEscapeStart))
            }
            Some(c) => {
                self.pending.push_char("<", false);
                Ok(Step::Reconsume(c, State::ScriptDataEscaped))
            }
            None => {
                self.pending.push_char("<", false);
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_double_escape_start_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if matches!(c, '\t' | '\n' | '\x0c' | ' ' | '/' | '>') => {
                self.pending.push_char(&c.to_string(), false);
                self.state = if self.temp_buffer.eq_ignore_ascii_case("script") {
                    State::ScriptDataDoubleEscaped
                } else {
                    State::ScriptDataEscaped
                };
                Ok(Step::Continue)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.temp_buffer.push(c.to_ascii_lowercase());
                self.pending.push_char(&c.to_string(), false);
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::ScriptDataEscaped)),
            None => {
                self.state = State::ScriptDataEscaped;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_double_escaped_state(&mut self) -> StepResult {
        let run = self.reader.consume_matching(|c| !matches!(c, '-' | '<' | '\0'), None)?;
        if !run.is_empty() {
            self.pending.push_char(&run, false);
            return Ok(Step::Continue);
        }
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataDoubleEscapedDash;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.pending.push_char("<", false);
                self.state = State::ScriptDataDoubleEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
            Some(_) => unreachable!(),
        }
    }

    fn script_data_double_escaped_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                self.state = State::ScriptDataDoubleEscapedDashDash;
                Ok(Step::Continue)
            }
            Some('<') => {
                self.pending.push_char("<", false);
                self.state = State::ScriptDataDoubleEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char(&c.to_string(), false);
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
        }
    }

    fn script_data_double_escaped_dash_dash_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('-') => {
                self.pending.push_char("-", false);
                Ok(Step::Continue)
            }
            Some('<') => {
                self.pending.push_char("<", false);
                self.state = State::ScriptDataDoubleEscapedLessThanSign;
                Ok(Step::Continue)
            }
            Some('>') => {
                self.pending.push_char(">", false);
                self.state = State::ScriptData;
                Ok(Step::Continue)
            }
            Some('\0') => {
                self.error(Error::UnexpectedNullCharacter);
                self.pending.push_char("\u{FFFD}", false);
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
            Some(c) => {
                self.pending.push_char(&c.to_string(), false);
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
            None => {
                self.error(Error::EofInScriptHtmlCommentLikeText);
                Ok(Step::Eof)
            }
        }
    }

    fn script_data_double_escaped_less_than_sign_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some('/') => {
                self.temp_buffer.clear();
                self.pending.push_char("/", false);
                self.state = State::ScriptDataDoubleEscapeEnd;
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::ScriptDataDoubleEscaped)),
            None => {
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
        }
    }

    fn script_data_double_escape_end_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if matches!(c, '\t' | '\n' | '\x0c' | ' ' | '/' | '>') => {
                self.pending.push_char(&c.to_string(), false);
                self.state = if self.temp_buffer.eq_ignore_ascii_case("script") {
                    State::ScriptDataEscaped
                } else {
                    State::ScriptDataDoubleEscaped
                };
                Ok(Step::Continue)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.temp_buffer.push(c.to_ascii_lowercase());
                self.pending.push_char(&c.to_string(), false);
                Ok(Step::Continue)
            }
            Some(c) => Ok(Step::Reconsume(c, State::ScriptDataDoubleEscaped)),
            None => {
                self.state = State::ScriptDataDoubleEscaped;
                Ok(Step::Continue)
            }
        }
    }

    // --- Character reference states -------------------------------------------------

    fn push_ref_str(&mut self, s: &str) {
        if self.consumed_as_part_of_attribute() {
            self.pending.cur_attr_value.push_str(s);
        } else {
            self.pending.push_char(s, false);
        }
    }

    fn flush_temp_buffer_as_chars(&mut self) {
        let s = std::mem::take(&mut self.temp_buffer);
        if self.consumed_as_part_of_attribute() {
            self.pending.cur_attr_value.push_str(&s);
        } else {
            self.pending.push_char(&s, false);
        }
    }

    fn exit_char_ref(&mut self) {
        self.state = self.return_state.take().unwrap_or(State::Data);
    }

    fn character_reference_state(&mut self) -> StepResult {
        self.temp_buffer.clear();
        self.temp_buffer.push('&');
        match self.reader.current()? {
            Some(c) if c.is_ascii_alphanumeric() => {
                self.state = State::NamedCharacterReference;
                Ok(Step::Continue)
            }
            Some('#') => {
                self.reader.advance()?;
                self.temp_buffer.push('#');
                self.state = State::NumericCharacterReference;
                Ok(Step::Continue)
            }
            _ => {
                self.flush_temp_buffer_as_chars();
                self.exit_char_ref();
                Ok(Step::Continue)
            }
        }
    }

    fn named_character_reference_state(&mut self) -> StepResult {
        self.reader.mark();
        let name = self.reader.consume_letter_then_digit_sequence()?;
        let terminated = self.reader.match_consume(';')?;
        let peek = if self.consumed_as_part_of_attribute() {
            self.reader.current()?
        } else {
            None
        };
        match entities::resolve_named(&name, terminated, peek) {
            Some((resolved, used_len)) => {
                if used_len < name.chars().count() {
                    self.reader.rewind_to_mark();
                    for _ in 0..used_len {
                        self.reader.advance()?;
                    }
                }
                self.reader.unmark();
                match resolved {
                    Resolved::One(c) => self.push_ref_str(&c.to_string()),
                    Resolved::Two(a, b) => {
                        let mut s = String::new();
                        s.push(a);
                        s.push(b);
                        self.push_ref_str(&s);
                    }
                    Resolved::None => {}
                }
                self.exit_char_ref();
                Ok(Step::Continue)
            }
            None => {
                self.reader.unmark();
                self.error(Error::UnknownNamedCharacterReference);
                self.temp_buffer.push_str(&name);
                if terminated {
                    self.temp_buffer.push(';');
                }
                self.flush_temp_buffer_as_chars();
                self.exit_char_ref();
                Ok(Step::Continue)
            }
        }
    }

    fn ambiguous_ampersand_state(&mut self) -> StepResult {
        match self.reader.consume()? {
            Some(c) if c.is_ascii_alphanumeric() => {
                self.push_ref_str(&c.to_string());
                Ok(Step::Continue)
            }
            Some(';') => {
                self.error(Error::UnknownNamedCharacterReference);
                Ok(Step::Reconsume(';', self.return_state.unwrap_or(State::Data)))
            }
            Some(c) => Ok(Step::Reconsume(c, self.return_state.unwrap_or(State::Data))),
            None => {
                self.exit_char_ref();
                Ok(Step::Continue)
            }
        }
    }

    fn numeric_character_reference_state(&mut self) -> StepResult {
        self.char_ref_code = 0;
        match self.reader.current()? {
            Some(c @ ('x' | 'X')) => {
                self.reader.advance()?;
                self.temp_buffer.push(c);
                self.state = State::HexadecimalCharacterReferenceStart;
            }
            _ => {
                self.state = State::DecimalCharacterReference;
            }
        }
        Ok(Step::Continue)
    }

    fn hexadecimal_character_reference_start_state(&mut self) -> StepResult {
        match self.reader.current()? {
            Some(c) if c.is_ascii_hexdigit() => {
                self.state = State::HexadecimalCharacterReference;
                Ok(Step::Continue)
            }
            _ => {
                self.error(Error::AbsenceOfDigitsInNumericCharacterReference);
                self.flush_temp_buffer_as_chars();
                self.exit_char_ref();
                Ok(Step::Continue)
            }
        }
    }

    fn hexadecimal_character_reference_state(&mut self) -> StepResult {
        let digits = self.reader.consume_hex_sequence()?;
        for d in digits.chars() {
            let v = i64::from(d.to_digit(16).expect("ascii hexdigit"));
            self.char_ref_code = self.char_ref_code.saturating_mul(16).saturating_add(v);
        }
        if !self.reader.match_consume(';')? {
            self.error(Error::MissingSemicolonAfterCharacterReference);
        }
        self.state = State::NumericCharacterReferenceEnd;
        Ok(Step::Continue)
    }

    fn decimal_character_reference_state(&mut self) -> StepResult {
        let digits = self.reader.consume_digit_sequence()?;
        if digits.is_empty() {
            self.error(Error::AbsenceOfDigitsInNumericCharacterReference);
            self.flush_temp_buffer_as_chars();
            self.exit_char_ref();
            return Ok(Step::Continue);
        }
        for d in digits.chars() {
            let v = i64::from(d.to_digit(10).expect("ascii digit"));
            self.char_ref_code = self.char_ref_code.saturating_mul(10).saturating_add(v);
        }
        if !self.reader.match_consume(';')? {
            self.error(Error::MissingSemicolonAfterCharacterReference);
        }
        self.state = State::NumericCharacterReferenceEnd;
        Ok(Step::Continue)
    }

    fn numeric_character_reference_end_state(&mut self) -> StepResult {
        let mut errs = Vec::new();
        let c = entities::resolve_numeric(self.char_ref_code, &mut errs);
        for e in errs {
            self.error(e);
        }
        self.push_ref_str(&c.to_string());
        self.exit_char_ref();
        Ok(Step::Continue)
    }

    // --- XML-only states -------------------------------------------------------------

    fn xml_declaration_open_state(&mut self) -> StepResult {
        let name = self.reader.consume_tag_name()?;
        self.pending.xml_decl.name.push_str(&name);
        self.state = State::XmlDeclarationContent;
        Ok(Step::Continue)
    }

    fn xml_declaration_content_state(&mut self) -> StepResult {
        let content = self.reader.consume_to('>')?;
        if self.reader.current()?.is_none() {
            parse_simple_attrs(&content, &mut self.pending.xml_decl.attributes);
            self.error(Error::XmlDeclarationNotWellFormed);
            self.emit_xml_decl();
            return Ok(Step::Eof);
        }
        self.reader.advance()?;
        parse_simple_attrs(&content, &mut self.pending.xml_decl.attributes);
        self.state = State::Data;
        self.emit_xml_decl();
        Ok(Step::Continue)
    }

    fn processing_instruction_content_state(&mut self) -> StepResult {
        let content = self.reader.consume_to_str("?>")?;
        self.pending.xml_decl.name.push_str(&content);
        if self.reader.match_consume_ignore_case("?>")? {
            self.state = State::Data;
            self.emit_xml_decl();
            Ok(Step::Continue)
        } else {
            self.error(Error::XmlDeclarationNotWellFormed);
            self.emit_xml_decl();
            Ok(Step::Eof)
        }
    }
}

/// Best-effort `name="value"`/`name='value'` scan over an XML declaration's raw
/// interior content; this crate doesn't need full XML
/// attribute-value normalization (no entity expansion inside `<?xml ...?>`), just
/// enough structure to recover `version`/`encoding`/`standalone`.
fn parse_simple_attrs(content: &str, attrs: &mut crate::attributes::Attributes) {
    let mut chars = content.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let mut name = String::new();
        while matches!(chars.peek(), Some(c) if !c.is_whitespace() && *c != '=') {
            name.push(chars.next().unwrap());
        }
        if name.is_empty() {
            break;
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            continue;
        }
        chars.next();
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.peek() {
            Some(q @ ('"' | '\'')) => {
                let q = *q;
                chars.next();
                q
            }
            _ => continue,
        };
        let mut value = String::new();
        for c in chars.by_ref() {
            if c == quote {
                break;
            }
            value.push(c);
        }
        attrs.push(HtmlString::from(name), HtmlString::from(value));
    }
}
